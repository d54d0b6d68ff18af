use std::fs;
use std::iter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Resolution, ResolverError};
use crate::config::{ModelConfig, ResolverStrategy};
use crate::engine::State;

/// For each horizon `k`, the canonical threshold state (tile sum exactly
/// `2^max_exponent`) that wins in exactly `k` moves.
///
/// Horizon 0 is the lone winning tile. Horizon `k` lays the tiles
/// `E-1, E-2, ..., E-k, E-k` along [`snake_path`], largest first. When no
/// longer run fits, one more horizon moves the last tile of the longest run
/// one cell further along the path, diagonal to its twin.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WinStates<const N: usize> {
    states: Vec<State<N>>,
}

impl<const N: usize> WinStates<N> {
    /// Build one state per horizon up to `model.max_depth`, keeping each only
    /// if `resolve(state, k)` finds it wins in exactly `k` moves.
    pub fn build<F>(model: &ModelConfig, resolve: F) -> Result<Self, ResolverError>
    where
        F: Fn(State<N>, u8) -> Resolution,
    {
        let path = snake_path::<N>();
        let mut states = Vec::with_capacity(usize::from(model.max_depth) + 1);
        for moves in 0..=model.max_depth {
            let state = win_state::<N, _>(model.max_exponent, moves, &path, &resolve).ok_or(
                ResolverError::HorizonExhausted { requested: model.max_depth, available: moves.saturating_sub(1) },
            )?;
            states.push(state);
        }
        Ok(Self { states })
    }

    /// Largest horizon with a win state.
    pub fn horizon(&self) -> u8 {
        self.states.len().saturating_sub(1) as u8
    }

    /// The state that wins in exactly `moves` moves.
    pub fn representative(&self, moves: u8) -> Option<State<N>> {
        self.states.get(usize::from(moves)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = State<N>> + '_ {
        self.states.iter().copied()
    }

    /// Persist with postcard, tagged with the parameters that produced it.
    pub fn save(&self, path: &Path, model: &ModelConfig, strategy: ResolverStrategy) -> Result<(), ResolverError> {
        let table = WinStateTable {
            model: *model,
            strategy,
            states: self.states.iter().map(|s| s.raw()).collect(),
        };
        fs::write(path, postcard::to_allocvec(&table)?)?;
        Ok(())
    }

    /// Load a saved table; `None` if it is missing or was built with other parameters.
    pub fn load(path: &Path, model: &ModelConfig, strategy: ResolverStrategy) -> Result<Option<Self>, ResolverError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let table: WinStateTable = postcard::from_bytes(&bytes)?;
        if table.model != *model || table.strategy != strategy {
            return Ok(None);
        }
        Ok(Some(Self { states: table.states.into_iter().map(State::from_raw).collect() }))
    }
}

#[derive(Serialize, Deserialize)]
struct WinStateTable {
    model: ModelConfig,
    strategy: ResolverStrategy,
    states: Vec<u64>,
}

/// Cell indices from the bottom-left corner: the bottom row left to right,
/// the row above right to left, and so on up the board.
fn snake_path<const N: usize>() -> Vec<usize> {
    (0..N)
        .flat_map(|j| {
            let row = N - 1 - j;
            (0..N).map(move |k| row * N + if j % 2 == 0 { k } else { N - 1 - k })
        })
        .collect()
}

/// Horizons whose win state is a plain run: each needs a positive smallest
/// tile and at least one empty cell.
fn run_horizons(max_exponent: u8, cells: usize) -> u8 {
    1 + max_exponent.saturating_sub(1).min(cells.saturating_sub(2) as u8)
}

/// `[E]` for horizon 0, otherwise `E-1, ..., E-moves, E-moves`.
fn run_tiles(max_exponent: u8, moves: u8) -> Vec<u8> {
    if moves == 0 {
        return vec![max_exponent];
    }
    (1..=moves).map(|i| max_exponent - i).chain(iter::once(max_exponent - moves)).collect()
}

fn place<const N: usize>(tiles: &[u8], cells: impl IntoIterator<Item = usize>) -> State<N> {
    tiles
        .iter()
        .zip(cells)
        .fold(State::EMPTY, |s, (&tile, cell)| s.with_cell(cell, tile))
        .canonicalize()
}

fn diagonal<const N: usize>(a: usize, b: usize) -> bool {
    (a / N).abs_diff(b / N) == 1 && (a % N).abs_diff(b % N) == 1
}

fn win_state<const N: usize, F>(max_exponent: u8, moves: u8, path: &[usize], resolve: &F) -> Option<State<N>>
where
    F: Fn(State<N>, u8) -> Resolution,
{
    let wins = |s: &State<N>| resolve(*s, moves) == Resolution::Win(moves);
    let runs = run_horizons(max_exponent, path.len());
    if moves < runs {
        return Some(place::<N>(&run_tiles(max_exponent, moves), path.iter().copied())).filter(wins);
    }
    if moves > runs {
        return None;
    }

    // Keep the run minus its last tile contiguous from `offset`, skip a cell,
    // and take the first placement whose two smallest tiles touch diagonally.
    let tiles = run_tiles(max_exponent, runs - 1);
    let len = tiles.len();
    if len < 2 {
        return None;
    }
    (0..path.len().saturating_sub(len))
        .filter(|&offset| diagonal::<N>(path[offset + len - 2], path[offset + len]))
        .map(|offset| {
            let head = path[offset..offset + len - 1].iter().copied();
            place::<N>(&tiles, head.chain(iter::once(path[offset + len])))
        })
        .find(wins)
}
