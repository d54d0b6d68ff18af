//! Terminal-state resolution.
//!
//! A resolver decides, within `max_depth` moves, whether a state is a
//! definite win or a definite loss. The layer builder stops expanding at
//! resolved states and the solver assigns them a closed-form value.

#[cfg(test)]
pub(crate) mod known_states;
mod search;
mod unknown_zeros;
mod valuer;
mod win_states;

use std::io;
use std::path::Path;

use log::{debug, info};

use crate::config::{ConfigError, ModelConfig, ResolverStrategy};
use crate::engine::State;
use search::Search;
use unknown_zeros::UnknownZerosSearch;

pub use valuer::Valuer;
pub use win_states::WinStates;

#[derive(thiserror::Error, Debug)]
pub enum ResolverError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("resolver horizon {requested} exceeds {available}, the last horizon with win states")]
    HorizonExhausted { requested: u8, available: u8 },
    #[error("state {state:#x} is not a win within {max_depth} moves")]
    NotResolved { state: u64, max_depth: u8 },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("win state table: {0}")]
    Postcard(#[from] postcard::Error),
}

/// Outcome of resolving a state within the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Won in at most this many moves whatever tiles spawn.
    Win(u8),
    /// Lost whatever the player does.
    Lose,
    Unresolved,
}

impl Resolution {
    pub fn is_resolved(self) -> bool {
        self != Resolution::Unresolved
    }

    /// Discounted value of a resolved state: `discount^k` for a win in `k`
    /// moves, zero for a loss.
    pub fn value(self, discount: f64) -> Option<f64> {
        match self {
            Resolution::Win(k) => Some(discount.powi(i32::from(k))),
            Resolution::Lose => Some(0.0),
            Resolution::Unresolved => None,
        }
    }
}

/// Classifies states as definite wins or losses.
///
/// Implementations are shared read-only across worker threads; per-thread
/// caching lives in [`Valuer`].
pub trait Resolver<const N: usize>: Send + Sync {
    fn model(&self) -> &ModelConfig;

    fn strategy(&self) -> ResolverStrategy;

    fn resolve(&self, state: State<N>) -> Resolution;

    /// One threshold state per moves-to-win, for horizons `0..=max_depth`.
    fn win_states(&self) -> &WinStates<N>;

    /// The state standing in for every definite loss.
    fn lose_state(&self) -> State<N> {
        State::EMPTY
    }
}

/// Full AND/OR search to the horizon.
pub struct ExactResolver<const N: usize> {
    model: ModelConfig,
    win_states: WinStates<N>,
}

impl<const N: usize> ExactResolver<N> {
    pub fn new(model: ModelConfig) -> Result<Self, ResolverError> {
        check_model::<N>(&model)?;
        let win_states = WinStates::build(&model, |s, moves| exact(model.max_exponent, s, moves))?;
        Ok(Self::with_win_states(model, win_states))
    }

    pub fn with_win_states(model: ModelConfig, win_states: WinStates<N>) -> Self {
        Self { model, win_states }
    }
}

impl<const N: usize> Resolver<N> for ExactResolver<N> {
    fn model(&self) -> &ModelConfig {
        &self.model
    }

    fn strategy(&self) -> ResolverStrategy {
        ResolverStrategy::Exact
    }

    fn resolve(&self, state: State<N>) -> Resolution {
        exact(self.model.max_exponent, state, self.model.max_depth)
    }

    fn win_states(&self) -> &WinStates<N> {
        &self.win_states
    }
}

/// Exact search that reports `Unresolved` once a query expands more than
/// `max_expansions` nodes. Win states are still computed exactly.
pub struct BoundedResolver<const N: usize> {
    model: ModelConfig,
    max_expansions: u64,
    win_states: WinStates<N>,
}

impl<const N: usize> BoundedResolver<N> {
    pub fn new(model: ModelConfig, max_expansions: u64) -> Result<Self, ResolverError> {
        check_model::<N>(&model)?;
        let win_states = WinStates::build(&model, |s, moves| exact(model.max_exponent, s, moves))?;
        Ok(Self::with_win_states(model, max_expansions, win_states))
    }

    pub fn with_win_states(model: ModelConfig, max_expansions: u64, win_states: WinStates<N>) -> Self {
        Self { model, max_expansions, win_states }
    }
}

impl<const N: usize> Resolver<N> for BoundedResolver<N> {
    fn model(&self) -> &ModelConfig {
        &self.model
    }

    fn strategy(&self) -> ResolverStrategy {
        ResolverStrategy::Bounded { max_expansions: self.max_expansions }
    }

    fn resolve(&self, state: State<N>) -> Resolution {
        let mut search = Search::new(self.model.max_exponent, Some(self.max_expansions));
        match search.resolve(state, self.model.max_depth) {
            Ok(r) => r,
            Err(_) => {
                debug!("gave up on {:?} after {} expansions", state, search.expansions());
                Resolution::Unresolved
            }
        }
    }

    fn win_states(&self) -> &WinStates<N> {
        &self.win_states
    }
}

/// Search that defers the 2-or-4 choice of spawned tiles.
pub struct UnknownZerosResolver<const N: usize> {
    model: ModelConfig,
    win_states: WinStates<N>,
}

impl<const N: usize> UnknownZerosResolver<N> {
    pub fn new(model: ModelConfig) -> Result<Self, ResolverError> {
        check_model::<N>(&model)?;
        let win_states = WinStates::build(&model, |s, moves| unknown_zeros(model.max_exponent, s, moves))?;
        Ok(Self::with_win_states(model, win_states))
    }

    pub fn with_win_states(model: ModelConfig, win_states: WinStates<N>) -> Self {
        Self { model, win_states }
    }
}

impl<const N: usize> Resolver<N> for UnknownZerosResolver<N> {
    fn model(&self) -> &ModelConfig {
        &self.model
    }

    fn strategy(&self) -> ResolverStrategy {
        ResolverStrategy::UnknownZeros
    }

    fn resolve(&self, state: State<N>) -> Resolution {
        unknown_zeros(self.model.max_exponent, state, self.model.max_depth)
    }

    fn win_states(&self) -> &WinStates<N> {
        &self.win_states
    }
}

fn exact<const N: usize>(max_exponent: u8, state: State<N>, horizon: u8) -> Resolution {
    Search::new(max_exponent, None).resolve(state, horizon).unwrap_or(Resolution::Unresolved)
}

fn unknown_zeros<const N: usize>(max_exponent: u8, state: State<N>, horizon: u8) -> Resolution {
    UnknownZerosSearch::new(max_exponent).resolve(state, horizon)
}

fn check_model<const N: usize>(model: &ModelConfig) -> Result<(), ConfigError> {
    model.validate()?;
    if model.board_size != N {
        return Err(ConfigError::UnsupportedBoardSize(model.board_size));
    }
    Ok(())
}

/// Build the resolver for `strategy`, computing its win states.
pub fn build_resolver<const N: usize>(
    model: ModelConfig,
    strategy: ResolverStrategy,
) -> Result<Box<dyn Resolver<N>>, ResolverError> {
    let resolver: Box<dyn Resolver<N>> = match strategy {
        ResolverStrategy::Exact => Box::new(ExactResolver::new(model)?),
        ResolverStrategy::Bounded { max_expansions } => Box::new(BoundedResolver::new(model, max_expansions)?),
        ResolverStrategy::UnknownZeros => Box::new(UnknownZerosResolver::new(model)?),
    };
    Ok(resolver)
}

/// Like [`build_resolver`], but reuses the win-state table at `path` when it
/// was built with the same parameters, and writes it otherwise.
pub fn load_or_build_resolver<const N: usize>(
    model: ModelConfig,
    strategy: ResolverStrategy,
    path: &Path,
) -> Result<Box<dyn Resolver<N>>, ResolverError> {
    check_model::<N>(&model)?;
    if let Some(win_states) = WinStates::<N>::load(path, &model, strategy)? {
        info!("loaded win states up to horizon {} from {}", win_states.horizon(), path.display());
        let resolver: Box<dyn Resolver<N>> = match strategy {
            ResolverStrategy::Exact => Box::new(ExactResolver::with_win_states(model, win_states)),
            ResolverStrategy::Bounded { max_expansions } => {
                Box::new(BoundedResolver::with_win_states(model, max_expansions, win_states))
            }
            ResolverStrategy::UnknownZeros => Box::new(UnknownZerosResolver::with_win_states(model, win_states)),
        };
        return Ok(resolver);
    }
    let resolver = build_resolver::<N>(model, strategy)?;
    resolver.win_states().save(path, &model, strategy)?;
    info!("built win states up to horizon {}, saved to {}", resolver.win_states().horizon(), path.display());
    Ok(resolver)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(board_size: usize, max_exponent: u8, max_depth: u8) -> ModelConfig {
        ModelConfig::new(board_size, max_exponent, max_depth).unwrap()
    }

    fn state<const N: usize>(cells: &[u8]) -> State<N> {
        State::from_cells(cells).unwrap()
    }

    fn check_table<const N: usize>(max_exponent: u8, table: &[&[u8]]) {
        let expected: Vec<State<N>> = table.iter().map(|cells| state::<N>(cells).canonicalize()).collect();
        let last = expected.len() as u8 - 1;
        let first = ExactResolver::<N>::new(model(N, max_exponent, 0)).unwrap();
        assert_eq!(first.win_states().iter().collect::<Vec<_>>(), expected[..1]);
        assert_eq!(first.lose_state(), State::EMPTY);

        let resolver = ExactResolver::<N>::new(model(N, max_exponent, last)).unwrap();
        let got: Vec<State<N>> = resolver.win_states().iter().collect();
        assert_eq!(got, expected, "{}x{} to 2^{}", N, N, max_exponent);
        for (moves, &s) in expected.iter().enumerate() {
            assert_eq!(resolver.win_states().representative(moves as u8), Some(s));
            assert_eq!(resolver.resolve(s), Resolution::Win(moves as u8));
        }
        match ExactResolver::<N>::new(model(N, max_exponent, last + 1)) {
            Err(ResolverError::HorizonExhausted { requested, available }) => {
                assert_eq!((requested, available), (last + 1, last));
            }
            other => panic!("{}x{} to 2^{}: unexpected {:?}", N, N, max_exponent, other.map(|_| ())),
        }
    }

    #[test]
    fn win_states_match_known_tables() {
        for &(size, max_exponent, table) in known_states::WIN_STATE_TABLES {
            match size {
                2 => check_table::<2>(max_exponent, table),
                3 => check_table::<3>(max_exponent, table),
                _ => check_table::<4>(max_exponent, table),
            }
        }
    }

    #[test]
    fn long_3x3_runs_match_known_tables() {
        for &(max_exponent, table) in known_states::LONG_3X3_TABLES {
            let runs = usize::from(max_exponent);
            let resolver = ExactResolver::<3>::new(model(3, max_exponent, max_exponent - 1)).unwrap();
            let got: Vec<State<3>> = resolver.win_states().iter().collect();
            let expected: Vec<State<3>> = table[..runs].iter().map(|cells| state::<3>(cells).canonicalize()).collect();
            assert_eq!(got, expected, "3x3 to 2^{}", max_exponent);
            for (moves, cells) in table.iter().enumerate() {
                let mut search = Search::<3>::new(max_exponent, None);
                assert_eq!(search.resolve(state(cells), moves as u8), Ok(Resolution::Win(moves as u8)), "{:?}", cells);
            }
        }
    }

    #[test]
    fn extra_horizon_needs_a_diagonal_pair_that_wins() {
        // 3x3 to 32: every diagonal placement of the longest run fails the check.
        assert!(matches!(
            ExactResolver::<3>::new(model(3, 5, 5)),
            Err(ResolverError::HorizonExhausted { requested: 5, available: 4 })
        ));
        let resolver = ExactResolver::<3>::new(model(3, 4, 4)).unwrap();
        assert_eq!(resolver.win_states().representative(4), Some(state(&[0, 0, 0, 0, 1, 0, 1, 2, 3])));
    }

    #[test]
    fn resolves_wins_and_losses() {
        let resolver = ExactResolver::<2>::new(model(2, 3, 1)).unwrap();
        assert_eq!(resolver.resolve(state(&[0, 0, 0, 3])), Resolution::Win(0));
        assert_eq!(resolver.resolve(state(&[0, 0, 2, 2])), Resolution::Win(1));
        assert_eq!(resolver.resolve(state(&[1, 2, 2, 1])), Resolution::Lose);
        assert_eq!(resolver.resolve(state(&[0, 0, 0, 1])), Resolution::Unresolved);
    }

    #[test]
    fn strategies_agree() {
        let m = model(2, 4, 2);
        let exact = ExactResolver::<2>::new(m).unwrap();
        let lazy = UnknownZerosResolver::<2>::new(m).unwrap();
        let bounded = BoundedResolver::<2>::new(m, 1 << 20).unwrap();
        assert_eq!(exact.win_states(), lazy.win_states());
        for raw in 0..(1u64 << 16) {
            let s = State::<2>::from_raw(raw);
            if s.cells().iter().any(|&c| c > 5) {
                continue;
            }
            let r = exact.resolve(s);
            assert_eq!(lazy.resolve(s), r, "{:?}", s);
            assert_eq!(bounded.resolve(s), r, "{:?}", s);
        }

        let m = model(3, 3, 3);
        let exact = ExactResolver::<3>::new(m).unwrap();
        let lazy = UnknownZerosResolver::<3>::new(m).unwrap();
        for cells in [
            [0, 0, 0, 0, 0, 1, 2, 1, 0],
            [0, 0, 0, 0, 0, 0, 1, 1, 2],
            [1, 2, 1, 2, 1, 2, 1, 2, 1],
            [0, 0, 1, 0, 0, 0, 1, 0, 0],
            [2, 0, 0, 0, 0, 0, 0, 0, 1],
        ] {
            let s = state::<3>(&cells);
            assert_eq!(lazy.resolve(s), exact.resolve(s), "{:?}", s);
        }
    }

    #[test]
    fn tiny_budget_gives_up() {
        let resolver = BoundedResolver::<3>::new(model(3, 3, 3), 1).unwrap();
        assert_eq!(resolver.resolve(state(&[0, 0, 0, 0, 0, 1, 2, 1, 0])), Resolution::Unresolved);
        assert_eq!(resolver.resolve(state(&[0, 0, 0, 0, 0, 0, 0, 2, 2])), Resolution::Win(1));
    }

    #[test]
    fn win_state_table_is_reused_only_for_matching_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("win_states.bin");
        let m = model(2, 3, 2);
        let built = load_or_build_resolver::<2>(m, ResolverStrategy::Exact, &path).unwrap();
        assert!(path.exists());
        let loaded = WinStates::<2>::load(&path, &m, ResolverStrategy::Exact).unwrap().unwrap();
        assert_eq!(&loaded, built.win_states());
        assert!(WinStates::<2>::load(&path, &m, ResolverStrategy::UnknownZeros).unwrap().is_none());
        assert!(WinStates::<2>::load(&path, &model(2, 3, 1), ResolverStrategy::Exact).unwrap().is_none());
        let again = load_or_build_resolver::<2>(m, ResolverStrategy::Exact, &path).unwrap();
        assert_eq!(again.win_states(), built.win_states());
    }

    #[test]
    fn board_size_must_match() {
        assert!(matches!(
            ExactResolver::<3>::new(model(2, 3, 0)),
            Err(ResolverError::Config(ConfigError::UnsupportedBoardSize(2)))
        ));
    }

    #[test]
    fn discounted_values() {
        assert_eq!(Resolution::Win(0).value(0.5), Some(1.0));
        assert_eq!(Resolution::Win(2).value(0.5), Some(0.25));
        assert_eq!(Resolution::Lose.value(0.5), Some(0.0));
        assert_eq!(Resolution::Unresolved.value(0.5), None);
    }
}
