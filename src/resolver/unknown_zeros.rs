use std::collections::HashMap;

use super::Resolution;
use crate::engine::{Move, State, Symmetry};

/// Search over partially known states.
///
/// A freshly spawned tile is recorded as "unknown" (bit set in `mask`, nibble
/// holding the placeholder 1) instead of branching on 2 vs 4 right away. The
/// value is only decided when no value-independent answer exists, so many
/// spawn pairs collapse into one node.
pub(super) struct UnknownZerosSearch<const N: usize> {
    max_exponent: u8,
    memo: HashMap<(State<N>, u16, u8), Resolution, ahash::RandomState>,
}

impl<const N: usize> UnknownZerosSearch<N> {
    pub fn new(max_exponent: u8) -> Self {
        Self { max_exponent, memo: HashMap::default() }
    }

    pub fn resolve(&mut self, state: State<N>, horizon: u8) -> Resolution {
        self.resolve_partial(state, 0, horizon)
    }

    fn resolve_partial(&mut self, state: State<N>, mask: u16, horizon: u8) -> Resolution {
        let key = canonicalize_partial(state, mask);
        if let Some(&r) = self.memo.get(&(key.0, key.1, horizon)) {
            return r;
        }
        let r = self.expand(key.0, key.1, horizon);
        self.memo.insert((key.0, key.1, horizon), r);
        r
    }

    fn expand(&mut self, state: State<N>, mask: u16, horizon: u8) -> Resolution {
        if state.max_value() >= self.max_exponent {
            return Resolution::Win(0);
        }
        if mask != 0 {
            if horizon >= 1 && self.wins_regardless(state, mask) {
                return Resolution::Win(1);
            }
            let bit = mask.trailing_zeros() as usize;
            let rest = mask & !(1 << bit);
            let low = self.resolve_partial(state.with_cell(bit, 1), rest, horizon);
            if low == Resolution::Unresolved {
                return low;
            }
            let high = self.resolve_partial(state.with_cell(bit, 2), rest, horizon);
            return match (low, high) {
                (Resolution::Win(a), Resolution::Win(b)) => Resolution::Win(a.max(b)),
                (Resolution::Lose, Resolution::Lose) => Resolution::Lose,
                _ => Resolution::Unresolved,
            };
        }

        let moved: Vec<State<N>> = state.legal_moves().map(|(_, s)| s).collect();
        if moved.is_empty() {
            return Resolution::Lose;
        }
        if horizon == 0 {
            return Resolution::Unresolved;
        }
        if moved.iter().any(|s| s.max_value() >= self.max_exponent) {
            return Resolution::Win(1);
        }

        let mut best: Option<u8> = None;
        let mut all_lose = true;
        for after in moved {
            let mut worst = Some(0u8);
            for (succ, succ_mask) in self.spawns(after) {
                let r = self.resolve_partial(succ, succ_mask, horizon - 1);
                worst = match (worst, r) {
                    (Some(w), Resolution::Win(k)) => Some(w.max(k)),
                    _ => None,
                };
                all_lose &= r == Resolution::Lose;
                if worst.is_none() && !all_lose {
                    break;
                }
            }
            if let Some(k) = worst {
                best = Some(best.map_or(k + 1, |b| b.min(k + 1)));
            }
        }
        match best {
            Some(k) => Resolution::Win(k),
            None if all_lose => Resolution::Lose,
            None => Resolution::Unresolved,
        }
    }

    /// One child per empty cell, value unknown. When a spawned 4 could itself
    /// be the winning tile the values are enumerated instead.
    fn spawns(&self, after: State<N>) -> Vec<(State<N>, u16)> {
        let empty = (0..State::<N>::CELLS).filter(|&i| after.get(i) == 0);
        if self.max_exponent <= 2 {
            return empty
                .flat_map(|i| [(after.with_cell(i, 1), 0), (after.with_cell(i, 2), 0)])
                .collect();
        }
        empty.map(|i| (after.with_cell(i, 1), 1u16 << i)).collect()
    }

    /// True if some move wins whatever the unknown tiles turn out to be.
    ///
    /// A move is value-independent when every line holding an unknown holds
    /// nothing else, so the unknown can only slide.
    fn wins_regardless(&self, state: State<N>, mask: u16) -> bool {
        Move::ALL.into_iter().any(|mv| {
            let columns = matches!(mv, Move::Up | Move::Down);
            let independent = (0..N).all(|line| {
                let cells: Vec<usize> = (0..N)
                    .map(|k| if columns { k * N + line } else { line * N + k })
                    .collect();
                let unknowns = cells.iter().filter(|&&i| mask & (1 << i) != 0).count();
                unknowns == 0 || (unknowns == 1 && cells.iter().filter(|&&i| state.get(i) != 0).count() == 1)
            });
            if !independent {
                return false;
            }
            let after = state.shift(mv);
            after != state && after.max_value() >= self.max_exponent
        })
    }
}

/// Smallest `(state, mask)` image over the board symmetries.
fn canonicalize_partial<const N: usize>(state: State<N>, mask: u16) -> (State<N>, u16) {
    Symmetry::ALL
        .iter()
        .map(|&sym| (state.transform(sym), sym.map_mask(mask, N)))
        .min()
        .unwrap_or((state, mask))
}
