use std::collections::HashMap;

use super::Resolution;
use crate::engine::State;

/// Raised when a bounded search runs past its expansion budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct OutOfBudget;

/// AND/OR search over concrete states: the player picks a move, every spawn
/// outcome must then be won (or lost) within the remaining horizon.
pub(super) struct Search<const N: usize> {
    max_exponent: u8,
    budget: Option<u64>,
    expansions: u64,
    memo: HashMap<(State<N>, u8), Resolution, ahash::RandomState>,
}

impl<const N: usize> Search<N> {
    pub fn new(max_exponent: u8, budget: Option<u64>) -> Self {
        Self { max_exponent, budget, expansions: 0, memo: HashMap::default() }
    }

    pub fn expansions(&self) -> u64 {
        self.expansions
    }

    pub fn resolve(&mut self, state: State<N>, horizon: u8) -> Result<Resolution, OutOfBudget> {
        let state = state.canonicalize();
        if let Some(&r) = self.memo.get(&(state, horizon)) {
            return Ok(r);
        }
        let r = self.expand(state, horizon)?;
        self.memo.insert((state, horizon), r);
        Ok(r)
    }

    fn expand(&mut self, state: State<N>, horizon: u8) -> Result<Resolution, OutOfBudget> {
        if state.max_value() >= self.max_exponent {
            return Ok(Resolution::Win(0));
        }
        let moved: Vec<State<N>> = state.legal_moves().map(|(_, s)| s).collect();
        if moved.is_empty() {
            return Ok(Resolution::Lose);
        }
        if horizon == 0 {
            return Ok(Resolution::Unresolved);
        }
        if moved.iter().any(|s| s.max_value() >= self.max_exponent) {
            return Ok(Resolution::Win(1));
        }
        self.expansions += 1;
        if self.budget.is_some_and(|b| self.expansions > b) {
            return Err(OutOfBudget);
        }

        let mut best: Option<u8> = None;
        let mut all_lose = true;
        for after in moved {
            let mut worst = Some(0u8);
            for (succ, _) in after.random_transitions() {
                let r = self.resolve(succ, horizon - 1)?;
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
        Ok(match best {
            Some(k) => Resolution::Win(k),
            None if all_lose => Resolution::Lose,
            None => Resolution::Unresolved,
        })
    }
}
