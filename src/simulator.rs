//! Monte Carlo playouts of a solved policy.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::info;
use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cache::LruCache;
use crate::config::SimulatorConfig;
use crate::engine::{gcd, start_states, State};
use crate::layers::LayerPartKey;
use crate::resolver::{Resolution, Resolver, Valuer};
use crate::solver::{PartPolicy, SolveError, Solution};

#[derive(thiserror::Error, Debug)]
pub enum SimulationError {
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error("state {state:#x} is not in the solved policy")]
    MissingPolicy { state: u64 },
    #[error("start state weights: {0}")]
    StartStates(#[from] WeightedError),
}

/// Aggregate outcome of a set of games.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub games: u64,
    pub wins: u64,
    pub losses: u64,
    /// Wins counted when the resolver proved them, without playing them out.
    pub resolved_wins: u64,
    /// Number of games by moves played.
    pub move_counts: BTreeMap<u32, u64>,
}

impl SimulationReport {
    pub fn win_rate(&self) -> f64 {
        if self.games == 0 {
            0.0
        } else {
            self.wins as f64 / self.games as f64
        }
    }

    pub fn mean_moves(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        let total: u64 = self.move_counts.iter().map(|(&m, &n)| u64::from(m) * n).sum();
        total as f64 / self.games as f64
    }

    fn record(&mut self, outcome: GameOutcome) {
        self.games += 1;
        match outcome.result {
            GameResult::Win => self.wins += 1,
            GameResult::ResolvedWin => {
                self.wins += 1;
                self.resolved_wins += 1;
            }
            GameResult::Lose => self.losses += 1,
        }
        *self.move_counts.entry(outcome.moves).or_default() += 1;
    }

    pub fn merge(mut self, other: SimulationReport) -> SimulationReport {
        self.games += other.games;
        self.wins += other.wins;
        self.losses += other.losses;
        self.resolved_wins += other.resolved_wins;
        for (moves, n) in other.move_counts {
            *self.move_counts.entry(moves).or_default() += n;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameResult {
    Win,
    ResolvedWin,
    Lose,
}

#[derive(Debug, Clone, Copy)]
struct GameOutcome {
    result: GameResult,
    moves: u32,
}

/// Draws canonical start states with their exact probabilities, scaled to
/// integer weights over a common denominator.
struct StartStateSampler<const N: usize> {
    states: Vec<State<N>>,
    index: WeightedIndex<u64>,
}

impl<const N: usize> StartStateSampler<N> {
    fn new() -> Result<Self, WeightedError> {
        let outcomes = start_states::<N>();
        let denominator = outcomes.iter().fold(1u64, |d, (_, p)| d / gcd(d, p.denominator()) * p.denominator());
        let index = WeightedIndex::new(outcomes.iter().map(|(_, p)| p.numerator() * (denominator / p.denominator())))?;
        Ok(Self { states: outcomes.into_iter().map(|(s, _)| s).collect(), index })
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> State<N> {
        self.states[self.index.sample(rng)]
    }
}

pub struct Simulator<'a, const N: usize> {
    solution: &'a Solution<N>,
    resolver: &'a dyn Resolver<N>,
    config: SimulatorConfig,
}

impl<'a, const N: usize> Simulator<'a, N> {
    pub fn new(solution: &'a Solution<N>, resolver: &'a dyn Resolver<N>, config: SimulatorConfig) -> Self {
        Self { solution, resolver, config }
    }

    /// Play `batches * batch_size` games. Batch `b` is seeded with `seed + b`,
    /// so reports are reproducible whatever the thread count.
    pub fn run(&self) -> Result<SimulationReport, SimulationError> {
        let starts = StartStateSampler::<N>::new()?;
        let reports = (0..self.config.batches)
            .into_par_iter()
            .map(|b| self.run_batch(&starts, b as u64))
            .collect::<Result<Vec<_>, _>>()?;
        let report = reports.into_iter().fold(SimulationReport::default(), SimulationReport::merge);
        info!(
            "{} games: {} wins ({} resolved), {} losses, win rate {:.4}",
            report.games,
            report.wins,
            report.resolved_wins,
            report.losses,
            report.win_rate()
        );
        Ok(report)
    }

    fn run_batch(&self, starts: &StartStateSampler<N>, batch: u64) -> Result<SimulationReport, SimulationError> {
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(batch));
        let mut valuer = Valuer::new(self.resolver, 1.0, 1 << 12);
        let mut policies: LruCache<LayerPartKey, Arc<PartPolicy>> = LruCache::new(self.config.policy_cache_size);
        let mut report = SimulationReport::default();
        for _ in 0..self.config.batch_size {
            let outcome = self.play(starts.sample(&mut rng), &mut rng, &mut valuer, &mut policies)?;
            report.record(outcome);
        }
        Ok(report)
    }

    fn play(
        &self,
        start: State<N>,
        rng: &mut StdRng,
        valuer: &mut Valuer<'_, N>,
        policies: &mut LruCache<LayerPartKey, Arc<PartPolicy>>,
    ) -> Result<GameOutcome, SimulationError> {
        let max_exponent = self.resolver.model().max_exponent;
        let mut state = start;
        let mut moves = 0u32;
        loop {
            if state.max_value() >= max_exponent {
                return Ok(GameOutcome { result: GameResult::Win, moves });
            }
            match valuer.resolution(state) {
                Resolution::Win(0) => return Ok(GameOutcome { result: GameResult::Win, moves }),
                Resolution::Win(k) => {
                    return Ok(GameOutcome { result: GameResult::ResolvedWin, moves: moves + u32::from(k) })
                }
                Resolution::Lose => return Ok(GameOutcome { result: GameResult::Lose, moves }),
                Resolution::Unresolved => {}
            }
            if state.is_lose() {
                return Ok(GameOutcome { result: GameResult::Lose, moves });
            }

            let part = LayerPartKey::of(state);
            let policy = policies
                .try_get_or_insert_with(part, || self.solution.part_policy(part).map(Arc::new))?
                .clone();
            let entry = policy.get(state.raw()).ok_or(SimulationError::MissingPolicy { state: state.raw() })?;
            let action = if self.config.use_alternate_actions {
                entry.alternates().choose(rng).unwrap_or(entry.action())
            } else {
                entry.action()
            };

            let next = state.shift(action);
            moves += 1;
            if next.max_value() >= max_exponent {
                return Ok(GameOutcome { result: GameResult::Win, moves });
            }
            state = next.with_random_tile(rng).canonicalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_arithmetic() {
        let mut a = SimulationReport::default();
        a.record(GameOutcome { result: GameResult::Win, moves: 3 });
        a.record(GameOutcome { result: GameResult::Lose, moves: 5 });
        let mut b = SimulationReport::default();
        b.record(GameOutcome { result: GameResult::ResolvedWin, moves: 3 });
        b.record(GameOutcome { result: GameResult::Win, moves: 7 });
        let total = a.merge(b);
        assert_eq!(total.games, 4);
        assert_eq!(total.wins, 3);
        assert_eq!(total.resolved_wins, 1);
        assert_eq!(total.losses, 1);
        assert_eq!(total.win_rate(), 0.75);
        assert_eq!(total.mean_moves(), 4.5);
        assert_eq!(total.move_counts.get(&3), Some(&2));
        assert_eq!(SimulationReport::default().win_rate(), 0.0);
    }

    #[test]
    fn start_states_follow_the_start_distribution() {
        let sampler = StartStateSampler::<2>::new().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let draws = 200_000u32;
        let mut counts: BTreeMap<State<2>, u32> = BTreeMap::new();
        for _ in 0..draws {
            *counts.entry(sampler.sample(&mut rng)).or_default() += 1;
        }
        let expected = start_states::<2>();
        assert_eq!(counts.len(), expected.len());
        for (state, p) in expected {
            let freq = f64::from(counts[&state]) / f64::from(draws);
            assert!((freq - p.to_f64()).abs() < 0.005, "{:?}: {} vs {}", state, freq, p.to_f64());
        }
    }
}
