//! Backward induction over the layer model.
//!
//! Layers are visited from the largest tile sum down. A state's successors
//! lie two or four above it, so by the time a layer is solved every value it
//! needs is either resolved or sitting in a `.values` file.

mod solution;

use std::io;

use log::{debug, info};
use rayon::prelude::*;

use crate::config::{ConfigError, SolverConfig};
use crate::engine::{Move, State};
use crate::layers::{LayerFolder, LayerPartKey, PartFile};
use crate::resolver::{Resolver, Valuer};
use crate::serialization::{
    write_policy, write_records, CodecError, PolicyEntry, StateQValues, StateValue, ValueReader,
};

pub use solution::{PartPolicy, Solution, SOLVER_FILE};

#[derive(thiserror::Error, Debug)]
pub enum SolveError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("successor {state:#x} of part {part:?} is neither resolved nor solved")]
    MissingState { state: u64, part: LayerPartKey },
    #[error("state {state:#x} has no legal move but was not resolved")]
    NoLegalMove { state: u64 },
    #[error("policy for {part:?} has {policy} entries for {states} states")]
    PolicyLength { part: LayerPartKey, states: usize, policy: usize },
}

/// What solving one part produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartStats {
    pub part: LayerPartKey,
    pub states: usize,
    /// Largest state value in the part.
    pub max_value: f64,
}

struct SolvedState {
    value: StateValue,
    policy: PolicyEntry,
    q: StateQValues,
}

pub struct LayerSolver<'r, const N: usize> {
    layers: LayerFolder,
    solution: LayerFolder,
    resolver: &'r dyn Resolver<N>,
    config: SolverConfig,
}

impl<'r, const N: usize> LayerSolver<'r, N> {
    /// Solve the model in `layers` into `layers/<config folder name>`.
    pub fn new(layers: LayerFolder, resolver: &'r dyn Resolver<N>, config: SolverConfig) -> Result<Self, SolveError> {
        config.validate()?;
        let solution = LayerFolder::create(layers.path().join(config.folder_name()))?;
        Ok(Self { layers, solution, resolver, config })
    }

    pub fn solution_folder(&self) -> &LayerFolder {
        &self.solution
    }

    pub fn solve(&self) -> Result<Solution<N>, SolveError> {
        self.solve_with_progress(|_| {})
    }

    /// Solve every part, reporting each to `on_part`.
    pub fn solve_with_progress<F: FnMut(&PartStats)>(&self, mut on_part: F) -> Result<Solution<N>, SolveError> {
        let mut sums = self.layers.layer_sums()?;
        sums.reverse();
        for sum in sums {
            let parts = self.layers.parts_with_sum(sum)?;
            let mut states = 0;
            for part in parts {
                let stats = self.solve_part(part)?;
                states += stats.states;
                on_part(&stats);
            }
            info!("solved layer {}: {} states", sum, states);
        }
        Solution::create(self.layers.clone(), self.solution.clone(), self.config)
    }

    /// Solve one part. Every part above it must already be solved.
    pub fn solve_part(&self, part: LayerPartKey) -> Result<PartStats, SolveError> {
        let mut readers: Vec<(LayerPartKey, ValueReader)> = Vec::new();
        for key in part.successor_keys() {
            let path = self.solution.part_path(key, PartFile::Values);
            if path.exists() {
                readers.push((key, ValueReader::open(&path)?));
            }
        }

        let states = self.layers.read_states(part)?;
        let solved: Vec<SolvedState> = states
            .par_iter()
            .map_init(
                || Valuer::new(self.resolver, self.config.discount, self.config.value_cache_size),
                |valuer, &raw| self.solve_state(State::from_raw(raw), part, valuer, &readers),
            )
            .collect::<Result<_, _>>()?;

        let values: Vec<StateValue> = solved.iter().map(|s| s.value).collect();
        let policy: Vec<PolicyEntry> = solved.iter().map(|s| s.policy).collect();
        write_records(&self.solution.part_path(part, PartFile::Values), &values)?;
        write_policy(&self.solution.part_path(part, PartFile::Policy), &policy)?;
        if self.config.write_q_values {
            let q: Vec<StateQValues> = solved.iter().map(|s| s.q).collect();
            write_records(&self.solution.part_path(part, PartFile::QValues), &q)?;
        }

        let max_value = values.iter().map(|v| v.value).fold(0.0, f64::max);
        debug!("solved {:?}: {} states, max value {}", part, values.len(), max_value);
        Ok(PartStats { part, states: values.len(), max_value })
    }

    fn solve_state(
        &self,
        state: State<N>,
        part: LayerPartKey,
        valuer: &mut Valuer<'_, N>,
        readers: &[(LayerPartKey, ValueReader)],
    ) -> Result<SolvedState, SolveError> {
        let discount = self.config.discount;
        let mut q = [0.0f64; 4];
        let mut legal = 0u64;
        for (mv, after) in state.legal_moves() {
            legal |= 1 << mv.index();
            let mut total = 0.0;
            for (succ, p) in after.random_transitions() {
                let v = match valuer.value(succ) {
                    Some(v) => v,
                    None => lookup(readers, succ).ok_or(SolveError::MissingState { state: succ.raw(), part })?,
                };
                total += p.to_f64() * discount * v;
            }
            q[mv.index()] = total;
        }
        if legal == 0 {
            return Err(SolveError::NoLegalMove { state: state.raw() });
        }

        let legal_moves = move || Move::ALL.into_iter().filter(move |a| legal & (1 << a.index()) != 0);
        let mut best = Move::Left;
        let mut best_q = f64::NEG_INFINITY;
        for a in legal_moves() {
            if q[a.index()] > best_q {
                best = a;
                best_q = q[a.index()];
            }
        }
        let threshold = best_q - self.config.alternate_action_tolerance;
        let alternates = legal_moves()
            .filter(|a| q[a.index()] >= threshold)
            .fold(0u8, |mask, a| mask | (1 << a.index()));

        Ok(SolvedState {
            value: StateValue { state: state.raw(), value: best_q },
            policy: PolicyEntry::new(best, alternates),
            q: StateQValues { state: state.raw(), legal, q },
        })
    }
}

fn lookup<const N: usize>(readers: &[(LayerPartKey, ValueReader)], state: State<N>) -> Option<f64> {
    let key = LayerPartKey::of(state);
    readers.iter().find(|(k, _)| *k == key).and_then(|(_, r)| r.get(state.raw()))
}
