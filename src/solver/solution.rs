use std::fs;
use std::marker::PhantomData;

use super::SolveError;
use crate::config::SolverConfig;
use crate::engine::{start_states, State};
use crate::layers::{LayerFolder, LayerPartKey, PartFile};
use crate::serialization::{read_policy, write_atomically, CodecError, PolicyEntry, ValueReader};

/// File in a solution folder recording the solver parameters.
pub const SOLVER_FILE: &str = "solver.json";

/// A solved model: the layer folder plus the folder of values and policies.
pub struct Solution<const N: usize> {
    layers: LayerFolder,
    folder: LayerFolder,
    config: SolverConfig,
    _board: PhantomData<State<N>>,
}

impl<const N: usize> Solution<N> {
    pub(super) fn create(layers: LayerFolder, folder: LayerFolder, config: SolverConfig) -> Result<Self, SolveError> {
        write_atomically(&folder.path().join(SOLVER_FILE), |w| {
            serde_json::to_writer_pretty(&mut *w, &config).map_err(CodecError::from)
        })?;
        Ok(Self { layers, folder, config, _board: PhantomData })
    }

    /// Open a solution written earlier into `folder`.
    pub fn open(layers: LayerFolder, folder: LayerFolder) -> Result<Self, SolveError> {
        let bytes = fs::read(folder.path().join(SOLVER_FILE))?;
        let config: SolverConfig = serde_json::from_slice(&bytes).map_err(CodecError::from)?;
        Ok(Self { layers, folder, config, _board: PhantomData })
    }

    pub fn folder(&self) -> &LayerFolder {
        &self.folder
    }

    pub fn layers(&self) -> &LayerFolder {
        &self.layers
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solved value of `state`, `None` if it is not in any solved part.
    pub fn value(&self, state: State<N>) -> Result<Option<f64>, SolveError> {
        let state = state.canonicalize();
        let path = self.folder.part_path(LayerPartKey::of(state), PartFile::Values);
        if !path.exists() {
            return Ok(None);
        }
        Ok(ValueReader::open(&path)?.get(state.raw()))
    }

    /// Expected value of a new game.
    pub fn start_value(&self) -> Result<f64, SolveError> {
        let mut total = 0.0;
        for (state, p) in start_states::<N>() {
            let v = self.value(state)?.ok_or(SolveError::MissingState {
                state: state.raw(),
                part: LayerPartKey::of(state),
            })?;
            total += p.to_f64() * v;
        }
        Ok(total)
    }

    /// States of `part` paired with their policy entries.
    pub fn part_policy(&self, part: LayerPartKey) -> Result<PartPolicy, SolveError> {
        let states = self.layers.read_states(part)?;
        let policy = read_policy(&self.folder.part_path(part, PartFile::Policy))?;
        if states.len() != policy.len() {
            return Err(SolveError::PolicyLength { part, states: states.len(), policy: policy.len() });
        }
        Ok(PartPolicy { states, policy })
    }
}

/// Policy of one part, searchable by state.
#[derive(Debug, Clone, Default)]
pub struct PartPolicy {
    states: Vec<u64>,
    policy: Vec<PolicyEntry>,
}

impl PartPolicy {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, state: u64) -> Option<PolicyEntry> {
        self.states.binary_search(&state).ok().map(|i| self.policy[i])
    }
}
