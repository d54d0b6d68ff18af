//! Forward enumeration of the reachable state space, one layer (tile sum) at
//! a time.
//!
//! Each layer is cut into tranches that run on the worker pool. A tranche
//! writes sorted fragments for the parts its successors land in, plus a
//! manifest naming them. Once both layers feeding a part are done the part is
//! compacted and the older manifests are dropped.

mod tranche;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::compactor::{CompactError, LayerCompactor};
use crate::config::{BuilderConfig, ConfigError, ModelConfig, ResolverStrategy};
use crate::engine::{start_states, State};
use crate::layers::{LayerFolder, LayerPartKey, PartFile, TrancheKey};
use crate::pool::{TaskError, WorkerPool};
use crate::resolver::{Resolution, Resolver, ResolverError};
use crate::serialization::{write_atomically, write_states, CodecError, LayerPartInfo};
use tranche::{TrancheTask, TrancheWorker};

/// File in the model folder recording how it was built.
pub const MODEL_FILE: &str = "model.json";

/// File in the model folder holding the resolver's win-state table.
pub const WIN_STATES_FILE: &str = "win_states.postcard";

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Compact(#[from] CompactError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("no start state parts in {0}")]
    NoStartStates(PathBuf),
    #[error("tranche {tranche} failed: {message}")]
    Tranche { tranche: String, message: String },
}

/// Parameters a model folder was built with, stored as `model.json`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub model: ModelConfig,
    pub strategy: ResolverStrategy,
    pub builder: BuilderConfig,
}

impl ModelManifest {
    pub fn write(&self, folder: &Path) -> Result<(), CodecError> {
        write_atomically(&folder.join(MODEL_FILE), |w| {
            serde_json::to_writer_pretty(&mut *w, self)?;
            Ok(())
        })
    }

    pub fn read(folder: &Path) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(&fs::read(folder.join(MODEL_FILE))?)?)
    }
}

/// What one layer of the build produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub sum: u32,
    pub input_parts: usize,
    pub input_states: u64,
    pub tranches: usize,
    /// States in the parts of layer `sum + 2`, which this layer completed.
    pub completed_states: u64,
}

pub struct LayerBuilder<'r, const N: usize> {
    folder: LayerFolder,
    resolver: &'r dyn Resolver<N>,
    config: BuilderConfig,
    pool: WorkerPool,
}

impl<'r, const N: usize> LayerBuilder<'r, N> {
    pub fn new(folder: LayerFolder, resolver: &'r dyn Resolver<N>, config: BuilderConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let pool = WorkerPool::new(config.worker_threads());
        Ok(Self { folder, resolver, config, pool })
    }

    pub fn folder(&self) -> &LayerFolder {
        &self.folder
    }

    pub fn model(&self) -> &ModelConfig {
        self.resolver.model()
    }

    /// Number of moves in which `state` is a definite win.
    pub fn moves_to_definite_win(&self, state: State<N>) -> Result<u8, ResolverError> {
        match self.resolver.resolve(state) {
            Resolution::Win(k) => Ok(k),
            _ => Err(ResolverError::NotResolved { state: state.raw(), max_depth: self.model().max_depth }),
        }
    }

    fn compactor(&self) -> LayerCompactor<'_> {
        LayerCompactor::new(&self.folder, *self.model(), self.config.index_stride)
    }

    /// Write the parts holding every canonical start state, and `model.json`.
    pub fn build_start_state_layers(&self) -> Result<Vec<LayerPartKey>, BuildError> {
        ModelManifest { model: *self.model(), strategy: self.resolver.strategy(), builder: self.config }
            .write(self.folder.path())?;

        let mut parts: Vec<(LayerPartKey, Vec<u64>)> = Vec::new();
        for (state, _) in start_states::<N>() {
            let key = LayerPartKey::of(state);
            match parts.iter_mut().find(|(k, _)| *k == key) {
                Some((_, states)) => states.push(state.raw()),
                None => parts.push((key, vec![state.raw()])),
            }
        }
        parts.sort();
        for (key, states) in &mut parts {
            states.sort_unstable();
            let written = write_states(
                &self.folder.part_path(*key, PartFile::States),
                states.iter().copied(),
                self.config.index_stride,
            )?;
            LayerPartInfo::new(written, self.config.index_stride, *self.model())
                .write(&self.folder.part_path(*key, PartFile::Info))?;
            debug!("start part {:?}: {} states", key, states.len());
        }
        info!("wrote {} start state parts", parts.len());
        Ok(parts.into_iter().map(|(k, _)| k).collect())
    }

    pub fn build(&self) -> Result<Vec<LayerStats>, BuildError> {
        self.build_with_progress(|_| {})
    }

    /// Build every layer reachable from the start-state parts, reporting each
    /// finished layer to `on_layer`.
    pub fn build_with_progress<F: FnMut(&LayerStats)>(&self, mut on_layer: F) -> Result<Vec<LayerStats>, BuildError> {
        self.remove_stale_work()?;
        let mut sum = match self.folder.layer_sums()?.first() {
            Some(&s) => s,
            None => return Err(BuildError::NoStartStates(self.folder.path().to_path_buf())),
        };

        let mut all_stats = Vec::new();
        let mut previous: Vec<TrancheKey> = Vec::new();
        loop {
            let parts = self.folder.parts_with_sum(sum)?;
            if parts.is_empty()
                && self.folder.parts_with_sum(sum + 2)?.is_empty()
                && self.folder.fragments()?.is_empty()
            {
                break;
            }
            let (tasks, input_states) = self.plan_layer(&parts)?;
            let current: Vec<TrancheKey> = tasks.iter().map(|t| t.key).collect();
            self.run_tranches(tasks)?;

            let completed_states = self.compact_layer(sum + 2, &current, &previous)?;
            self.remove_manifests(&previous)?;

            let stats = LayerStats {
                sum,
                input_parts: parts.len(),
                input_states,
                tranches: current.len(),
                completed_states,
            };
            info!(
                "layer {}: {} states in {} parts, {} tranches; layer {} has {} states",
                sum,
                input_states,
                parts.len(),
                current.len(),
                sum + 2,
                completed_states
            );
            on_layer(&stats);
            all_stats.push(stats);
            previous = current;
            sum += 2;
        }
        self.remove_manifests(&previous)?;
        Ok(all_stats)
    }

    fn plan_layer(&self, parts: &[LayerPartKey]) -> Result<(Vec<TrancheTask>, u64), BuildError> {
        let mut tasks = Vec::new();
        let mut input_states = 0;
        for &part in parts {
            let info = self.folder.read_info(part)?;
            input_states += info.num_states;
            for (remainder, (start, end)) in info.partitions(self.config.partitions).into_iter().enumerate() {
                tasks.push(TrancheTask {
                    key: TrancheKey { input: part, remainder: remainder as u32 },
                    start,
                    end,
                });
            }
        }
        Ok((tasks, input_states))
    }

    fn run_tranches(&self, tasks: Vec<TrancheTask>) -> Result<(), BuildError> {
        let keys: Vec<TrancheKey> = tasks.iter().map(|t| t.key).collect();
        let worker = TrancheWorker { folder: &self.folder, resolver: self.resolver, config: &self.config };
        let results = self.pool.run(tasks, |task| worker.run(task));
        let mut first_error = None;
        for (key, result) in keys.iter().zip(results) {
            let message = match result {
                Ok(_) => continue,
                Err(TaskError::Failed(e)) => e.to_string(),
                Err(TaskError::Panicked(msg)) => format!("panicked: {}", msg),
            };
            warn!("tranche {} failed: {}", key.file_name(), message);
            first_error.get_or_insert(BuildError::Tranche { tranche: key.file_name(), message });
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Compact every part of layer `sum` from the tranches of the two layers
    /// that feed it. Returns the number of states in the layer.
    fn compact_layer(&self, sum: u32, current: &[TrancheKey], previous: &[TrancheKey]) -> Result<u64, BuildError> {
        let tranches: Vec<TrancheKey> = previous.iter().chain(current).copied().collect();
        let mut outputs: BTreeSet<LayerPartKey> = BTreeSet::new();
        for tranche in &tranches {
            if !self.folder.tranche_path(tranche).exists() {
                return Err(CompactError::MissingTranche(tranche.file_name()).into());
            }
            let manifest = self.folder.read_manifest(tranche)?;
            outputs.extend(manifest.outputs.iter().map(|o| o.part).filter(|p| p.sum == sum));
        }
        let compactor = self.compactor();
        for &part in &outputs {
            compactor.compact(part, &tranches)?;
        }
        let mut states = 0;
        for part in self.folder.parts_with_sum(sum)? {
            states += self.folder.read_info(part)?.num_states;
        }
        Ok(states)
    }

    fn remove_manifests(&self, tranches: &[TrancheKey]) -> io::Result<()> {
        for tranche in tranches {
            match fs::remove_file(self.folder.tranche_path(tranche)) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    /// Fragments and manifests left by an interrupted build.
    fn remove_stale_work(&self) -> io::Result<()> {
        let fragments = self.folder.fragments()?;
        let tranches = self.folder.tranches()?;
        if !fragments.is_empty() || !tranches.is_empty() {
            warn!(
                "removing {} fragments and {} manifests from an earlier build",
                fragments.len(),
                tranches.len()
            );
        }
        for key in &fragments {
            fs::remove_file(self.folder.fragment_path(key))?;
        }
        self.remove_manifests(&tranches)
    }
}
