use std::collections::BTreeMap;
use std::fs::File;

use log::debug;
use memmap2::Mmap;

use super::BuildError;
use crate::cache::StateHashSet;
use crate::config::BuilderConfig;
use crate::engine::State;
use crate::layers::{LayerFolder, LayerPartKey, PartFile, TrancheKey, TrancheManifest, TrancheOutput};
use crate::resolver::{Resolver, Valuer};
use crate::serialization::{write_states, VByteIndexEntry, VByteReader};

/// A contiguous byte range of one input part.
#[derive(Debug, Clone, Copy)]
pub(super) struct TrancheTask {
    pub key: TrancheKey,
    pub start: VByteIndexEntry,
    pub end: u64,
}

struct Output {
    states: StateHashSet,
    fragments: u32,
}

/// Expands tranches into fragment files. Shared by all pool threads; each
/// call to `run` owns its sets and resolver cache.
pub(super) struct TrancheWorker<'a, const N: usize> {
    pub folder: &'a LayerFolder,
    pub resolver: &'a dyn Resolver<N>,
    pub config: &'a BuilderConfig,
}

impl<const N: usize> TrancheWorker<'_, N> {
    pub fn run(&self, task: TrancheTask) -> Result<TrancheManifest, BuildError> {
        let path = self.folder.part_path(task.key.input, PartFile::States);
        let file = File::open(&path)?;
        // Parts are immutable once compacted.
        let bytes = unsafe { Mmap::map(&file)? };
        let end = usize::try_from(task.end).unwrap_or(usize::MAX).min(bytes.len());

        let max_exponent = self.resolver.model().max_exponent;
        let mut valuer = Valuer::new(self.resolver, 1.0, self.config.resolver_cache_size);
        let mut outputs: BTreeMap<LayerPartKey, Output> = BTreeMap::new();
        let mut input_states = 0u64;

        for raw in VByteReader::from_entry(&bytes, task.start, end)? {
            let state = State::<N>::from_raw(raw?);
            input_states += 1;
            for (_, after) in state.legal_moves() {
                if after.max_value() >= max_exponent {
                    continue;
                }
                for (succ, _) in after.random_transitions() {
                    if valuer.resolution(succ).is_resolved() {
                        continue;
                    }
                    let part = LayerPartKey::of(succ);
                    let out = outputs.entry(part).or_insert_with(|| Output {
                        states: StateHashSet::with_limit(self.config.max_states),
                        fragments: 0,
                    });
                    out.states.insert(succ.raw());
                    if out.states.is_full() {
                        self.flush(task.key, part, out)?;
                    }
                }
            }
        }
        for (&part, out) in outputs.iter_mut() {
            if !out.states.is_empty() {
                self.flush(task.key, part, out)?;
            }
        }

        let manifest = TrancheManifest {
            tranche: task.key,
            input_states,
            outputs: outputs
                .iter()
                .filter(|(_, o)| o.fragments > 0)
                .map(|(&part, o)| TrancheOutput { part, fragments: o.fragments })
                .collect(),
        };
        manifest.write(&self.folder.tranche_path(&task.key))?;
        debug!(
            "tranche {} read {} states into {} outputs",
            task.key.file_name(),
            input_states,
            manifest.outputs.len()
        );
        Ok(manifest)
    }

    fn flush(&self, tranche: TrancheKey, part: LayerPartKey, out: &mut Output) -> Result<(), BuildError> {
        let key = tranche.fragment(part, out.fragments);
        let states = out.states.drain_sorted();
        write_states(&self.folder.fragment_path(&key), states, self.config.index_stride)?;
        out.fragments += 1;
        Ok(())
    }
}
