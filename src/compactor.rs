//! Merges tranche fragments into canonical layer parts.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::{debug, warn};

use crate::config::ModelConfig;
use crate::layers::{LayerFolder, LayerPartKey, PartFile, TrancheKey};
use crate::serialization::{write_states, CodecError, LayerPartInfo, VByteReader};

#[derive(thiserror::Error, Debug)]
pub enum CompactError {
    #[error("no manifest for tranche {0}")]
    MissingTranche(String),
    #[error("missing fragment {0}")]
    MissingFragment(PathBuf),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub struct LayerCompactor<'a> {
    folder: &'a LayerFolder,
    model: ModelConfig,
    index_stride: usize,
}

impl<'a> LayerCompactor<'a> {
    pub fn new(folder: &'a LayerFolder, model: ModelConfig, index_stride: usize) -> Self {
        Self { folder, model, index_stride }
    }

    /// Merge every fragment that `tranches` produced for `part`, together with
    /// the part's existing file if any, into the canonical part file.
    ///
    /// Fragments are deleted only after the part and its info are in place.
    /// Fragments of tranches the existing part already absorbed may be gone,
    /// so running the same compaction twice gives the same part.
    pub fn compact(&self, part: LayerPartKey, tranches: &[TrancheKey]) -> Result<LayerPartInfo, CompactError> {
        let part_path = self.folder.part_path(part, PartFile::States);
        let info_path = self.folder.part_path(part, PartFile::Info);
        let existing = if part_path.exists() && info_path.exists() {
            Some(LayerPartInfo::read(&info_path)?)
        } else {
            None
        };
        let absorbed: &[TrancheKey] = existing.as_ref().map_or(&[], |i| i.tranches.as_slice());

        let mut fragments = Vec::new();
        for tranche in tranches {
            let manifest_path = self.folder.tranche_path(tranche);
            if !manifest_path.exists() {
                return Err(CompactError::MissingTranche(tranche.file_name()));
            }
            let manifest = self.folder.read_manifest(tranche)?;
            for key in manifest.fragment_keys(part) {
                let path = self.folder.fragment_path(&key);
                if path.exists() {
                    fragments.push(path);
                } else if absorbed.contains(tranche) {
                    debug!("fragment {} already merged into {:?}", key.file_name(), part);
                } else {
                    return Err(CompactError::MissingFragment(path));
                }
            }
        }

        let mut sources: Vec<Vec<u8>> = Vec::with_capacity(fragments.len() + 1);
        if existing.is_some() {
            sources.push(fs::read(&part_path)?);
        }
        for path in &fragments {
            sources.push(fs::read(path)?);
        }
        let merged = merge_sorted(&sources)?;

        let written = write_states(&part_path, merged, self.index_stride)?;
        let mut info = LayerPartInfo::new(written, self.index_stride, self.model);
        let mut all_tranches: Vec<TrancheKey> = absorbed.iter().chain(tranches).copied().collect();
        all_tranches.sort();
        all_tranches.dedup();
        info.tranches = all_tranches;
        info.write(&info_path)?;

        for path in &fragments {
            if let Err(e) = fs::remove_file(path) {
                warn!("could not remove fragment {}: {}", path.display(), e);
            }
        }
        debug!("compacted {:?}: {} fragments, {} states", part, fragments.len(), info.num_states);
        Ok(info)
    }
}

/// K-way merge of strictly increasing vbyte streams, dropping duplicates.
pub fn merge_sorted(sources: &[Vec<u8>]) -> Result<Vec<u64>, CodecError> {
    let mut readers: Vec<VByteReader<'_>> = sources.iter().map(|b| VByteReader::new(b)).collect();
    let mut heap = BinaryHeap::with_capacity(readers.len());
    for (i, reader) in readers.iter_mut().enumerate() {
        if let Some(v) = reader.next() {
            heap.push(Reverse((v?, i)));
        }
    }
    let mut out: Vec<u64> = Vec::new();
    while let Some(Reverse((value, i))) = heap.pop() {
        if out.last() != Some(&value) {
            out.push(value);
        }
        if let Some(v) = readers[i].next() {
            heap.push(Reverse((v?, i)));
        }
    }
    Ok(out)
}
