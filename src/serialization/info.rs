use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{write_atomically, CodecError, VByteIndexEntry, WrittenStates};
use crate::config::ModelConfig;
use crate::layers::TrancheKey;

/// Metadata stored as `<part>.json` next to a compacted `.vbyte` part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerPartInfo {
    pub num_states: u64,
    pub num_bytes: u64,
    pub crc32c: u32,
    pub index_stride: usize,
    pub index: Vec<VByteIndexEntry>,
    pub model: ModelConfig,
    /// Tranches whose fragments have been merged into this part.
    #[serde(default)]
    pub tranches: Vec<TrancheKey>,
}

impl LayerPartInfo {
    pub fn new(written: WrittenStates, index_stride: usize, model: ModelConfig) -> Self {
        Self {
            num_states: written.num_states,
            num_bytes: written.num_bytes,
            crc32c: written.crc32c,
            index_stride,
            index: written.index,
            model,
            tranches: Vec::new(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), CodecError> {
        write_atomically(path, |w| {
            serde_json::to_writer_pretty(&mut *w, self)?;
            Ok(())
        })
    }

    pub fn read(path: &Path) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Check a part's bytes against the recorded length and checksum.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), CodecError> {
        if bytes.len() as u64 != self.num_bytes {
            return Err(CodecError::Malformed("part length differs from metadata"));
        }
        let actual = crc32c::crc32c(bytes);
        if actual != self.crc32c {
            return Err(CodecError::Checksum { expected: self.crc32c, actual });
        }
        Ok(())
    }

    /// Split the part into at most `partitions` contiguous byte ranges at
    /// index entries. Each range is `(start, end_offset)`.
    pub fn partitions(&self, partitions: usize) -> Vec<(VByteIndexEntry, u64)> {
        if self.index.is_empty() {
            return Vec::new();
        }
        let n = partitions.clamp(1, self.index.len());
        let starts: Vec<VByteIndexEntry> =
            (0..n).map(|r| self.index[r * self.index.len() / n]).collect();
        starts
            .iter()
            .enumerate()
            .map(|(r, &start)| {
                let end = starts.get(r + 1).map_or(self.num_bytes, |e| e.byte_offset);
                (start, end)
            })
            .collect()
    }
}
