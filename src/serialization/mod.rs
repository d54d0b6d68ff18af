//! On-disk formats for layer parts.
//!
//! - `vbyte`: delta + varint encoding of sorted state lists, with index entries
//!   for resuming mid-stream.
//! - `info`: JSON metadata written next to each compacted part.
//! - `solution`: fixed-size value, Q-value and policy records.

mod info;
mod solution;
mod vbyte;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub use info::LayerPartInfo;
pub use solution::{
    read_policy, read_records, write_policy, write_records, PolicyEntry, StateQValues, StateValue,
    ValueReader,
};
pub use vbyte::{
    decode_states, decode_varint, encode_states, encode_varint, VByteIndexEntry, VByteReader,
    VByteWriter, MAX_VARINT_BYTES,
};

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("truncated varint")]
    Truncated,
    #[error("varint overflows u64")]
    Overflow,
    #[error("values not strictly increasing: {value:#x} after {previous:#x}")]
    NotIncreasing { previous: u64, value: u64 },
    #[error("malformed file: {0}")]
    Malformed(&'static str),
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Checksum { expected: u32, actual: u32 },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// `Write` adapter that keeps a running CRC32C of everything written.
pub struct ChecksumWriter<W: Write> {
    inner: W,
    crc: u32,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, crc: 0 }
    }

    pub fn checksum(&self) -> u32 {
        self.crc
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.crc = crc32c::crc32c_append(self.crc, &buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `path` through a temporary sibling, sync it and rename it into place.
/// On failure the sibling is removed and `path` is left as it was.
pub fn write_atomically<T, E, F>(path: &Path, write: F) -> Result<T, E>
where
    E: From<io::Error>,
    F: FnOnce(&mut BufWriter<File>) -> Result<T, E>,
{
    let tmp = temp_path(path);
    let mut w = BufWriter::new(File::create(&tmp)?);
    let result = write(&mut w).and_then(|out| {
        let f = w.into_inner().map_err(|e| e.into_error())?;
        f.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(out)
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Result of writing a sorted state list to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenStates {
    pub num_states: u64,
    pub num_bytes: u64,
    pub crc32c: u32,
    pub index: Vec<VByteIndexEntry>,
}

/// Write strictly increasing `states` as a vbyte file, atomically.
pub fn write_states<I>(path: &Path, states: I, index_stride: usize) -> Result<WrittenStates, CodecError>
where
    I: IntoIterator<Item = u64>,
{
    write_atomically(path, |w| {
        let mut vw = VByteWriter::with_index(ChecksumWriter::new(w), index_stride);
        vw.write_all(states)?;
        let (num_states, num_bytes) = (vw.count(), vw.bytes_written());
        let (cw, index) = vw.finish()?;
        Ok(WrittenStates { num_states, num_bytes, crc32c: cw.checksum(), index })
    })
}

pub fn read_states(path: &Path) -> Result<Vec<u64>, CodecError> {
    decode_states(&fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_states_reports_checksum_and_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sum-0004.max_value-1.vbyte");
        let states: Vec<u64> = (1..50u64).map(|i| i * 17).collect();
        let written = write_states(&path, states.iter().copied(), 10).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(written.num_states, 49);
        assert_eq!(written.num_bytes, bytes.len() as u64);
        assert_eq!(written.crc32c, crc32c::crc32c(&bytes));
        assert_eq!(written.index.len(), 5);
        assert_eq!(read_states(&path).unwrap(), states);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn empty_state_list_writes_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.vbyte");
        let written = write_states(&path, std::iter::empty(), 4).unwrap();
        assert_eq!(written.num_states, 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert!(read_states(&path).unwrap().is_empty());
    }

    #[test]
    fn failed_write_leaves_target_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part.vbyte");
        fs::write(&path, [1u8, 1]).unwrap();
        let res = write_states(&path, [3u64, 2], 4);
        assert!(matches!(res, Err(CodecError::NotIncreasing { .. })));
        assert_eq!(fs::read(&path).unwrap(), vec![1u8, 1]);
        assert!(!temp_path(&path).exists());
    }
}
