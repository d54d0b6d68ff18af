use std::fs::{self, File};
use std::io::Write;
use std::mem::size_of;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use memmap2::Mmap;

use super::{write_atomically, CodecError};
use crate::engine::Move;

/// Solved value of one state; `.values` files hold these sorted by state.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateValue {
    pub state: u64,
    pub value: f64,
}

// Safety: repr(C), two 8-byte fields, no padding, every bit pattern valid.
unsafe impl Zeroable for StateValue {}
unsafe impl Pod for StateValue {}

/// Action values of one state. Bit `a` of `legal` is set when action `a`
/// changes the board; `q[a]` is meaningless otherwise.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateQValues {
    pub state: u64,
    pub legal: u64,
    pub q: [f64; 4],
}

// Safety: repr(C), 8-byte aligned fields only, no padding.
unsafe impl Zeroable for StateQValues {}
unsafe impl Pod for StateQValues {}

impl StateQValues {
    pub fn get(&self, action: Move) -> Option<f64> {
        (self.legal & (1 << action.index()) != 0).then_some(self.q[action.index()])
    }
}

/// Policy byte: primary action in bits 0-1, alternate-action mask in bits 4-7.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolicyEntry(u8);

impl PolicyEntry {
    pub fn new(action: Move, alternates: u8) -> Self {
        PolicyEntry(action.index() as u8 | ((alternates & 0xf) << 4))
    }

    pub fn from_byte(b: u8) -> Self {
        PolicyEntry(b)
    }

    pub fn byte(self) -> u8 {
        self.0
    }

    pub fn action(self) -> Move {
        Move::ALL[(self.0 & 0x3) as usize]
    }

    /// Actions within tolerance of the best, always including the primary one.
    pub fn alternates(self) -> impl Iterator<Item = Move> {
        let mask = (self.0 >> 4) | (1 << (self.0 & 0x3));
        Move::ALL.into_iter().filter(move |a| mask & (1 << a.index()) != 0)
    }
}

pub fn write_records<T: Pod>(path: &Path, records: &[T]) -> Result<(), CodecError> {
    write_atomically(path, |w| {
        w.write_all(bytemuck::cast_slice(records))?;
        Ok(())
    })
}

pub fn read_records<T: Pod>(path: &Path) -> Result<Vec<T>, CodecError> {
    let bytes = fs::read(path)?;
    if bytes.len() % size_of::<T>() != 0 {
        return Err(CodecError::Malformed("record file length"));
    }
    Ok(bytes.chunks_exact(size_of::<T>()).map(bytemuck::pod_read_unaligned).collect())
}

pub fn write_policy(path: &Path, policy: &[PolicyEntry]) -> Result<(), CodecError> {
    let bytes: Vec<u8> = policy.iter().map(|p| p.byte()).collect();
    write_atomically(path, |w| {
        w.write_all(&bytes)?;
        Ok(())
    })
}

pub fn read_policy(path: &Path) -> Result<Vec<PolicyEntry>, CodecError> {
    Ok(fs::read(path)?.into_iter().map(PolicyEntry::from_byte).collect())
}

/// Memory-mapped, binary-searchable view of a `.values` file.
pub struct ValueReader {
    // Empty files cannot be mapped on every platform.
    mmap: Option<Mmap>,
}

impl ValueReader {
    pub fn open(path: &Path) -> Result<Self, CodecError> {
        let f = File::open(path)?;
        let len = f.metadata()?.len();
        if len == 0 {
            return Ok(Self { mmap: None });
        }
        if len % size_of::<StateValue>() as u64 != 0 {
            return Err(CodecError::Malformed("values file length"));
        }
        let mmap = unsafe { Mmap::map(&f)? };
        bytemuck::try_cast_slice::<u8, StateValue>(&mmap[..])
            .map_err(|_| CodecError::Malformed("values file alignment"))?;
        Ok(Self { mmap: Some(mmap) })
    }

    pub fn records(&self) -> &[StateValue] {
        match &self.mmap {
            // Length and alignment were checked in `open`.
            Some(m) => bytemuck::try_cast_slice(&m[..]).unwrap_or(&[]),
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn get(&self, state: u64) -> Option<f64> {
        let records = self.records();
        records
            .binary_search_by_key(&state, |r| r.state)
            .ok()
            .map(|i| records[i].value)
    }
}
