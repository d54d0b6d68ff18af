use std::io::Write;

use serde::{Deserialize, Serialize};

use super::CodecError;

/// A u64 never needs more than ten 7-bit groups.
pub const MAX_VARINT_BYTES: usize = 10;

/// Resume point inside a vbyte stream: decoding may start at `byte_offset`
/// with `previous` as the running value.
///
/// JSON metadata stores `previous` as a hex string; the binary form below
/// stores both fields as plain little-endian integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VByteIndexEntry {
    pub byte_offset: u64,
    #[serde(with = "hex_u64")]
    pub previous: u64,
}

impl VByteIndexEntry {
    pub const START: VByteIndexEntry = VByteIndexEntry { byte_offset: 0, previous: 0 };

    pub fn to_le_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.byte_offset.to_le_bytes());
        out[8..].copy_from_slice(&self.previous.to_le_bytes());
        out
    }

    pub fn from_le_bytes(b: [u8; 16]) -> Self {
        let mut offset = [0u8; 8];
        let mut previous = [0u8; 8];
        offset.copy_from_slice(&b[..8]);
        previous.copy_from_slice(&b[8..]);
        Self { byte_offset: u64::from_le_bytes(offset), previous: u64::from_le_bytes(previous) }
    }
}

mod hex_u64 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{value:x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let s = String::deserialize(d)?;
        u64::from_str_radix(&s, 16).map_err(D::Error::custom)
    }
}

/// Encode `value` as a little-endian base-128 varint into `buf`, returning
/// the number of bytes used.
#[inline]
pub fn encode_varint(mut value: u64, buf: &mut [u8; MAX_VARINT_BYTES]) -> usize {
    let mut n = 0;
    loop {
        let low = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf[n] = low;
            return n + 1;
        }
        buf[n] = low | 0x80;
        n += 1;
    }
}

/// Decode one varint from the front of `bytes`, returning the value and its length.
#[inline]
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize), CodecError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &b) in bytes.iter().enumerate() {
        if i == MAX_VARINT_BYTES {
            return Err(CodecError::Overflow);
        }
        let low = u64::from(b & 0x7f);
        if shift == 63 && low > 1 {
            return Err(CodecError::Overflow);
        }
        value |= low << shift;
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(CodecError::Truncated)
}

/// Streaming delta + varint writer for strictly increasing values.
pub struct VByteWriter<W: Write> {
    inner: W,
    bytes_written: u64,
    previous: u64,
    count: u64,
    stride: Option<u64>,
    index: Vec<VByteIndexEntry>,
}

impl<W: Write> VByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, bytes_written: 0, previous: 0, count: 0, stride: None, index: Vec::new() }
    }

    /// Like `new`, but records an index entry before every `stride`-th value.
    pub fn with_index(inner: W, stride: usize) -> Self {
        let mut w = Self::new(inner);
        w.stride = Some(stride.max(1) as u64);
        w
    }

    pub fn write(&mut self, value: u64) -> Result<(), CodecError> {
        if self.count > 0 && value <= self.previous {
            return Err(CodecError::NotIncreasing { previous: self.previous, value });
        }
        if let Some(stride) = self.stride {
            if self.count % stride == 0 {
                self.index.push(VByteIndexEntry {
                    byte_offset: self.bytes_written,
                    previous: self.previous,
                });
            }
        }
        let mut buf = [0u8; MAX_VARINT_BYTES];
        let n = encode_varint(value - self.previous, &mut buf);
        self.inner.write_all(&buf[..n])?;
        self.bytes_written += n as u64;
        self.previous = value;
        self.count += 1;
        Ok(())
    }

    pub fn write_all<I: IntoIterator<Item = u64>>(&mut self, values: I) -> Result<(), CodecError> {
        values.into_iter().try_for_each(|v| self.write(v))
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn previous(&self) -> u64 {
        self.previous
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn index(&self) -> &[VByteIndexEntry] {
        &self.index
    }

    /// Flush and hand back the writer together with the recorded index.
    pub fn finish(mut self) -> Result<(W, Vec<VByteIndexEntry>), CodecError> {
        self.inner.flush()?;
        Ok((self.inner, self.index))
    }
}

/// Decoder over a vbyte byte slice, optionally starting at an index entry
/// and stopping at a byte offset.
pub struct VByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
    previous: u64,
    started: bool,
}

impl<'a> VByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0, end: bytes.len(), previous: 0, started: false }
    }

    /// Decode from `entry` up to (not including) byte `end`.
    pub fn from_entry(bytes: &'a [u8], entry: VByteIndexEntry, end: usize) -> Result<Self, CodecError> {
        let pos = usize::try_from(entry.byte_offset).map_err(|_| CodecError::Malformed("index offset"))?;
        if pos > end || end > bytes.len() {
            return Err(CodecError::Malformed("index entry outside stream"));
        }
        Ok(Self { bytes, pos, end, previous: entry.previous, started: pos > 0 })
    }

    /// Byte offset of the next value.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl Iterator for VByteReader<'_> {
    type Item = Result<u64, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let decoded = decode_varint(&self.bytes[self.pos..self.end]).and_then(|(delta, n)| {
            if delta == 0 && self.started {
                return Err(CodecError::NotIncreasing { previous: self.previous, value: self.previous });
            }
            let value = self.previous.checked_add(delta).ok_or(CodecError::Overflow)?;
            Ok((value, n))
        });
        match decoded {
            Ok((value, n)) => {
                self.pos += n;
                self.previous = value;
                self.started = true;
                Some(Ok(value))
            }
            Err(e) => {
                // Stop after the first error.
                self.pos = self.end;
                Some(Err(e))
            }
        }
    }
}

/// Encode a sorted, duplicate-free slice.
pub fn encode_states(states: &[u64]) -> Result<Vec<u8>, CodecError> {
    let mut w = VByteWriter::new(Vec::with_capacity(states.len() * 2));
    w.write_all(states.iter().copied())?;
    let (bytes, _) = w.finish()?;
    Ok(bytes)
}

pub fn decode_states(bytes: &[u8]) -> Result<Vec<u64>, CodecError> {
    VByteReader::new(bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_boundaries() {
        let mut buf = [0u8; MAX_VARINT_BYTES];
        for (v, len) in [(0u64, 1), (127, 1), (128, 2), (16_383, 2), (16_384, 3), (u64::MAX, 10)] {
            let n = encode_varint(v, &mut buf);
            assert_eq!(n, len, "length of {v}");
            assert_eq!(decode_varint(&buf[..n]).unwrap(), (v, n));
        }
        assert_eq!(encode_varint(300, &mut buf), 2);
        assert_eq!(&buf[..2], &[0xac, 0x02]);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(encode_states(&[]).unwrap().is_empty());
        assert!(decode_states(&[]).unwrap().is_empty());
    }

    #[test]
    fn roundtrip_sorted_states() {
        let states = vec![0x11, 0x12, 0x1000, 0x1001, 0x0123_4567_89ab_cdef, u64::MAX];
        let bytes = encode_states(&states).unwrap();
        assert_eq!(decode_states(&bytes).unwrap(), states);
        assert_eq!(bytes[0], 0x11);
        assert_eq!(bytes[1], 0x01);
    }

    #[test]
    fn rejects_unsorted_or_duplicate_input() {
        assert!(matches!(
            encode_states(&[5, 5]),
            Err(CodecError::NotIncreasing { previous: 5, value: 5 })
        ));
        assert!(encode_states(&[5, 3]).is_err());
    }

    #[test]
    fn truncated_and_overflowing_streams() {
        assert!(matches!(decode_states(&[0x80]), Err(CodecError::Truncated)));
        assert!(matches!(decode_states(&[0x05, 0xff]), Err(CodecError::Truncated)));
        assert!(matches!(decode_states(&[0xff; 11]), Err(CodecError::Overflow)));
        // Two deltas that together exceed u64::MAX.
        let mut bytes = vec![0xff; 9];
        bytes.push(0x01);
        bytes.push(0x01);
        assert!(matches!(decode_states(&bytes), Err(CodecError::Overflow)));
        // A zero delta after the first value means a duplicate.
        assert!(matches!(decode_states(&[0x03, 0x00]), Err(CodecError::NotIncreasing { .. })));
    }

    #[test]
    fn index_allows_resuming_mid_stream() {
        let states: Vec<u64> = (1..=100u64).map(|i| i * i * 1000).collect();
        let mut w = VByteWriter::with_index(Vec::new(), 16);
        w.write_all(states.iter().copied()).unwrap();
        assert_eq!(w.count(), 100);
        assert_eq!(w.previous(), 100 * 100 * 1000);
        let total = w.bytes_written();
        let (bytes, index) = w.finish().unwrap();
        assert_eq!(bytes.len() as u64, total);
        assert_eq!(index.len(), 7);
        assert_eq!(index[0], VByteIndexEntry::START);

        let entry = index[2];
        let end = index[3].byte_offset as usize;
        let chunk: Vec<u64> = VByteReader::from_entry(&bytes, entry, end)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(chunk, states[32..48].to_vec());

        let tail: Vec<u64> = VByteReader::from_entry(&bytes, index[6], bytes.len())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(tail, states[96..].to_vec());
    }

    #[test]
    fn index_entry_serialises_previous_as_hex() {
        let e = VByteIndexEntry { byte_offset: 42, previous: 0xabc };
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"byte_offset":42,"previous":"abc"}"#);
        let back: VByteIndexEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
        assert_eq!(VByteIndexEntry::from_le_bytes(e.to_le_bytes()), e);
    }
}
