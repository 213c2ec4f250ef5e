//! Delta bit-packing for small-delta `i32` sequences.
//!
//! Layout: `[count-1 uvarint][width u8][zigzag(min delta) varint][zigzag(first) varint]
//! [(delta - min delta) packed in `width` bits each]` where `delta = previous - current`.

use super::bit::{BitReader, BitWriter};
use super::stream::{write_var_i64, write_var_u64, ByteReader};
use crate::error::IndexError;

#[derive(Debug)]
pub struct DeltaBitPackingEncoder {
    first: i32,
    previous: i32,
    min_delta: i32,
    is_first: bool,
    deltas: Vec<i32>,
}

impl Default for DeltaBitPackingEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaBitPackingEncoder {
    pub fn new() -> Self {
        Self {
            first: 0,
            previous: 0,
            min_delta: i32::MAX,
            is_first: true,
            deltas: Vec::new(),
        }
    }

    /// Clears all state; the delta buffer keeps its capacity.
    pub fn reset(&mut self) {
        self.first = 0;
        self.previous = 0;
        self.min_delta = i32::MAX;
        self.is_first = true;
        self.deltas.clear();
    }

    pub fn add(&mut self, v: i32) {
        if self.is_first {
            self.is_first = false;
            self.first = v;
            self.previous = v;
            return;
        }
        let delta = self.previous.wrapping_sub(v);
        self.deltas.push(delta);
        self.min_delta = self.min_delta.min(delta);
        self.previous = v;
    }

    /// Number of values added so far.
    pub fn len(&self) -> usize {
        if self.is_first {
            0
        } else {
            self.deltas.len() + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_first
    }

    /// Encodes all added values. An encoder with no values yields an empty buffer.
    pub fn bytes(&self) -> Result<Vec<u8>, IndexError> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    pub fn marshal_binary(&self) -> Result<Vec<u8>, IndexError> {
        self.bytes()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<(), IndexError> {
        if self.is_first {
            return Ok(());
        }
        let min_delta = if self.deltas.is_empty() {
            0
        } else {
            self.min_delta
        };
        let packed = |d: i32| (d as i64 - min_delta as i64) as u64;
        let max_packed = self.deltas.iter().map(|&d| packed(d)).max().unwrap_or(0);
        let width = 64 - max_packed.leading_zeros();

        write_var_u64(out, self.deltas.len() as u64);
        out.push(width as u8);
        write_var_i64(out, min_delta as i64);
        write_var_i64(out, self.first as i64);

        let mut bw = BitWriter::new(out);
        for &d in &self.deltas {
            bw.write_bits(packed(d), width)?;
        }
        bw.flush()
    }
}

#[derive(Debug, Clone)]
pub struct DeltaBitPackingDecoder<'a> {
    br: BitReader<'a>,
    remaining: usize,
    width: u32,
    min_delta: i32,
    previous: i32,
    first_pending: bool,
}

impl<'a> DeltaBitPackingDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, IndexError> {
        let mut d = Self {
            br: BitReader::new(&[]),
            remaining: 0,
            width: 0,
            min_delta: 0,
            previous: 0,
            first_pending: false,
        };
        d.reset(buf)?;
        Ok(d)
    }

    /// Like [`new`](Self::new), but rejects a header announcing more than `max` values.
    ///
    /// A zero-width body takes no bytes, so its count is bounded only by this limit.
    pub fn with_limit(buf: &'a [u8], max: usize) -> Result<Self, IndexError> {
        let d = Self::new(buf)?;
        if d.remaining() > max {
            return Err(IndexError::corruption(format!(
                "delta bit-packing announces {} values, at most {} allowed",
                d.remaining(),
                max
            )));
        }
        Ok(d)
    }

    /// Rebinds the decoder to a new buffer and parses its header.
    pub fn reset(&mut self, buf: &'a [u8]) -> Result<(), IndexError> {
        self.br.reset(&[]);
        self.remaining = 0;
        self.first_pending = false;
        if buf.is_empty() {
            return Ok(());
        }
        let mut r = ByteReader::new(buf);
        let deltas = r.read_var_u64();
        let width = r.read_u8() as u32;
        let min_delta = r.read_var_i64();
        let first = r.read_var_i64();
        r.error()?;
        if width > 33 {
            return Err(IndexError::corruption(format!(
                "delta bit-packing width {} out of range",
                width
            )));
        }
        let body = &buf[r.position()..];
        let available = if width == 0 {
            u64::MAX
        } else {
            (body.len() as u64 * 8) / width as u64
        };
        if deltas > available || deltas >= usize::MAX as u64 {
            return Err(IndexError::corruption(
                "delta bit-packing count exceeds payload",
            ));
        }
        self.br.reset(body);
        self.remaining = deltas as usize;
        self.width = width;
        self.min_delta = min_delta as i32;
        self.previous = first as i32;
        self.first_pending = true;
        Ok(())
    }

    pub fn has_next(&self) -> bool {
        self.first_pending || self.remaining > 0
    }

    pub fn next_value(&mut self) -> Result<i32, IndexError> {
        if self.first_pending {
            self.first_pending = false;
            return Ok(self.previous);
        }
        if self.remaining == 0 {
            return Err(IndexError::UnexpectedEof);
        }
        self.remaining -= 1;
        let packed = self.br.read_bits(self.width)?;
        let delta = (packed as i64 + self.min_delta as i64) as i32;
        self.previous = self.previous.wrapping_sub(delta);
        Ok(self.previous)
    }

    /// Number of values still to be returned.
    pub fn remaining(&self) -> usize {
        self.remaining + self.first_pending as usize
    }
}

impl Iterator for DeltaBitPackingDecoder<'_> {
    type Item = Result<i32, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }
        Some(self.next_value())
    }
}

/// Packs a list of `u32` ids (stored as `i32` bit patterns).
pub fn encode_u32s(values: &[u32], enc: &mut DeltaBitPackingEncoder) -> Result<Vec<u8>, IndexError> {
    enc.reset();
    for &v in values {
        enc.add(v as i32);
    }
    enc.bytes()
}

/// Unpacks at most `max` ids; a longer list is corruption and nothing is allocated for it.
pub fn decode_u32s(buf: &[u8], max: usize) -> Result<Vec<u32>, IndexError> {
    let mut d = DeltaBitPackingDecoder::with_limit(buf, max)?;
    let mut out = Vec::with_capacity(d.remaining());
    while d.has_next() {
        out.push(d.next_value()? as u32);
    }
    Ok(out)
}
