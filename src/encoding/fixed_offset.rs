//! Fixed-width offset tables for O(1) random access.
//!
//! Layout: `[width u8][value_0 .. value_n]`, every value stored little-endian in `width`
//! bytes, where `width` is the smallest of 1..=4 that fits the largest value.

use crate::error::IndexError;

#[derive(Debug, Default)]
pub struct FixedOffsetEncoder {
    values: Vec<u32>,
    max: u32,
}

/// Smallest number of bytes (1..=4) that can hold `v`.
#[inline]
pub fn min_width(v: u32) -> usize {
    match v {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

impl FixedOffsetEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.values.clear();
        self.max = 0;
    }

    /// Appends a value. Monotonicity is the caller's convention, not enforced.
    pub fn add(&mut self, v: u32) {
        self.max = self.max.max(v);
        self.values.push(v);
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn marshal_size(&self) -> usize {
        1 + self.values.len() * min_width(self.max)
    }

    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.marshal_size());
        self.write_to(&mut out);
        out
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let width = min_width(self.max);
        out.push(width as u8);
        for v in &self.values {
            out.extend_from_slice(&v.to_le_bytes()[..width]);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedOffsetDecoder<'a> {
    body: &'a [u8],
    width: usize,
}

impl<'a> FixedOffsetDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, IndexError> {
        let (&width, body) = buf
            .split_first()
            .ok_or_else(|| IndexError::corruption("empty fixed offset table"))?;
        let width = width as usize;
        if !(1..=4).contains(&width) {
            return Err(IndexError::corruption(format!(
                "fixed offset width {} out of range",
                width
            )));
        }
        if body.len() % width != 0 {
            return Err(IndexError::corruption(
                "fixed offset table length is not a multiple of its width",
            ));
        }
        Ok(Self { body, width })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn size(&self) -> usize {
        self.body.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        let start = index.checked_mul(self.width)?;
        let bytes = self.body.get(start..start.checked_add(self.width)?)?;
        let mut b = [0u8; 4];
        b[..self.width].copy_from_slice(bytes);
        Some(u32::from_le_bytes(b))
    }

    /// Slices `data` between offset `index` and the next offset; the last block runs to the
    /// end of `data`.
    pub fn get_block(&self, index: usize, data: &'a [u8]) -> Result<&'a [u8], IndexError> {
        let start = self
            .get(index)
            .ok_or_else(|| IndexError::NotFound(format!("offset index {}", index)))?
            as usize;
        let end = match self.get(index + 1) {
            Some(end) => end as usize,
            None => data.len(),
        };
        data.get(start..end).ok_or_else(|| {
            IndexError::corruption(format!(
                "offset block [{}, {}) out of range {}",
                start,
                end,
                data.len()
            ))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.size()).filter_map(move |i| self.get(i))
    }
}
