//! Plain bit arrays plus rank and select lookup tables.
//!
//! Bit `p` lives in `words[p / 64]` at bit `p % 64` (least significant first).

use crate::encoding::stream::{padding, write_u32, write_u64, ByteReader};
use crate::error::IndexError;

pub(crate) const WORD_BITS: usize = 64;
/// Bits covered by one rank lookup entry.
pub(crate) const RANK_BLOCK_BITS: usize = 512;
/// One select sample every this many set bits.
pub(crate) const SELECT_SAMPLE: usize = 64;

#[inline]
fn words_for(bits: usize) -> usize {
    bits.div_ceil(WORD_BITS)
}

/// Sets bit `pos` in a growable word array.
#[inline]
pub(crate) fn set_bit(words: &mut Vec<u64>, pos: usize) {
    let w = pos / WORD_BITS;
    if words.len() <= w {
        words.resize(w + 1, 0);
    }
    words[w] |= 1u64 << (pos % WORD_BITS);
}

/// Position of the `r`-th (1-based) set bit inside `word`.
#[inline]
fn select_in_word(mut word: u64, r: u32) -> u32 {
    for _ in 1..r {
        word &= word - 1;
    }
    word.trailing_zeros()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitVector {
    num_bits: usize,
    words: Vec<u64>,
}

impl BitVector {
    /// Concatenates per-level bit arrays; level `i` contributes its first `level_bits[i]` bits
    /// starting right after the previous level, at any bit offset.
    pub fn from_levels(levels: &[&[u64]], level_bits: &[usize]) -> Self {
        debug_assert_eq!(levels.len(), level_bits.len());
        let total: usize = level_bits.iter().sum();
        let mut words = vec![0u64; words_for(total)];
        let mut offset = 0usize;
        for (level, &bits) in levels.iter().zip(level_bits) {
            let full = bits / WORD_BITS;
            let tail = bits % WORD_BITS;
            let n = full + (tail > 0) as usize;
            for i in 0..n {
                let mut word = level.get(i).copied().unwrap_or(0);
                if i == full {
                    word &= (1u64 << tail) - 1;
                }
                let at = offset + i * WORD_BITS;
                let (w, shift) = (at / WORD_BITS, at % WORD_BITS);
                words[w] |= word << shift;
                if shift > 0 && w + 1 < words.len() {
                    words[w + 1] |= word >> (WORD_BITS - shift);
                }
            }
            offset += bits;
        }
        Self {
            num_bits: total,
            words,
        }
    }

    pub fn from_bools(bits: &[bool]) -> Self {
        let mut words = vec![0u64; words_for(bits.len())];
        for (i, _) in bits.iter().enumerate().filter(|(_, b)| **b) {
            set_bit(&mut words, i);
        }
        Self {
            num_bits: bits.len(),
            words,
        }
    }

    #[inline]
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    #[inline]
    pub fn is_set(&self, pos: usize) -> bool {
        pos < self.num_bits && (self.words[pos / WORD_BITS] >> (pos % WORD_BITS)) & 1 == 1
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[cfg(test)]
    fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn marshal_size(&self) -> usize {
        4 + self.words.len() * 8
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        write_u32(out, self.num_bits as u32);
        for &w in &self.words {
            write_u64(out, w);
        }
    }

    pub(crate) fn read_from(r: &mut ByteReader<'_>) -> Result<Self, IndexError> {
        let num_bits = r.read_u32() as usize;
        let n = words_for(num_bits);
        let raw = r.read_slice(n.saturating_mul(8));
        r.error()?;
        let words: Vec<u64> = raw
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();
        let tail = num_bits % WORD_BITS;
        if tail > 0 && words[n - 1] >> tail != 0 {
            return Err(IndexError::corruption("bit vector has bits set past its length"));
        }
        Ok(Self { num_bits, words })
    }
}

/// Bit vector with a per-512-bit-block prefix count for constant time `rank`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankVector {
    bits: BitVector,
    lut: Vec<u32>,
}

impl Default for RankVector {
    fn default() -> Self {
        Self::new(BitVector::default())
    }
}

impl RankVector {
    pub fn new(bits: BitVector) -> Self {
        let lut = Self::build_lut(&bits);
        Self { bits, lut }
    }

    fn build_lut(bits: &BitVector) -> Vec<u32> {
        let words_per_block = RANK_BLOCK_BITS / WORD_BITS;
        let mut lut = Vec::with_capacity(bits.words.len() / words_per_block + 1);
        let mut acc = 0u32;
        for block in bits.words.chunks(words_per_block) {
            lut.push(acc);
            acc += block.iter().map(|w| w.count_ones()).sum::<u32>();
        }
        lut.push(acc);
        lut
    }

    pub fn bits(&self) -> &BitVector {
        &self.bits
    }

    #[inline]
    pub fn num_bits(&self) -> usize {
        self.bits.num_bits
    }

    #[inline]
    pub fn is_set(&self, pos: usize) -> bool {
        self.bits.is_set(pos)
    }

    /// Total number of set bits.
    #[inline]
    pub fn num_ones(&self) -> usize {
        self.lut.last().copied().unwrap_or(0) as usize
    }

    /// Number of set bits in `[0, pos]`. `pos` must be below `num_bits`.
    #[inline]
    pub fn rank(&self, pos: usize) -> usize {
        debug_assert!(pos < self.bits.num_bits);
        let block = pos / RANK_BLOCK_BITS;
        let word = pos / WORD_BITS;
        let mut n = self.lut[block] as usize;
        for w in &self.bits.words[block * (RANK_BLOCK_BITS / WORD_BITS)..word] {
            n += w.count_ones() as usize;
        }
        let off = pos % WORD_BITS;
        let mask = if off == WORD_BITS - 1 {
            u64::MAX
        } else {
            (1u64 << (off + 1)) - 1
        };
        n + (self.bits.words[word] & mask).count_ones() as usize
    }

    pub fn marshal_size(&self) -> usize {
        let n = self.bits.marshal_size() + 4 + self.lut.len() * 4;
        n + padding(n, 8)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        self.bits.write_to(out);
        write_u32(out, self.lut.len() as u32);
        for &v in &self.lut {
            write_u32(out, v);
        }
        pad_from(out, start);
    }

    pub(crate) fn read_from(r: &mut ByteReader<'_>) -> Result<Self, IndexError> {
        let start = r.position();
        let bits = BitVector::read_from(r)?;
        let stored = read_u32_array(r)?;
        align_from(r, start);
        r.error()?;
        let rv = Self::new(bits);
        if rv.lut != stored {
            return Err(IndexError::corruption("rank lookup table mismatch"));
        }
        Ok(rv)
    }
}

/// Bit vector with a sampled position table for fast `select`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectVector {
    bits: BitVector,
    num_ones: usize,
    lut: Vec<u32>,
}

impl SelectVector {
    pub fn new(bits: BitVector) -> Self {
        let mut lut = Vec::new();
        let mut seen = 0usize;
        for (wi, &word) in bits.words.iter().enumerate() {
            let mut w = word;
            while w != 0 {
                if seen % SELECT_SAMPLE == 0 {
                    lut.push((wi * WORD_BITS + w.trailing_zeros() as usize) as u32);
                }
                seen += 1;
                w &= w - 1;
            }
        }
        Self {
            bits,
            num_ones: seen,
            lut,
        }
    }

    pub fn bits(&self) -> &BitVector {
        &self.bits
    }

    #[inline]
    pub fn num_bits(&self) -> usize {
        self.bits.num_bits
    }

    #[inline]
    pub fn num_ones(&self) -> usize {
        self.num_ones
    }

    #[inline]
    pub fn is_set(&self, pos: usize) -> bool {
        self.bits.is_set(pos)
    }

    /// Position of the `rank`-th (1-based) set bit, or `num_bits` when out of range.
    pub fn select(&self, rank: usize) -> usize {
        if rank == 0 || rank > self.num_ones {
            return self.bits.num_bits;
        }
        let sample = (rank - 1) / SELECT_SAMPLE;
        let pos = self.lut[sample] as usize;
        let mut left = ((rank - 1) % SELECT_SAMPLE) as u32;
        if left == 0 {
            return pos;
        }
        let mut wi = pos / WORD_BITS;
        let off = pos % WORD_BITS;
        // drop the sampled bit and everything below it
        let mut word = if off == WORD_BITS - 1 {
            0
        } else {
            self.bits.words[wi] & (u64::MAX << (off + 1))
        };
        loop {
            let c = word.count_ones();
            if left <= c {
                return wi * WORD_BITS + select_in_word(word, left) as usize;
            }
            left -= c;
            wi += 1;
            match self.bits.words.get(wi) {
                Some(&w) => word = w,
                None => return self.bits.num_bits,
            }
        }
    }

    pub fn marshal_size(&self) -> usize {
        let n = self.bits.marshal_size() + 4 + 4 + self.lut.len() * 4;
        n + padding(n, 8)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        self.bits.write_to(out);
        write_u32(out, self.num_ones as u32);
        write_u32(out, self.lut.len() as u32);
        for &v in &self.lut {
            write_u32(out, v);
        }
        pad_from(out, start);
    }

    pub(crate) fn read_from(r: &mut ByteReader<'_>) -> Result<Self, IndexError> {
        let start = r.position();
        let bits = BitVector::read_from(r)?;
        let num_ones = r.read_u32() as usize;
        let stored = read_u32_array(r)?;
        align_from(r, start);
        r.error()?;
        let sv = Self::new(bits);
        if sv.num_ones != num_ones || sv.lut != stored {
            return Err(IndexError::corruption("select lookup table mismatch"));
        }
        Ok(sv)
    }
}

fn read_u32_array(r: &mut ByteReader<'_>) -> Result<Vec<u32>, IndexError> {
    let n = r.read_u32() as usize;
    let raw = r.read_slice(n.saturating_mul(4));
    r.error()?;
    Ok(raw
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Pads `out` so the bytes written since `start` are a multiple of 8.
pub(crate) fn pad_from(out: &mut Vec<u8>, start: usize) {
    let pad = padding(out.len() - start, 8);
    out.resize(out.len() + pad, 0);
}

pub(crate) fn align_from(r: &mut ByteReader<'_>, start: usize) {
    let pad = padding(r.position() - start, 8);
    r.read_slice(pad);
}
