use super::bitvec::{align_from, pad_from, BitVector, RankVector};
use crate::encoding::fixed_offset::{FixedOffsetDecoder, FixedOffsetEncoder};
use crate::encoding::stream::{padding, write_u32, ByteReader};
use crate::error::IndexError;

/// Optional byte strings keyed by a dense index (node id for prefixes, leaf index for
/// suffixes). A presence bit per index; the strings of present entries are concatenated and
/// addressed through an offset table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressPathVector {
    present: RankVector,
    offsets: Vec<u32>,
    data: Vec<u8>,
}

impl Default for CompressPathVector {
    fn default() -> Self {
        Self::new(BitVector::default(), &[], Vec::new())
    }
}

impl CompressPathVector {
    /// `present` has one bit per index; `ends[i]` is the end offset in `data` of the `i`-th
    /// present entry.
    pub fn new(present: BitVector, ends: &[u32], data: Vec<u8>) -> Self {
        let mut offsets = Vec::with_capacity(ends.len() + 1);
        offsets.push(0);
        offsets.extend_from_slice(ends);
        Self {
            present: RankVector::new(present),
            offsets,
            data,
        }
    }

    /// Number of indexes covered, present or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.present.num_bits()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes stored for `index`; empty when absent.
    #[inline]
    pub fn get(&self, index: usize) -> &[u8] {
        if !self.present.is_set(index) {
            return &[];
        }
        let i = self.present.rank(index) - 1;
        &self.data[self.offsets[i] as usize..self.offsets[i + 1] as usize]
    }

    /// Matches the entry for `index` against `key[depth..]`; returns the depth after it.
    #[inline]
    pub fn check_prefix(&self, index: usize, key: &[u8], depth: usize) -> Option<usize> {
        let p = self.get(index);
        if key.len() - depth < p.len() || &key[depth..depth + p.len()] != p {
            return None;
        }
        Some(depth + p.len())
    }

    /// True when the entry for `index` equals `key[depth..]` exactly.
    #[inline]
    pub fn check_suffix(&self, index: usize, key: &[u8], depth: usize) -> bool {
        self.get(index) == &key[depth.min(key.len())..]
    }

    fn offset_table(&self) -> FixedOffsetEncoder {
        let mut enc = FixedOffsetEncoder::new();
        for &o in &self.offsets {
            enc.add(o);
        }
        enc
    }

    pub fn marshal_size(&self) -> usize {
        let n = self.present.marshal_size() + 4 + self.offset_table().marshal_size() + 4 + self.data.len();
        n + padding(n, 8)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        self.present.write_to(out);
        let table = self.offset_table();
        write_u32(out, table.marshal_size() as u32);
        table.write_to(out);
        write_u32(out, self.data.len() as u32);
        out.extend_from_slice(&self.data);
        pad_from(out, start);
    }

    pub(crate) fn read_from(r: &mut ByteReader<'_>) -> Result<Self, IndexError> {
        let start = r.position();
        let present = RankVector::read_from(r)?;
        let table_len = r.read_u32() as usize;
        let table = r.read_slice(table_len);
        let data_len = r.read_u32() as usize;
        let data = r.read_slice(data_len).to_vec();
        align_from(r, start);
        r.error()?;

        let offsets: Vec<u32> = FixedOffsetDecoder::new(table)?.iter().collect();
        if offsets.len() != present.num_ones() + 1 || offsets.first() != Some(&0) {
            return Err(IndexError::corruption(
                "path vector offsets do not match its presence bits",
            ));
        }
        if offsets.windows(2).any(|w| w[0] > w[1])
            || offsets.last().map(|&o| o as usize) != Some(data.len())
        {
            return Err(IndexError::corruption("path vector offsets out of order"));
        }
        Ok(Self {
            present,
            offsets,
            data,
        })
    }
}
