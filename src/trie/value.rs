use super::bitvec::{align_from, pad_from};
use crate::encoding::stream::{padding, write_u32, ByteReader};
use crate::error::IndexError;

/// Fixed-width values, one per leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueVector {
    width: usize,
    count: usize,
    bytes: Vec<u8>,
}

impl ValueVector {
    pub fn new(width: usize, count: usize, bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len(), width * count);
        Self {
            width,
            count,
            bytes,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, leaf: usize) -> &[u8] {
        let start = leaf * self.width;
        &self.bytes[start..start + self.width]
    }

    pub fn marshal_size(&self) -> usize {
        let n = 8 + self.bytes.len();
        n + padding(n, 8)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        write_u32(out, self.width as u32);
        write_u32(out, self.count as u32);
        out.extend_from_slice(&self.bytes);
        pad_from(out, start);
    }

    pub(crate) fn read_from(r: &mut ByteReader<'_>) -> Result<Self, IndexError> {
        let start = r.position();
        let width = r.read_u32() as usize;
        let count = r.read_u32() as usize;
        let bytes = r.read_slice(width.saturating_mul(count)).to_vec();
        align_from(r, start);
        r.error()?;
        Ok(Self {
            width,
            count,
            bytes,
        })
    }
}
