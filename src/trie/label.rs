use super::bitvec::{align_from, pad_from};
use super::TERMINATOR;
use crate::encoding::stream::{padding, write_u32, ByteReader};
use crate::error::IndexError;

/// One label byte per trie position, nodes laid out back to back in level order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelVector {
    labels: Vec<u8>,
}

impl LabelVector {
    pub fn new(labels: Vec<u8>) -> Self {
        Self { labels }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn read(&self, pos: usize) -> u8 {
        self.labels[pos]
    }

    /// First slot of `[start, end)` that may hold a real label; a terminator always sits at
    /// the node's first slot.
    #[inline]
    fn search_start(&self, start: usize, end: usize) -> usize {
        if end - start > 1 && self.labels[start] == TERMINATOR {
            start + 1
        } else if end - start == 1 && self.labels[start] == TERMINATOR {
            // single-slot node holding only a terminator
            end
        } else {
            start
        }
    }

    /// Position of `label` within the node spanning `[start, end)`.
    pub fn search(&self, label: u8, start: usize, end: usize) -> Option<usize> {
        let lo = self.search_start(start, end);
        self.labels[lo..end]
            .binary_search(&label)
            .ok()
            .map(|i| lo + i)
    }

    /// First position in the node whose label is `>= label`, skipping the terminator.
    pub fn lower_bound(&self, label: u8, start: usize, end: usize) -> Option<usize> {
        let lo = self.search_start(start, end);
        let i = self.labels[lo..end].partition_point(|&l| l < label);
        (lo + i < end).then_some(lo + i)
    }

    pub fn marshal_size(&self) -> usize {
        let n = 4 + self.labels.len();
        n + padding(n, 8)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        write_u32(out, self.labels.len() as u32);
        out.extend_from_slice(&self.labels);
        pad_from(out, start);
    }

    pub(crate) fn read_from(r: &mut ByteReader<'_>) -> Result<Self, IndexError> {
        let start = r.position();
        let n = r.read_u32() as usize;
        let labels = r.read_slice(n).to_vec();
        align_from(r, start);
        r.error()?;
        Ok(Self { labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_skips_terminator_slot() {
        // node 0: [term, 'a', 'c', 0xFF]; node 1: ['b']
        let lv = LabelVector::new(vec![TERMINATOR, b'a', b'c', 0xFF, b'b']);
        assert_eq!(lv.search(b'a', 0, 4), Some(1));
        assert_eq!(lv.search(b'c', 0, 4), Some(2));
        assert_eq!(lv.search(0xFF, 0, 4), Some(3));
        assert_eq!(lv.search(b'b', 0, 4), None);
        assert_eq!(lv.search(b'b', 4, 5), Some(4));
    }

    #[test]
    fn lower_bound_within_node() {
        let lv = LabelVector::new(vec![TERMINATOR, b'b', b'd', b'x']);
        assert_eq!(lv.lower_bound(b'a', 0, 3), Some(1));
        assert_eq!(lv.lower_bound(b'c', 0, 3), Some(2));
        assert_eq!(lv.lower_bound(b'e', 0, 3), None);
        assert_eq!(lv.lower_bound(0, 0, 1), None);
    }

    #[test]
    fn round_trip_is_padded() {
        let lv = LabelVector::new(b"hello".to_vec());
        let mut buf = Vec::new();
        lv.write_to(&mut buf);
        assert_eq!(buf.len(), 16);
        assert_eq!(buf.len(), lv.marshal_size());
        let mut r = ByteReader::new(&buf);
        assert_eq!(LabelVector::read_from(&mut r).unwrap(), lv);
        assert!(r.is_empty());
    }
}
