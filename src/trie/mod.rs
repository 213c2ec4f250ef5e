//! LOUDS-Sparse succinct trie mapping byte-string keys to fixed-width values.
//!
//! Every trie position carries a label byte, a has-child bit and a LOUDS bit marking the
//! first position of a node. Positions are grouped by node and nodes are stored level by
//! level, left to right. Node prefixes (keyed by node id) and leaf suffixes (keyed by leaf
//! index) compress single-branch paths.
//!
//! Navigation:
//! - child node of position `p`: `rank_has_child(p)`
//! - first position of node `n`: `select_louds(n + 1)`
//! - leaf index of position `p`: `p - rank_has_child(p)`
//!
//! A key that ends inside a node is marked by a terminator label ([`TERMINATOR`]) in the
//! node's first slot, without a child.

mod bitvec;
mod builder;
mod iter;
mod label;
mod path;
mod value;

pub use bitvec::{BitVector, RankVector, SelectVector};
pub use builder::Builder;
pub use iter::{Iter, PrefixIter};
pub use label::LabelVector;
pub use path::CompressPathVector;
pub use value::ValueVector;

use crate::encoding::stream::{write_u32, ByteReader};
use crate::error::IndexError;

/// Label used for the key-ends-here slot.
pub const TERMINATOR: u8 = 0xFF;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccinctTrie {
    height: u32,
    labels: LabelVector,
    has_child: RankVector,
    louds: SelectVector,
    prefixes: CompressPathVector,
    suffixes: CompressPathVector,
    values: ValueVector,
}

impl SuccinctTrie {
    /// Number of levels.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn num_keys(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Width in bytes of every stored value.
    pub fn value_width(&self) -> usize {
        self.values.width()
    }

    #[inline]
    fn num_nodes(&self) -> usize {
        self.louds.num_ones()
    }

    /// `[start, end)` positions of node `node`.
    #[inline]
    pub(crate) fn node_range(&self, node: usize) -> (usize, usize) {
        let start = self.louds.select(node + 1);
        let end = if node + 1 < self.num_nodes() {
            self.louds.select(node + 2)
        } else {
            self.labels.len()
        };
        (start, end)
    }

    #[inline]
    pub(crate) fn has_child(&self, pos: usize) -> bool {
        self.has_child.is_set(pos)
    }

    #[inline]
    pub(crate) fn child(&self, pos: usize) -> usize {
        self.has_child.rank(pos)
    }

    #[inline]
    pub(crate) fn leaf_index(&self, pos: usize) -> usize {
        pos - self.has_child.rank(pos)
    }

    #[inline]
    pub(crate) fn is_terminator(&self, pos: usize, node_start: usize) -> bool {
        pos == node_start && self.labels.read(pos) == TERMINATOR && !self.has_child(pos)
    }

    #[inline]
    pub(crate) fn label(&self, pos: usize) -> u8 {
        self.labels.read(pos)
    }

    pub(crate) fn labels(&self) -> &LabelVector {
        &self.labels
    }

    pub(crate) fn prefix(&self, node: usize) -> &[u8] {
        self.prefixes.get(node)
    }

    pub(crate) fn suffix(&self, leaf: usize) -> &[u8] {
        self.suffixes.get(leaf)
    }

    pub(crate) fn leaf_value(&self, leaf: usize) -> &[u8] {
        self.values.get(leaf)
    }

    /// Exact-match lookup.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        if self.is_empty() {
            return None;
        }
        let mut node = 0usize;
        let mut depth = 0usize;
        loop {
            let (start, end) = self.node_range(node);
            depth = self.prefixes.check_prefix(node, key, depth)?;
            if depth == key.len() {
                return self
                    .is_terminator(start, start)
                    .then(|| self.values.get(self.leaf_index(start)));
            }
            let pos = self.labels.search(key[depth], start, end)?;
            if !self.has_child(pos) {
                let leaf = self.leaf_index(pos);
                return self
                    .suffixes
                    .check_suffix(leaf, key, depth + 1)
                    .then(|| self.values.get(leaf));
            }
            node = self.child(pos);
            depth += 1;
        }
    }

    /// Ordered cursor over all keys. Starts unpositioned.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self)
    }

    /// Keys starting with `prefix`, in order.
    pub fn prefix_iter(&self, prefix: &[u8]) -> PrefixIter<'_> {
        PrefixIter::new(self, prefix)
    }

    pub fn marshal_size(&self) -> usize {
        8 + self.labels.marshal_size()
            + self.has_child.marshal_size()
            + self.louds.marshal_size()
            + self.prefixes.marshal_size()
            + self.suffixes.marshal_size()
            + self.values.marshal_size()
    }

    /// Layout: `[height u32][pad]` then labels, has-child, LOUDS, prefixes, suffixes and
    /// values, each 8-byte aligned.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        write_u32(out, self.height);
        out.resize(start + 8, 0);
        self.labels.write_to(out);
        self.has_child.write_to(out);
        self.louds.write_to(out);
        self.prefixes.write_to(out);
        self.suffixes.write_to(out);
        self.values.write_to(out);
        debug_assert_eq!(out.len() - start, self.marshal_size());
    }

    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.marshal_size());
        self.write_to(&mut out);
        out
    }

    /// Parses and validates a trie. Malformed input yields a corruption error, never a panic.
    pub fn unmarshal(buf: &[u8]) -> Result<Self, IndexError> {
        let mut r = ByteReader::new(buf);
        let height = r.read_u32();
        r.read_slice(4);
        r.error()?;
        let trie = Self {
            height,
            labels: LabelVector::read_from(&mut r)?,
            has_child: RankVector::read_from(&mut r)?,
            louds: SelectVector::read_from(&mut r)?,
            prefixes: CompressPathVector::read_from(&mut r)?,
            suffixes: CompressPathVector::read_from(&mut r)?,
            values: ValueVector::read_from(&mut r)?,
        };
        if !r.is_empty() {
            return Err(IndexError::corruption(format!(
                "{} trailing bytes after trie",
                r.remaining()
            )));
        }
        trie.validate()?;
        Ok(trie)
    }

    fn validate(&self) -> Result<(), IndexError> {
        let n = self.labels.len();
        if self.has_child.num_bits() != n || self.louds.num_bits() != n {
            return Err(IndexError::corruption("trie vectors disagree on position count"));
        }
        if n == 0 {
            if self.num_nodes() != 0 || !self.prefixes.is_empty() || !self.suffixes.is_empty() || !self.values.is_empty() {
                return Err(IndexError::corruption("empty trie with leftover data"));
            }
            return Ok(());
        }
        if !self.louds.is_set(0) {
            return Err(IndexError::corruption("trie does not start with a node"));
        }
        let children = self.has_child.num_ones();
        if children + 1 != self.num_nodes() {
            return Err(IndexError::corruption(format!(
                "{} child edges for {} nodes",
                children,
                self.num_nodes()
            )));
        }
        let leaves = n - children;
        if self.prefixes.len() != self.num_nodes()
            || self.suffixes.len() != leaves
            || self.values.len() != leaves
        {
            return Err(IndexError::corruption("trie leaf or node counts mismatch"));
        }
        // children must sit strictly after their parent so traversal cannot loop
        let mut node = 0usize;
        for pos in 0..n {
            if pos > 0 && self.louds.is_set(pos) {
                node += 1;
            }
            if self.has_child(pos) && self.child(pos) <= node {
                return Err(IndexError::corruption(format!(
                    "position {} points back to node {}",
                    pos,
                    self.child(pos)
                )));
            }
        }
        Ok(())
    }
}
