use super::bitvec::{set_bit, BitVector, RankVector, SelectVector};
use super::label::LabelVector;
use super::path::CompressPathVector;
use super::value::ValueVector;
use super::{SuccinctTrie, TERMINATOR};
use crate::error::IndexError;

/// Scratch state for one trie level. Cleared between builds, capacity kept.
#[derive(Debug, Default)]
struct Level {
    labels: Vec<u8>,
    has_child: Vec<u64>,
    louds: Vec<u64>,

    nodes: usize,
    has_prefix: Vec<u64>,
    prefix_bytes: Vec<u8>,
    prefix_ends: Vec<u32>,

    leaves: usize,
    has_suffix: Vec<u64>,
    suffix_bytes: Vec<u8>,
    suffix_ends: Vec<u32>,

    values: Vec<u8>,
}

impl Level {
    fn clear(&mut self) {
        self.labels.clear();
        self.has_child.clear();
        self.louds.clear();
        self.nodes = 0;
        self.has_prefix.clear();
        self.prefix_bytes.clear();
        self.prefix_ends.clear();
        self.leaves = 0;
        self.has_suffix.clear();
        self.suffix_bytes.clear();
        self.suffix_ends.clear();
        self.values.clear();
    }

    fn push_leaf(&mut self, label: u8, suffix: &[u8], value: &[u8]) {
        self.labels.push(label);
        if !suffix.is_empty() {
            set_bit(&mut self.has_suffix, self.leaves);
            self.suffix_bytes.extend_from_slice(suffix);
            self.suffix_ends.push(self.suffix_bytes.len() as u32);
        }
        self.leaves += 1;
        self.values.extend_from_slice(value);
    }
}

/// Builds a [`SuccinctTrie`] from sorted keys and fixed-width values.
///
/// The builder can be reused; level buffers survive between builds.
#[derive(Debug, Default)]
pub struct Builder {
    levels: Vec<Level>,
    height: usize,
    keys: Vec<usize>,
    value_width: usize,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a trie over `keys` (ascending byte order) with `values[i]` stored for `keys[i]`.
    ///
    /// Repeated keys keep the first value. Unsorted keys, a length mismatch or values of
    /// differing widths are rejected.
    pub fn build<K, V>(&mut self, keys: &[K], values: &[V]) -> Result<SuccinctTrie, IndexError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        if keys.len() != values.len() {
            return Err(IndexError::InvalidInput(format!(
                "{} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        self.reset();
        if keys.is_empty() {
            return Ok(SuccinctTrie::default());
        }
        self.value_width = values[0].as_ref().len();
        for (i, v) in values.iter().enumerate() {
            if v.as_ref().len() != self.value_width {
                return Err(IndexError::InvalidInput(format!(
                    "value {} is {} bytes, expected {}",
                    i,
                    v.as_ref().len(),
                    self.value_width
                )));
            }
        }
        self.keys.push(0);
        for i in 1..keys.len() {
            match keys[i - 1].as_ref().cmp(keys[i].as_ref()) {
                std::cmp::Ordering::Less => self.keys.push(i),
                std::cmp::Ordering::Equal => {}
                std::cmp::Ordering::Greater => {
                    return Err(IndexError::InvalidInput(format!(
                        "keys are not sorted at index {}",
                        i
                    )))
                }
            }
        }

        let order = std::mem::take(&mut self.keys);
        self.build_node(keys, values, &order, 0, 0);
        self.keys = order;
        Ok(self.assemble())
    }

    fn reset(&mut self) {
        for level in &mut self.levels[..self.height] {
            level.clear();
        }
        self.height = 0;
        self.keys.clear();
        self.value_width = 0;
    }

    fn level(&mut self, level: usize) -> &mut Level {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, Level::default);
        }
        self.height = self.height.max(level + 1);
        &mut self.levels[level]
    }

    /// Emits the node holding `order` (indexes into `keys`, sharing the first `depth` bytes),
    /// then its children one level down. Depth-first recursion still appends each level in
    /// left-to-right order.
    fn build_node<K, V>(&mut self, keys: &[K], values: &[V], order: &[usize], depth: usize, level: usize)
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let key = |i: usize| keys[order[i]].as_ref();
        let first = key(0);
        let last = key(order.len() - 1);
        let lcp = if order.len() == 1 {
            first.len() - depth
        } else {
            common_prefix_len(&first[depth..], &last[depth..])
        };

        let lvl = self.level(level);
        let node = lvl.nodes;
        lvl.nodes += 1;
        if lcp > 0 {
            set_bit(&mut lvl.has_prefix, node);
            lvl.prefix_bytes.extend_from_slice(&first[depth..depth + lcp]);
            lvl.prefix_ends.push(lvl.prefix_bytes.len() as u32);
        }
        let depth = depth + lcp;
        set_bit(&mut lvl.louds, lvl.labels.len());

        let mut children: Vec<(usize, usize)> = Vec::new();
        let mut i = 0;
        if first.len() == depth {
            lvl.push_leaf(TERMINATOR, &[], values[order[0]].as_ref());
            i = 1;
        }
        while i < order.len() {
            let b = key(i)[depth];
            let mut j = i + 1;
            while j < order.len() && key(j)[depth] == b {
                j += 1;
            }
            if j - i == 1 {
                lvl.push_leaf(b, &key(i)[depth + 1..], values[order[i]].as_ref());
            } else {
                set_bit(&mut lvl.has_child, lvl.labels.len());
                lvl.labels.push(b);
                children.push((i, j));
            }
            i = j;
        }

        for (i, j) in children {
            self.build_node(keys, values, &order[i..j], depth + 1, level + 1);
        }
    }

    fn assemble(&self) -> SuccinctTrie {
        let levels = &self.levels[..self.height];

        let label_counts: Vec<usize> = levels.iter().map(|l| l.labels.len()).collect();
        let node_counts: Vec<usize> = levels.iter().map(|l| l.nodes).collect();
        let leaf_counts: Vec<usize> = levels.iter().map(|l| l.leaves).collect();

        let labels: Vec<u8> = levels.iter().flat_map(|l| l.labels.iter().copied()).collect();
        let has_child = BitVector::from_levels(
            &levels.iter().map(|l| l.has_child.as_slice()).collect::<Vec<_>>(),
            &label_counts,
        );
        let louds = BitVector::from_levels(
            &levels.iter().map(|l| l.louds.as_slice()).collect::<Vec<_>>(),
            &label_counts,
        );

        let prefixes = concat_paths(
            levels.iter().map(|l| (l.has_prefix.as_slice(), l.prefix_bytes.as_slice(), l.prefix_ends.as_slice())),
            &node_counts,
        );
        let suffixes = concat_paths(
            levels.iter().map(|l| (l.has_suffix.as_slice(), l.suffix_bytes.as_slice(), l.suffix_ends.as_slice())),
            &leaf_counts,
        );

        let num_leaves: usize = leaf_counts.iter().sum();
        let values: Vec<u8> = levels.iter().flat_map(|l| l.values.iter().copied()).collect();

        SuccinctTrie {
            height: self.height as u32,
            labels: LabelVector::new(labels),
            has_child: RankVector::new(has_child),
            louds: SelectVector::new(louds),
            prefixes,
            suffixes,
            values: ValueVector::new(self.value_width, num_leaves, values),
        }
    }
}

fn concat_paths<'a>(
    levels: impl Iterator<Item = (&'a [u64], &'a [u8], &'a [u32])>,
    counts: &[usize],
) -> CompressPathVector {
    let mut words = Vec::new();
    let mut data = Vec::new();
    let mut ends = Vec::new();
    for (bits, bytes, level_ends) in levels {
        let base = data.len() as u32;
        data.extend_from_slice(bytes);
        ends.extend(level_ends.iter().map(|e| base + e));
        words.push(bits);
    }
    CompressPathVector::new(BitVector::from_levels(&words, counts), &ends, data)
}

#[inline]
fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_input() {
        let mut b = Builder::new();
        assert!(matches!(
            b.build(&["b", "a"], &[[0u8; 4], [1; 4]]),
            Err(IndexError::InvalidInput(_))
        ));
        assert!(matches!(
            b.build(&["a", "b"], &[vec![0u8; 4], vec![1; 3]]),
            Err(IndexError::InvalidInput(_))
        ));
        assert!(matches!(
            b.build(&["a", "b"], &[[0u8; 4]]),
            Err(IndexError::InvalidInput(_))
        ));
    }

    #[test]
    fn duplicate_keys_keep_first_value() {
        let mut b = Builder::new();
        let trie = b
            .build(&["a", "a", "b"], &[1u32.to_le_bytes(), 2u32.to_le_bytes(), 3u32.to_le_bytes()])
            .unwrap();
        assert_eq!(trie.get(b"a"), Some(&1u32.to_le_bytes()[..]));
        assert_eq!(trie.num_keys(), 2);
    }

    #[test]
    fn reused_builder_matches_fresh_one() {
        let keys_a = ["alpha", "beta", "betamax", "gamma"];
        let keys_b = ["x", "xy", "xyz"];
        let vals = |n: usize| (0..n as u32).map(u32::to_le_bytes).collect::<Vec<_>>();

        let mut reused = Builder::new();
        reused.build(&keys_a, &vals(keys_a.len())).unwrap();
        let again = reused.build(&keys_b, &vals(keys_b.len())).unwrap();
        let fresh = Builder::new().build(&keys_b, &vals(keys_b.len())).unwrap();
        assert_eq!(again.marshal_binary(), fresh.marshal_binary());
    }

    #[test]
    fn path_compression_keeps_levels_low() {
        let keys = ["abcdef", "abcdefg"];
        let trie = Builder::new()
            .build(&keys, &[[0u8; 2], [1u8; 2]])
            .unwrap();
        // root prefix "abcdef", then terminator and 'g'
        assert_eq!(trie.height(), 1);
        assert_eq!(trie.get(b"abcdef"), Some(&[0u8, 0][..]));
        assert_eq!(trie.get(b"abcdefg"), Some(&[1u8, 1][..]));
        assert_eq!(trie.get(b"abcde"), None);
    }
}
