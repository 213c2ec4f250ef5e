use super::SuccinctTrie;

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: usize,
    start: usize,
    end: usize,
    pos: usize,
    /// Key length before this node's prefix.
    key_len: usize,
    /// Key length after this node's prefix.
    prefix_end: usize,
}

/// Ordered cursor over a [`SuccinctTrie`].
///
/// Holds one frame per node on the path from the root to the current leaf plus the bytes
/// of the current key. Starts unpositioned; call one of the seek methods first.
#[derive(Debug, Clone)]
pub struct Iter<'t> {
    trie: &'t SuccinctTrie,
    frames: Vec<Frame>,
    key: Vec<u8>,
    valid: bool,
}

impl<'t> Iter<'t> {
    pub fn new(trie: &'t SuccinctTrie) -> Self {
        Self {
            trie,
            frames: Vec::with_capacity(trie.height() as usize),
            key: Vec::new(),
            valid: false,
        }
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Current key. Only meaningful while [`Iter::valid`].
    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Value of the current key. Only meaningful while [`Iter::valid`].
    pub fn value(&self) -> &'t [u8] {
        match self.frames.last() {
            Some(f) if self.valid => self.trie.leaf_value(self.trie.leaf_index(f.pos)),
            _ => &[],
        }
    }

    fn reset(&mut self) {
        self.frames.clear();
        self.key.clear();
        self.valid = false;
    }

    fn enter(&mut self, node: usize, rightmost: bool) {
        let (start, end) = self.trie.node_range(node);
        let key_len = self.key.len();
        self.key.extend_from_slice(self.trie.prefix(node));
        self.frames.push(Frame {
            node,
            start,
            end,
            pos: if rightmost { end - 1 } else { start },
            key_len,
            prefix_end: self.key.len(),
        });
    }

    /// Walks from the top frame's position down to a leaf, taking the first (or last) slot
    /// of every node entered.
    fn descend(&mut self, rightmost: bool) {
        while let Some(&f) = self.frames.last() {
            self.key.truncate(f.prefix_end);
            if !self.trie.is_terminator(f.pos, f.start) {
                self.key.push(self.trie.label(f.pos));
            }
            if self.trie.has_child(f.pos) {
                self.enter(self.trie.child(f.pos), rightmost);
            } else {
                let leaf = self.trie.leaf_index(f.pos);
                self.key.extend_from_slice(self.trie.suffix(leaf));
                self.valid = true;
                return;
            }
        }
    }

    pub fn seek_to_first(&mut self) {
        self.reset();
        if self.trie.is_empty() {
            return;
        }
        self.enter(0, false);
        self.descend(false);
    }

    pub fn seek_to_last(&mut self) {
        self.reset();
        if self.trie.is_empty() {
            return;
        }
        self.enter(0, true);
        self.descend(true);
    }

    /// Moves to the next key in order; becomes invalid past the last key.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        if !self.valid {
            return;
        }
        while let Some(f) = self.frames.last_mut() {
            if f.pos + 1 < f.end {
                f.pos += 1;
                self.descend(false);
                return;
            }
            self.key.truncate(f.key_len);
            self.frames.pop();
        }
        self.valid = false;
    }

    /// Moves to the previous key in order; becomes invalid before the first key.
    pub fn prev(&mut self) {
        if !self.valid {
            return;
        }
        while let Some(f) = self.frames.last_mut() {
            if f.pos > f.start {
                f.pos -= 1;
                self.descend(true);
                return;
            }
            self.key.truncate(f.key_len);
            self.frames.pop();
        }
        self.valid = false;
    }

    /// Positions at the first key `>= target`. Returns true on an exact match.
    pub fn seek(&mut self, target: &[u8]) -> bool {
        self.reset();
        if self.trie.is_empty() {
            return false;
        }
        self.enter(0, false);
        let mut depth = 0usize;
        loop {
            let Some(&f) = self.frames.last() else {
                return false;
            };
            let prefix = self.trie.prefix(f.node);
            let rest = &target[depth..];
            let n = prefix.len().min(rest.len());
            match prefix[..n].cmp(&rest[..n]) {
                std::cmp::Ordering::Less => return self.past_subtree(),
                std::cmp::Ordering::Greater => return self.into_subtree(),
                std::cmp::Ordering::Equal if rest.len() < prefix.len() => return self.into_subtree(),
                std::cmp::Ordering::Equal => {}
            }
            depth += prefix.len();

            if depth == target.len() {
                self.descend(false);
                return self.trie.is_terminator(f.start, f.start);
            }
            let b = target[depth];
            let Some(pos) = self.trie.labels().lower_bound(b, f.start, f.end) else {
                return self.past_subtree();
            };
            self.set_pos(pos);
            if self.trie.label(pos) > b {
                self.descend(false);
                return false;
            }
            if self.trie.has_child(pos) {
                self.key.truncate(f.prefix_end);
                self.key.push(b);
                self.enter(self.trie.child(pos), false);
                depth += 1;
                continue;
            }
            self.descend(false);
            let suffix = self.trie.suffix(self.trie.leaf_index(pos));
            return match suffix.cmp(&target[depth + 1..]) {
                std::cmp::Ordering::Equal => true,
                std::cmp::Ordering::Greater => false,
                std::cmp::Ordering::Less => {
                    self.next();
                    false
                }
            };
        }
    }

    fn set_pos(&mut self, pos: usize) {
        if let Some(f) = self.frames.last_mut() {
            f.pos = pos;
        }
    }

    /// Every key under the top frame is greater than the target: take the smallest.
    fn into_subtree(&mut self) -> bool {
        if let Some(f) = self.frames.last_mut() {
            f.pos = f.start;
        }
        self.descend(false);
        false
    }

    /// Every key under the top frame is smaller than the target: take the successor.
    fn past_subtree(&mut self) -> bool {
        if let Some(f) = self.frames.last_mut() {
            f.pos = f.end - 1;
        }
        self.descend(true);
        self.next();
        false
    }
}

/// Iterator over the keys sharing a prefix, yielding `(key, value)` pairs in order.
#[derive(Debug, Clone)]
pub struct PrefixIter<'t> {
    it: Iter<'t>,
    prefix: Vec<u8>,
}

impl<'t> PrefixIter<'t> {
    pub fn new(trie: &'t SuccinctTrie, prefix: &[u8]) -> Self {
        let mut it = Iter::new(trie);
        it.seek(prefix);
        Self {
            it,
            prefix: prefix.to_vec(),
        }
    }
}

impl<'t> Iterator for PrefixIter<'t> {
    type Item = (Vec<u8>, &'t [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.it.valid() || !self.it.key().starts_with(&self.prefix) {
            return None;
        }
        let item = (self.it.key().to_vec(), self.it.value());
        self.it.next();
        Some(item)
    }
}
