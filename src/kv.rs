//! Key-value seams the index blocks are written to and read from.
//!
//! A block is one value in a table keyed by tag key id. Writers stream a block through
//! [`StreamWriter`] and commit it; readers look blocks up through [`TableReader`]; compaction
//! hands every input block for one key to a [`Merger`].

use crate::error::IndexError;

use crc32fast::Hasher as Crc32;

use std::collections::{BTreeMap, BTreeSet};

/// Read side of a table: raw block bytes by key.
pub trait TableReader: std::fmt::Debug {
    fn get(&self, key: u32) -> Option<&[u8]>;

    /// Every key stored in the table, ascending.
    fn keys(&self) -> Vec<u32>;
}

/// Write side of a table. One record at a time: `prepare`, any number of `write`s, `commit`.
pub trait StreamWriter {
    /// Starts a record for `key`, discarding an uncommitted one.
    fn prepare(&mut self, key: u32);

    fn write(&mut self, data: &[u8]) -> Result<usize, IndexError>;

    /// Bytes written since `prepare`.
    fn size(&self) -> u32;

    /// CRC32 (IEEE) of the bytes written since `prepare`.
    fn crc32_checksum(&self) -> u32;

    fn commit(&mut self) -> Result<(), IndexError>;
}

/// Combines all blocks stored under one key into a single output block.
pub trait Merger {
    fn merge(&mut self, key: u32, values: &[&[u8]]) -> Result<(), IndexError>;
}

/// Immutable sorted table held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTable {
    records: BTreeMap<u32, Vec<u8>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: u32, value: Vec<u8>) {
        self.records.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get_mut(&mut self, key: u32) -> Option<&mut Vec<u8>> {
        self.records.get_mut(&key)
    }
}

impl TableReader for MemoryTable {
    fn get(&self, key: u32) -> Option<&[u8]> {
        self.records.get(&key).map(Vec::as_slice)
    }

    fn keys(&self) -> Vec<u32> {
        self.records.keys().copied().collect()
    }
}

#[derive(Debug)]
struct PendingRecord {
    key: u32,
    buf: Vec<u8>,
    crc: Crc32,
}

/// [`StreamWriter`] collecting committed records into a [`MemoryTable`].
#[derive(Debug, Default)]
pub struct MemoryStreamWriter {
    table: MemoryTable,
    pending: Option<PendingRecord>,
}

impl MemoryStreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &MemoryTable {
        &self.table
    }

    /// Finishes writing; an uncommitted record is dropped.
    pub fn into_table(self) -> MemoryTable {
        self.table
    }
}

impl StreamWriter for MemoryStreamWriter {
    fn prepare(&mut self, key: u32) {
        self.pending = Some(PendingRecord {
            key,
            buf: Vec::new(),
            crc: Crc32::new(),
        });
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, IndexError> {
        let rec = self
            .pending
            .as_mut()
            .ok_or_else(|| IndexError::InvalidInput("write before prepare".to_string()))?;
        rec.buf.extend_from_slice(data);
        rec.crc.update(data);
        Ok(data.len())
    }

    fn size(&self) -> u32 {
        self.pending.as_ref().map_or(0, |r| r.buf.len() as u32)
    }

    fn crc32_checksum(&self) -> u32 {
        self.pending
            .as_ref()
            .map_or(0, |r| r.crc.clone().finalize())
    }

    fn commit(&mut self) -> Result<(), IndexError> {
        let rec = self
            .pending
            .take()
            .ok_or_else(|| IndexError::InvalidInput("commit before prepare".to_string()))?;
        if self.table.records.contains_key(&rec.key) {
            return Err(IndexError::InvalidInput(format!(
                "key {} already committed",
                rec.key
            )));
        }
        self.table.insert(rec.key, rec.buf);
        Ok(())
    }
}

impl<W: StreamWriter + ?Sized> StreamWriter for &mut W {
    fn prepare(&mut self, key: u32) {
        (**self).prepare(key)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, IndexError> {
        (**self).write(data)
    }

    fn size(&self) -> u32 {
        (**self).size()
    }

    fn crc32_checksum(&self) -> u32 {
        (**self).crc32_checksum()
    }

    fn commit(&mut self) -> Result<(), IndexError> {
        (**self).commit()
    }
}

/// Collects the blocks stored under `key` across `tables`, skipping tables without it.
pub fn blocks_for_key<'a>(tables: &[&'a dyn TableReader], key: u32) -> Vec<&'a [u8]> {
    tables.iter().filter_map(|t| t.get(key)).collect()
}

/// Runs `merger` once per key in the union of `tables`, ascending, handing it that key's
/// blocks in table order. Stops at the first failing key. Returns the number of keys merged.
pub fn merge_tables<M: Merger + ?Sized>(merger: &mut M, tables: &[&dyn TableReader]) -> Result<usize, IndexError> {
    let keys: BTreeSet<u32> = tables.iter().flat_map(|t| t.keys()).collect();
    for &key in &keys {
        let blocks = blocks_for_key(tables, key);
        merger.merge(key, &blocks)?;
    }
    Ok(keys.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::crc32;

    #[test]
    fn records_commit_into_table() {
        let mut w = MemoryStreamWriter::new();
        w.prepare(3);
        w.write(b"abc").unwrap();
        w.write(b"def").unwrap();
        assert_eq!(w.size(), 6);
        assert_eq!(w.crc32_checksum(), crc32(b"abcdef"));
        w.commit().unwrap();

        w.prepare(1);
        w.write(b"x").unwrap();
        w.commit().unwrap();

        let table = w.into_table();
        assert_eq!(table.get(3), Some(&b"abcdef"[..]));
        assert_eq!(table.get(1), Some(&b"x"[..]));
        assert_eq!(table.get(2), None);
        assert_eq!(table.keys(), vec![1, 3]);
    }

    #[test]
    fn misuse_is_rejected() {
        let mut w = MemoryStreamWriter::new();
        assert!(w.write(b"a").is_err());
        assert!(w.commit().is_err());
        w.prepare(1);
        w.commit().unwrap();
        w.prepare(1);
        assert!(w.commit().is_err());
    }

    #[test]
    fn prepare_discards_uncommitted_bytes() {
        let mut w = MemoryStreamWriter::new();
        w.prepare(1);
        w.write(b"junk").unwrap();
        w.prepare(2);
        assert_eq!(w.size(), 0);
        w.write(b"ok").unwrap();
        w.commit().unwrap();
        let table = w.into_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(2), Some(&b"ok"[..]));
    }

    #[derive(Debug, Default)]
    struct Recorder(Vec<(u32, Vec<Vec<u8>>)>);

    impl Merger for Recorder {
        fn merge(&mut self, key: u32, values: &[&[u8]]) -> Result<(), IndexError> {
            self.0.push((key, values.iter().map(|v| v.to_vec()).collect()));
            Ok(())
        }
    }

    #[test]
    fn merge_tables_walks_key_union_in_order() {
        let mut a = MemoryTable::new();
        a.insert(2, b"a2".to_vec());
        a.insert(5, b"a5".to_vec());
        let mut b = MemoryTable::new();
        b.insert(1, b"b1".to_vec());
        b.insert(5, b"b5".to_vec());

        let mut rec = Recorder::default();
        let merged = merge_tables(&mut rec, &[&a, &b]).unwrap();
        assert_eq!(merged, 3);
        assert_eq!(
            rec.0,
            vec![
                (1, vec![b"b1".to_vec()]),
                (2, vec![b"a2".to_vec()]),
                (5, vec![b"a5".to_vec(), b"b5".to_vec()]),
            ]
        );
    }
}
