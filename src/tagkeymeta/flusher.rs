use super::{FOOTER_FIELDS, KIND};
use crate::bitmap::{default_codec, BitmapCodec};
use crate::block::finish_block;
use crate::config::IndexConfig;
use crate::encoding::fixed_offset::FixedOffsetEncoder;
use crate::error::IndexError;
use crate::kv::StreamWriter;
use crate::trie::Builder;

use roaring::RoaringBitmap;

use std::sync::Arc;

/// Buffers `(tag value, id)` pairs for one tag key and writes them out as a metadata block.
#[derive(Debug)]
pub struct TagKeyMetaFlusher<W: StreamWriter> {
    writer: W,
    config: IndexConfig,
    codec: Arc<dyn BitmapCodec>,
    entries: Vec<(Vec<u8>, u32)>,
    builder: Builder,
    rank_offsets: FixedOffsetEncoder,
    buf: Vec<u8>,
}

impl<W: StreamWriter> TagKeyMetaFlusher<W> {
    pub fn new(writer: W, config: &IndexConfig) -> Self {
        Self {
            writer,
            config: config.clone(),
            codec: default_codec(),
            entries: Vec::new(),
            builder: Builder::new(),
            rank_offsets: FixedOffsetEncoder::new(),
            buf: Vec::new(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn BitmapCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Buffers one tag value. Values may arrive in any order.
    pub fn flush_tag_value(&mut self, tag_value: impl AsRef<[u8]>, tag_value_id: u32) {
        self.entries.push((tag_value.as_ref().to_vec(), tag_value_id));
    }

    /// Number of buffered tag values.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Drops buffered tag values.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Writes the buffered values as the block of `tag_key_id`. `tag_value_seq` comes from the
    /// caller's id allocator and is stored verbatim.
    pub fn flush_tag_key_id(&mut self, tag_key_id: u32, tag_value_seq: u32) -> Result<(), IndexError> {
        let result = self.write_block(tag_key_id, tag_value_seq);
        self.entries.clear();
        result
    }

    fn write_block(&mut self, tag_key_id: u32, tag_value_seq: u32) -> Result<(), IndexError> {
        // stable sort, so the first of repeated values wins
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
        self.entries.dedup_by(|next, prev| next.0 == prev.0);

        let ids: RoaringBitmap = self.entries.iter().map(|(_, id)| *id).collect();
        if ids.len() != self.entries.len() as u64 {
            return Err(IndexError::InvalidInput(format!(
                "tag key {}: a tag value id is shared by several values",
                tag_key_id
            )));
        }

        let keys: Vec<&[u8]> = self.entries.iter().map(|(v, _)| v.as_slice()).collect();
        let values: Vec<[u8; 4]> = self.entries.iter().map(|(_, id)| id.to_le_bytes()).collect();
        let trie = self.builder.build(&keys, &values)?;

        let mut by_id: Vec<(u32, u32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(rank, (_, id))| (*id, rank as u32))
            .collect();
        by_id.sort_unstable();
        self.rank_offsets.reset();
        for (_, rank) in by_id {
            self.rank_offsets.add(rank);
        }

        self.buf.clear();
        trie.write_to(&mut self.buf);
        let bitmap_pos = self.buf.len() as u32;
        self.codec.encode(&ids, &mut self.buf)?;
        let offsets_pos = self.buf.len() as u32;
        self.rank_offsets.write_to(&mut self.buf);

        self.writer.prepare(tag_key_id);
        self.writer.write(&self.buf)?;
        let footer: [u32; FOOTER_FIELDS] = [bitmap_pos, offsets_pos, tag_value_seq];
        finish_block(&mut self.writer, &footer, KIND, tag_key_id, &self.config)?;
        Ok(())
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Closes the flusher, handing back the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{MemoryStreamWriter, TableReader};
    use crate::tagkeymeta::TagKeyMeta;
    use crate::telemetry::test_support::RecordingListener;
    use crate::telemetry::IndexEvent;

    #[test]
    fn blocks_per_tag_key_and_flush_events() {
        let listener = Arc::new(RecordingListener::default());
        let config = IndexConfig::default().with_event_listener(listener.clone());
        let mut f = TagKeyMetaFlusher::new(MemoryStreamWriter::new(), &config);
        f.flush_tag_value("b", 2);
        f.flush_tag_value("a", 1);
        f.flush_tag_key_id(10, 2).unwrap();
        assert_eq!(f.pending(), 0);
        f.flush_tag_value("x", 5);
        f.flush_tag_key_id(11, 5).unwrap();

        let table = f.into_inner().into_table();
        let codec = crate::bitmap::PortableBitmapCodec;
        let a = TagKeyMeta::new(10, table.get(10).unwrap(), &codec, true).unwrap();
        let b = TagKeyMeta::new(11, table.get(11).unwrap(), &codec, true).unwrap();
        assert_eq!(a.get(b"a"), Some(1));
        assert_eq!(a.get(b"x"), None);
        assert_eq!(b.get(b"x"), Some(5));

        let events = listener.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], IndexEvent::TagKeyFlushed { tag_key_id: 10, .. }));
    }

    #[test]
    fn repeated_values_collapse_but_shared_ids_fail() {
        let mut f = TagKeyMetaFlusher::new(MemoryStreamWriter::new(), &IndexConfig::default());
        f.flush_tag_value("dup", 4);
        f.flush_tag_value("dup", 4);
        f.flush_tag_key_id(1, 4).unwrap();

        f.flush_tag_value("one", 4);
        f.flush_tag_value("two", 4);
        assert!(matches!(f.flush_tag_key_id(2, 4), Err(IndexError::InvalidInput(_))));
        assert_eq!(f.pending(), 0);
        assert!(f.writer().table().get(2).is_none());
    }

    #[test]
    fn empty_tag_key_still_records_sequence() {
        let mut f = TagKeyMetaFlusher::new(MemoryStreamWriter::new(), &IndexConfig::default());
        f.flush_tag_key_id(3, 77).unwrap();
        let table = f.into_inner().into_table();
        let meta = TagKeyMeta::new(3, table.get(3).unwrap(), &crate::bitmap::PortableBitmapCodec, true)
            .unwrap();
        assert!(meta.is_empty());
        assert_eq!(meta.tag_value_seq(), 77);
    }
}
