use super::forward_reader::ForwardBlock;
use super::{TagForwardFlusher, FORWARD_KIND};
use crate::bitmap::{containers, default_codec, BitmapCodec};
use crate::block::{report, run_merge};
use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::kv::{Merger, StreamWriter};

use roaring::RoaringBitmap;

use std::sync::Arc;

/// Merges forward index blocks of one tag key.
///
/// The output covers the union of the input series. A series that appears in several
/// inputs gets their tag value ids concatenated in input order, never re-sorted.
#[derive(Debug)]
pub struct TagForwardMerger<W: StreamWriter> {
    flusher: TagForwardFlusher<W>,
    codec: Arc<dyn BitmapCodec>,
    config: IndexConfig,
    ids: Vec<u32>,
    counts: Vec<u32>,
}

impl<W: StreamWriter> TagForwardMerger<W> {
    pub fn new(writer: W, config: &IndexConfig) -> Self {
        Self {
            flusher: TagForwardFlusher::new(writer, config),
            codec: default_codec(),
            config: config.clone(),
            ids: Vec::new(),
            counts: Vec::new(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn BitmapCodec>) -> Self {
        self.flusher = self.flusher.with_codec(codec.clone());
        self.codec = codec;
        self
    }

    pub fn into_inner(self) -> W {
        self.flusher.into_inner()
    }

    fn merge_blocks(&mut self, tag_key_id: u32, blocks: &[ForwardBlock<'_>]) -> Result<(), IndexError> {
        let mut union = RoaringBitmap::new();
        for b in blocks {
            union |= b.series_ids();
        }

        self.flusher.prepare_tag_key(tag_key_id);
        for (high_key, series) in containers(&union) {
            let parts = blocks
                .iter()
                .map(|b| b.container(high_key))
                .collect::<Result<Vec<_>, _>>()?;

            self.ids.clear();
            self.counts.clear();
            for s in series {
                let before = self.ids.len();
                for part in parts.iter().flatten() {
                    if let Some(values) = part.get(s) {
                        self.ids.extend_from_slice(values);
                    }
                }
                self.counts.push((self.ids.len() - before) as u32);
            }
            self.flusher.flush_forward_index_with_counts(&self.ids, &self.counts)?;
        }
        self.flusher.commit_tag_key(&union)
    }
}

impl<W: StreamWriter> Merger for TagForwardMerger<W> {
    fn merge(&mut self, tag_key_id: u32, values: &[&[u8]]) -> Result<(), IndexError> {
        let config = self.config.clone();
        run_merge(&config, FORWARD_KIND, tag_key_id, values.len(), || {
            let blocks = values
                .iter()
                .map(|buf| {
                    ForwardBlock::new(tag_key_id, buf, self.codec.as_ref(), &config)
                        .map_err(|e| report(&config, FORWARD_KIND, tag_key_id, e))
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.merge_blocks(tag_key_id, &blocks)
                .map_err(|e| report(&config, FORWARD_KIND, tag_key_id, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{MemoryStreamWriter, TableReader};
    use crate::tagindex::TagForwardReader;

    fn block(series: &[u32], ids: &[u32]) -> Vec<u8> {
        let mut f = TagForwardFlusher::new(MemoryStreamWriter::new(), &IndexConfig::default());
        f.prepare_tag_key(4);
        f.flush_forward_index(ids).unwrap();
        f.commit_tag_key(&series.iter().copied().collect()).unwrap();
        f.into_inner().into_table().get(4).unwrap().to_vec()
    }

    #[test]
    fn concatenates_in_input_order() {
        let a = block(&[1, 2], &[1, 3]);
        let b = block(&[1, 2, 5], &[2, 4, 9]);
        let mut m = TagForwardMerger::new(MemoryStreamWriter::new(), &IndexConfig::default());
        m.merge(4, &[&a, &b]).unwrap();

        let table = m.into_inner().into_table();
        let reader = TagForwardReader::new(vec![&table], &IndexConfig::default());
        assert_eq!(reader.get_tag_value_ids_for_series(4, 1).unwrap(), vec![1, 2]);
        assert_eq!(reader.get_tag_value_ids_for_series(4, 2).unwrap(), vec![3, 4]);
        assert_eq!(reader.get_tag_value_ids_for_series(4, 5).unwrap(), vec![9]);
        assert_eq!(
            reader.get_series_ids_for_tag_key_id(4).unwrap(),
            [1u32, 2, 5].into_iter().collect::<RoaringBitmap>()
        );
    }

    #[test]
    fn reversed_inputs_reverse_the_order() {
        let a = block(&[7], &[1]);
        let b = block(&[7], &[2]);
        let mut m = TagForwardMerger::new(MemoryStreamWriter::new(), &IndexConfig::default());
        m.merge(4, &[&b, &a]).unwrap();
        let table = m.into_inner().into_table();
        let reader = TagForwardReader::new(vec![&table], &IndexConfig::default());
        assert_eq!(reader.get_tag_value_ids_for_series(4, 7).unwrap(), vec![2, 1]);
    }

    #[test]
    fn corrupt_input_writes_nothing() {
        let a = block(&[1], &[1]);
        let mut b = block(&[1], &[2]);
        b[0] ^= 0x55;
        let mut m = TagForwardMerger::new(MemoryStreamWriter::new(), &IndexConfig::default());
        assert!(matches!(m.merge(4, &[&a, &b]), Err(IndexError::Corruption { .. })));
        assert!(m.into_inner().into_table().is_empty());
    }
}
