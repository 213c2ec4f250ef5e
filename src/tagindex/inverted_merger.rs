use super::inverted_reader::{InvertedBlock, InvertedScanner};
use super::{TagInvertedFlusher, INVERTED_KIND};
use crate::bitmap::{default_codec, BitmapCodec};
use crate::block::{report, run_merge};
use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::kv::{Merger, StreamWriter};

use roaring::RoaringBitmap;

use std::sync::Arc;

/// Merges inverted index blocks of one tag key by unioning the series of every tag value
/// id across inputs.
#[derive(Debug)]
pub struct TagInvertedMerger<W: StreamWriter> {
    flusher: TagInvertedFlusher<W>,
    codec: Arc<dyn BitmapCodec>,
    config: IndexConfig,
}

impl<W: StreamWriter> TagInvertedMerger<W> {
    pub fn new(writer: W, config: &IndexConfig) -> Self {
        Self {
            flusher: TagInvertedFlusher::new(writer, config),
            codec: default_codec(),
            config: config.clone(),
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

    fn merge_scanners(&mut self, tag_key_id: u32, scanners: &mut [InvertedScanner<'_>]) -> Result<(), IndexError> {
        let mut ids = RoaringBitmap::new();
        for s in scanners.iter() {
            ids |= s.tag_value_ids();
        }

        self.flusher.prepare_tag_key(tag_key_id);
        let mut series = RoaringBitmap::new();
        for id in &ids {
            series.clear();
            for s in scanners.iter_mut() {
                if let Some(part) = s.series_ids(id)? {
                    series |= part;
                }
            }
            self.flusher.flush_inverted_index(id, &series)?;
        }
        self.flusher.commit_tag_key()
    }
}

impl<W: StreamWriter> Merger for TagInvertedMerger<W> {
    fn merge(&mut self, tag_key_id: u32, values: &[&[u8]]) -> Result<(), IndexError> {
        let config = self.config.clone();
        run_merge(&config, INVERTED_KIND, tag_key_id, values.len(), || {
            let mut scanners = values
                .iter()
                .map(|buf| {
                    InvertedBlock::new(tag_key_id, buf, self.codec.clone(), config.verify_checksums)
                        .map(InvertedScanner::new)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| report(&config, INVERTED_KIND, tag_key_id, e))?;
            self.merge_scanners(tag_key_id, &mut scanners)
                .map_err(|e| report(&config, INVERTED_KIND, tag_key_id, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{MemoryStreamWriter, MemoryTable, TableReader};
    use crate::tagindex::TagInvertedReader;

    fn bm(values: &[u32]) -> RoaringBitmap {
        values.iter().copied().collect()
    }

    fn block(entries: &[(u32, &[u32])]) -> Vec<u8> {
        let mut f = TagInvertedFlusher::new(MemoryStreamWriter::new(), &IndexConfig::default());
        f.prepare_tag_key(8);
        for (id, series) in entries {
            f.flush_inverted_index(*id, &bm(series)).unwrap();
        }
        f.commit_tag_key().unwrap();
        f.into_inner().into_table().get(8).unwrap().to_vec()
    }

    fn merged(inputs: &[&[u8]]) -> MemoryTable {
        let mut m = TagInvertedMerger::new(MemoryStreamWriter::new(), &IndexConfig::default());
        m.merge(8, inputs).unwrap();
        m.into_inner().into_table()
    }

    #[test]
    fn unions_series_per_tag_value() {
        let a = block(&[(1, &[1, 2]), (100_000, &[5])]);
        let b = block(&[(1, &[3]), (2, &[4])]);
        let t = merged(&[&a, &b]);
        let r = TagInvertedReader::new(vec![&t], &IndexConfig::default());
        assert_eq!(r.get_tag_value_ids(8).unwrap(), bm(&[1, 2, 100_000]));
        assert_eq!(r.get_series_ids_by_tag_value_ids(8, &bm(&[1])).unwrap(), bm(&[1, 2, 3]));
        assert_eq!(r.get_series_ids_by_tag_value_ids(8, &bm(&[2])).unwrap(), bm(&[4]));
        assert_eq!(r.get_series_ids_by_tag_value_ids(8, &bm(&[100_000])).unwrap(), bm(&[5]));
    }

    #[test]
    fn merging_in_stages_matches_one_pass() {
        let a = block(&[(1, &[1]), (3, &[3])]);
        let b = block(&[(1, &[2]), (2, &[2])]);
        let c = block(&[(3, &[9]), (70_000, &[7])]);

        let ab = merged(&[&a, &b]);
        let staged = merged(&[ab.get(8).unwrap(), &c]);
        let direct = merged(&[&a, &b, &c]);
        assert_eq!(staged.get(8), direct.get(8));
    }
}
