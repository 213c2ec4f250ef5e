use super::{INVERTED_FOOTER_FIELDS, INVERTED_KIND};
use crate::bitmap::{container_len, containers, default_codec, high_bits, high_keys, position_in_container, BitmapCodec};
use crate::block::{check_positions, footer_start, read_footer, report};
use crate::config::IndexConfig;
use crate::encoding::fixed_offset::FixedOffsetDecoder;
use crate::encoding::stream::u32_at;
use crate::error::IndexError;
use crate::kv::{blocks_for_key, TableReader};

use roaring::RoaringBitmap;

use std::sync::Arc;

/// One parsed inverted index block.
#[derive(Debug, Clone)]
pub struct InvertedBlock<'a> {
    tag_key_id: u32,
    tag_value_ids: RoaringBitmap,
    high_keys: Vec<u16>,
    offsets: FixedOffsetDecoder<'a>,
    data: &'a [u8],
    codec: Arc<dyn BitmapCodec>,
}

/// Series bitmaps of the tag value ids sharing one high key.
#[derive(Debug, Clone)]
struct Bucket<'a> {
    high_key: u16,
    low_offsets: FixedOffsetDecoder<'a>,
    data: &'a [u8],
}

impl<'a> InvertedBlock<'a> {
    pub fn new(
        tag_key_id: u32,
        buf: &'a [u8],
        codec: Arc<dyn BitmapCodec>,
        verify_checksum: bool,
    ) -> Result<Self, IndexError> {
        let [bitmap_at, offsets_at] =
            read_footer::<INVERTED_FOOTER_FIELDS>(buf, INVERTED_KIND, tag_key_id, verify_checksum)?;
        let footer_at = footer_start::<INVERTED_FOOTER_FIELDS>(buf);
        check_positions(&[0, bitmap_at, offsets_at], footer_at, INVERTED_KIND, tag_key_id)?;
        let (bitmap_at, offsets_at) = (bitmap_at as usize, offsets_at as usize);

        let corrupt = |details: String| IndexError::corrupt_block(INVERTED_KIND.as_str(), tag_key_id, details);
        let tag_value_ids = codec
            .decode(&buf[bitmap_at..offsets_at])
            .map_err(|e| corrupt(e.to_string()))?;
        let offsets = FixedOffsetDecoder::new(&buf[offsets_at..footer_at]).map_err(|e| corrupt(e.to_string()))?;
        let high_keys = high_keys(&tag_value_ids);
        if offsets.size() != high_keys.len() {
            return Err(corrupt(format!(
                "{} bucket offsets for {} buckets",
                offsets.size(),
                high_keys.len()
            )));
        }
        Ok(Self {
            tag_key_id,
            tag_value_ids,
            high_keys,
            offsets,
            data: &buf[..bitmap_at],
            codec,
        })
    }

    pub fn tag_value_ids(&self) -> &RoaringBitmap {
        &self.tag_value_ids
    }

    fn corrupt(&self, details: impl Into<String>) -> IndexError {
        IndexError::corrupt_block(INVERTED_KIND.as_str(), self.tag_key_id, details)
    }

    fn bucket(&self, high_key: u16) -> Result<Option<Bucket<'a>>, IndexError> {
        let Ok(idx) = self.high_keys.binary_search(&high_key) else {
            return Ok(None);
        };
        let bytes = self
            .offsets
            .get_block(idx, self.data)
            .map_err(|e| self.corrupt(e.to_string()))?;
        if bytes.len() < 4 {
            return Err(self.corrupt(format!("bucket {} of {} bytes", high_key, bytes.len())));
        }
        let trailer_at = bytes.len() - 4;
        let table_len = u32_at(bytes, trailer_at).unwrap_or_default() as usize;
        let table_at = trailer_at
            .checked_sub(table_len)
            .ok_or_else(|| self.corrupt(format!("bucket {} low offsets table overruns", high_key)))?;
        let low_offsets = FixedOffsetDecoder::new(&bytes[table_at..trailer_at]).map_err(|e| self.corrupt(e.to_string()))?;
        let expected = container_len(&self.tag_value_ids, high_key);
        if low_offsets.size() as u64 != expected {
            return Err(self.corrupt(format!(
                "bucket {} has {} offsets for {} tag value ids",
                high_key,
                low_offsets.size(),
                expected
            )));
        }
        Ok(Some(Bucket {
            high_key,
            low_offsets,
            data: &bytes[..table_at],
        }))
    }

    fn decode_series(&self, bucket: &Bucket<'a>, tag_value_id: u32) -> Result<Option<RoaringBitmap>, IndexError> {
        let Some(pos) = position_in_container(&self.tag_value_ids, tag_value_id) else {
            return Ok(None);
        };
        let bytes = bucket
            .low_offsets
            .get_block(pos, bucket.data)
            .map_err(|e| self.corrupt(e.to_string()))?;
        self.codec
            .decode(bytes)
            .map(Some)
            .map_err(|e| self.corrupt(e.to_string()))
    }

    /// Series carrying `tag_value_id`, `None` when the block does not hold the id.
    pub fn series_ids(&self, tag_value_id: u32) -> Result<Option<RoaringBitmap>, IndexError> {
        match self.bucket(high_bits(tag_value_id))? {
            Some(bucket) => self.decode_series(&bucket, tag_value_id),
            None => Ok(None),
        }
    }

    /// Unions into `out` the series of every id in `tag_value_ids` held by this block.
    pub fn union_series_ids(&self, tag_value_ids: &RoaringBitmap, out: &mut RoaringBitmap) -> Result<(), IndexError> {
        let hits = tag_value_ids & &self.tag_value_ids;
        for (high_key, ids) in containers(&hits) {
            let Some(bucket) = self.bucket(high_key)? else {
                continue;
            };
            for id in ids {
                if let Some(series) = self.decode_series(&bucket, id)? {
                    *out |= series;
                }
            }
        }
        Ok(())
    }
}

/// Cursor over one inverted block for callers visiting ids in ascending order; the
/// current bucket is kept between calls.
#[derive(Debug, Clone)]
pub struct InvertedScanner<'a> {
    block: InvertedBlock<'a>,
    bucket: Option<Bucket<'a>>,
}

impl<'a> InvertedScanner<'a> {
    pub fn new(block: InvertedBlock<'a>) -> Self {
        Self { block, bucket: None }
    }

    pub fn tag_value_ids(&self) -> &RoaringBitmap {
        self.block.tag_value_ids()
    }

    pub fn series_ids(&mut self, tag_value_id: u32) -> Result<Option<RoaringBitmap>, IndexError> {
        if !self.block.tag_value_ids.contains(tag_value_id) {
            return Ok(None);
        }
        let high_key = high_bits(tag_value_id);
        if self.bucket.as_ref().map(|b| b.high_key) != Some(high_key) {
            self.bucket = self.block.bucket(high_key)?;
        }
        match &self.bucket {
            Some(bucket) => self.block.decode_series(bucket, tag_value_id),
            None => Ok(None),
        }
    }
}

/// Queries inverted index blocks spread over several tables.
#[derive(Debug, Clone)]
pub struct TagInvertedReader<'a> {
    tables: Vec<&'a dyn TableReader>,
    codec: Arc<dyn BitmapCodec>,
    config: IndexConfig,
}

impl<'a> TagInvertedReader<'a> {
    pub fn new(tables: Vec<&'a dyn TableReader>, config: &IndexConfig) -> Self {
        Self {
            tables,
            codec: default_codec(),
            config: config.clone(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn BitmapCodec>) -> Self {
        self.codec = codec;
        self
    }

    fn blocks(&self, tag_key_id: u32) -> Result<Vec<InvertedBlock<'a>>, IndexError> {
        blocks_for_key(&self.tables, tag_key_id)
            .into_iter()
            .map(|buf| {
                InvertedBlock::new(tag_key_id, buf, self.codec.clone(), self.config.verify_checksums)
                    .map_err(|e| report(&self.config, INVERTED_KIND, tag_key_id, e))
            })
            .collect()
    }

    /// Union of the series carrying any of `tag_value_ids`. An absent tag key yields an
    /// empty bitmap.
    pub fn get_series_ids_by_tag_value_ids(
        &self,
        tag_key_id: u32,
        tag_value_ids: &RoaringBitmap,
    ) -> Result<RoaringBitmap, IndexError> {
        let mut out = RoaringBitmap::new();
        if tag_value_ids.is_empty() {
            return Ok(out);
        }
        for block in self.blocks(tag_key_id)? {
            block
                .union_series_ids(tag_value_ids, &mut out)
                .map_err(|e| report(&self.config, INVERTED_KIND, tag_key_id, e))?;
        }
        Ok(out)
    }

    /// Union of the tag value ids indexed for the key.
    pub fn get_tag_value_ids(&self, tag_key_id: u32) -> Result<RoaringBitmap, IndexError> {
        let mut out = RoaringBitmap::new();
        for block in self.blocks(tag_key_id)? {
            out |= block.tag_value_ids();
        }
        Ok(out)
    }

    pub fn scanners(&self, tag_key_id: u32) -> Result<Vec<InvertedScanner<'a>>, IndexError> {
        Ok(self.blocks(tag_key_id)?.into_iter().map(InvertedScanner::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStreamWriter;
    use crate::tagindex::TagInvertedFlusher;

    fn bm(values: &[u32]) -> RoaringBitmap {
        values.iter().copied().collect()
    }

    fn table(entries: &[(u32, &[u32])]) -> crate::kv::MemoryTable {
        let mut f = TagInvertedFlusher::new(MemoryStreamWriter::new(), &IndexConfig::default());
        f.prepare_tag_key(1);
        for (id, series) in entries {
            f.flush_inverted_index(*id, &bm(series)).unwrap();
        }
        f.commit_tag_key().unwrap();
        f.into_inner().into_table()
    }

    #[test]
    fn lookups_across_buckets() {
        let t = table(&[(1, &[10, 11]), (2, &[12]), (70_000, &[13, 1 << 20]), (70_001, &[])]);
        let r = TagInvertedReader::new(vec![&t], &IndexConfig::default());
        assert_eq!(r.get_tag_value_ids(1).unwrap(), bm(&[1, 2, 70_000, 70_001]));
        assert_eq!(r.get_series_ids_by_tag_value_ids(1, &bm(&[1])).unwrap(), bm(&[10, 11]));
        assert_eq!(
            r.get_series_ids_by_tag_value_ids(1, &bm(&[2, 70_000, 99])).unwrap(),
            bm(&[12, 13, 1 << 20])
        );
        assert!(r.get_series_ids_by_tag_value_ids(1, &bm(&[70_001])).unwrap().is_empty());
        // absent key behaves like a key without values
        assert!(r.get_tag_value_ids(2).unwrap().is_empty());
        assert!(r.get_series_ids_by_tag_value_ids(2, &bm(&[1])).unwrap().is_empty());
    }

    #[test]
    fn unions_over_tables() {
        let a = table(&[(1, &[10]), (3, &[30])]);
        let b = table(&[(1, &[11]), (4, &[40])]);
        let r = TagInvertedReader::new(vec![&a, &b], &IndexConfig::default());
        assert_eq!(r.get_series_ids_by_tag_value_ids(1, &bm(&[1, 4])).unwrap(), bm(&[10, 11, 40]));
        assert_eq!(r.get_tag_value_ids(1).unwrap(), bm(&[1, 3, 4]));
    }

    #[test]
    fn scanner_reuses_bucket() {
        let t = table(&[(1, &[1]), (2, &[2]), (65_537, &[3])]);
        let r = TagInvertedReader::new(vec![&t], &IndexConfig::default());
        let mut s = r.scanners(1).unwrap().pop().unwrap();
        assert_eq!(s.series_ids(1).unwrap(), Some(bm(&[1])));
        assert_eq!(s.series_ids(2).unwrap(), Some(bm(&[2])));
        assert_eq!(s.series_ids(3).unwrap(), None);
        assert_eq!(s.series_ids(65_537).unwrap(), Some(bm(&[3])));
    }

    #[test]
    fn flipped_payload_is_reported() {
        let mut t = table(&[(1, &[1]), (2, &[2])]);
        // footer fields stay intact, only the crc notices the flipped payload byte
        t.get_mut(1).unwrap()[0] ^= 0xFF;
        let r = TagInvertedReader::new(vec![&t], &IndexConfig::default());
        assert!(matches!(
            r.get_tag_value_ids(1),
            Err(IndexError::Corruption { block: Some("tag_inverted"), .. })
        ));
    }
}
