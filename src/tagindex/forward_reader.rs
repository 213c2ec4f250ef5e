use super::grouping::{Grouping, GroupingScanner, SeriesTagValues};
use super::{FORWARD_FOOTER_FIELDS, FORWARD_KIND};
use crate::bitmap::{container_len, container_of, default_codec, high_bits, high_keys, BitmapCodec};
use crate::block::{check_positions, footer_start, read_footer, report};
use crate::config::IndexConfig;
use crate::encoding::delta::decode_u32s;
use crate::encoding::fixed_offset::FixedOffsetDecoder;
use crate::encoding::stream::ByteReader;
use crate::error::IndexError;
use crate::kv::{blocks_for_key, TableReader};

use roaring::RoaringBitmap;

use std::sync::Arc;

/// One parsed forward index block.
#[derive(Debug, Clone)]
pub struct ForwardBlock<'a> {
    tag_key_id: u32,
    series_ids: RoaringBitmap,
    high_keys: Vec<u16>,
    offsets: FixedOffsetDecoder<'a>,
    data: &'a [u8],
    max_per_series: u32,
}

impl<'a> ForwardBlock<'a> {
    pub fn new(
        tag_key_id: u32,
        buf: &'a [u8],
        codec: &dyn BitmapCodec,
        config: &IndexConfig,
    ) -> Result<Self, IndexError> {
        let [series_at, offsets_at] =
            read_footer::<FORWARD_FOOTER_FIELDS>(buf, FORWARD_KIND, tag_key_id, config.verify_checksums)?;
        let footer_at = footer_start::<FORWARD_FOOTER_FIELDS>(buf);
        check_positions(&[series_at, offsets_at], footer_at, FORWARD_KIND, tag_key_id)?;
        let (series_at, offsets_at) = (series_at as usize, offsets_at as usize);

        let corrupt = |details: String| IndexError::corrupt_block(FORWARD_KIND.as_str(), tag_key_id, details);
        let series_ids = codec
            .decode(&buf[series_at..offsets_at])
            .map_err(|e| corrupt(e.to_string()))?;
        let offsets = FixedOffsetDecoder::new(&buf[offsets_at..footer_at]).map_err(|e| corrupt(e.to_string()))?;
        let high_keys = high_keys(&series_ids);
        if offsets.size() != high_keys.len() {
            return Err(corrupt(format!(
                "{} container offsets for {} containers",
                offsets.size(),
                high_keys.len()
            )));
        }
        let mut prev = 0u32;
        for off in offsets.iter() {
            if off < prev || off as usize > series_at {
                return Err(corrupt(format!("container offset {} out of order", off)));
            }
            prev = off;
        }
        Ok(Self {
            tag_key_id,
            series_ids,
            high_keys,
            offsets,
            data: &buf[..series_at],
            max_per_series: config.max_tag_values_per_series,
        })
    }

    pub fn series_ids(&self) -> &RoaringBitmap {
        &self.series_ids
    }

    /// Decodes container `high_key`, `None` when the block has no such container.
    pub fn container(&self, high_key: u16) -> Result<Option<SeriesTagValues>, IndexError> {
        let Ok(idx) = self.high_keys.binary_search(&high_key) else {
            return Ok(None);
        };
        let payload = self.offsets.get_block(idx, self.data)?;
        self.decode_container(high_key, payload)
            .map(Some)
            .map_err(|e| IndexError::corrupt_block(FORWARD_KIND.as_str(), self.tag_key_id, e.to_string()))
    }

    fn decode_container(&self, high_key: u16, payload: &[u8]) -> Result<SeriesTagValues, IndexError> {
        let mut r = ByteReader::new(payload);
        let series = r.read_var_u64();
        let ids_len = r.read_var_u64() as usize;
        let ids_block = r.read_slice(ids_len);
        r.error()?;
        let counts_block = &payload[r.position()..];

        if series != container_len(&self.series_ids, high_key) {
            return Err(IndexError::corruption(format!(
                "container {} lists {} series, bitmap has {}",
                high_key,
                series,
                container_len(&self.series_ids, high_key)
            )));
        }
        // counts first: bounded by the series count, they bound the ids
        let counts = if counts_block.is_empty() {
            vec![1u32; series as usize]
        } else {
            decode_u32s(counts_block, series as usize)?
        };
        if counts.len() as u64 != series {
            return Err(IndexError::corruption(format!(
                "container {}: {} counts for {} series",
                high_key,
                counts.len(),
                series
            )));
        }
        if let Some(&c) = counts.iter().find(|&&c| c > self.max_per_series) {
            return Err(IndexError::corruption(format!(
                "container {}: series with {} tag value ids, at most {} allowed",
                high_key, c, self.max_per_series
            )));
        }
        let total: u64 = counts.iter().map(|&c| c as u64).sum();
        let ids = decode_u32s(ids_block, total as usize)?;
        if ids.len() as u64 != total {
            return Err(IndexError::corruption(format!(
                "container {}: counts add up to {} for {} ids",
                high_key,
                total,
                ids.len()
            )));
        }
        let series_ids = container_of(&self.series_ids, high_key).iter().collect();
        Ok(SeriesTagValues::new(high_key, series_ids, &counts, ids))
    }
}

/// Grouping cursor over one forward index block.
#[derive(Debug, Clone)]
pub struct ForwardScanner<'a> {
    block: ForwardBlock<'a>,
}

impl<'a> ForwardScanner<'a> {
    pub fn new(block: ForwardBlock<'a>) -> Self {
        Self { block }
    }
}

impl GroupingScanner for ForwardScanner<'_> {
    fn series_ids(&self) -> &RoaringBitmap {
        self.block.series_ids()
    }

    fn get_series_and_tag_value(&mut self, high_key: u16) -> Result<Option<SeriesTagValues>, IndexError> {
        self.block.container(high_key)
    }
}

/// Queries forward index blocks spread over several tables.
#[derive(Debug, Clone)]
pub struct TagForwardReader<'a> {
    tables: Vec<&'a dyn TableReader>,
    codec: Arc<dyn BitmapCodec>,
    config: IndexConfig,
}

impl<'a> TagForwardReader<'a> {
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

    fn blocks(&self, tag_key_id: u32) -> Result<Vec<ForwardBlock<'a>>, IndexError> {
        blocks_for_key(&self.tables, tag_key_id)
            .into_iter()
            .map(|buf| {
                ForwardBlock::new(tag_key_id, buf, self.codec.as_ref(), &self.config)
                    .map_err(|e| report(&self.config, FORWARD_KIND, tag_key_id, e))
            })
            .collect()
    }

    /// Union of the series recorded for the tag key.
    pub fn get_series_ids_for_tag_key_id(&self, tag_key_id: u32) -> Result<RoaringBitmap, IndexError> {
        let blocks = self.blocks(tag_key_id)?;
        if blocks.is_empty() {
            return Err(IndexError::NotFound(format!(
                "forward index of tag key {}",
                tag_key_id
            )));
        }
        let mut out = RoaringBitmap::new();
        for b in &blocks {
            out |= b.series_ids();
        }
        Ok(out)
    }

    /// Tag value ids of one series, concatenated over the tables in the order given.
    pub fn get_tag_value_ids_for_series(&self, tag_key_id: u32, series_id: u32) -> Result<Vec<u32>, IndexError> {
        let mut out = Vec::new();
        for b in self.blocks(tag_key_id)? {
            if !b.series_ids().contains(series_id) {
                continue;
            }
            if let Some(stv) = b.container(high_bits(series_id))? {
                out.extend_from_slice(stv.get(series_id).unwrap_or_default());
            }
        }
        Ok(out)
    }
}

impl<'a> Grouping for TagForwardReader<'a> {
    type Scanner = ForwardScanner<'a>;

    fn get_grouping_scanners(
        &self,
        tag_key_id: u32,
        series_ids: &RoaringBitmap,
    ) -> Result<Vec<ForwardScanner<'a>>, IndexError> {
        Ok(self
            .blocks(tag_key_id)?
            .into_iter()
            .filter(|b| !b.series_ids().is_disjoint(series_ids))
            .map(ForwardScanner::new)
            .collect())
    }
}
