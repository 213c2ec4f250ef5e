use super::{FORWARD_FOOTER_FIELDS, FORWARD_KIND};
use crate::bitmap::{container_len, default_codec, high_keys, BitmapCodec};
use crate::block::finish_block;
use crate::config::IndexConfig;
use crate::encoding::delta::DeltaBitPackingEncoder;
use crate::encoding::fixed_offset::FixedOffsetEncoder;
use crate::encoding::stream::write_var_u64;
use crate::error::IndexError;
use crate::kv::StreamWriter;

use roaring::RoaringBitmap;

use std::sync::Arc;

/// Writes forward index blocks: for every series of a tag key, its tag value ids.
///
/// Per tag key: [`prepare_tag_key`](Self::prepare_tag_key), one `flush_forward_index*` call
/// per roaring container of the series bitmap (ascending high key, series in ascending
/// order), then [`commit_tag_key`](Self::commit_tag_key).
///
/// Container payload: `[series count uvarint][ids len uvarint][delta-packed ids]
/// [delta-packed per-series counts, omitted when every count is 1]`.
#[derive(Debug)]
pub struct TagForwardFlusher<W: StreamWriter> {
    writer: W,
    config: IndexConfig,
    codec: Arc<dyn BitmapCodec>,
    tag_key_id: Option<u32>,
    offsets: FixedOffsetEncoder,
    container_series: Vec<u32>,
    encoder: DeltaBitPackingEncoder,
    buf: Vec<u8>,
    scratch: Vec<u8>,
}

impl<W: StreamWriter> TagForwardFlusher<W> {
    pub fn new(writer: W, config: &IndexConfig) -> Self {
        Self {
            writer,
            config: config.clone(),
            codec: default_codec(),
            tag_key_id: None,
            offsets: FixedOffsetEncoder::new(),
            container_series: Vec::new(),
            encoder: DeltaBitPackingEncoder::new(),
            buf: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn BitmapCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn prepare_tag_key(&mut self, tag_key_id: u32) {
        self.writer.prepare(tag_key_id);
        self.tag_key_id = Some(tag_key_id);
        self.offsets.reset();
        self.container_series.clear();
    }

    fn current_key(&self) -> Result<u32, IndexError> {
        self.tag_key_id
            .ok_or_else(|| IndexError::InvalidInput("prepare_tag_key was not called".to_string()))
    }

    /// One container where every series has exactly one tag value id.
    pub fn flush_forward_index(&mut self, tag_value_ids: &[u32]) -> Result<(), IndexError> {
        self.write_container(tag_value_ids, None)
    }

    /// One container where series `i` owns the next `counts[i]` ids of `tag_value_ids`.
    pub fn flush_forward_index_with_counts(
        &mut self,
        tag_value_ids: &[u32],
        counts: &[u32],
    ) -> Result<(), IndexError> {
        let total: u64 = counts.iter().map(|&c| c as u64).sum();
        if total != tag_value_ids.len() as u64 {
            return Err(IndexError::InvalidInput(format!(
                "counts add up to {} but {} tag value ids were given",
                total,
                tag_value_ids.len()
            )));
        }
        let limit = self.config.max_tag_values_per_series;
        if let Some(&c) = counts.iter().find(|&&c| c > limit) {
            return Err(IndexError::InvalidInput(format!(
                "series with {} tag value ids exceeds max_tag_values_per_series {}",
                c, limit
            )));
        }
        if counts.iter().all(|&c| c == 1) {
            return self.write_container(tag_value_ids, None);
        }
        self.write_container(tag_value_ids, Some(counts))
    }

    fn write_container(&mut self, ids: &[u32], counts: Option<&[u32]>) -> Result<(), IndexError> {
        self.current_key()?;
        let series = counts.map_or(ids.len(), <[u32]>::len);

        self.scratch.clear();
        self.encoder.reset();
        for &id in ids {
            self.encoder.add(id as i32);
        }
        self.encoder.write_to(&mut self.scratch)?;

        self.buf.clear();
        write_var_u64(&mut self.buf, series as u64);
        write_var_u64(&mut self.buf, self.scratch.len() as u64);
        self.buf.extend_from_slice(&self.scratch);
        if let Some(counts) = counts {
            self.encoder.reset();
            for &c in counts {
                self.encoder.add(c as i32);
            }
            self.encoder.write_to(&mut self.buf)?;
        }

        self.offsets.add(self.writer.size());
        self.container_series.push(series as u32);
        self.writer.write(&self.buf)?;
        Ok(())
    }

    /// Writes the series bitmap, container offsets and footer, then commits the block.
    pub fn commit_tag_key(&mut self, series_ids: &RoaringBitmap) -> Result<(), IndexError> {
        let tag_key_id = self.current_key()?;
        self.tag_key_id = None;

        let keys = high_keys(series_ids);
        if keys.len() != self.container_series.len() {
            return Err(IndexError::InvalidInput(format!(
                "tag key {}: {} containers flushed for {} in the series bitmap",
                tag_key_id,
                self.container_series.len(),
                keys.len()
            )));
        }
        for (hk, &n) in keys.iter().zip(&self.container_series) {
            if container_len(series_ids, *hk) != n as u64 {
                return Err(IndexError::InvalidInput(format!(
                    "tag key {}: container {} holds {} series, {} flushed",
                    tag_key_id,
                    hk,
                    container_len(series_ids, *hk),
                    n
                )));
            }
        }

        let series_at = self.writer.size();
        self.buf.clear();
        self.codec.encode(series_ids, &mut self.buf)?;
        let offsets_at = series_at + self.buf.len() as u32;
        self.offsets.write_to(&mut self.buf);
        self.writer.write(&self.buf)?;

        let footer: [u32; FORWARD_FOOTER_FIELDS] = [series_at, offsets_at];
        finish_block(&mut self.writer, &footer, FORWARD_KIND, tag_key_id, &self.config)?;
        Ok(())
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStreamWriter;

    #[test]
    fn misuse_is_rejected() {
        let mut f = TagForwardFlusher::new(MemoryStreamWriter::new(), &IndexConfig::default());
        assert!(f.flush_forward_index(&[1]).is_err());

        f.prepare_tag_key(1);
        assert!(f.flush_forward_index_with_counts(&[1, 2], &[1]).is_err());
        f.flush_forward_index(&[1, 2]).unwrap();
        // two series flushed, but the bitmap's container holds three
        let series: RoaringBitmap = [1u32, 2, 3].into_iter().collect();
        assert!(matches!(f.commit_tag_key(&series), Err(IndexError::InvalidInput(_))));
        assert!(f.writer().table().is_empty());
    }

    #[test]
    fn too_many_values_per_series_is_rejected() {
        let config = IndexConfig {
            max_tag_values_per_series: 2,
            ..IndexConfig::default()
        };
        let mut f = TagForwardFlusher::new(MemoryStreamWriter::new(), &config);
        f.prepare_tag_key(1);
        assert!(matches!(
            f.flush_forward_index_with_counts(&[1, 2, 3, 4], &[3, 1]),
            Err(IndexError::InvalidInput(_))
        ));
        f.flush_forward_index_with_counts(&[1, 2, 3], &[2, 1]).unwrap();
    }
}
