use super::{INVERTED_FOOTER_FIELDS, INVERTED_KIND};
use crate::bitmap::{default_codec, high_bits, BitmapCodec};
use crate::block::finish_block;
use crate::config::IndexConfig;
use crate::encoding::fixed_offset::FixedOffsetEncoder;
use crate::encoding::stream::write_u32;
use crate::error::IndexError;
use crate::kv::StreamWriter;

use roaring::RoaringBitmap;

use std::sync::Arc;

/// Writes inverted index blocks: for every tag value id of a tag key, its series bitmap.
///
/// Ids are grouped into buckets by their high 16 bits. A bucket is
/// `[series bitmaps][low offsets table][low offsets table len u32]`, where the low offsets
/// are relative to the bucket start. The block then carries the tag value id bitmap and
/// one offset per bucket.
#[derive(Debug)]
pub struct TagInvertedFlusher<W: StreamWriter> {
    writer: W,
    config: IndexConfig,
    codec: Arc<dyn BitmapCodec>,
    tag_key_id: Option<u32>,
    started: bool,
    tag_value_ids: RoaringBitmap,
    last_id: Option<u32>,
    bucket_start: u32,
    high_offsets: FixedOffsetEncoder,
    low_offsets: FixedOffsetEncoder,
    buf: Vec<u8>,
}

impl<W: StreamWriter> TagInvertedFlusher<W> {
    pub fn new(writer: W, config: &IndexConfig) -> Self {
        Self {
            writer,
            config: config.clone(),
            codec: default_codec(),
            tag_key_id: None,
            started: false,
            tag_value_ids: RoaringBitmap::new(),
            last_id: None,
            bucket_start: 0,
            high_offsets: FixedOffsetEncoder::new(),
            low_offsets: FixedOffsetEncoder::new(),
            buf: Vec::new(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn BitmapCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Starts a tag key. The record itself is only opened by the first flushed value, so a
    /// key without values leaves no trace in the writer.
    pub fn prepare_tag_key(&mut self, tag_key_id: u32) {
        self.tag_key_id = Some(tag_key_id);
        self.started = false;
        self.tag_value_ids.clear();
        self.last_id = None;
        self.high_offsets.reset();
        self.low_offsets.reset();
    }

    /// Adds one tag value. Ids must be strictly ascending within a tag key.
    pub fn flush_inverted_index(&mut self, tag_value_id: u32, series_ids: &RoaringBitmap) -> Result<(), IndexError> {
        let tag_key_id = self
            .tag_key_id
            .ok_or_else(|| IndexError::InvalidInput("prepare_tag_key was not called".to_string()))?;
        if let Some(last) = self.last_id {
            if tag_value_id <= last {
                return Err(IndexError::InvalidInput(format!(
                    "tag key {}: tag value id {} flushed after {}",
                    tag_key_id, tag_value_id, last
                )));
            }
            if high_bits(tag_value_id) != high_bits(last) {
                self.finish_bucket()?;
            }
        }
        if !self.started {
            self.writer.prepare(tag_key_id);
            self.started = true;
            self.bucket_start = self.writer.size();
        }

        self.low_offsets.add(self.writer.size() - self.bucket_start);
        self.buf.clear();
        self.codec.encode(series_ids, &mut self.buf)?;
        self.writer.write(&self.buf)?;

        self.tag_value_ids.insert(tag_value_id);
        self.last_id = Some(tag_value_id);
        Ok(())
    }

    fn finish_bucket(&mut self) -> Result<(), IndexError> {
        self.buf.clear();
        self.low_offsets.write_to(&mut self.buf);
        let table_len = self.buf.len() as u32;
        write_u32(&mut self.buf, table_len);
        self.writer.write(&self.buf)?;

        self.high_offsets.add(self.bucket_start);
        self.low_offsets.reset();
        self.bucket_start = self.writer.size();
        Ok(())
    }

    /// Closes the last bucket and writes the id bitmap, bucket offsets and footer. A key
    /// with no flushed values commits nothing.
    pub fn commit_tag_key(&mut self) -> Result<(), IndexError> {
        let tag_key_id = self
            .tag_key_id
            .take()
            .ok_or_else(|| IndexError::InvalidInput("prepare_tag_key was not called".to_string()))?;
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.finish_bucket()?;

        let bitmap_at = self.writer.size();
        self.buf.clear();
        self.codec.encode(&self.tag_value_ids, &mut self.buf)?;
        let offsets_at = bitmap_at + self.buf.len() as u32;
        self.high_offsets.write_to(&mut self.buf);
        self.writer.write(&self.buf)?;

        let footer: [u32; INVERTED_FOOTER_FIELDS] = [bitmap_at, offsets_at];
        finish_block(&mut self.writer, &footer, INVERTED_KIND, tag_key_id, &self.config)?;
        Ok(())
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
