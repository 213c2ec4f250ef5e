//! Tag key metadata: per tag key, the mapping from tag value to tag value id.
//!
//! Block layout:
//!
//! ```text
//! [succinct trie: value -> id][id bitmap][rank offsets]
//! [bitmapPos u32][offsetsPos u32][tagValueSeq u32][crc32 u32]
//! ```
//!
//! The rank offsets table holds, for the i-th smallest id, the rank of its value in trie
//! order, which lets id -> value lookups run as a single ordered trie walk.

mod filter;
mod flusher;
mod merger;
mod reader;

pub use filter::TagFilter;
pub use flusher::TagKeyMetaFlusher;
pub use merger::TagKeyMetaMerger;
pub use reader::TagKeyMetaReader;

use crate::bitmap::BitmapCodec;
use crate::block::{footer_start, read_footer};
use crate::encoding::fixed_offset::FixedOffsetDecoder;
use crate::error::IndexError;
use crate::telemetry::BlockKind;
use crate::trie::{PrefixIter, SuccinctTrie};

use roaring::RoaringBitmap;

pub(crate) const FOOTER_FIELDS: usize = 3;
const KIND: BlockKind = BlockKind::TagKeyMeta;

#[inline]
pub(crate) fn decode_id(v: &[u8]) -> u32 {
    <[u8; 4]>::try_from(v).map(u32::from_le_bytes).unwrap_or_default()
}

/// One parsed tag key metadata block.
#[derive(Debug)]
pub struct TagKeyMeta<'a> {
    tag_key_id: u32,
    trie: SuccinctTrie,
    ids: RoaringBitmap,
    ranks: FixedOffsetDecoder<'a>,
    tag_value_seq: u32,
}

impl<'a> TagKeyMeta<'a> {
    pub fn new(
        tag_key_id: u32,
        buf: &'a [u8],
        codec: &dyn BitmapCodec,
        verify_checksum: bool,
    ) -> Result<Self, IndexError> {
        let [bitmap_pos, offsets_pos, tag_value_seq] =
            read_footer::<FOOTER_FIELDS>(buf, KIND, tag_key_id, verify_checksum)?;
        let footer_pos = footer_start::<FOOTER_FIELDS>(buf);
        let (bitmap_pos, offsets_pos) = (bitmap_pos as usize, offsets_pos as usize);
        if !(0 < bitmap_pos && bitmap_pos < offsets_pos && offsets_pos < footer_pos) {
            return Err(IndexError::corrupt_block(
                KIND.as_str(),
                tag_key_id,
                format!(
                    "footer positions bitmap={} offsets={} footer={} out of order",
                    bitmap_pos, offsets_pos, footer_pos
                ),
            ));
        }
        let context = |e: IndexError| IndexError::corrupt_block(KIND.as_str(), tag_key_id, e.to_string());
        let trie = SuccinctTrie::unmarshal(&buf[..bitmap_pos]).map_err(context)?;
        let ids = codec.decode(&buf[bitmap_pos..offsets_pos]).map_err(context)?;
        let ranks = FixedOffsetDecoder::new(&buf[offsets_pos..footer_pos]).map_err(context)?;

        let n = trie.num_keys();
        if ids.len() != n as u64 || ranks.size() != n || (n > 0 && trie.value_width() != 4) {
            return Err(IndexError::corrupt_block(
                KIND.as_str(),
                tag_key_id,
                format!(
                    "{} trie keys, {} ids, {} rank offsets",
                    n,
                    ids.len(),
                    ranks.size()
                ),
            ));
        }
        if ranks.iter().any(|r| r as usize >= n) {
            return Err(IndexError::corrupt_block(
                KIND.as_str(),
                tag_key_id,
                "rank offset beyond trie size",
            ));
        }
        Ok(Self {
            tag_key_id,
            trie,
            ids,
            ranks,
            tag_value_seq,
        })
    }

    pub fn tag_key_id(&self) -> u32 {
        self.tag_key_id
    }

    pub fn tag_value_seq(&self) -> u32 {
        self.tag_value_seq
    }

    pub fn tag_value_ids(&self) -> &RoaringBitmap {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.trie.num_keys()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    /// Id of an exact tag value.
    pub fn get(&self, tag_value: &[u8]) -> Option<u32> {
        self.trie.get(tag_value).map(decode_id)
    }

    /// `(tag value, id)` pairs whose value starts with `prefix`, in value order.
    pub fn prefix_iter(&self, prefix: &[u8]) -> impl Iterator<Item = (Vec<u8>, u32)> + '_ {
        PrefixIter::new(&self.trie, prefix).map(|(k, v)| (k, decode_id(v)))
    }

    /// Rank in value order of the value holding `id`.
    pub fn rank_of(&self, id: u32) -> Option<usize> {
        if !self.ids.contains(id) {
            return None;
        }
        let idx = self.ids.rank(id) as usize - 1;
        self.ranks.get(idx).map(|r| r as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::PortableBitmapCodec;
    use crate::config::IndexConfig;
    use crate::kv::{MemoryStreamWriter, TableReader};

    fn block(values: &[(&str, u32)], seq: u32) -> Vec<u8> {
        let mut f = TagKeyMetaFlusher::new(MemoryStreamWriter::new(), &IndexConfig::default());
        for (v, id) in values {
            f.flush_tag_value(v, *id);
        }
        f.flush_tag_key_id(1, seq).unwrap();
        f.into_inner().into_table().get(1).unwrap().to_vec()
    }

    #[test]
    fn parse_and_look_up() {
        let buf = block(&[("zeta", 1), ("alpha", 7), ("mid", 3)], 9);
        let meta = TagKeyMeta::new(1, &buf, &PortableBitmapCodec, true).unwrap();
        assert_eq!(meta.tag_value_seq(), 9);
        assert_eq!(meta.len(), 3);
        assert_eq!(meta.get(b"alpha"), Some(7));
        assert_eq!(meta.get(b"alp"), None);
        assert_eq!(meta.tag_value_ids().iter().collect::<Vec<_>>(), vec![1, 3, 7]);
        // value order: alpha(0), mid(1), zeta(2)
        assert_eq!(meta.rank_of(7), Some(0));
        assert_eq!(meta.rank_of(3), Some(1));
        assert_eq!(meta.rank_of(1), Some(2));
        assert_eq!(meta.rank_of(2), None);
    }

    #[test]
    fn truncation_and_bad_footers_are_corruption() {
        let buf = block(&[("a", 1), ("b", 2)], 2);
        for len in 0..buf.len() {
            assert!(
                TagKeyMeta::new(1, &buf[..len], &PortableBitmapCodec, true).is_err(),
                "len={}",
                len
            );
        }
        // swap bitmapPos and offsetsPos, skipping the checksum to reach the position check
        let mut bad = buf.clone();
        let f = bad.len() - 16;
        let (a, b) = (bad[f..f + 4].to_vec(), bad[f + 4..f + 8].to_vec());
        bad[f..f + 4].copy_from_slice(&b);
        bad[f + 4..f + 8].copy_from_slice(&a);
        let err = TagKeyMeta::new(1, &bad, &PortableBitmapCodec, false).unwrap_err();
        assert!(matches!(err, IndexError::Corruption { block: Some("tag_key_meta"), .. }));
        assert!(TagKeyMeta::new(1, &bad, &PortableBitmapCodec, true).is_err());
    }
}
