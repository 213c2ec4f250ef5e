use super::filter::CompiledFilter;
use super::{TagFilter, TagKeyMeta, KIND};
use crate::bitmap::{default_codec, BitmapCodec};
use crate::block::report;
use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::kv::{blocks_for_key, TableReader};

use roaring::RoaringBitmap;

use std::collections::HashMap;
use std::sync::Arc;

/// Queries tag key metadata spread over several tables (one per file generation).
///
/// Holds no decode state between calls; each query parses the blocks it needs.
#[derive(Debug, Clone)]
pub struct TagKeyMetaReader<'a> {
    tables: Vec<&'a dyn TableReader>,
    codec: Arc<dyn BitmapCodec>,
    config: IndexConfig,
}

impl<'a> TagKeyMetaReader<'a> {
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

    /// Parses every block stored for `tag_key_id`; an absent key yields no blocks.
    fn metas(&self, tag_key_id: u32) -> Result<Vec<TagKeyMeta<'a>>, IndexError> {
        blocks_for_key(&self.tables, tag_key_id)
            .into_iter()
            .map(|buf| {
                TagKeyMeta::new(tag_key_id, buf, self.codec.as_ref(), self.config.verify_checksums)
                    .map_err(|e| report(&self.config, KIND, tag_key_id, e))
            })
            .collect()
    }

    fn metas_or_not_found(&self, tag_key_id: u32) -> Result<Vec<TagKeyMeta<'a>>, IndexError> {
        let metas = self.metas(tag_key_id)?;
        if metas.is_empty() {
            return Err(IndexError::TagKeyMetaNotFound(tag_key_id));
        }
        Ok(metas)
    }

    /// Highest tag value sequence recorded for the tag key.
    pub fn get_tag_value_seq(&self, tag_key_id: u32) -> Result<u32, IndexError> {
        self.metas(tag_key_id)?
            .iter()
            .map(TagKeyMeta::tag_value_seq)
            .max()
            .ok_or(IndexError::TagValueSeqNotFound(tag_key_id))
    }

    pub fn get_tag_value_id(&self, tag_key_id: u32, tag_value: &str) -> Result<u32, IndexError> {
        self.metas(tag_key_id)?
            .iter()
            .find_map(|m| m.get(tag_value.as_bytes()))
            .ok_or_else(|| IndexError::TagValueIdNotFound {
                tag_key_id,
                tag_value: tag_value.to_string(),
            })
    }

    /// All tag value ids of the tag key.
    pub fn get_tag_value_ids_for_tag_key_id(&self, tag_key_id: u32) -> Result<RoaringBitmap, IndexError> {
        let mut out = RoaringBitmap::new();
        for m in self.metas_or_not_found(tag_key_id)? {
            out |= m.tag_value_ids();
        }
        Ok(out)
    }

    /// Ids of the tag values matching `filter`.
    pub fn find_value_ids_by_expr(
        &self,
        tag_key_id: u32,
        filter: &TagFilter,
    ) -> Result<RoaringBitmap, IndexError> {
        let compiled = filter.compile()?;
        let metas = self.metas_or_not_found(tag_key_id)?;
        let mut out = RoaringBitmap::new();
        match &compiled {
            CompiledFilter::Exact(values) => {
                for m in &metas {
                    out.extend(values.iter().filter_map(|v| m.get(v)));
                }
            }
            CompiledFilter::Scan { prefix, matcher } => {
                for m in &metas {
                    out.extend(
                        m.prefix_iter(prefix)
                            .filter(|(k, _)| matcher.matches(k))
                            .map(|(_, id)| id),
                    );
                }
            }
        }
        Ok(out)
    }

    /// Distinct tag values starting with `prefix`, sorted, at most `limit` (itself capped by
    /// the configured maximum). An unknown tag key has no suggestions.
    pub fn suggest_tag_values(
        &self,
        tag_key_id: u32,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, IndexError> {
        let limit = limit.min(self.config.max_suggestions);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut found = Vec::with_capacity(limit.min(1024));
        walk_merged(&self.metas(tag_key_id)?, prefix.as_bytes(), |k, _| {
            found.push(String::from_utf8_lossy(k).into_owned());
            found.len() < limit
        });
        Ok(found)
    }

    /// Calls `f(tag value, id)` for values starting with `prefix` in ascending order until it
    /// returns false. A value held by several tables is visited once, with the id of the
    /// first table holding it.
    pub fn walk_tag_values<F>(&self, tag_key_id: u32, prefix: &[u8], f: F) -> Result<(), IndexError>
    where
        F: FnMut(&[u8], u32) -> bool,
    {
        walk_merged(&self.metas_or_not_found(tag_key_id)?, prefix, f);
        Ok(())
    }

    /// Resolves tag value ids to values. Found ids are removed from `ids` and inserted into
    /// `out`; one ordered trie walk per block.
    pub fn collect_tag_values(
        &self,
        tag_key_id: u32,
        ids: &mut RoaringBitmap,
        out: &mut HashMap<u32, String>,
    ) -> Result<(), IndexError> {
        for m in self.metas(tag_key_id)? {
            if ids.is_empty() {
                break;
            }
            let found = &*ids & m.tag_value_ids();
            if found.is_empty() {
                continue;
            }
            let mut pending: Vec<(usize, u32)> = found
                .iter()
                .filter_map(|id| m.rank_of(id).map(|r| (r, id)))
                .collect();
            pending.sort_unstable();

            let mut next = pending.iter().peekable();
            for (rank, (key, _)) in m.prefix_iter(&[]).enumerate() {
                let Some(&&(want, id)) = next.peek() else {
                    break;
                };
                if rank == want {
                    out.insert(id, String::from_utf8_lossy(&key).into_owned());
                    next.next();
                }
            }
            if next.peek().is_some() {
                return Err(IndexError::corrupt_block(
                    KIND.as_str(),
                    tag_key_id,
                    "rank offsets point past the last tag value",
                ));
            }
            *ids -= found;
        }
        Ok(())
    }
}

/// K-way merge of the per-table prefix scans; ties go to the earliest table.
fn walk_merged<F>(metas: &[TagKeyMeta<'_>], prefix: &[u8], mut f: F)
where
    F: FnMut(&[u8], u32) -> bool,
{
    let mut iters: Vec<_> = metas.iter().map(|m| m.prefix_iter(prefix)).collect();
    let mut heads: Vec<Option<(Vec<u8>, u32)>> = iters.iter_mut().map(Iterator::next).collect();
    loop {
        let next = (0..heads.len())
            .filter(|&i| heads[i].is_some())
            .min_by(|&a, &b| heads[a].as_ref().map(|h| &h.0).cmp(&heads[b].as_ref().map(|h| &h.0)));
        let Some(i) = next else {
            return;
        };
        let Some((key, id)) = heads[i].take() else {
            return;
        };
        for (j, head) in heads.iter_mut().enumerate() {
            if head.as_ref().is_some_and(|(k, _)| *k == key) {
                *head = iters[j].next();
            }
        }
        heads[i] = iters[i].next();
        if !f(&key, id) {
            return;
        }
    }
}
