use super::{TagKeyMeta, TagKeyMetaFlusher, KIND};
use crate::bitmap::{default_codec, BitmapCodec};
use crate::block::{report, run_merge};
use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::kv::{Merger, StreamWriter};

use std::sync::Arc;

/// Merges the metadata blocks of one tag key: every value of every input is re-flushed,
/// the first id seen for a value wins and the highest sequence is kept.
#[derive(Debug)]
pub struct TagKeyMetaMerger<W: StreamWriter> {
    flusher: TagKeyMetaFlusher<W>,
    codec: Arc<dyn BitmapCodec>,
    config: IndexConfig,
}

impl<W: StreamWriter> TagKeyMetaMerger<W> {
    pub fn new(writer: W, config: &IndexConfig) -> Self {
        Self {
            flusher: TagKeyMetaFlusher::new(writer, config),
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
}

impl<W: StreamWriter> Merger for TagKeyMetaMerger<W> {
    fn merge(&mut self, tag_key_id: u32, values: &[&[u8]]) -> Result<(), IndexError> {
        let (flusher, codec, config) = (&mut self.flusher, &self.codec, &self.config);
        run_merge(config, KIND, tag_key_id, values.len(), || {
            flusher.reset();
            let mut seq = 0u32;
            for buf in values {
                let meta = TagKeyMeta::new(tag_key_id, buf, codec.as_ref(), config.verify_checksums)
                    .map_err(|e| report(config, KIND, tag_key_id, e));
                let meta = match meta {
                    Ok(m) => m,
                    Err(e) => {
                        flusher.reset();
                        return Err(e);
                    }
                };
                seq = seq.max(meta.tag_value_seq());
                for (value, id) in meta.prefix_iter(&[]) {
                    flusher.flush_tag_value(value, id);
                }
            }
            flusher.flush_tag_key_id(tag_key_id, seq)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{MemoryStreamWriter, TableReader};
    use crate::tagkeymeta::TagKeyMetaReader;
    use crate::telemetry::test_support::RecordingListener;
    use crate::telemetry::IndexEvent;

    fn block(values: &[(&str, u32)], seq: u32) -> Vec<u8> {
        let mut f = TagKeyMetaFlusher::new(MemoryStreamWriter::new(), &IndexConfig::default());
        for (v, id) in values {
            f.flush_tag_value(v, *id);
        }
        f.flush_tag_key_id(1, seq).unwrap();
        f.into_inner().into_table().get(1).unwrap().to_vec()
    }

    #[test]
    fn overlapping_generations_merge_into_valid_block() {
        let a = block(&[("host-a", 1), ("host-b", 2)], 2);
        let b = block(&[("host-b", 2), ("host-c", 3)], 3);
        let listener = Arc::new(RecordingListener::default());
        let config = IndexConfig::default().with_event_listener(listener.clone());
        let mut m = TagKeyMetaMerger::new(MemoryStreamWriter::new(), &config);
        m.merge(1, &[&a, &b]).unwrap();

        let table = m.into_inner().into_table();
        let reader = TagKeyMetaReader::new(vec![&table], &config);
        assert_eq!(reader.get_tag_value_seq(1).unwrap(), 3);
        assert_eq!(reader.suggest_tag_values(1, "", 10).unwrap(), vec!["host-a", "host-b", "host-c"]);
        assert_eq!(reader.get_tag_value_id(1, "host-c").unwrap(), 3);
        assert!(listener
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, IndexEvent::MergeCompleted { inputs: 2, .. })));
    }

    #[test]
    fn corrupt_input_aborts_without_output() {
        let a = block(&[("x", 1)], 1);
        let mut b = block(&[("y", 2)], 2);
        let n = b.len();
        b.truncate(n - 3);
        let listener = Arc::new(RecordingListener::default());
        let config = IndexConfig::default().with_event_listener(listener.clone());
        let mut m = TagKeyMetaMerger::new(MemoryStreamWriter::new(), &config);
        assert!(m.merge(1, &[&a, &b]).is_err());
        assert!(m.into_inner().into_table().get(1).is_none());
        assert!(listener
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, IndexEvent::MergeFailed { tag_key_id: 1, .. })));
    }
}
