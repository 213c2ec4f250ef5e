use std::sync::Arc;
use std::time::Duration;

/// Structured, in-process event hook for observability.
///
/// This crate is a library; emitting logs directly (e.g. `println!`) is not acceptable for
/// production. Instead, callers can provide an implementation that forwards these events to
/// `tracing`, `log`, metrics, or custom sinks.
pub trait IndexEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: IndexEvent);
}

/// Kind of index block an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    TagKeyMeta,
    TagForward,
    TagInverted,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::TagKeyMeta => "tag_key_meta",
            BlockKind::TagForward => "tag_forward",
            BlockKind::TagInverted => "tag_inverted",
        }
    }
}

/// Structured events emitted by flushers, readers and mergers.
#[derive(Debug, Clone)]
pub enum IndexEvent {
    TagKeyFlushed {
        kind: BlockKind,
        tag_key_id: u32,
        bytes: u32,
    },
    MergeCompleted {
        kind: BlockKind,
        tag_key_id: u32,
        inputs: usize,
    },
    MergeFailed {
        kind: BlockKind,
        tag_key_id: u32,
        error: String,
    },
    CorruptBlock {
        kind: BlockKind,
        tag_key_id: u32,
        error: String,
    },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl IndexEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: IndexEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn IndexEventListener> {
    Arc::new(NoopEventListener)
}

/// Metrics instrumentation through the `metrics` facade.
///
/// Emitting is effectively a no-op until the embedding process installs a recorder.
pub mod index_metrics {
    use super::*;

    use ::metrics::{describe_counter, describe_histogram, Unit};

    // Counters are exposed as `<name>_total` by the Prometheus exporter.
    pub const BLOCKS_FLUSHED: &str = "ugnos_index_blocks_flushed";
    pub const BYTES_FLUSHED: &str = "ugnos_index_bytes_flushed";
    pub const MERGES: &str = "ugnos_index_merges";
    pub const MERGE_DURATION_SECONDS: &str = "ugnos_index_merge_duration_seconds";
    pub const CORRUPT_BLOCKS: &str = "ugnos_index_corrupt_blocks";

    #[inline]
    pub fn record_block_flushed(kind: BlockKind, bytes: u64) {
        ::metrics::counter!(BLOCKS_FLUSHED, "kind" => kind.as_str()).increment(1);
        if bytes > 0 {
            ::metrics::counter!(BYTES_FLUSHED, "kind" => kind.as_str()).increment(bytes);
        }
    }

    #[inline]
    pub fn record_merge(kind: BlockKind, duration: Duration) {
        ::metrics::counter!(MERGES, "kind" => kind.as_str()).increment(1);
        ::metrics::histogram!(MERGE_DURATION_SECONDS, "kind" => kind.as_str())
            .record(duration.as_secs_f64());
    }

    #[inline]
    pub fn record_corrupt_block(kind: BlockKind) {
        ::metrics::counter!(CORRUPT_BLOCKS, "kind" => kind.as_str()).increment(1);
    }

    /// Registers descriptions for all index metrics with the installed recorder.
    pub fn describe_all() {
        describe_counter!(
            BLOCKS_FLUSHED,
            Unit::Count,
            "Total number of tag index blocks committed by flushers."
        );
        describe_counter!(
            BYTES_FLUSHED,
            Unit::Bytes,
            "Total number of bytes written for committed tag index blocks."
        );
        describe_counter!(
            MERGES,
            Unit::Count,
            "Total number of tag index merges completed."
        );
        describe_counter!(
            CORRUPT_BLOCKS,
            Unit::Count,
            "Total number of index blocks rejected as corrupt on read."
        );
        describe_histogram!(
            MERGE_DURATION_SECONDS,
            Unit::Seconds,
            "Time to merge all input blocks of one tag key into a single block."
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_noop() {
        index_metrics::describe_all();
        index_metrics::record_block_flushed(BlockKind::TagInverted, 0);
        index_metrics::record_merge(BlockKind::TagForward, Duration::from_millis(3));
        index_metrics::record_corrupt_block(BlockKind::TagKeyMeta);
        noop_event_listener().on_event(IndexEvent::CorruptBlock {
            kind: BlockKind::TagKeyMeta,
            tag_key_id: 1,
            error: "x".to_string(),
        });
    }

    #[test]
    fn kind_labels_are_distinct() {
        let labels = [BlockKind::TagKeyMeta, BlockKind::TagForward, BlockKind::TagInverted].map(|k| k.as_str());
        assert_eq!(labels, ["tag_key_meta", "tag_forward", "tag_inverted"]);
    }
}
