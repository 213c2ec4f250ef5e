#![doc = include_str!("../README.md")]
// Declare modules
pub mod bitmap;
pub(crate) mod block;
pub mod config;
pub mod encoding;
pub mod error;
pub mod kv;
pub mod tagindex;
pub mod tagkeymeta;
pub mod telemetry;
pub mod trie;

/// Roaring bitmap (de)serialization strategy used by every tag index block.
pub use crate::bitmap::{BitmapCodec, PortableBitmapCodec};
/// Configuration shared by flushers, readers and mergers.
pub use crate::config::IndexConfig;
/// Error type for index operations.
pub use crate::error::IndexError;
/// Storage seams: blocks are read from tables and streamed into writers.
pub use crate::kv::{merge_tables, MemoryStreamWriter, MemoryTable, Merger, StreamWriter, TableReader};
/// Tag forward and inverted indexes.
pub use crate::tagindex::{
    Grouping, GroupingScanner, SeriesTagValues, TagForwardFlusher, TagForwardMerger, TagForwardReader,
    TagInvertedFlusher, TagInvertedMerger, TagInvertedReader,
};
/// Tag value dictionary of a tag key.
pub use crate::tagkeymeta::{TagFilter, TagKeyMetaFlusher, TagKeyMetaMerger, TagKeyMetaReader};
/// Structured event hook for observability.
pub use crate::telemetry::{BlockKind, IndexEvent, IndexEventListener};
/// Succinct LOUDS-Sparse trie.
pub use crate::trie::{Builder as TrieBuilder, SuccinctTrie};
