//! Tag forward and inverted indexes.
//!
//! Both indexes store one block per tag key:
//!
//! * the forward index maps every series to the tag value ids it carries for the key,
//!   grouped by roaring container of the series id;
//! * the inverted index maps every tag value id to the bitmap of series carrying it,
//!   bucketed by the high 16 bits of the tag value id.
//!
//! Blocks are written once by a flusher, opened per query by a reader over the raw bytes
//! of every table holding the key, and combined by a merger during compaction.

mod forward_flusher;
mod forward_merger;
mod forward_reader;
pub mod grouping;
mod inverted_flusher;
mod inverted_merger;
mod inverted_reader;

pub use forward_flusher::TagForwardFlusher;
pub use forward_merger::TagForwardMerger;
pub use forward_reader::{ForwardBlock, ForwardScanner, TagForwardReader};
pub use grouping::{Grouping, GroupingScanner, SeriesTagValues};
pub use inverted_flusher::TagInvertedFlusher;
pub use inverted_merger::TagInvertedMerger;
pub use inverted_reader::{InvertedBlock, InvertedScanner, TagInvertedReader};

use crate::telemetry::BlockKind;

/// `[seriesIDAt][offsetsAt]`
pub(crate) const FORWARD_FOOTER_FIELDS: usize = 2;
pub(crate) const FORWARD_KIND: BlockKind = BlockKind::TagForward;

/// `[tagValueBitmapAt][offsetsAt]`
pub(crate) const INVERTED_FOOTER_FIELDS: usize = 2;
pub(crate) const INVERTED_KIND: BlockKind = BlockKind::TagInverted;
