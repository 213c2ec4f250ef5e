//! Bit-level and numeric codecs used by the trie and the tag indexes.

pub mod bit;
pub mod delta;
pub mod fixed_offset;
pub mod stream;
pub mod tsd;
pub mod xor;

pub use bit::{BitReader, BitWriter};
pub use delta::{DeltaBitPackingDecoder, DeltaBitPackingEncoder};
pub use fixed_offset::{FixedOffsetDecoder, FixedOffsetEncoder};
pub use stream::crc32;
pub use tsd::{TsdDecoder, TsdEncoder};
pub use xor::{FloatDecoder, FloatEncoder, XorDecoder, XorEncoder};
