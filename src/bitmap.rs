//! Roaring bitmap serialization and per-container helpers.
//!
//! A roaring bitmap groups its values by the high 16 bits ("high key"); the index blocks
//! store one payload per such container, so most readers work container by container.

use crate::error::IndexError;

use roaring::RoaringBitmap;

use std::fmt::Debug;
use std::sync::Arc;

/// Strategy for turning bitmaps into bytes and back. Passed to flushers and readers.
pub trait BitmapCodec: Debug + Send + Sync {
    fn encode(&self, bitmap: &RoaringBitmap, out: &mut Vec<u8>) -> Result<(), IndexError>;

    /// Decodes exactly one bitmap occupying all of `buf`.
    fn decode(&self, buf: &[u8]) -> Result<RoaringBitmap, IndexError>;
}

/// The portable roaring serialization format.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortableBitmapCodec;

impl BitmapCodec for PortableBitmapCodec {
    fn encode(&self, bitmap: &RoaringBitmap, out: &mut Vec<u8>) -> Result<(), IndexError> {
        out.reserve(bitmap.serialized_size());
        bitmap.serialize_into(out)?;
        Ok(())
    }

    fn decode(&self, buf: &[u8]) -> Result<RoaringBitmap, IndexError> {
        let mut r = buf;
        let bm = RoaringBitmap::deserialize_from(&mut r)
            .map_err(|e| IndexError::corruption(format!("bad bitmap: {}", e)))?;
        if !r.is_empty() {
            return Err(IndexError::corruption(format!(
                "{} trailing bytes after bitmap",
                r.len()
            )));
        }
        Ok(bm)
    }
}

pub fn default_codec() -> Arc<dyn BitmapCodec> {
    Arc::new(PortableBitmapCodec)
}

#[inline]
pub fn high_bits(v: u32) -> u16 {
    (v >> 16) as u16
}

#[inline]
pub fn low_bits(v: u32) -> u16 {
    v as u16
}

#[inline]
fn container_bounds(high_key: u16) -> (u32, u32) {
    let lo = (high_key as u32) << 16;
    (lo, lo | 0xFFFF)
}

/// High keys of all containers, ascending.
pub fn high_keys(bm: &RoaringBitmap) -> Vec<u16> {
    let mut keys = Vec::new();
    let mut next = bm.min();
    while let Some(v) = next {
        let hk = high_bits(v);
        keys.push(hk);
        if hk == u16::MAX {
            break;
        }
        let (_, hi) = container_bounds(hk);
        next = bm.select(bm.rank(hi) as u32);
    }
    keys
}

/// Number of values in the container of `high_key`.
pub fn container_len(bm: &RoaringBitmap, high_key: u16) -> u64 {
    let (lo, hi) = container_bounds(high_key);
    let below = if lo == 0 { 0 } else { bm.rank(lo - 1) };
    bm.rank(hi) - below
}

/// The values of one container as a bitmap of full 32-bit values.
pub fn container_of(bm: &RoaringBitmap, high_key: u16) -> RoaringBitmap {
    let (lo, hi) = container_bounds(high_key);
    let mut mask = RoaringBitmap::new();
    mask.insert_range(lo..=hi);
    &mask & bm
}

/// 0-based position of `value` inside its container, `None` when absent.
pub fn position_in_container(bm: &RoaringBitmap, value: u32) -> Option<usize> {
    if !bm.contains(value) {
        return None;
    }
    let (lo, _) = container_bounds(high_bits(value));
    let below = if lo == 0 { 0 } else { bm.rank(lo - 1) };
    Some((bm.rank(value) - below - 1) as usize)
}

/// Bitmaps grouped by container: yields `(high_key, container values)` ascending.
pub fn containers(bm: &RoaringBitmap) -> impl Iterator<Item = (u16, Vec<u32>)> + '_ {
    let mut iter = bm.iter().peekable();
    std::iter::from_fn(move || {
        let first = iter.next()?;
        let hk = high_bits(first);
        let mut values = vec![first];
        while let Some(&v) = iter.peek() {
            if high_bits(v) != hk {
                break;
            }
            values.push(v);
            iter.next();
        }
        Some((hk, values))
    })
}
