//! Footer handling shared by the tag index blocks.
//!
//! Every block ends with `N` little-endian `u32` position fields followed by a CRC32 of all
//! bytes before the CRC itself.

use crate::config::IndexConfig;
use crate::encoding::stream::{crc32, u32_at, write_u32};
use crate::error::IndexError;
use crate::kv::StreamWriter;
use crate::telemetry::{index_metrics, BlockKind, IndexEvent};

/// Reads the `N` position fields of a block footer, checking the CRC when `verify` is set.
pub(crate) fn read_footer<const N: usize>(
    buf: &[u8],
    kind: BlockKind,
    tag_key_id: u32,
    verify: bool,
) -> Result<[u32; N], IndexError> {
    let footer_len = 4 * (N + 1);
    if buf.len() < footer_len {
        return Err(IndexError::corrupt_block(
            kind.as_str(),
            tag_key_id,
            format!("block of {} bytes is shorter than its footer", buf.len()),
        ));
    }
    let crc_at = buf.len() - 4;
    let footer_at = buf.len() - footer_len;
    if verify {
        let stored = u32_at(buf, crc_at).unwrap_or_default();
        let actual = crc32(&buf[..crc_at]);
        if stored != actual {
            return Err(IndexError::corrupt_block(
                kind.as_str(),
                tag_key_id,
                format!("crc32 mismatch: stored {:#010x}, computed {:#010x}", stored, actual),
            ));
        }
    }
    let mut fields = [0u32; N];
    for (i, f) in fields.iter_mut().enumerate() {
        *f = u32_at(buf, footer_at + 4 * i).unwrap_or_default();
    }
    Ok(fields)
}

/// Offset of the first footer byte for a block with `N` position fields.
#[inline]
pub(crate) fn footer_start<const N: usize>(buf: &[u8]) -> usize {
    buf.len().saturating_sub(4 * (N + 1))
}

/// Checks that `positions` never decrease, then that the last does not exceed `limit`.
pub(crate) fn check_positions(
    positions: &[u32],
    limit: usize,
    kind: BlockKind,
    tag_key_id: u32,
) -> Result<(), IndexError> {
    let ordered = positions.windows(2).all(|w| w[0] <= w[1]);
    let in_range = positions.last().map_or(true, |&p| p as usize <= limit);
    if !ordered || !in_range {
        return Err(IndexError::corrupt_block(
            kind.as_str(),
            tag_key_id,
            format!("footer positions {:?} out of order (footer at {})", positions, limit),
        ));
    }
    Ok(())
}

/// Writes the position fields and the trailing CRC, then commits the record.
pub(crate) fn finish_block<W: StreamWriter>(
    writer: &mut W,
    positions: &[u32],
    kind: BlockKind,
    tag_key_id: u32,
    config: &IndexConfig,
) -> Result<u32, IndexError> {
    let mut footer = Vec::with_capacity(4 * positions.len());
    for &p in positions {
        write_u32(&mut footer, p);
    }
    writer.write(&footer)?;
    let crc = writer.crc32_checksum();
    writer.write(&crc.to_le_bytes())?;
    let size = writer.size();
    writer.commit()?;

    index_metrics::record_block_flushed(kind, size as u64);
    config.event_listener.on_event(IndexEvent::TagKeyFlushed {
        kind,
        tag_key_id,
        bytes: size,
    });
    Ok(size)
}

/// Reports corruption found while opening a block; other errors pass through silently.
pub(crate) fn report(config: &IndexConfig, kind: BlockKind, tag_key_id: u32, err: IndexError) -> IndexError {
    if let IndexError::Corruption { .. } = &err {
        index_metrics::record_corrupt_block(kind);
        config.event_listener.on_event(IndexEvent::CorruptBlock {
            kind,
            tag_key_id,
            error: err.to_string(),
        });
    }
    err
}

/// Runs a merge body, reporting its outcome to metrics and the event hook.
pub(crate) fn run_merge<F>(
    config: &IndexConfig,
    kind: BlockKind,
    tag_key_id: u32,
    inputs: usize,
    body: F,
) -> Result<(), IndexError>
where
    F: FnOnce() -> Result<(), IndexError>,
{
    let started = std::time::Instant::now();
    match body() {
        Ok(()) => {
            index_metrics::record_merge(kind, started.elapsed());
            config.event_listener.on_event(IndexEvent::MergeCompleted {
                kind,
                tag_key_id,
                inputs,
            });
            Ok(())
        }
        Err(e) => {
            config.event_listener.on_event(IndexEvent::MergeFailed {
                kind,
                tag_key_id,
                error: e.to_string(),
            });
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{MemoryStreamWriter, TableReader};

    fn block(payload: &[u8], positions: &[u32]) -> Vec<u8> {
        let mut w = MemoryStreamWriter::new();
        w.prepare(9);
        w.write(payload).unwrap();
        finish_block(&mut w, positions, BlockKind::TagForward, 9, &IndexConfig::default()).unwrap();
        w.into_table().get(9).unwrap().to_vec()
    }

    #[test]
    fn footer_round_trip() {
        let buf = block(b"payload", &[3, 7]);
        let fields: [u32; 2] = read_footer(&buf, BlockKind::TagForward, 9, true).unwrap();
        assert_eq!(fields, [3, 7]);
        assert_eq!(footer_start::<2>(&buf), 7);
        check_positions(&fields, 7, BlockKind::TagForward, 9).unwrap();
    }

    #[test]
    fn crc_and_length_are_checked() {
        let mut buf = block(b"payload", &[3, 7]);
        buf[0] ^= 1;
        assert!(read_footer::<2>(&buf, BlockKind::TagForward, 9, true).is_err());
        // the same bytes pass when verification is off
        assert!(read_footer::<2>(&buf, BlockKind::TagForward, 9, false).is_ok());
        assert!(read_footer::<2>(&buf[..11], BlockKind::TagForward, 9, false).is_err());
    }

    #[test]
    fn unordered_positions_are_corruption() {
        assert!(check_positions(&[5, 3], 10, BlockKind::TagInverted, 1).is_err());
        assert!(check_positions(&[3, 11], 10, BlockKind::TagInverted, 1).is_err());
        assert!(check_positions(&[0, 0, 10], 10, BlockKind::TagInverted, 1).is_ok());
    }
}
