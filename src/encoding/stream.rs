//! Little-endian byte helpers, varints and a slice reader with a sticky error.

use crate::error::IndexError;

use crc32fast::Hasher as Crc32;

pub fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}
pub fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
pub fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn write_var_u64(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

pub fn write_var_u32(buf: &mut Vec<u8>, v: u32) {
    write_var_u64(buf, v as u64);
}

/// Zigzag + varint, so small negative numbers stay short.
pub fn write_var_i64(buf: &mut Vec<u8>, v: i64) {
    write_var_u64(buf, zigzag_encode(v));
}

#[inline]
pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

#[inline]
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(bytes);
    h.finalize()
}

/// Reads a little-endian `u32` at `off`, `None` when it does not fit.
#[inline]
pub fn u32_at(bytes: &[u8], off: usize) -> Option<u32> {
    let end = off.checked_add(4)?;
    let b = bytes.get(off..end)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Cursor over a byte slice.
///
/// The first failure is kept in `err` and every later read returns a zero value, so a
/// long decode loop can check [`ByteReader::error`] once at the end.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    err: Option<&'static str>,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            err: None,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn fail(&mut self, what: &'static str) {
        if self.err.is_none() {
            self.err = Some(what);
        }
        self.pos = self.buf.len();
    }

    pub fn read_slice(&mut self, n: usize) -> &'a [u8] {
        if self.err.is_some() {
            return &[];
        }
        match self.pos.checked_add(n) {
            Some(end) if end <= self.buf.len() => {
                let s = &self.buf[self.pos..end];
                self.pos = end;
                s
            }
            _ => {
                self.fail("truncated byte stream");
                &[]
            }
        }
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read_slice(1).first().copied().unwrap_or(0)
    }

    pub fn read_u16(&mut self) -> u16 {
        match self.read_slice(2) {
            [a, b] => u16::from_le_bytes([*a, *b]),
            _ => 0,
        }
    }

    pub fn read_u32(&mut self) -> u32 {
        match self.read_slice(4) {
            [a, b, c, d] => u32::from_le_bytes([*a, *b, *c, *d]),
            _ => 0,
        }
    }

    pub fn read_u64(&mut self) -> u64 {
        let s = self.read_slice(8);
        if s.len() != 8 {
            return 0;
        }
        let mut b = [0u8; 8];
        b.copy_from_slice(s);
        u64::from_le_bytes(b)
    }

    pub fn read_var_u64(&mut self) -> u64 {
        let mut out: u64 = 0;
        let mut shift: u32 = 0;
        for _ in 0..10 {
            if self.err.is_some() {
                return 0;
            }
            let byte = self.read_u8();
            if self.err.is_some() {
                return 0;
            }
            out |= ((byte & 0x7F) as u64) << shift;
            if (byte & 0x80) == 0 {
                return out;
            }
            shift = shift.saturating_add(7);
        }
        self.fail("varint too long");
        0
    }

    pub fn read_var_u32(&mut self) -> u32 {
        let v = self.read_var_u64();
        if v > u32::MAX as u64 {
            self.fail("varint does not fit in u32");
            return 0;
        }
        v as u32
    }

    pub fn read_var_i64(&mut self) -> i64 {
        zigzag_decode(self.read_var_u64())
    }

    /// Skips padding so the position becomes a multiple of `align`.
    pub fn align_to(&mut self, align: usize) {
        let pad = padding(self.pos, align);
        self.read_slice(pad);
    }

    /// Returns the accumulated error, if any read failed.
    pub fn error(&self) -> Result<(), IndexError> {
        match self.err {
            None => Ok(()),
            Some(what) => Err(IndexError::corruption(what)),
        }
    }
}

/// Number of bytes needed to pad `len` up to a multiple of `align`.
#[inline]
pub fn padding(len: usize, align: usize) -> usize {
    (align - len % align) % align
}

pub fn write_padding(buf: &mut Vec<u8>, align: usize) {
    let pad = padding(buf.len(), align);
    buf.resize(buf.len() + pad, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_maps_small_negatives_to_small_codes() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        for v in [i64::MIN, -300, -1, 0, 1, 300, i64::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }

    #[test]
    fn reader_accumulates_first_error() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 7);
        write_var_u32(&mut buf, 300);
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_u32(), 7);
        assert_eq!(r.read_var_u32(), 300);
        assert!(r.error().is_ok());
        assert_eq!(r.read_u64(), 0);
        assert_eq!(r.read_u8(), 0);
        assert!(matches!(r.error(), Err(IndexError::Corruption { .. })));
    }

    #[test]
    fn truncated_varint_is_an_error() {
        let mut r = ByteReader::new(&[0x80, 0x80]);
        assert_eq!(r.read_var_u64(), 0);
        assert!(r.error().is_err());
    }

    #[test]
    fn padding_to_eight() {
        assert_eq!(padding(0, 8), 0);
        assert_eq!(padding(1, 8), 7);
        assert_eq!(padding(8, 8), 0);
        let mut buf = vec![1u8; 5];
        write_padding(&mut buf, 8);
        assert_eq!(buf.len(), 8);
        let mut r = ByteReader::new(&buf);
        r.read_slice(5);
        r.align_to(8);
        assert_eq!(r.position(), 8);
        assert!(r.error().is_ok());
    }
}
