//! Gorilla-style XOR compression for 64-bit integers and floats.
//!
//! Stream layout per value after the first (stored raw in 64 bits):
//! - `0`: same as the previous value
//! - `1 1 <bits>`: meaningful bits fit the previous leading/trailing window, reuse it
//! - `1 0 <leading:6> <block size:6> <bits>`: new window (a block size of 64 is stored as 0)

use super::bit::{BitReader, BitWriter};
use crate::error::IndexError;

use std::io::Write;

#[derive(Debug)]
pub struct XorEncoder<W: Write> {
    bw: BitWriter<W>,
    prev: u64,
    leading: u32,
    trailing: u32,
    first: bool,
}

impl<W: Write> XorEncoder<W> {
    pub fn new(w: W) -> Self {
        Self {
            bw: BitWriter::new(w),
            prev: 0,
            leading: u32::MAX,
            trailing: 0,
            first: true,
        }
    }

    /// Rebinds to a new sink and forgets all compression state.
    pub fn reset(&mut self, w: W) {
        self.bw.reset(w);
        self.prev = 0;
        self.leading = u32::MAX;
        self.trailing = 0;
        self.first = true;
    }

    pub fn write(&mut self, val: u64) -> Result<(), IndexError> {
        if self.first {
            self.first = false;
            self.prev = val;
            return self.bw.write_bits(val, 64);
        }
        let delta = val ^ self.prev;
        self.prev = val;
        if delta == 0 {
            return self.bw.write_bit(false);
        }
        self.bw.write_bit(true)?;

        let leading = delta.leading_zeros();
        let trailing = delta.trailing_zeros();
        if self.leading != u32::MAX && leading >= self.leading && trailing >= self.trailing {
            self.bw.write_bit(true)?;
            let block_size = 64 - self.leading - self.trailing;
            self.bw.write_bits(delta >> self.trailing, block_size)
        } else {
            self.leading = leading;
            self.trailing = trailing;
            self.bw.write_bit(false)?;
            self.bw.write_bits(leading as u64, 6)?;
            let block_size = 64 - leading - trailing;
            // 64 does not fit in 6 bits and is stored as 0
            self.bw.write_bits((block_size & 0x3F) as u64, 6)?;
            self.bw.write_bits(delta >> trailing, block_size)
        }
    }

    /// Emits the pending partial byte. Call once, after the last value.
    pub fn flush(&mut self) -> Result<(), IndexError> {
        self.bw.flush()
    }

    /// Shared bit stream, so other codecs can interleave their own bits.
    pub fn bit_writer(&mut self) -> &mut BitWriter<W> {
        &mut self.bw
    }

    pub fn into_inner(self) -> W {
        self.bw.into_inner()
    }
}

impl XorEncoder<Vec<u8>> {
    /// Flushes and returns the encoded bytes, leaving the encoder reset for reuse.
    pub fn bytes(&mut self) -> Result<Vec<u8>, IndexError> {
        self.flush()?;
        let out = std::mem::take(self.bw.get_mut());
        self.reset(Vec::new());
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct XorDecoder<'a> {
    br: BitReader<'a>,
    prev: u64,
    leading: u32,
    trailing: u32,
    first: bool,
}

impl<'a> XorDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            br: BitReader::new(buf),
            prev: 0,
            leading: 0,
            trailing: 0,
            first: true,
        }
    }

    pub fn reset(&mut self, buf: &'a [u8]) {
        self.br.reset(buf);
        self.prev = 0;
        self.leading = 0;
        self.trailing = 0;
        self.first = true;
    }

    /// Decodes the next value.
    pub fn read(&mut self) -> Result<u64, IndexError> {
        if self.first {
            self.first = false;
            self.prev = self.br.read_bits(64)?;
            return Ok(self.prev);
        }
        if !self.br.read_bit()? {
            return Ok(self.prev);
        }
        if !self.br.read_bit()? {
            self.leading = self.br.read_bits(6)? as u32;
            let mut block_size = self.br.read_bits(6)? as u32;
            if block_size == 0 {
                block_size = 64;
            }
            if self.leading + block_size > 64 {
                return Err(IndexError::corruption("invalid XOR bit window"));
            }
            self.trailing = 64 - self.leading - block_size;
        }
        let block_size = 64 - self.leading - self.trailing;
        let bits = self.br.read_bits(block_size)?;
        self.prev ^= bits << self.trailing;
        Ok(self.prev)
    }

    pub fn bit_reader(&mut self) -> &mut BitReader<'a> {
        &mut self.br
    }
}

/// Decodes exactly `count` values from an XOR stream.
pub fn decode_all(buf: &[u8], count: usize) -> Result<Vec<u64>, IndexError> {
    let mut d = XorDecoder::new(buf);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(d.read()?);
    }
    Ok(out)
}

/// XOR encoder over `f64` bit patterns. NaN is rejected.
#[derive(Debug)]
pub struct FloatEncoder<W: Write> {
    inner: XorEncoder<W>,
}

impl<W: Write> FloatEncoder<W> {
    pub fn new(w: W) -> Self {
        Self {
            inner: XorEncoder::new(w),
        }
    }

    pub fn write(&mut self, v: f64) -> Result<(), IndexError> {
        if v.is_nan() {
            return Err(IndexError::NanValue);
        }
        self.inner.write(v.to_bits())
    }

    pub fn flush(&mut self) -> Result<(), IndexError> {
        self.inner.flush()
    }

    pub fn reset(&mut self, w: W) {
        self.inner.reset(w);
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl FloatEncoder<Vec<u8>> {
    pub fn bytes(&mut self) -> Result<Vec<u8>, IndexError> {
        self.inner.bytes()
    }
}

#[derive(Debug, Clone)]
pub struct FloatDecoder<'a> {
    inner: XorDecoder<'a>,
}

impl<'a> FloatDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            inner: XorDecoder::new(buf),
        }
    }

    pub fn read(&mut self) -> Result<f64, IndexError> {
        self.inner.read().map(f64::from_bits)
    }
}
