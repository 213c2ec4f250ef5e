//! MSB-first bit writer and reader.

use crate::error::IndexError;

use std::io::Write;

/// Writes single bits and bit runs into a byte sink, most significant bit first.
///
/// `count` is the number of free bits left in the pending byte. [`BitWriter::flush`] must be
/// called once at the end to emit a partially filled byte.
#[derive(Debug)]
pub struct BitWriter<W: Write> {
    w: W,
    b: u8,
    count: u8,
}

impl<W: Write> BitWriter<W> {
    pub fn new(w: W) -> Self {
        Self { w, b: 0, count: 8 }
    }

    /// Rebinds the writer to a new sink, dropping any pending bits.
    pub fn reset(&mut self, w: W) {
        self.w = w;
        self.b = 0;
        self.count = 8;
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<(), IndexError> {
        if bit {
            self.b |= 1 << (self.count - 1);
        }
        self.count -= 1;
        if self.count == 0 {
            self.w.write_all(&[self.b])?;
            self.b = 0;
            self.count = 8;
        }
        Ok(())
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<(), IndexError> {
        // fill the pending byte with the high bits of `byte`
        self.b |= byte.checked_shr(8 - self.count as u32).unwrap_or(0);
        self.w.write_all(&[self.b])?;
        // the low bits start the next pending byte
        self.b = byte.checked_shl(self.count as u32).unwrap_or(0);
        Ok(())
    }

    /// Writes the low `nbits` bits of `u`, high bit first.
    pub fn write_bits(&mut self, u: u64, nbits: u32) -> Result<(), IndexError> {
        debug_assert!(nbits <= 64);
        if nbits == 0 {
            return Ok(());
        }
        let mut u = u << (64 - nbits);
        let mut nbits = nbits;
        while nbits >= 8 {
            let byte = (u >> 56) as u8;
            self.write_byte(byte)?;
            u <<= 8;
            nbits -= 8;
        }
        while nbits > 0 {
            self.write_bit((u >> 63) == 1)?;
            u <<= 1;
            nbits -= 1;
        }
        Ok(())
    }

    /// Pads the pending byte with zero bits and writes it out.
    pub fn flush(&mut self) -> Result<(), IndexError> {
        while self.count != 8 {
            self.write_bit(false)?;
        }
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.w
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.w
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

/// Reads bits from a byte slice, mirroring [`BitWriter`].
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    buf: &'a [u8],
    pos: usize,
    b: u8,
    count: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            b: 0,
            count: 0,
        }
    }

    pub fn reset(&mut self, buf: &'a [u8]) {
        self.buf = buf;
        self.pos = 0;
        self.b = 0;
        self.count = 0;
    }

    fn load(&mut self) -> Result<(), IndexError> {
        let b = *self.buf.get(self.pos).ok_or(IndexError::UnexpectedEof)?;
        self.pos += 1;
        self.b = b;
        self.count = 8;
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool, IndexError> {
        if self.count == 0 {
            self.load()?;
        }
        self.count -= 1;
        let bit = (self.b >> 7) == 1;
        self.b <<= 1;
        Ok(bit)
    }

    pub fn read_byte(&mut self) -> Result<u8, IndexError> {
        if self.count == 0 {
            self.load()?;
            self.count = 0;
            return Ok(self.b);
        }
        let high = self.b;
        let next = *self.buf.get(self.pos).ok_or(IndexError::UnexpectedEof)?;
        self.pos += 1;
        let byte = high | (next >> self.count);
        self.b = next << (8 - self.count);
        Ok(byte)
    }

    pub fn read_bits(&mut self, nbits: u32) -> Result<u64, IndexError> {
        debug_assert!(nbits <= 64);
        let mut u: u64 = 0;
        let mut nbits = nbits;
        while nbits >= 8 {
            u = (u << 8) | self.read_byte()? as u64;
            nbits -= 8;
        }
        while nbits > 0 {
            u = (u << 1) | self.read_bit()? as u64;
            nbits -= 1;
        }
        Ok(u)
    }

    /// Bytes consumed from the underlying slice, counting a partially read byte.
    pub fn consumed(&self) -> usize {
        self.pos
    }
}
