//! Per-field time-series block: a presence bit per time slot interleaved with XOR-compressed
//! values in a single bit stream.
//!
//! Layout: `[start slot u16][end slot u16][bit stream]`. An encoder without slots produces
//! an empty buffer.

use super::stream::write_u16;
use super::xor::{XorDecoder, XorEncoder};
use crate::error::IndexError;

const HEADER_LEN: usize = 4;

#[derive(Debug)]
pub struct TsdEncoder {
    start_slot: u16,
    slots: u32,
    values: XorEncoder<Vec<u8>>,
}

impl TsdEncoder {
    pub fn new(start_slot: u16) -> Self {
        Self {
            start_slot,
            slots: 0,
            values: XorEncoder::new(Vec::new()),
        }
    }

    pub fn reset(&mut self, start_slot: u16) {
        self.start_slot = start_slot;
        self.slots = 0;
        self.values.reset(Vec::new());
    }

    /// Marks whether the next slot carries a value.
    pub fn append_time(&mut self, has_value: bool) -> Result<(), IndexError> {
        if self.start_slot as u32 + self.slots > u16::MAX as u32 {
            return Err(IndexError::InvalidInput(
                "time slot beyond u16 range".to_string(),
            ));
        }
        self.slots += 1;
        self.values.bit_writer().write_bit(has_value)
    }

    /// Appends the value for the slot most recently marked present.
    pub fn append_value(&mut self, value: u64) -> Result<(), IndexError> {
        self.values.write(value)
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, IndexError> {
        if self.slots == 0 {
            self.reset(self.start_slot);
            return Ok(Vec::new());
        }
        let end_slot = (self.start_slot as u32 + self.slots - 1) as u16;
        let stream = self.values.bytes()?;
        let mut out = Vec::with_capacity(HEADER_LEN + stream.len());
        write_u16(&mut out, self.start_slot);
        write_u16(&mut out, end_slot);
        out.extend_from_slice(&stream);
        self.reset(self.start_slot);
        Ok(out)
    }
}

/// Returns the `[start, end]` slot range of an encoded block.
pub fn slot_range(buf: &[u8]) -> Result<(u16, u16), IndexError> {
    match buf.get(..HEADER_LEN) {
        Some(&[a, b, c, d]) => {
            let start = u16::from_le_bytes([a, b]);
            let end = u16::from_le_bytes([c, d]);
            if start > end {
                return Err(IndexError::corruption("TSD start slot after end slot"));
            }
            Ok((start, end))
        }
        _ => Err(IndexError::corruption("TSD block shorter than its header")),
    }
}

/// Walks the slots of an encoded block. Errors are kept until [`TsdDecoder::error`].
#[derive(Debug, Clone)]
pub struct TsdDecoder<'a> {
    start_slot: u16,
    end_slot: u16,
    next_slot: u32,
    slot: u16,
    has_value: bool,
    value: u64,
    values: XorDecoder<'a>,
    err: Option<String>,
    eof: bool,
}

impl<'a> TsdDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        let mut d = Self {
            start_slot: 0,
            end_slot: 0,
            next_slot: 0,
            slot: 0,
            has_value: false,
            value: 0,
            values: XorDecoder::new(&[]),
            err: None,
            eof: true,
        };
        d.reset(buf);
        d
    }

    pub fn reset(&mut self, buf: &'a [u8]) {
        self.err = None;
        self.has_value = false;
        self.value = 0;
        if buf.is_empty() {
            self.eof = true;
            self.values.reset(&[]);
            return;
        }
        match slot_range(buf) {
            Ok((start, end)) => {
                self.start_slot = start;
                self.end_slot = end;
                self.next_slot = start as u32;
                self.values.reset(&buf[HEADER_LEN..]);
                self.eof = false;
            }
            Err(e) => {
                self.err = Some(e.to_string());
                self.eof = true;
            }
        }
    }

    pub fn start_slot(&self) -> u16 {
        self.start_slot
    }

    pub fn end_slot(&self) -> u16 {
        self.end_slot
    }

    /// Advances to the next slot; false at the end or after an error.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if self.eof || self.err.is_some() || self.next_slot > self.end_slot as u32 {
            self.eof = true;
            return false;
        }
        self.slot = self.next_slot as u16;
        self.next_slot += 1;
        let present = match self.values.bit_reader().read_bit() {
            Ok(b) => b,
            Err(e) => {
                self.err = Some(e.to_string());
                return false;
            }
        };
        self.has_value = present;
        if present {
            match self.values.read() {
                Ok(v) => self.value = v,
                Err(e) => {
                    self.err = Some(e.to_string());
                    return false;
                }
            }
        }
        true
    }

    pub fn slot(&self) -> u16 {
        self.slot
    }

    pub fn has_value(&self) -> bool {
        self.has_value
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// Returns the first error met while decoding.
    pub fn error(&self) -> Result<(), IndexError> {
        match &self.err {
            None => Ok(()),
            Some(e) => Err(IndexError::corruption(format!("TSD decode failed: {}", e))),
        }
    }
}
