//! Packed boolean flags for the tight encoding.
//!
//! Tight marshalling records every presence/null/boolean flag of a command in
//! one bit stream that is written ahead of the field bytes. Bits are packed
//! LSB-first and the packed bytes are preceded by a byte count:
//!
//! ```text
//! count < 64   : [count u8] [bytes...]
//! count < 256  : [0xC0] [count u8] [bytes...]
//! otherwise    : [0x80] [count u16 BE] [bytes...]
//! ```
//!
//! The number of bits is never written. Readers must consume flags in exactly
//! the order the marshaller produced them.

use bytes::BufMut;

use super::DataInput;
use crate::error::{OpenWireError, Result};

/// Append-only bit buffer with a read cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BooleanStream {
    data: Vec<u8>,
    /// Number of bits written.
    bits: usize,
    /// Read cursor, in bits.
    read_pos: usize,
}

impl BooleanStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one flag.
    pub fn write_boolean(&mut self, value: bool) {
        let bit = self.bits % 8;
        if bit == 0 {
            self.data.push(0);
        }
        if value {
            let last = self.data.len() - 1;
            self.data[last] |= 1 << bit;
        }
        self.bits += 1;
    }

    /// Consume the next flag.
    pub fn read_boolean(&mut self) -> Result<bool> {
        let byte = self.data.get(self.read_pos / 8).ok_or_else(|| {
            OpenWireError::Protocol(format!(
                "Boolean stream exhausted after {} flags",
                self.read_pos
            ))
        })?;
        let value = (byte >> (self.read_pos % 8)) & 0x01 != 0;
        self.read_pos += 1;
        Ok(value)
    }

    /// Number of packed bytes, `ceil(bits / 8)`.
    #[inline]
    pub fn packed_len(&self) -> usize {
        self.data.len()
    }

    /// Number of flags written (for a stream built by `write_boolean`).
    #[inline]
    pub fn len(&self) -> usize {
        self.bits
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Bytes `marshal` will write, count prefix included.
    pub fn marshalled_size(&self) -> usize {
        let count = self.packed_len();
        let prefix = if count < 64 {
            1
        } else if count < 256 {
            2
        } else {
            3
        };
        prefix + count
    }

    /// Write the count prefix and packed bytes, then rewind for reading.
    pub fn marshal<B: BufMut + ?Sized>(&mut self, out: &mut B) -> Result<()> {
        let count = self.packed_len();
        if count < 64 {
            out.put_u8(count as u8);
        } else if count < 256 {
            out.put_u8(0xC0);
            out.put_u8(count as u8);
        } else if count <= u16::MAX as usize {
            out.put_u8(0x80);
            out.put_u16(count as u16);
        } else {
            return Err(OpenWireError::Protocol(format!(
                "Boolean stream of {count} bytes is too large"
            )));
        }
        out.put_slice(&self.data);
        self.rewind();
        Ok(())
    }

    /// Read a marshalled stream, positioned at its first flag.
    pub fn unmarshal(input: &mut DataInput<'_>) -> Result<Self> {
        let start = input.position();
        let result = Self::read_packed(input);
        if result.is_err() {
            input.set_position(start);
        }
        result
    }

    fn read_packed(input: &mut DataInput<'_>) -> Result<Self> {
        let count = match input.read_u8()? {
            0xC0 => input.read_u8()? as usize,
            0x80 => input.read_u16()? as usize,
            n => n as usize,
        };
        let data = input.read_bytes(count)?.to_vec();
        Ok(Self {
            bits: count * 8,
            data,
            read_pos: 0,
        })
    }

    /// Move the read cursor back to the first flag.
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    /// Drop all flags.
    pub fn clear(&mut self) {
        self.data.clear();
        self.bits = 0;
        self.read_pos = 0;
    }
}
