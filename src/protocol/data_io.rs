//! Big-endian scalar and string I/O.
//!
//! Every multi-byte value on the wire is big-endian. Strings use the Java
//! "modified UTF-8" form: NUL is written as `C0 80` and code points above
//! U+FFFF are written as a surrogate pair of 3-byte sequences.
//!
//! - [`DataOutput`] is implemented for every `BufMut` (in practice `BytesMut`).
//! - [`DataInput`] is a cursor over a byte slice whose position can be saved
//!   and restored, which is how failed reads are rewound.

use bytes::BufMut;

use crate::error::{OpenWireError, Result};

/// Encoded length of `value` in modified UTF-8.
pub fn modified_utf8_len(value: &str) -> usize {
    value
        .chars()
        .map(|c| match c as u32 {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            0x0800..=0xFFFF => 3,
            _ => 6,
        })
        .sum()
}

/// True if every char is in `0x01..=0x7F`, i.e. the encoded form is the raw
/// string bytes.
pub fn is_modified_ascii(value: &str) -> bool {
    value.bytes().all(|b| (0x01..=0x7F).contains(&b))
}

fn put_modified_utf8<B: BufMut + ?Sized>(out: &mut B, value: &str) {
    if is_modified_ascii(value) {
        out.put_slice(value.as_bytes());
        return;
    }
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.put_u8(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.put_u8(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.put_u8(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.put_u8(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.put_u8(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.put_u8(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
}

/// Decode modified UTF-8 bytes into a `String`.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if bytes.iter().all(|b| (0x01..=0x7F).contains(b)) {
        // All ASCII, so valid UTF-8 as-is.
        return std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| OpenWireError::Protocol(format!("Invalid string data: {e}")));
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let a = bytes[i] as u16;
        if a & 0x80 == 0 {
            units.push(a);
            i += 1;
        } else if a & 0xE0 == 0xC0 {
            let b = continuation(bytes, i + 1)?;
            units.push(((a & 0x1F) << 6) | b);
            i += 2;
        } else if a & 0xF0 == 0xE0 {
            let b = continuation(bytes, i + 1)?;
            let c = continuation(bytes, i + 2)?;
            units.push(((a & 0x0F) << 12) | (b << 6) | c);
            i += 3;
        } else {
            return Err(OpenWireError::Protocol(format!(
                "Invalid modified UTF-8 lead byte 0x{a:02x} at offset {i}"
            )));
        }
    }

    String::from_utf16(&units)
        .map_err(|_| OpenWireError::Protocol("Invalid surrogate sequence in string data".into()))
}

fn continuation(bytes: &[u8], index: usize) -> Result<u16> {
    match bytes.get(index) {
        Some(&b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
        Some(&b) => Err(OpenWireError::Protocol(format!(
            "Invalid modified UTF-8 continuation byte 0x{b:02x} at offset {index}"
        ))),
        None => Err(OpenWireError::Protocol(
            "Truncated modified UTF-8 sequence".into(),
        )),
    }
}

/// Writer-side helpers layered on top of `BufMut`.
pub trait DataOutput: BufMut {
    #[inline]
    fn write_bool(&mut self, value: bool) {
        self.put_u8(value as u8);
    }

    /// Write a char as one UTF-16 code unit.
    fn write_char(&mut self, value: char) -> Result<()> {
        let code = value as u32;
        if code > 0xFFFF {
            return Err(OpenWireError::Protocol(format!(
                "Char U+{code:X} does not fit a single UTF-16 unit"
            )));
        }
        self.put_u16(code as u16);
        Ok(())
    }

    /// Write a u16 length followed by modified UTF-8.
    fn write_utf(&mut self, value: &str) -> Result<()> {
        let len = modified_utf8_len(value);
        if len > u16::MAX as usize {
            return Err(OpenWireError::Protocol(format!(
                "Encoded string length {len} exceeds 65535"
            )));
        }
        self.put_u16(len as u16);
        put_modified_utf8(self, value);
        Ok(())
    }

    /// Write an i32 length followed by modified UTF-8.
    fn write_utf32(&mut self, value: &str) -> Result<()> {
        let len = modified_utf8_len(value);
        let len = i32::try_from(len).map_err(|_| {
            OpenWireError::Protocol(format!("Encoded string length {len} exceeds i32::MAX"))
        })?;
        self.put_i32(len);
        put_modified_utf8(self, value);
        Ok(())
    }

    /// Write an i32 length followed by the raw bytes.
    fn write_sized_bytes(&mut self, value: &[u8]) -> Result<()> {
        let len = i32::try_from(value.len()).map_err(|_| {
            OpenWireError::Protocol(format!("Byte sequence length {} exceeds i32::MAX", value.len()))
        })?;
        self.put_i32(len);
        self.put_slice(value);
        Ok(())
    }
}

impl<B: BufMut + ?Sized> DataOutput for B {}

/// Read cursor over a byte slice.
///
/// Truncation is reported as [`OpenWireError::UnexpectedEof`]; on error the
/// position is left where the failed read started.
#[derive(Debug, Clone)]
pub struct DataInput<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! read_be {
    ($name:ident, $ty:ty) => {
        #[inline]
        pub fn $name(&mut self) -> Result<$ty> {
            const N: usize = std::mem::size_of::<$ty>();
            let bytes = self.take(N)?;
            let mut raw = [0u8; N];
            raw.copy_from_slice(bytes);
            Ok(<$ty>::from_be_bytes(raw))
        }
    };
}

impl<'a> DataInput<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the slice.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Restore a previously saved offset.
    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes not yet consumed.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(OpenWireError::eof(n, self.remaining()));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Peek the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    read_be!(read_u8, u8);
    read_be!(read_i8, i8);
    read_be!(read_u16, u16);
    read_be!(read_i16, i16);
    read_be!(read_i32, i32);
    read_be!(read_i64, i64);
    read_be!(read_f32, f32);
    read_be!(read_f64, f64);

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_char(&mut self) -> Result<char> {
        let start = self.pos;
        let unit = self.read_u16()?;
        char::from_u32(unit as u32).ok_or_else(|| {
            self.pos = start;
            OpenWireError::Protocol(format!("Char value 0x{unit:04x} is a lone surrogate"))
        })
    }

    /// Borrow the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Read an i32 length followed by that many bytes.
    pub fn read_sized_bytes(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let len = self.read_i32()?;
        let len = self.checked_len(start, len)?;
        self.take(len).inspect_err(|_| self.pos = start)
    }

    /// Read a u16 length followed by modified UTF-8.
    pub fn read_utf(&mut self) -> Result<String> {
        let start = self.pos;
        let len = self.read_u16()? as usize;
        self.read_utf_body(start, len)
    }

    /// Read an i32 length followed by modified UTF-8.
    pub fn read_utf32(&mut self) -> Result<String> {
        let start = self.pos;
        let len = self.read_i32()?;
        let len = self.checked_len(start, len)?;
        self.read_utf_body(start, len)
    }

    fn read_utf_body(&mut self, start: usize, len: usize) -> Result<String> {
        let bytes = self.take(len).inspect_err(|_| self.pos = start)?;
        decode_modified_utf8(bytes).inspect_err(|_| self.pos = start)
    }

    fn checked_len(&mut self, start: usize, len: i32) -> Result<usize> {
        usize::try_from(len).map_err(|_| {
            self.pos = start;
            OpenWireError::Protocol(format!("Negative length {len}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_scalars_are_big_endian() {
        let mut out = BytesMut::new();
        out.put_i16(0x0102);
        out.put_i32(0x03040506);
        out.put_i64(-2);
        out.write_char('A').unwrap();

        assert_eq!(&out[..6], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

        let mut input = DataInput::new(&out);
        assert_eq!(input.read_i16().unwrap(), 0x0102);
        assert_eq!(input.read_i32().unwrap(), 0x03040506);
        assert_eq!(input.read_i64().unwrap(), -2);
        assert_eq!(input.read_char().unwrap(), 'A');
        assert!(input.is_empty());
    }

    #[test]
    fn test_short_read_reports_eof_and_keeps_position() {
        let data = [0u8, 1, 2];
        let mut input = DataInput::new(&data);
        input.read_u8().unwrap();
        match input.read_i32() {
            Err(OpenWireError::UnexpectedEof { needed, available }) => {
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("Expected UnexpectedEof, got {:?}", other),
        }
        assert_eq!(input.position(), 1);
    }

    #[test]
    fn test_utf_ascii_is_raw_bytes() {
        let mut out = BytesMut::new();
        out.write_utf("hello").unwrap();
        assert_eq!(&out[..], &[0, 5, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_modified_utf8_nul_and_supplementary() {
        assert_eq!(modified_utf8_len("\0"), 2);
        assert_eq!(modified_utf8_len("\u{e9}"), 2);
        assert_eq!(modified_utf8_len("\u{20ac}"), 3);
        assert_eq!(modified_utf8_len("\u{1F600}"), 6);

        let mut out = BytesMut::new();
        out.write_utf("a\0b").unwrap();
        assert_eq!(&out[..], &[0, 4, b'a', 0xC0, 0x80, b'b']);

        let text = "x\u{0}\u{e9}\u{20ac}\u{1F600}";
        let mut out = BytesMut::new();
        out.write_utf(text).unwrap();
        let mut input = DataInput::new(&out);
        assert_eq!(input.read_utf().unwrap(), text);
    }

    #[test]
    fn test_utf32_roundtrip() {
        let text = "long ".repeat(10_000);
        let mut out = BytesMut::new();
        out.write_utf32(&text).unwrap();
        assert_eq!(&out[..4], &(text.len() as i32).to_be_bytes());
        let mut input = DataInput::new(&out);
        assert_eq!(input.read_utf32().unwrap(), text);
    }

    #[test]
    fn test_utf_too_long() {
        let text = "a".repeat(70_000);
        let mut out = BytesMut::new();
        assert!(out.write_utf(&text).is_err());
    }

    #[test]
    fn test_invalid_modified_utf8() {
        assert!(decode_modified_utf8(&[0xFF]).is_err());
        assert!(decode_modified_utf8(&[0xC3]).is_err());
        assert!(decode_modified_utf8(&[0xE2, 0x82, 0x41]).is_err());
    }

    #[test]
    fn test_negative_length_rewinds() {
        let mut out = BytesMut::new();
        out.put_i32(-5);
        let mut input = DataInput::new(&out);
        assert!(input.read_sized_bytes().is_err());
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_set_position_restores_mark() {
        let data = [1u8, 2, 3, 4];
        let mut input = DataInput::new(&data);
        let mark = input.position();
        input.read_i16().unwrap();
        input.set_position(mark);
        assert_eq!(input.read_u8().unwrap(), 1);
        assert_eq!(input.peek_u8(), Some(2));
    }
}
