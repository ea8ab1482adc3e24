//! Stream message: a body made of a sequence of tagged primitive values.
//!
//! Values are written with the tagged primitive encoding and read back in
//! the same order. Typed reads accept a small set of widenings described by
//! [`COERCIONS`]; a failed read leaves the cursor where it was so the caller
//! can retry with another type.

use std::str::FromStr;

use bytes::Bytes;

use crate::commands::{impl_message_command, types, Message};
use crate::error::{OpenWireError, Result};
use crate::primitive::{codec, PrimitiveKind, PrimitiveValue};
use crate::protocol::DataInput;

use PrimitiveKind::{
    BigString, Boolean, Byte, ByteArray, Char, Double, Float, Integer, List, Long, Map, Short,
    String as Str,
};

/// For every requested read kind, the stored kinds it may be produced from.
pub const COERCIONS: &[(PrimitiveKind, &[PrimitiveKind])] = &[
    (Boolean, &[Boolean, Str, BigString]),
    (Byte, &[Byte, Str, BigString]),
    (Short, &[Short, Byte, Str, BigString]),
    (Char, &[Char]),
    (Integer, &[Integer, Short, Byte, Str, BigString]),
    (Long, &[Long, Integer, Short, Byte, Str, BigString]),
    (Float, &[Float, Str, BigString]),
    (Double, &[Double, Float, Str, BigString]),
    (ByteArray, &[ByteArray]),
    (
        Str,
        &[
            Boolean, Byte, Char, Short, Integer, Long, Double, Float, Str, ByteArray, Map, List,
            BigString,
        ],
    ),
];

/// True if a value stored as `stored` may be read as `requested`.
pub fn can_read_as(requested: PrimitiveKind, stored: PrimitiveKind) -> bool {
    let requested = if requested == BigString { Str } else { requested };
    COERCIONS
        .iter()
        .find(|(kind, _)| *kind == requested)
        .is_some_and(|(_, accepted)| accepted.contains(&stored))
}

/// No byte sequence is being read.
const NO_BYTES_IN_PROGRESS: i64 = -1;

/// Message whose body is a sequence of tagged primitive values.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    message: Message,
    /// Bytes left in the byte sequence being read, or -1.
    remaining_bytes: i64,
}

impl Default for StreamMessage {
    fn default() -> Self {
        Self {
            message: Message::default(),
            remaining_bytes: NO_BYTES_IN_PROGRESS,
        }
    }
}

impl PartialEq for StreamMessage {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
    }
}

impl_message_command!(StreamMessage, types::ACTIVEMQ_STREAM_MESSAGE);

impl StreamMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to reading: materialize the body and rewind to the first value.
    pub fn freeze(&mut self) {
        self.message.envelope_mut().freeze();
        self.remaining_bytes = NO_BYTES_IN_PROGRESS;
    }

    /// Discard the body and return to writing.
    pub fn clear_body(&mut self) {
        self.message.envelope_mut().clear_body();
        self.remaining_bytes = NO_BYTES_IN_PROGRESS;
    }

    /// Same as [`clear_body`](Self::clear_body).
    pub fn reset(&mut self) {
        self.clear_body();
    }

    pub fn content(&self) -> Bytes {
        self.message.content()
    }

    // ---- writing ----

    fn write_value(&mut self, value: &PrimitiveValue) -> Result<()> {
        let out = self.message.envelope_mut().body_writer()?;
        let start = out.len();
        codec::marshal_value(value, out).inspect_err(|_| out.truncate(start))
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_value(&PrimitiveValue::Boolean(value))
    }

    pub fn write_byte(&mut self, value: i8) -> Result<()> {
        self.write_value(&PrimitiveValue::Byte(value))
    }

    pub fn write_short(&mut self, value: i16) -> Result<()> {
        self.write_value(&PrimitiveValue::Short(value))
    }

    /// Characters outside the basic multilingual plane are rejected.
    pub fn write_char(&mut self, value: char) -> Result<()> {
        self.write_value(&PrimitiveValue::Char(value))
    }

    pub fn write_int(&mut self, value: i32) -> Result<()> {
        self.write_value(&PrimitiveValue::Integer(value))
    }

    pub fn write_long(&mut self, value: i64) -> Result<()> {
        self.write_value(&PrimitiveValue::Long(value))
    }

    pub fn write_float(&mut self, value: f32) -> Result<()> {
        self.write_value(&PrimitiveValue::Float(value))
    }

    pub fn write_double(&mut self, value: f64) -> Result<()> {
        self.write_value(&PrimitiveValue::Double(value))
    }

    /// Long strings are written with the big string tag.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_value(&PrimitiveValue::string(value))
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_value(&PrimitiveValue::ByteArray(value.to_vec()))
    }

    /// Write `length` bytes of `value` starting at `offset`.
    pub fn write_bytes_slice(&mut self, value: &[u8], offset: usize, length: usize) -> Result<()> {
        let slice = offset
            .checked_add(length)
            .and_then(|end| value.get(offset..end))
            .ok_or_else(|| {
                OpenWireError::IllegalState(format!(
                    "Range {offset}+{length} out of bounds for {} bytes",
                    value.len()
                ))
            })?;
        self.write_bytes(slice)
    }

    pub fn write_null(&mut self) -> Result<()> {
        self.write_value(&PrimitiveValue::Null)
    }

    pub fn write_object(&mut self, value: impl Into<PrimitiveValue>) -> Result<()> {
        self.write_value(&value.into())
    }

    // ---- reading ----

    fn ensure_no_bytes_in_progress(&self) -> Result<()> {
        if self.remaining_bytes != NO_BYTES_IN_PROGRESS {
            return Err(OpenWireError::MessageFormat(
                "Byte sequence not fully read".into(),
            ));
        }
        Ok(())
    }

    /// Read the next value if it is stored as one of the kinds accepted for
    /// `requested`, then convert it. The cursor only moves on success.
    fn read_as<T>(
        &mut self,
        requested: PrimitiveKind,
        convert: impl FnOnce(PrimitiveValue) -> Result<T>,
    ) -> Result<T> {
        self.ensure_no_bytes_in_progress()?;
        let (content, pos) = self.message.envelope_mut().body_reader()?;
        let mut input = DataInput::new(content);
        input.set_position(*pos);

        let kind = read_tag(&mut input)?;
        if kind == PrimitiveKind::Null {
            return Err(OpenWireError::NullValue);
        }
        if !can_read_as(requested, kind) {
            return Err(OpenWireError::IncompatibleKind {
                requested,
                found: kind,
            });
        }
        let value = codec::unmarshal_value_body(kind, &mut input).map_err(format_error)?;
        let converted = convert(value)?;
        *pos = input.position();
        Ok(converted)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_as(Boolean, |value| match value {
            PrimitiveValue::Boolean(v) => Ok(v),
            PrimitiveValue::String(s) | PrimitiveValue::BigString(s) => parse_bool(&s),
            other => Err(unexpected(Boolean, &other)),
        })
    }

    pub fn read_byte(&mut self) -> Result<i8> {
        self.read_as(Byte, |value| match value {
            PrimitiveValue::Byte(v) => Ok(v),
            PrimitiveValue::String(s) | PrimitiveValue::BigString(s) => parse_number(&s, Byte),
            other => Err(unexpected(Byte, &other)),
        })
    }

    pub fn read_short(&mut self) -> Result<i16> {
        self.read_as(Short, |value| match value {
            PrimitiveValue::Short(v) => Ok(v),
            PrimitiveValue::Byte(v) => Ok(v.into()),
            PrimitiveValue::String(s) | PrimitiveValue::BigString(s) => parse_number(&s, Short),
            other => Err(unexpected(Short, &other)),
        })
    }

    pub fn read_char(&mut self) -> Result<char> {
        self.read_as(Char, |value| match value {
            PrimitiveValue::Char(v) => Ok(v),
            other => Err(unexpected(Char, &other)),
        })
    }

    pub fn read_int(&mut self) -> Result<i32> {
        self.read_as(Integer, |value| match value {
            PrimitiveValue::Integer(v) => Ok(v),
            PrimitiveValue::Short(v) => Ok(v.into()),
            PrimitiveValue::Byte(v) => Ok(v.into()),
            PrimitiveValue::String(s) | PrimitiveValue::BigString(s) => parse_number(&s, Integer),
            other => Err(unexpected(Integer, &other)),
        })
    }

    pub fn read_long(&mut self) -> Result<i64> {
        self.read_as(Long, |value| match value {
            PrimitiveValue::Long(v) => Ok(v),
            PrimitiveValue::Integer(v) => Ok(v.into()),
            PrimitiveValue::Short(v) => Ok(v.into()),
            PrimitiveValue::Byte(v) => Ok(v.into()),
            PrimitiveValue::String(s) | PrimitiveValue::BigString(s) => parse_number(&s, Long),
            other => Err(unexpected(Long, &other)),
        })
    }

    pub fn read_float(&mut self) -> Result<f32> {
        self.read_as(Float, |value| match value {
            PrimitiveValue::Float(v) => Ok(v),
            PrimitiveValue::String(s) | PrimitiveValue::BigString(s) => parse_number(&s, Float),
            other => Err(unexpected(Float, &other)),
        })
    }

    pub fn read_double(&mut self) -> Result<f64> {
        self.read_as(Double, |value| match value {
            PrimitiveValue::Double(v) => Ok(v),
            PrimitiveValue::Float(v) => Ok(v.into()),
            PrimitiveValue::String(s) | PrimitiveValue::BigString(s) => parse_number(&s, Double),
            other => Err(unexpected(Double, &other)),
        })
    }

    /// Any non-null value, rendered as text.
    pub fn read_string(&mut self) -> Result<String> {
        self.read_as(Str, |value| {
            Ok(match value {
                PrimitiveValue::String(s) | PrimitiveValue::BigString(s) => s,
                other => other.to_string(),
            })
        })
    }

    /// The next value as stored, including `Null`.
    pub fn read_object(&mut self) -> Result<PrimitiveValue> {
        self.ensure_no_bytes_in_progress()?;
        let (content, pos) = self.message.envelope_mut().body_reader()?;
        let mut input = DataInput::new(content);
        input.set_position(*pos);

        let kind = read_tag(&mut input)?;
        let value = codec::unmarshal_value_body(kind, &mut input).map_err(format_error)?;
        *pos = input.position();
        Ok(value)
    }

    /// Kind of the next value without consuming it.
    pub fn next_value_kind(&mut self) -> Result<Option<PrimitiveKind>> {
        let (content, pos) = self.message.envelope_mut().body_reader()?;
        match content.get(*pos) {
            None => Ok(None),
            Some(&tag) => PrimitiveKind::from_tag(tag)
                .map(Some)
                .ok_or_else(|| unknown_tag(tag)),
        }
    }

    /// Read the next chunk of a byte sequence value into `buf`.
    ///
    /// Returns the number of bytes copied. A short count means the value
    /// ended; the call after the last chunk returns `None` and readies the
    /// stream for the next value.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let mut remaining = self.remaining_bytes;
        if remaining == 0 {
            self.remaining_bytes = NO_BYTES_IN_PROGRESS;
            return Ok(None);
        }

        let (content, pos) = self.message.envelope_mut().body_reader()?;
        let mut input = DataInput::new(content);
        input.set_position(*pos);

        if remaining == NO_BYTES_IN_PROGRESS {
            let kind = read_tag(&mut input)?;
            if kind == PrimitiveKind::Null {
                return Err(OpenWireError::NullValue);
            }
            if kind != ByteArray {
                return Err(OpenWireError::IncompatibleKind {
                    requested: ByteArray,
                    found: kind,
                });
            }
            let length = input.read_i32().map_err(format_error)?;
            if length < 0 {
                return Err(OpenWireError::MessageFormat(format!(
                    "Negative byte sequence length: {length}"
                )));
            }
            remaining = length.into();
        }

        let n = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let chunk = input.read_bytes(n).map_err(format_error)?;
        buf[..n].copy_from_slice(chunk);
        *pos = input.position();
        self.remaining_bytes = remaining - n as i64;
        Ok(Some(n))
    }
}

fn read_tag(input: &mut DataInput<'_>) -> Result<PrimitiveKind> {
    let tag = input.read_u8().map_err(|_| OpenWireError::EndOfData)?;
    PrimitiveKind::from_tag(tag).ok_or_else(|| unknown_tag(tag))
}

fn unknown_tag(tag: u8) -> OpenWireError {
    OpenWireError::MessageFormat(format!("Unknown value type tag: {tag}"))
}

fn format_error(err: OpenWireError) -> OpenWireError {
    match err {
        OpenWireError::MessageFormat(_) => err,
        other => OpenWireError::MessageFormat(other.to_string()),
    }
}

fn unexpected(requested: PrimitiveKind, value: &PrimitiveValue) -> OpenWireError {
    OpenWireError::IncompatibleKind {
        requested,
        found: value.kind(),
    }
}

fn parse_bool(text: &str) -> Result<bool> {
    if text.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if text.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(OpenWireError::MessageFormat(format!(
            "Cannot convert \"{text}\" to BOOLEAN"
        )))
    }
}

fn parse_number<T: FromStr>(text: &str, kind: PrimitiveKind) -> Result<T> {
    text.parse().map_err(|_| {
        OpenWireError::MessageFormat(format!("Cannot convert \"{text}\" to {kind}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Command, DataStructure};

    fn frozen(build: impl FnOnce(&mut StreamMessage)) -> StreamMessage {
        let mut message = StreamMessage::new();
        build(&mut message);
        message.freeze();
        message
    }

    #[test]
    fn test_type_code() {
        let message = StreamMessage::new();
        assert_eq!(message.data_structure_type(), 27);
        assert!(message.as_command().is_some());
        assert!(!message.is_response());
    }

    #[test]
    fn test_exact_round_trip() {
        let mut message = frozen(|m| {
            m.write_bool(true).unwrap();
            m.write_byte(-3).unwrap();
            m.write_short(300).unwrap();
            m.write_char('x').unwrap();
            m.write_int(70_000).unwrap();
            m.write_long(1 << 40).unwrap();
            m.write_float(1.5).unwrap();
            m.write_double(2.25).unwrap();
            m.write_string("hello").unwrap();
            m.write_bytes(&[1, 2, 3]).unwrap();
        });

        assert!(message.read_bool().unwrap());
        assert_eq!(message.read_byte().unwrap(), -3);
        assert_eq!(message.read_short().unwrap(), 300);
        assert_eq!(message.read_char().unwrap(), 'x');
        assert_eq!(message.read_int().unwrap(), 70_000);
        assert_eq!(message.read_long().unwrap(), 1 << 40);
        assert_eq!(message.read_float().unwrap(), 1.5);
        assert_eq!(message.read_double().unwrap(), 2.25);
        assert_eq!(message.read_string().unwrap(), "hello");
        let mut buf = [0u8; 3];
        assert_eq!(message.read_bytes(&mut buf).unwrap(), Some(3));
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(message.read_bytes(&mut buf).unwrap(), None);
        assert!(matches!(message.read_int(), Err(OpenWireError::EndOfData)));
    }

    #[test]
    fn test_long_from_byte() {
        let mut message = frozen(|m| m.write_byte(5).unwrap());
        assert_eq!(message.read_long().unwrap(), 5);
    }

    #[test]
    fn test_string_from_int() {
        let mut message = frozen(|m| m.write_int(42).unwrap());
        assert_eq!(message.read_string().unwrap(), "42");
    }

    #[test]
    fn test_rejected_read_keeps_position() {
        let mut message = frozen(|m| m.write_int(1).unwrap());
        let err = message.read_bool().unwrap_err();
        assert!(err.is_format_error());
        assert_eq!(message.read_int().unwrap(), 1);
    }

    #[test]
    fn test_failed_parse_keeps_position() {
        let mut message = frozen(|m| m.write_string("abc").unwrap());
        assert!(matches!(
            message.read_int(),
            Err(OpenWireError::MessageFormat(_))
        ));
        assert!(matches!(
            message.read_bool(),
            Err(OpenWireError::MessageFormat(_))
        ));
        assert_eq!(message.read_string().unwrap(), "abc");
    }

    #[test]
    fn test_numeric_strings_coerce() {
        let mut message = frozen(|m| {
            m.write_string("12").unwrap();
            m.write_string("TRUE").unwrap();
            m.write_string("0.5").unwrap();
        });
        assert_eq!(message.read_long().unwrap(), 12);
        assert!(message.read_bool().unwrap());
        assert_eq!(message.read_double().unwrap(), 0.5);
    }

    #[test]
    fn test_char_accepts_only_char() {
        let mut message = frozen(|m| m.write_string("c").unwrap());
        assert!(matches!(
            message.read_char(),
            Err(OpenWireError::IncompatibleKind { .. })
        ));
        assert_eq!(message.read_string().unwrap(), "c");
    }

    #[test]
    fn test_no_narrowing() {
        let mut message = frozen(|m| m.write_long(1).unwrap());
        assert!(message.read_int().is_err());
        assert!(message.read_short().is_err());
        assert_eq!(message.read_long().unwrap(), 1);
    }

    #[test]
    fn test_null_value_rewinds() {
        let mut message = frozen(|m| m.write_null().unwrap());
        assert!(matches!(message.read_int(), Err(OpenWireError::NullValue)));
        assert_eq!(message.read_object().unwrap(), PrimitiveValue::Null);
    }

    #[test]
    fn test_byte_chunking() {
        let mut message = frozen(|m| m.write_bytes(&[7u8; 10]).unwrap());
        let mut buf = [0u8; 4];
        assert_eq!(message.read_bytes(&mut buf).unwrap(), Some(4));
        assert_eq!(message.read_bytes(&mut buf).unwrap(), Some(4));
        assert_eq!(message.read_bytes(&mut buf).unwrap(), Some(2));
        assert_eq!(message.read_bytes(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_empty_byte_sequence() {
        let mut message = frozen(|m| m.write_bytes(&[]).unwrap());
        let mut buf = [0u8; 8];
        assert_eq!(message.read_bytes(&mut buf).unwrap(), Some(0));
        assert_eq!(message.read_bytes(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_read_during_byte_sequence_fails() {
        let mut message = frozen(|m| {
            m.write_bytes(&[1, 2, 3, 4]).unwrap();
            m.write_int(9).unwrap();
        });
        let mut buf = [0u8; 2];
        assert_eq!(message.read_bytes(&mut buf).unwrap(), Some(2));
        assert!(matches!(
            message.read_int(),
            Err(OpenWireError::MessageFormat(_))
        ));
        assert_eq!(message.read_bytes(&mut buf).unwrap(), Some(2));
        assert_eq!(message.read_bytes(&mut buf).unwrap(), None);
        assert_eq!(message.read_int().unwrap(), 9);
    }

    #[test]
    fn test_read_bytes_on_wrong_kind() {
        let mut message = frozen(|m| m.write_int(1).unwrap());
        let mut buf = [0u8; 4];
        assert!(matches!(
            message.read_bytes(&mut buf),
            Err(OpenWireError::IncompatibleKind { .. })
        ));
        assert_eq!(message.read_int().unwrap(), 1);
    }

    #[test]
    fn test_write_after_freeze_and_read_before_freeze() {
        let mut message = StreamMessage::new();
        message.write_int(1).unwrap();
        assert!(matches!(
            message.read_int(),
            Err(OpenWireError::ReadBeforeContent)
        ));
        message.freeze();
        assert!(matches!(
            message.write_int(2),
            Err(OpenWireError::WriteToReadOnly)
        ));
    }

    #[test]
    fn test_reset_returns_to_writing() {
        let mut message = frozen(|m| m.write_int(1).unwrap());
        let first = message.content();
        message.reset();
        message.write_int(2).unwrap();
        message.freeze();
        assert_ne!(message.content(), first);
        assert_eq!(message.read_int().unwrap(), 2);
    }

    #[test]
    fn test_big_string_written_with_long_tag() {
        let text = "a".repeat(crate::primitive::MAX_SHORT_STRING_LEN + 1);
        let mut message = frozen(|m| m.write_string(&text).unwrap());
        assert_eq!(message.next_value_kind().unwrap(), Some(BigString));
        assert_eq!(message.read_string().unwrap(), text);
    }

    #[test]
    fn test_write_object_and_read_object() {
        let mut message = frozen(|m| {
            m.write_object(3.5f64).unwrap();
            m.write_object("s").unwrap();
        });
        assert_eq!(message.read_object().unwrap(), PrimitiveValue::Double(3.5));
        assert_eq!(message.read_object().unwrap(), PrimitiveValue::from("s"));
        assert_eq!(message.next_value_kind().unwrap(), None);
    }

    #[test]
    fn test_write_bytes_slice_bounds() {
        let mut message = StreamMessage::new();
        assert!(message.write_bytes_slice(&[1, 2, 3], 2, 5).is_err());
        message.write_bytes_slice(&[1, 2, 3], 1, 2).unwrap();
        message.freeze();
        assert_eq!(
            message.read_object().unwrap(),
            PrimitiveValue::ByteArray(vec![2, 3])
        );
    }

    #[test]
    fn test_coercion_table_asymmetry() {
        assert!(can_read_as(Str, Char));
        assert!(!can_read_as(Char, Str));
        assert!(can_read_as(Double, Float));
        assert!(!can_read_as(Float, Double));
        assert!(!can_read_as(Integer, PrimitiveKind::Null));
    }
}
