//! Tagged binary encoding of primitive values, lists and maps.
//!
//! Each value is a one-byte kind tag followed by its encoding:
//!
//! | kind | encoding |
//! |---|---|
//! | NULL | nothing |
//! | BOOLEAN, BYTE | 1 byte |
//! | CHAR, SHORT | 2 bytes |
//! | INTEGER, FLOAT | 4 bytes |
//! | LONG, DOUBLE | 8 bytes |
//! | STRING | u16 length + modified UTF-8 |
//! | BIG_STRING | i32 length + modified UTF-8 |
//! | BYTE_ARRAY | i32 length + raw bytes |
//! | MAP | i32 count, then (u16-length key, tagged value) pairs |
//! | LIST | i32 count, then tagged values |
//!
//! Message properties, `WireFormatInfo` properties and stream message bodies
//! all use this encoding.

use bytes::{BufMut, Bytes, BytesMut};

use super::value::MAX_SHORT_STRING_LEN;
use super::{PrimitiveKind, PrimitiveList, PrimitiveMap, PrimitiveValue};
use crate::error::{OpenWireError, Result};
use crate::protocol::{modified_utf8_len, DataInput, DataOutput};

/// Deepest list/map nesting accepted when decoding.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Write one tagged value.
pub fn marshal_value<B: BufMut>(value: &PrimitiveValue, out: &mut B) -> Result<()> {
    match value {
        PrimitiveValue::Null => out.put_u8(PrimitiveKind::Null.tag()),
        PrimitiveValue::Boolean(v) => {
            out.put_u8(PrimitiveKind::Boolean.tag());
            out.write_bool(*v);
        }
        PrimitiveValue::Byte(v) => {
            out.put_u8(PrimitiveKind::Byte.tag());
            out.put_i8(*v);
        }
        PrimitiveValue::Char(v) => {
            out.put_u8(PrimitiveKind::Char.tag());
            out.write_char(*v)?;
        }
        PrimitiveValue::Short(v) => {
            out.put_u8(PrimitiveKind::Short.tag());
            out.put_i16(*v);
        }
        PrimitiveValue::Integer(v) => {
            out.put_u8(PrimitiveKind::Integer.tag());
            out.put_i32(*v);
        }
        PrimitiveValue::Long(v) => {
            out.put_u8(PrimitiveKind::Long.tag());
            out.put_i64(*v);
        }
        PrimitiveValue::Double(v) => {
            out.put_u8(PrimitiveKind::Double.tag());
            out.put_f64(*v);
        }
        PrimitiveValue::Float(v) => {
            out.put_u8(PrimitiveKind::Float.tag());
            out.put_f32(*v);
        }
        PrimitiveValue::String(v) => {
            if modified_utf8_len(v) > MAX_SHORT_STRING_LEN {
                out.put_u8(PrimitiveKind::BigString.tag());
                out.write_utf32(v)?;
            } else {
                out.put_u8(PrimitiveKind::String.tag());
                out.write_utf(v)?;
            }
        }
        PrimitiveValue::BigString(v) => {
            out.put_u8(PrimitiveKind::BigString.tag());
            out.write_utf32(v)?;
        }
        PrimitiveValue::ByteArray(v) => {
            out.put_u8(PrimitiveKind::ByteArray.tag());
            out.write_sized_bytes(v)?;
        }
        PrimitiveValue::Map(v) => {
            out.put_u8(PrimitiveKind::Map.tag());
            marshal_map(v, out)?;
        }
        PrimitiveValue::List(v) => {
            out.put_u8(PrimitiveKind::List.tag());
            marshal_list(v, out)?;
        }
    }
    Ok(())
}

/// Write a map as an i32 count followed by key/value pairs.
pub fn marshal_map<B: BufMut>(map: &PrimitiveMap, out: &mut B) -> Result<()> {
    out.put_i32(count(map.len())?);
    for (key, value) in map {
        out.write_utf(key)?;
        marshal_value(value, out)?;
    }
    Ok(())
}

/// Write a list as an i32 count followed by tagged values.
pub fn marshal_list<B: BufMut>(list: &PrimitiveList, out: &mut B) -> Result<()> {
    out.put_i32(count(list.len())?);
    for value in list.iter() {
        marshal_value(value, out)?;
    }
    Ok(())
}

/// Encode a map into a standalone byte sequence.
pub fn marshal_map_to_bytes(map: &PrimitiveMap) -> Result<Bytes> {
    let mut out = BytesMut::new();
    marshal_map(map, &mut out)?;
    Ok(out.freeze())
}

fn count(len: usize) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| OpenWireError::Protocol(format!("Collection of {len} entries is too large")))
}

/// Read one tagged value.
pub fn unmarshal_value(input: &mut DataInput<'_>) -> Result<PrimitiveValue> {
    read_value(input, 0)
}

/// Read the encoding that follows an already consumed tag.
pub fn unmarshal_value_body(kind: PrimitiveKind, input: &mut DataInput<'_>) -> Result<PrimitiveValue> {
    read_body(kind, input, 0)
}

/// Read a map written by [`marshal_map`]. A negative count reads as empty.
pub fn unmarshal_map(input: &mut DataInput<'_>) -> Result<PrimitiveMap> {
    read_map(input, 0)
}

/// Read a list written by [`marshal_list`].
pub fn unmarshal_list(input: &mut DataInput<'_>) -> Result<PrimitiveList> {
    read_list(input, 0)
}

/// Decode a standalone map byte sequence.
pub fn unmarshal_map_from_bytes(bytes: &[u8]) -> Result<PrimitiveMap> {
    let mut input = DataInput::new(bytes);
    unmarshal_map(&mut input)
}

fn read_value(input: &mut DataInput<'_>, depth: usize) -> Result<PrimitiveValue> {
    let tag = input.read_u8()?;
    let kind = PrimitiveKind::from_tag(tag)
        .ok_or_else(|| OpenWireError::Protocol(format!("Unknown primitive type tag: {tag}")))?;
    read_body(kind, input, depth)
}

fn read_body(kind: PrimitiveKind, input: &mut DataInput<'_>, depth: usize) -> Result<PrimitiveValue> {
    let value = match kind {
        PrimitiveKind::Null => PrimitiveValue::Null,
        PrimitiveKind::Boolean => PrimitiveValue::Boolean(input.read_bool()?),
        PrimitiveKind::Byte => PrimitiveValue::Byte(input.read_i8()?),
        PrimitiveKind::Char => PrimitiveValue::Char(input.read_char()?),
        PrimitiveKind::Short => PrimitiveValue::Short(input.read_i16()?),
        PrimitiveKind::Integer => PrimitiveValue::Integer(input.read_i32()?),
        PrimitiveKind::Long => PrimitiveValue::Long(input.read_i64()?),
        PrimitiveKind::Double => PrimitiveValue::Double(input.read_f64()?),
        PrimitiveKind::Float => PrimitiveValue::Float(input.read_f32()?),
        PrimitiveKind::String => PrimitiveValue::String(input.read_utf()?),
        PrimitiveKind::BigString => PrimitiveValue::BigString(input.read_utf32()?),
        PrimitiveKind::ByteArray => PrimitiveValue::ByteArray(input.read_sized_bytes()?.to_vec()),
        PrimitiveKind::Map => PrimitiveValue::Map(read_map(input, depth + 1)?),
        PrimitiveKind::List => PrimitiveValue::List(read_list(input, depth + 1)?),
    };
    Ok(value)
}

fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_NESTING_DEPTH {
        return Err(OpenWireError::Protocol(format!(
            "Primitive collections nested deeper than {MAX_NESTING_DEPTH}"
        )));
    }
    Ok(())
}

fn read_map(input: &mut DataInput<'_>, depth: usize) -> Result<PrimitiveMap> {
    check_depth(depth)?;
    let size = input.read_i32()?;
    let mut map = PrimitiveMap::new();
    for _ in 0..size.max(0) {
        let key = input.read_utf()?;
        let value = read_value(input, depth)?;
        map.set(key, value);
    }
    Ok(map)
}

fn read_list(input: &mut DataInput<'_>, depth: usize) -> Result<PrimitiveList> {
    check_depth(depth)?;
    let size = input.read_i32()?;
    // Cap the preallocation; the count comes off the wire.
    let mut values = Vec::with_capacity(size.clamp(0, 1024) as usize);
    for _ in 0..size.max(0) {
        values.push(read_value(input, depth)?);
    }
    Ok(values.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: PrimitiveValue) -> PrimitiveValue {
        let mut out = BytesMut::new();
        marshal_value(&value, &mut out).unwrap();
        let mut input = DataInput::new(&out);
        let read = unmarshal_value(&mut input).unwrap();
        assert!(input.is_empty(), "trailing bytes after {:?}", value);
        read
    }

    #[test]
    fn test_scalar_encodings() {
        let mut out = BytesMut::new();
        marshal_value(&PrimitiveValue::Boolean(true), &mut out).unwrap();
        marshal_value(&PrimitiveValue::Short(0x0102), &mut out).unwrap();
        marshal_value(&PrimitiveValue::Char('A'), &mut out).unwrap();
        marshal_value(&PrimitiveValue::Integer(7), &mut out).unwrap();
        assert_eq!(
            &out[..],
            &[1, 1, 4, 0x01, 0x02, 3, 0x00, 0x41, 5, 0, 0, 0, 7]
        );
    }

    #[test]
    fn test_string_tag_threshold() {
        let mut out = BytesMut::new();
        marshal_value(&PrimitiveValue::String("a".repeat(MAX_SHORT_STRING_LEN)), &mut out).unwrap();
        assert_eq!(out[0], PrimitiveKind::String.tag());

        let mut out = BytesMut::new();
        marshal_value(
            &PrimitiveValue::String("a".repeat(MAX_SHORT_STRING_LEN + 1)),
            &mut out,
        )
        .unwrap();
        assert_eq!(out[0], PrimitiveKind::BigString.tag());
        assert_eq!(&out[1..5], &((MAX_SHORT_STRING_LEN + 1) as i32).to_be_bytes());
    }

    #[test]
    fn test_every_kind_reads_back() {
        let values = vec![
            PrimitiveValue::Null,
            PrimitiveValue::from(false),
            PrimitiveValue::from(-128i8),
            PrimitiveValue::from('\u{e9}'),
            PrimitiveValue::from(i16::MIN),
            PrimitiveValue::from(i32::MAX),
            PrimitiveValue::from(i64::MIN),
            PrimitiveValue::from(3.5f32),
            PrimitiveValue::from(-0.125f64),
            PrimitiveValue::from("short"),
            PrimitiveValue::from("x".repeat(20_000)),
            PrimitiveValue::from(vec![0u8, 255, 7]),
        ];
        for value in values {
            assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn test_lists_of_lists_and_maps_of_lists() {
        let mut inner = PrimitiveList::new();
        inner.push(1i32);
        inner.push("two");
        let mut outer = PrimitiveList::new();
        outer.push(inner.clone());
        outer.push(PrimitiveValue::Null);

        let mut map = PrimitiveMap::new();
        map.set("inner", inner);
        map.set("outer", outer.clone());
        map.set("flag", true);

        let value = PrimitiveValue::from(map);
        assert_eq!(roundtrip(value.clone()), value);
        assert_eq!(
            roundtrip(PrimitiveValue::from(outer.clone())),
            PrimitiveValue::from(outer)
        );
    }

    #[test]
    fn test_map_bytes_helpers() {
        let map: PrimitiveMap = [("CacheSize", 1024i32)].into_iter().collect();
        let bytes = marshal_map_to_bytes(&map).unwrap();
        assert_eq!(&bytes[..4], &[0, 0, 0, 1]);
        assert_eq!(unmarshal_map_from_bytes(&bytes).unwrap(), map);
    }

    #[test]
    fn test_null_map_reads_as_empty() {
        let data = (-1i32).to_be_bytes();
        assert!(unmarshal_map_from_bytes(&data).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_tag_is_error() {
        let data = [99u8];
        let mut input = DataInput::new(&data);
        assert!(matches!(
            unmarshal_value(&mut input),
            Err(OpenWireError::Protocol(_))
        ));
    }

    #[test]
    fn test_excessive_nesting_rejected() {
        let mut out = BytesMut::new();
        for _ in 0..=MAX_NESTING_DEPTH + 1 {
            out.put_u8(PrimitiveKind::List.tag());
            out.put_i32(1);
        }
        out.put_u8(PrimitiveKind::Null.tag());
        let mut input = DataInput::new(&out);
        assert!(unmarshal_value(&mut input).is_err());
    }

    #[test]
    fn test_truncated_value_is_eof() {
        let data = [PrimitiveKind::Long.tag(), 0, 0];
        let mut input = DataInput::new(&data);
        assert!(matches!(
            unmarshal_value(&mut input),
            Err(OpenWireError::UnexpectedEof { .. })
        ));
    }
}
