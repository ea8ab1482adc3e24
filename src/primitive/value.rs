//! Tagged primitive value.
//!
//! `PrimitiveValue` holds exactly one of the 14 kinds the OpenWire marshalling
//! layer knows about. Each kind has a single-byte tag that is written on the
//! wire ahead of the encoded value:
//!
//! ```text
//! NULL 0   BOOLEAN 1   BYTE 2     CHAR 3       SHORT 4   INTEGER 5   LONG 6
//! DOUBLE 7 FLOAT 8     STRING 9   BYTE_ARRAY 10 MAP 11   LIST 12     BIG_STRING 13
//! ```
//!
//! Accessors never coerce: asking for a kind the value does not hold is a
//! `WrongKind` error. Coercion only happens in the stream message body.

use std::fmt;

use super::{PrimitiveList, PrimitiveMap};
use crate::error::{OpenWireError, Result};
use crate::protocol::modified_utf8_len;

/// Largest encoded string length still written with the short string tag.
pub const MAX_SHORT_STRING_LEN: usize = (i16::MAX / 4) as usize;

/// Kind tag of a primitive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveKind {
    Null = 0,
    Boolean = 1,
    Byte = 2,
    Char = 3,
    Short = 4,
    Integer = 5,
    Long = 6,
    Double = 7,
    Float = 8,
    String = 9,
    ByteArray = 10,
    Map = 11,
    List = 12,
    BigString = 13,
}

impl PrimitiveKind {
    /// Wire tag for this kind.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Look up a kind by wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        let kind = match tag {
            0 => PrimitiveKind::Null,
            1 => PrimitiveKind::Boolean,
            2 => PrimitiveKind::Byte,
            3 => PrimitiveKind::Char,
            4 => PrimitiveKind::Short,
            5 => PrimitiveKind::Integer,
            6 => PrimitiveKind::Long,
            7 => PrimitiveKind::Double,
            8 => PrimitiveKind::Float,
            9 => PrimitiveKind::String,
            10 => PrimitiveKind::ByteArray,
            11 => PrimitiveKind::Map,
            12 => PrimitiveKind::List,
            13 => PrimitiveKind::BigString,
            _ => return None,
        };
        Some(kind)
    }

    /// True for the two string kinds.
    #[inline]
    pub fn is_string(self) -> bool {
        matches!(self, PrimitiveKind::String | PrimitiveKind::BigString)
    }

    fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Null => "NULL",
            PrimitiveKind::Boolean => "BOOLEAN",
            PrimitiveKind::Byte => "BYTE",
            PrimitiveKind::Char => "CHAR",
            PrimitiveKind::Short => "SHORT",
            PrimitiveKind::Integer => "INTEGER",
            PrimitiveKind::Long => "LONG",
            PrimitiveKind::Double => "DOUBLE",
            PrimitiveKind::Float => "FLOAT",
            PrimitiveKind::String => "STRING",
            PrimitiveKind::ByteArray => "BYTE_ARRAY",
            PrimitiveKind::Map => "MAP",
            PrimitiveKind::List => "LIST",
            PrimitiveKind::BigString => "BIG_STRING",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single tagged value.
///
/// Complex kinds own their payload; `clone()` deep-copies it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PrimitiveValue {
    #[default]
    Null,
    Boolean(bool),
    Byte(i8),
    Char(char),
    Short(i16),
    Integer(i32),
    Long(i64),
    Double(f64),
    Float(f32),
    String(String),
    ByteArray(Vec<u8>),
    Map(PrimitiveMap),
    List(PrimitiveList),
    BigString(String),
}

macro_rules! scalar_accessor {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self) -> Result<$ty> {
            match self {
                PrimitiveValue::$variant(v) => Ok(*v),
                other => Err(other.wrong_kind(PrimitiveKind::$variant)),
            }
        }
    };
}

impl PrimitiveValue {
    /// Build a string value, choosing the long string kind when the encoded
    /// form would not fit the 16-bit length of the short string form.
    pub fn string(value: impl Into<String>) -> Self {
        let value = value.into();
        if modified_utf8_len(&value) > MAX_SHORT_STRING_LEN {
            PrimitiveValue::BigString(value)
        } else {
            PrimitiveValue::String(value)
        }
    }

    /// The active kind.
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveValue::Null => PrimitiveKind::Null,
            PrimitiveValue::Boolean(_) => PrimitiveKind::Boolean,
            PrimitiveValue::Byte(_) => PrimitiveKind::Byte,
            PrimitiveValue::Char(_) => PrimitiveKind::Char,
            PrimitiveValue::Short(_) => PrimitiveKind::Short,
            PrimitiveValue::Integer(_) => PrimitiveKind::Integer,
            PrimitiveValue::Long(_) => PrimitiveKind::Long,
            PrimitiveValue::Double(_) => PrimitiveKind::Double,
            PrimitiveValue::Float(_) => PrimitiveKind::Float,
            PrimitiveValue::String(_) => PrimitiveKind::String,
            PrimitiveValue::ByteArray(_) => PrimitiveKind::ByteArray,
            PrimitiveValue::Map(_) => PrimitiveKind::Map,
            PrimitiveValue::List(_) => PrimitiveKind::List,
            PrimitiveValue::BigString(_) => PrimitiveKind::BigString,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, PrimitiveValue::Null)
    }

    /// Reset to the null kind, releasing any owned payload.
    pub fn clear(&mut self) {
        *self = PrimitiveValue::Null;
    }

    /// Switch to a new value, returning the previous one.
    pub fn replace(&mut self, value: PrimitiveValue) -> PrimitiveValue {
        std::mem::replace(self, value)
    }

    scalar_accessor!(as_bool, Boolean, bool);
    scalar_accessor!(as_byte, Byte, i8);
    scalar_accessor!(as_char, Char, char);
    scalar_accessor!(as_short, Short, i16);
    scalar_accessor!(as_int, Integer, i32);
    scalar_accessor!(as_long, Long, i64);
    scalar_accessor!(as_float, Float, f32);
    scalar_accessor!(as_double, Double, f64);

    /// String payload of either string kind.
    pub fn as_string(&self) -> Result<&str> {
        match self {
            PrimitiveValue::String(s) | PrimitiveValue::BigString(s) => Ok(s),
            other => Err(other.wrong_kind(PrimitiveKind::String)),
        }
    }

    pub fn as_byte_array(&self) -> Result<&[u8]> {
        match self {
            PrimitiveValue::ByteArray(v) => Ok(v),
            other => Err(other.wrong_kind(PrimitiveKind::ByteArray)),
        }
    }

    pub fn as_list(&self) -> Result<&PrimitiveList> {
        match self {
            PrimitiveValue::List(v) => Ok(v),
            other => Err(other.wrong_kind(PrimitiveKind::List)),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut PrimitiveList> {
        match self {
            PrimitiveValue::List(v) => Ok(v),
            other => Err(other.wrong_kind(PrimitiveKind::List)),
        }
    }

    pub fn as_map(&self) -> Result<&PrimitiveMap> {
        match self {
            PrimitiveValue::Map(v) => Ok(v),
            other => Err(other.wrong_kind(PrimitiveKind::Map)),
        }
    }

    pub fn as_map_mut(&mut self) -> Result<&mut PrimitiveMap> {
        match self {
            PrimitiveValue::Map(v) => Ok(v),
            other => Err(other.wrong_kind(PrimitiveKind::Map)),
        }
    }

    fn wrong_kind(&self, expected: PrimitiveKind) -> OpenWireError {
        OpenWireError::WrongKind {
            expected,
            found: self.kind(),
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::Null => f.write_str("null"),
            PrimitiveValue::Boolean(v) => write!(f, "{v}"),
            PrimitiveValue::Byte(v) => write!(f, "{v}"),
            PrimitiveValue::Char(v) => write!(f, "{v}"),
            PrimitiveValue::Short(v) => write!(f, "{v}"),
            PrimitiveValue::Integer(v) => write!(f, "{v}"),
            PrimitiveValue::Long(v) => write!(f, "{v}"),
            // Debug keeps the fractional part on whole numbers ("1.0").
            PrimitiveValue::Double(v) => write!(f, "{v:?}"),
            PrimitiveValue::Float(v) => write!(f, "{v:?}"),
            PrimitiveValue::String(v) | PrimitiveValue::BigString(v) => f.write_str(v),
            PrimitiveValue::ByteArray(bytes) => {
                for b in bytes {
                    write!(f, "[{b}]")?;
                }
                Ok(())
            }
            PrimitiveValue::Map(v) => write!(f, "{v}"),
            PrimitiveValue::List(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for PrimitiveValue {
            fn from(v: $ty) -> Self {
                PrimitiveValue::$variant(v)
            }
        }
    };
}

impl_from!(bool, Boolean);
impl_from!(i8, Byte);
impl_from!(char, Char);
impl_from!(i16, Short);
impl_from!(i32, Integer);
impl_from!(i64, Long);
impl_from!(f32, Float);
impl_from!(f64, Double);
impl_from!(Vec<u8>, ByteArray);
impl_from!(PrimitiveList, List);
impl_from!(PrimitiveMap, Map);

impl From<String> for PrimitiveValue {
    fn from(v: String) -> Self {
        PrimitiveValue::string(v)
    }
}

impl From<&str> for PrimitiveValue {
    fn from(v: &str) -> Self {
        PrimitiveValue::string(v)
    }
}

impl From<&[u8]> for PrimitiveValue {
    fn from(v: &[u8]) -> Self {
        PrimitiveValue::ByteArray(v.to_vec())
    }
}

impl<T: Into<PrimitiveValue>> From<Option<T>> for PrimitiveValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(PrimitiveValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_roundtrip() {
        for tag in 0..=13u8 {
            let kind = PrimitiveKind::from_tag(tag).unwrap();
            assert_eq!(kind.tag(), tag);
        }
        assert_eq!(PrimitiveKind::from_tag(14), None);
        assert_eq!(PrimitiveKind::from_tag(0xFF), None);
    }

    #[test]
    fn test_accessors_match_kind() {
        assert!(PrimitiveValue::from(true).as_bool().unwrap());
        assert_eq!(PrimitiveValue::from(-3i8).as_byte().unwrap(), -3);
        assert_eq!(PrimitiveValue::from('z').as_char().unwrap(), 'z');
        assert_eq!(PrimitiveValue::from(512i16).as_short().unwrap(), 512);
        assert_eq!(PrimitiveValue::from(42i32).as_int().unwrap(), 42);
        assert_eq!(PrimitiveValue::from(1i64 << 40).as_long().unwrap(), 1 << 40);
        assert_eq!(PrimitiveValue::from(1.5f32).as_float().unwrap(), 1.5);
        assert_eq!(PrimitiveValue::from(2.25f64).as_double().unwrap(), 2.25);
        assert_eq!(PrimitiveValue::from("abc").as_string().unwrap(), "abc");
        assert_eq!(
            PrimitiveValue::from(vec![1u8, 2]).as_byte_array().unwrap(),
            &[1, 2]
        );
    }

    #[test]
    fn test_accessor_wrong_kind() {
        let v = PrimitiveValue::from(42i32);
        match v.as_long() {
            Err(OpenWireError::WrongKind { expected, found }) => {
                assert_eq!(expected, PrimitiveKind::Long);
                assert_eq!(found, PrimitiveKind::Integer);
            }
            other => panic!("Expected WrongKind, got {:?}", other),
        }
        assert!(v.as_string().is_err());
        assert!(v.as_map().is_err());
    }

    #[test]
    fn test_clear_then_any_accessor_fails() {
        let mut v = PrimitiveValue::from("payload");
        v.clear();
        assert!(v.is_null());
        assert_eq!(v.kind(), PrimitiveKind::Null);
        assert!(v.as_bool().is_err());
        assert!(v.as_int().is_err());
        assert!(v.as_string().is_err());
        assert!(v.as_byte_array().is_err());
        assert!(v.as_list().is_err());
        assert!(v.as_map().is_err());
    }

    #[test]
    fn test_replace_switches_kind() {
        let mut v = PrimitiveValue::from(7i32);
        let old = v.replace(PrimitiveValue::from("seven"));
        assert_eq!(old, PrimitiveValue::Integer(7));
        assert_eq!(v.kind(), PrimitiveKind::String);
    }

    #[test]
    fn test_long_string_picks_big_string_kind() {
        let short = "a".repeat(MAX_SHORT_STRING_LEN);
        let long = "a".repeat(MAX_SHORT_STRING_LEN + 1);
        assert_eq!(PrimitiveValue::from(short).kind(), PrimitiveKind::String);
        let big = PrimitiveValue::from(long.clone());
        assert_eq!(big.kind(), PrimitiveKind::BigString);
        assert_eq!(big.as_string().unwrap(), long);
    }

    #[test]
    fn test_equality_is_tag_then_payload() {
        assert_ne!(PrimitiveValue::from(1i32), PrimitiveValue::from(1i64));
        assert_eq!(PrimitiveValue::from(1i32), PrimitiveValue::from(1i32));
        assert_ne!(
            PrimitiveValue::String("x".into()),
            PrimitiveValue::BigString("x".into())
        );
    }

    #[test]
    fn test_nested_deep_copy() {
        let mut inner = PrimitiveList::new();
        inner.push(1i32);
        let mut outer = PrimitiveList::new();
        outer.push(inner);
        let original = PrimitiveValue::from(outer);

        let mut copy = original.clone();
        copy.as_list_mut().unwrap()[0]
            .as_list_mut()
            .unwrap()
            .push(2i32);

        assert_eq!(original.as_list().unwrap()[0].as_list().unwrap().len(), 1);
        assert_eq!(copy.as_list().unwrap()[0].as_list().unwrap().len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(PrimitiveValue::from(true).to_string(), "true");
        assert_eq!(PrimitiveValue::from(42i32).to_string(), "42");
        assert_eq!(PrimitiveValue::from(1.0f64).to_string(), "1.0");
        assert_eq!(PrimitiveValue::from(vec![1u8, 2, 3]).to_string(), "[1][2][3]");
        assert_eq!(PrimitiveValue::Null.to_string(), "null");
    }

    #[test]
    fn test_from_option() {
        assert!(PrimitiveValue::from(None::<i32>).is_null());
        assert_eq!(PrimitiveValue::from(Some(3i32)), PrimitiveValue::Integer(3));
    }
}
