//! Ordered list of primitive values.

use std::fmt;
use std::ops::{Deref, DerefMut};

use super::PrimitiveValue;
use crate::error::{OpenWireError, Result};

/// Ordered list of [`PrimitiveValue`]s.
///
/// Derefs to the underlying `Vec`, so indexing and iteration work directly.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimitiveList {
    values: Vec<PrimitiveValue>,
}

macro_rules! list_getter {
    ($name:ident, $accessor:ident, $ty:ty) => {
        pub fn $name(&self, index: usize) -> Result<$ty> {
            self.require(index)?.$accessor()
        }
    };
}

impl PrimitiveList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value.
    pub fn push(&mut self, value: impl Into<PrimitiveValue>) {
        self.values.push(value.into());
    }

    /// Replace the value at `index`, returning the previous one.
    pub fn set(&mut self, index: usize, value: impl Into<PrimitiveValue>) -> Result<PrimitiveValue> {
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, len))?;
        Ok(slot.replace(value.into()))
    }

    fn require(&self, index: usize) -> Result<&PrimitiveValue> {
        self.values
            .get(index)
            .ok_or_else(|| out_of_range(index, self.values.len()))
    }

    list_getter!(get_bool, as_bool, bool);
    list_getter!(get_byte, as_byte, i8);
    list_getter!(get_char, as_char, char);
    list_getter!(get_short, as_short, i16);
    list_getter!(get_int, as_int, i32);
    list_getter!(get_long, as_long, i64);
    list_getter!(get_float, as_float, f32);
    list_getter!(get_double, as_double, f64);

    pub fn get_string(&self, index: usize) -> Result<&str> {
        self.require(index)?.as_string()
    }

    pub fn get_byte_array(&self, index: usize) -> Result<&[u8]> {
        self.require(index)?.as_byte_array()
    }

    pub fn into_inner(self) -> Vec<PrimitiveValue> {
        self.values
    }
}

fn out_of_range(index: usize, len: usize) -> OpenWireError {
    OpenWireError::NoSuchElement(format!("index {index} out of range for list of {len}"))
}

impl Deref for PrimitiveList {
    type Target = Vec<PrimitiveValue>;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl DerefMut for PrimitiveList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}

impl From<Vec<PrimitiveValue>> for PrimitiveList {
    fn from(values: Vec<PrimitiveValue>) -> Self {
        Self { values }
    }
}

impl FromIterator<PrimitiveValue> for PrimitiveList {
    fn from_iter<I: IntoIterator<Item = PrimitiveValue>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for PrimitiveList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let mut list = PrimitiveList::new();
        list.push(true);
        list.push(7i32);
        list.push("seven");

        assert!(list.get_bool(0).unwrap());
        assert_eq!(list.get_int(1).unwrap(), 7);
        assert_eq!(list.get_string(2).unwrap(), "seven");
        assert!(list.get_long(1).is_err());
    }

    #[test]
    fn test_out_of_range() {
        let list = PrimitiveList::new();
        assert!(matches!(
            list.get_int(0),
            Err(OpenWireError::NoSuchElement(_))
        ));
    }

    #[test]
    fn test_set_returns_previous() {
        let mut list: PrimitiveList = vec![PrimitiveValue::from(1i32)].into();
        let old = list.set(0, 2i64).unwrap();
        assert_eq!(old, PrimitiveValue::Integer(1));
        assert_eq!(list.get_long(0).unwrap(), 2);
        assert!(list.set(5, 0i32).is_err());
    }

    #[test]
    fn test_display() {
        let mut list = PrimitiveList::new();
        list.push(1i32);
        list.push("a");
        assert_eq!(list.to_string(), "[1, a]");
    }
}
