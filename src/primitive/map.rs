//! Key-ordered map of primitive values.
//!
//! Used for message properties and for the `WireFormatInfo` negotiation
//! properties.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use super::PrimitiveValue;
use crate::error::{OpenWireError, Result};

/// Map from name to [`PrimitiveValue`], iterated in key order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimitiveMap {
    entries: BTreeMap<String, PrimitiveValue>,
}

macro_rules! map_getter {
    ($name:ident, $accessor:ident, $ty:ty) => {
        pub fn $name(&self, key: &str) -> Result<$ty> {
            self.require(key)?.$accessor()
        }
    };
}

impl PrimitiveMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value, returning the previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PrimitiveValue>) -> Option<PrimitiveValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&PrimitiveValue> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PrimitiveValue> {
        self.entries.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PrimitiveValue> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PrimitiveValue> {
        self.entries.iter()
    }

    fn require(&self, key: &str) -> Result<&PrimitiveValue> {
        self.entries
            .get(key)
            .ok_or_else(|| OpenWireError::NoSuchElement(format!("no value for key '{key}'")))
    }

    map_getter!(get_bool, as_bool, bool);
    map_getter!(get_byte, as_byte, i8);
    map_getter!(get_char, as_char, char);
    map_getter!(get_short, as_short, i16);
    map_getter!(get_int, as_int, i32);
    map_getter!(get_long, as_long, i64);
    map_getter!(get_float, as_float, f32);
    map_getter!(get_double, as_double, f64);

    pub fn get_string(&self, key: &str) -> Result<&str> {
        self.require(key)?.as_string()
    }

    pub fn get_byte_array(&self, key: &str) -> Result<&[u8]> {
        self.require(key)?.as_byte_array()
    }
}

impl<'a> IntoIterator for &'a PrimitiveMap {
    type Item = (&'a String, &'a PrimitiveValue);
    type IntoIter = btree_map::Iter<'a, String, PrimitiveValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<K: Into<String>, V: Into<PrimitiveValue>> FromIterator<(K, V)> for PrimitiveMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for PrimitiveMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::PrimitiveList;

    #[test]
    fn test_set_and_typed_get() {
        let mut map = PrimitiveMap::new();
        map.set("CacheSize", 1024i32);
        map.set("TightEncodingEnabled", true);
        map.set("name", "queue://orders");

        assert_eq!(map.get_int("CacheSize").unwrap(), 1024);
        assert!(map.get_bool("TightEncodingEnabled").unwrap());
        assert_eq!(map.get_string("name").unwrap(), "queue://orders");
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_missing_and_wrong_kind() {
        let mut map = PrimitiveMap::new();
        map.set("n", 1i32);
        assert!(matches!(
            map.get_int("absent"),
            Err(OpenWireError::NoSuchElement(_))
        ));
        assert!(matches!(
            map.get_bool("n"),
            Err(OpenWireError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_keys_are_ordered() {
        let map: PrimitiveMap = [("b", 2i32), ("a", 1i32), ("c", 3i32)].into_iter().collect();
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_map_of_lists_equality() {
        let mut list = PrimitiveList::new();
        list.push(1i32);
        list.push("two");

        let mut a = PrimitiveMap::new();
        a.set("list", list.clone());
        let mut b = PrimitiveMap::new();
        b.set("list", list);
        assert_eq!(a, b);

        b.get_mut("list").unwrap().as_list_mut().unwrap().push(3i32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let map: PrimitiveMap = [("x", 1i32), ("y", 2i32)].into_iter().collect();
        assert_eq!(map.to_string(), "{x=1, y=2}");
    }
}
