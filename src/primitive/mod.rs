//! Primitive value model - tagged values, lists, maps and their encoding.

pub mod codec;
mod list;
mod map;
mod value;

pub use list::PrimitiveList;
pub use map::PrimitiveMap;
pub use value::{PrimitiveKind, PrimitiveValue, MAX_SHORT_STRING_LEN};
