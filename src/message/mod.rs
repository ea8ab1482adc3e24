//! Message bodies.
//!
//! [`Envelope`] holds the body bytes and properties of every message and
//! drives the Building/Frozen/ReadOnly lifecycle. [`StreamMessage`] and
//! [`TextMessage`] layer typed bodies on top of it.

mod envelope;
mod stream;
mod text;

pub use envelope::{BodyState, Envelope};
pub use stream::{can_read_as, StreamMessage, COERCIONS};
pub use text::TextMessage;
