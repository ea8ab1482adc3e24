//! Message body and property lifecycle.
//!
//! The body moves through three states:
//!
//! ```text
//!            freeze()            on_send() / received
//! Building ───────────► Frozen ─────────────────────► ReadOnly
//!    ▲                                                    │
//!    └──────────────────── clear_body() ◄─────────────────┘
//! ```
//!
//! - `Building`: writes append to a growable buffer, reads are rejected.
//! - `Frozen`: the buffer became immutable content; reads build a cursor over
//!   it on first use, writes are rejected.
//! - `ReadOnly`: same as frozen, reached after transmission or on receipt.
//!
//! Properties live in their own read/write-locked map and are only locked
//! down when the whole envelope is marked read-only.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::{Bytes, BytesMut};

use crate::error::{OpenWireError, Result};
use crate::primitive::{PrimitiveMap, PrimitiveValue};

/// Lifecycle state of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
    Building,
    Frozen,
    ReadOnly,
}

/// Body buffer plus property bag of a message.
#[derive(Debug)]
pub struct Envelope {
    state: BodyState,
    /// Write buffer, only used while building.
    buffer: BytesMut,
    /// Immutable content once frozen or received.
    content: Bytes,
    /// Read cursor over `content`, created on first read.
    read_pos: Option<usize>,
    properties: RwLock<PrimitiveMap>,
    read_only_properties: bool,
    marshaled_form: RwLock<Option<Bytes>>,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    pub fn new() -> Self {
        Self {
            state: BodyState::Building,
            buffer: BytesMut::new(),
            content: Bytes::new(),
            read_pos: None,
            properties: RwLock::new(PrimitiveMap::new()),
            read_only_properties: false,
            marshaled_form: RwLock::new(None),
        }
    }

    #[inline]
    pub fn state(&self) -> BodyState {
        self.state
    }

    #[inline]
    pub fn is_read_only_body(&self) -> bool {
        self.state == BodyState::ReadOnly
    }

    #[inline]
    pub fn is_read_only_properties(&self) -> bool {
        self.read_only_properties
    }

    pub fn set_read_only_properties(&mut self, read_only: bool) {
        self.read_only_properties = read_only;
    }

    /// `true` freezes the body and locks it. `false` drops a read-only body
    /// back to `Frozen`; writing again still requires [`clear_body`].
    ///
    /// [`clear_body`]: Envelope::clear_body
    pub fn set_read_only_body(&mut self, read_only: bool) {
        if read_only {
            self.freeze();
            self.state = BodyState::ReadOnly;
        } else if self.state == BodyState::ReadOnly {
            self.state = BodyState::Frozen;
        }
    }

    /// Buffer for appending body bytes.
    pub fn body_writer(&mut self) -> Result<&mut BytesMut> {
        match self.state {
            BodyState::Building => {
                self.invalidate_marshaled_form();
                Ok(&mut self.buffer)
            }
            BodyState::Frozen | BodyState::ReadOnly => Err(OpenWireError::WriteToReadOnly),
        }
    }

    /// Frozen content and the read cursor into it.
    pub fn body_reader(&mut self) -> Result<(&[u8], &mut usize)> {
        match self.state {
            BodyState::Building => Err(OpenWireError::ReadBeforeContent),
            BodyState::Frozen | BodyState::ReadOnly => {
                let pos = self.read_pos.get_or_insert(0);
                Ok((&self.content[..], pos))
            }
        }
    }

    /// Materialize the written bytes as immutable content.
    ///
    /// Calling it again only rewinds the read cursor.
    pub fn freeze(&mut self) {
        if self.state == BodyState::Building {
            self.content = self.buffer.split().freeze();
            self.state = BodyState::Frozen;
        }
        self.read_pos = None;
    }

    /// Freeze the body and lock body and properties for transmission.
    pub fn on_send(&mut self) {
        self.freeze();
        self.state = BodyState::ReadOnly;
        self.read_only_properties = true;
    }

    /// Lock a received envelope.
    pub(crate) fn mark_received(&mut self) {
        self.buffer.clear();
        self.read_pos = None;
        self.state = BodyState::ReadOnly;
        self.read_only_properties = true;
    }

    /// Return to `Building`, discarding content and any read position.
    pub fn clear_body(&mut self) {
        self.state = BodyState::Building;
        self.buffer.clear();
        self.content = Bytes::new();
        self.read_pos = None;
        self.invalidate_marshaled_form();
    }

    /// Body bytes as they would be transmitted now.
    pub fn content(&self) -> Bytes {
        match self.state {
            BodyState::Building => Bytes::copy_from_slice(&self.buffer),
            BodyState::Frozen | BodyState::ReadOnly => self.content.clone(),
        }
    }

    pub(crate) fn set_content(&mut self, content: Bytes) {
        self.buffer.clear();
        self.content = content;
        self.read_pos = None;
        self.state = BodyState::Frozen;
    }

    fn read_properties(&self) -> RwLockReadGuard<'_, PrimitiveMap> {
        self.properties.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_properties(&self) -> RwLockWriteGuard<'_, PrimitiveMap> {
        self.properties.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn property(&self, name: &str) -> Option<PrimitiveValue> {
        self.read_properties().get(name).cloned()
    }

    pub fn property_exists(&self, name: &str) -> bool {
        self.read_properties().contains_key(name)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.read_properties().keys().map(str::to_owned).collect()
    }

    /// Set a property. Names must be non-empty.
    pub fn set_property(&self, name: &str, value: impl Into<PrimitiveValue>) -> Result<()> {
        if name.is_empty() {
            return Err(OpenWireError::IllegalState(
                "Property name must not be empty".into(),
            ));
        }
        if self.read_only_properties {
            return Err(OpenWireError::PropertiesReadOnly);
        }
        self.write_properties().set(name, value);
        self.invalidate_marshaled_form();
        Ok(())
    }

    pub fn remove_property(&self, name: &str) -> Result<Option<PrimitiveValue>> {
        if self.read_only_properties {
            return Err(OpenWireError::PropertiesReadOnly);
        }
        let removed = self.write_properties().remove(name);
        self.invalidate_marshaled_form();
        Ok(removed)
    }

    /// Snapshot of all properties.
    pub fn properties(&self) -> PrimitiveMap {
        self.read_properties().clone()
    }

    /// Run `f` against the properties under the read lock.
    pub fn with_properties<R>(&self, f: impl FnOnce(&PrimitiveMap) -> R) -> R {
        f(&self.read_properties())
    }

    pub(crate) fn set_properties(&mut self, properties: PrimitiveMap) {
        *self.write_properties() = properties;
    }

    /// Remove every property and make the bag writable again.
    pub fn clear_properties(&mut self) {
        self.write_properties().clear();
        self.read_only_properties = false;
        self.invalidate_marshaled_form();
    }

    pub(crate) fn marshaled_form(&self) -> Option<Bytes> {
        self.marshaled_form
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_marshaled_form(&self, form: Option<Bytes>) {
        *self
            .marshaled_form
            .write()
            .unwrap_or_else(PoisonError::into_inner) = form;
    }

    pub(crate) fn invalidate_marshaled_form(&self) {
        self.set_marshaled_form(None);
    }
}

impl Clone for Envelope {
    fn clone(&self) -> Self {
        Self {
            state: self.state,
            buffer: self.buffer.clone(),
            content: self.content.clone(),
            read_pos: self.read_pos,
            properties: RwLock::new(self.properties()),
            read_only_properties: self.read_only_properties,
            marshaled_form: RwLock::new(self.marshaled_form()),
        }
    }
}

/// Two envelopes are equal when they carry the same body bytes and the same
/// properties, whatever their lifecycle state.
impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.content() == other.content() && self.properties() == other.properties()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[test]
    fn test_new_envelope_is_building() {
        let mut envelope = Envelope::new();
        assert_eq!(envelope.state(), BodyState::Building);
        assert!(matches!(
            envelope.body_reader(),
            Err(OpenWireError::ReadBeforeContent)
        ));
    }

    #[test]
    fn test_freeze_then_read() {
        let mut envelope = Envelope::new();
        envelope.body_writer().unwrap().put_slice(b"abc");
        envelope.freeze();
        assert_eq!(envelope.state(), BodyState::Frozen);

        let (content, pos) = envelope.body_reader().unwrap();
        assert_eq!(content, b"abc");
        assert_eq!(*pos, 0);
        *pos = 2;
        let (_, pos) = envelope.body_reader().unwrap();
        assert_eq!(*pos, 2);

        // Freezing again rewinds.
        envelope.freeze();
        let (_, pos) = envelope.body_reader().unwrap();
        assert_eq!(*pos, 0);
    }

    #[test]
    fn test_write_after_freeze_rejected() {
        let mut envelope = Envelope::new();
        envelope.freeze();
        assert!(matches!(
            envelope.body_writer(),
            Err(OpenWireError::WriteToReadOnly)
        ));
        envelope.on_send();
        assert!(envelope.is_read_only_body());
        assert!(matches!(
            envelope.body_writer(),
            Err(OpenWireError::WriteToReadOnly)
        ));
    }

    #[test]
    fn test_clear_body_returns_to_building_with_new_content() {
        let mut envelope = Envelope::new();
        envelope.body_writer().unwrap().put_slice(b"first");
        envelope.freeze();
        let first = envelope.content();

        envelope.clear_body();
        assert_eq!(envelope.state(), BodyState::Building);
        envelope.body_writer().unwrap().put_slice(b"second");
        envelope.freeze();
        assert_ne!(envelope.content(), first);
        assert_eq!(&envelope.content()[..], b"second");
    }

    #[test]
    fn test_properties_independent_of_body_state() {
        let mut envelope = Envelope::new();
        envelope.freeze();
        envelope.set_property("color", "red").unwrap();
        assert_eq!(envelope.property("color"), Some(PrimitiveValue::from("red")));

        envelope.on_send();
        assert!(matches!(
            envelope.set_property("color", "blue"),
            Err(OpenWireError::PropertiesReadOnly)
        ));

        envelope.clear_properties();
        assert!(envelope.property_names().is_empty());
        envelope.set_property("color", "blue").unwrap();
    }

    #[test]
    fn test_empty_property_name_rejected() {
        let envelope = Envelope::new();
        assert!(matches!(
            envelope.set_property("", 1i32),
            Err(OpenWireError::IllegalState(_))
        ));
    }

    #[test]
    fn test_equality_ignores_state() {
        let mut building = Envelope::new();
        building.body_writer().unwrap().put_slice(b"xyz");
        let mut received = Envelope::new();
        received.set_content(Bytes::from_static(b"xyz"));
        received.mark_received();
        assert_eq!(building, received);
    }

    #[test]
    fn test_mutation_drops_marshaled_form() {
        let mut envelope = Envelope::new();
        envelope.set_marshaled_form(Some(Bytes::from_static(b"cached")));
        envelope.set_property("k", 1i32).unwrap();
        assert!(envelope.marshaled_form().is_none());

        envelope.set_marshaled_form(Some(Bytes::from_static(b"cached")));
        envelope.body_writer().unwrap();
        assert!(envelope.marshaled_form().is_none());
    }
}
