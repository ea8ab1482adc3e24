//! Message header shared by every message kind.

use bytes::Bytes;

use super::{
    types, ActiveMQDestination, BrokerId, ConsumerId, DataStructure, LocalTransactionId,
    MessageId, ProducerId,
};
use crate::error::Result;
use crate::message::{BodyState, Envelope};
use crate::primitive::{codec, PrimitiveValue};

/// Priority assigned to messages that never set one.
pub const DEFAULT_PRIORITY: u8 = 4;

/// Header fields plus the body/property envelope of a message.
///
/// Concrete message kinds wrap a `Message` and implement [`MessageCommand`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub command_id: i32,
    pub response_required: bool,
    pub producer_id: Option<ProducerId>,
    pub destination: Option<ActiveMQDestination>,
    pub transaction_id: Option<LocalTransactionId>,
    pub original_destination: Option<ActiveMQDestination>,
    pub message_id: Option<MessageId>,
    pub original_transaction_id: Option<LocalTransactionId>,
    pub group_id: Option<String>,
    pub group_sequence: i32,
    pub correlation_id: Option<String>,
    pub persistent: bool,
    pub expiration: i64,
    pub priority: u8,
    pub reply_to: Option<ActiveMQDestination>,
    pub timestamp: i64,
    pub message_type: Option<String>,
    pub data_structure: Option<Box<dyn DataStructure>>,
    pub target_consumer_id: Option<ConsumerId>,
    /// Carried as a flag only; bodies are never compressed here.
    pub compressed: bool,
    pub redelivery_counter: i32,
    pub broker_path: Option<Vec<BrokerId>>,
    pub arrival: i64,
    pub user_id: Option<String>,
    pub received_by_dfbridge: bool,
    /// Version 2 and later.
    pub droppable: bool,
    /// Version 3 and later.
    pub cluster: Option<Vec<BrokerId>>,
    /// Version 3 and later.
    pub broker_in_time: i64,
    /// Version 3 and later.
    pub broker_out_time: i64,
    envelope: Envelope,
    /// Encoded properties received off the wire, decoded by `after_unmarshal`.
    marshalled_properties: Option<Bytes>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            command_id: 0,
            response_required: false,
            producer_id: None,
            destination: None,
            transaction_id: None,
            original_destination: None,
            message_id: None,
            original_transaction_id: None,
            group_id: None,
            group_sequence: 0,
            correlation_id: None,
            persistent: false,
            expiration: 0,
            priority: DEFAULT_PRIORITY,
            reply_to: None,
            timestamp: 0,
            message_type: None,
            data_structure: None,
            target_consumer_id: None,
            compressed: false,
            redelivery_counter: 0,
            broker_path: None,
            arrival: 0,
            user_id: None,
            received_by_dfbridge: false,
            droppable: false,
            cluster: None,
            broker_in_time: 0,
            broker_out_time: 0,
            envelope: Envelope::new(),
            marshalled_properties: None,
        }
    }
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    #[inline]
    pub fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    /// Body bytes as they would be transmitted now.
    pub fn content(&self) -> Bytes {
        self.envelope.content()
    }

    pub(crate) fn set_received_content(&mut self, content: Option<Bytes>) {
        self.envelope.set_content(content.unwrap_or_default());
    }

    /// Properties in their encoded form, `None` when there are none.
    pub(crate) fn encoded_properties(&self) -> Result<Option<Bytes>> {
        if let Some(raw) = &self.marshalled_properties {
            return Ok(Some(raw.clone()));
        }
        self.envelope.with_properties(|properties| {
            if properties.is_empty() {
                Ok(None)
            } else {
                codec::marshal_map_to_bytes(properties).map(Some)
            }
        })
    }

    pub(crate) fn set_marshalled_properties(&mut self, raw: Option<Bytes>) {
        self.marshalled_properties = raw;
    }

    pub fn property(&self, name: &str) -> Option<PrimitiveValue> {
        self.envelope.property(name)
    }

    pub fn set_property(&self, name: &str, value: impl Into<PrimitiveValue>) -> Result<()> {
        self.envelope.set_property(name, value)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.envelope.property_names()
    }

    pub fn clear_properties(&mut self) {
        self.envelope.clear_properties();
    }

    /// Materialize a body still being built. Called before the first
    /// transmit attempt so the encoded bytes cannot drift from the body.
    pub fn freeze_for_send(&mut self) {
        if self.envelope.state() == BodyState::Building {
            self.envelope.freeze();
        }
    }

    /// Freeze the body and lock the message for transmission.
    pub fn on_send(&mut self) {
        self.envelope.on_send();
    }

    /// True once the message was sent or received.
    pub fn is_read_only(&self) -> bool {
        self.envelope.is_read_only_body() && self.envelope.is_read_only_properties()
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expiration > 0 && self.expiration < now_millis
    }

    /// Cached tight frame, if one was stored and not invalidated since.
    pub fn marshaled_form(&self) -> Option<Bytes> {
        self.envelope.marshaled_form()
    }

    pub(crate) fn set_marshaled_form(&self, form: Bytes) {
        self.envelope.set_marshaled_form(Some(form));
    }

    /// Drop the cached frame. Needed after writing header fields directly,
    /// since only body and property writes invalidate it.
    pub fn clear_marshaled_form(&self) {
        self.envelope.invalidate_marshaled_form();
    }

    pub(crate) fn after_unmarshal(&mut self) -> Result<()> {
        if let Some(raw) = self.marshalled_properties.take() {
            let properties = codec::unmarshal_map_from_bytes(&raw)?;
            self.envelope.set_properties(properties);
        }
        self.envelope.mark_received();
        Ok(())
    }
}

/// A command carrying a [`Message`].
pub trait MessageCommand: super::Command {
    fn message(&self) -> &Message;
    fn message_mut(&mut self) -> &mut Message;
    fn to_command(&self) -> &dyn super::Command;
}

/// Implements the data structure, command and message traits for a type
/// holding its header in a `message: Message` field.
macro_rules! impl_message_command {
    ($ty:ty, $code:expr) => {
        impl $crate::commands::DataStructure for $ty {
            fn data_structure_type(&self) -> u8 {
                $code
            }

            fn is_marshal_aware(&self) -> bool {
                true
            }

            fn marshaled_form(&self) -> Option<::bytes::Bytes> {
                self.message.marshaled_form()
            }

            fn after_unmarshal(
                &mut self,
                _wire_format: &$crate::protocol::WireFormat,
            ) -> $crate::error::Result<()> {
                self.message.after_unmarshal()
            }

            fn as_command(&self) -> Option<&dyn $crate::commands::Command> {
                Some(self)
            }

            fn into_command(self: Box<Self>) -> Option<Box<dyn $crate::commands::Command>> {
                Some(self)
            }

            fn as_message(&self) -> Option<&dyn $crate::commands::MessageCommand> {
                Some(self)
            }
        }

        impl $crate::commands::Command for $ty {
            fn command_id(&self) -> i32 {
                self.message.command_id
            }

            fn set_command_id(&mut self, id: i32) {
                self.message.command_id = id;
            }

            fn is_response_required(&self) -> bool {
                self.message.response_required
            }

            fn set_response_required(&mut self, required: bool) {
                self.message.response_required = required;
            }

            fn as_data_structure(&self) -> &dyn $crate::commands::DataStructure {
                self
            }
        }

        impl $crate::commands::MessageCommand for $ty {
            fn message(&self) -> &$crate::commands::Message {
                &self.message
            }

            fn message_mut(&mut self) -> &mut $crate::commands::Message {
                &mut self.message
            }

            fn to_command(&self) -> &dyn $crate::commands::Command {
                self
            }
        }
    };
}

pub(crate) use impl_message_command;

/// Plain message with an opaque body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActiveMQMessage {
    message: Message,
}

impl ActiveMQMessage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl_message_command!(ActiveMQMessage, types::ACTIVEMQ_MESSAGE);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Command, MessageCommand};
    use crate::error::OpenWireError;
    use bytes::BufMut;

    #[test]
    fn test_defaults() {
        let message = ActiveMQMessage::new();
        assert_eq!(message.message().priority, DEFAULT_PRIORITY);
        assert!(message.is_marshal_aware());
        assert!(message.as_message().is_some());
        assert_eq!(message.data_structure_type(), types::ACTIVEMQ_MESSAGE);
    }

    #[test]
    fn test_command_fields_delegate_to_header() {
        let mut message = ActiveMQMessage::new();
        message.set_command_id(12);
        message.set_response_required(true);
        assert_eq!(message.message().command_id, 12);
        assert!(message.message().response_required);
    }

    #[test]
    fn test_after_unmarshal_decodes_properties_and_locks() {
        let mut map = crate::primitive::PrimitiveMap::new();
        map.set("n", 7i32);
        let raw = codec::marshal_map_to_bytes(&map).unwrap();

        let mut message = Message::new();
        message.set_received_content(Some(Bytes::from_static(b"body")));
        message.set_marshalled_properties(Some(raw));
        message.after_unmarshal().unwrap();

        assert_eq!(message.property("n"), Some(PrimitiveValue::Integer(7)));
        assert!(message.is_read_only());
        assert!(matches!(
            message.set_property("n", 8i32),
            Err(OpenWireError::PropertiesReadOnly)
        ));
        assert_eq!(&message.content()[..], b"body");
    }

    #[test]
    fn test_body_write_drops_cached_form() {
        let mut message = Message::new();
        message.set_marshaled_form(Bytes::from_static(b"frame"));
        assert!(message.marshaled_form().is_some());
        message.envelope_mut().body_writer().unwrap().put_u8(1);
        assert!(message.marshaled_form().is_none());
    }

    #[test]
    fn test_encoded_properties_empty_is_none() {
        let message = Message::new();
        assert!(message.encoded_properties().unwrap().is_none());
        message.set_property("a", true).unwrap();
        assert!(message.encoded_properties().unwrap().is_some());
    }

    #[test]
    fn test_expiration() {
        let mut message = Message::new();
        assert!(!message.is_expired(1_000));
        message.expiration = 500;
        assert!(message.is_expired(1_000));
        assert!(!message.is_expired(100));
    }
}
