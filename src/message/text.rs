//! Text message: the body holds one optional string.

use bytes::BufMut;

use crate::commands::{impl_message_command, types, Message};
use crate::error::{OpenWireError, Result};
use crate::protocol::{decode_modified_utf8, DataInput, DataOutput};

/// Message carrying a single string body.
///
/// The body is an i32 length followed by modified UTF-8; a length of -1
/// stands for "no text".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextMessage {
    message: Message,
}

impl_message_command!(TextMessage, types::ACTIVEMQ_TEXT_MESSAGE);

impl TextMessage {
    pub fn new(text: &str) -> Result<Self> {
        let mut message = Self::default();
        message.set_text(Some(text))?;
        Ok(message)
    }

    /// Replace the body. Fails once the body is read-only.
    pub fn set_text(&mut self, text: Option<&str>) -> Result<()> {
        let envelope = self.message.envelope_mut();
        if envelope.is_read_only_body() {
            return Err(OpenWireError::WriteToReadOnly);
        }
        envelope.clear_body();
        let out = envelope.body_writer()?;
        match text {
            Some(text) => out.write_utf32(text)?,
            None => out.put_i32(-1),
        }
        Ok(())
    }

    /// Decode the body. An empty body reads as no text.
    pub fn text(&self) -> Result<Option<String>> {
        let content = self.message.content();
        if content.is_empty() {
            return Ok(None);
        }
        let mut input = DataInput::new(&content);
        let length = input.read_i32()?;
        if length < 0 {
            return Ok(None);
        }
        let bytes = input.read_bytes(length as usize)?;
        decode_modified_utf8(bytes).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{DataStructure, MessageCommand};

    #[test]
    fn test_text_round_trip() {
        let message = TextMessage::new("héllo \u{0}").unwrap();
        assert_eq!(message.text().unwrap().as_deref(), Some("héllo \u{0}"));
        assert_eq!(message.data_structure_type(), 28);
    }

    #[test]
    fn test_null_text() {
        let mut message = TextMessage::default();
        assert_eq!(message.text().unwrap(), None);
        message.set_text(None).unwrap();
        assert_eq!(&message.message().content()[..], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(message.text().unwrap(), None);
    }

    #[test]
    fn test_set_text_replaces_and_respects_read_only() {
        let mut message = TextMessage::new("one").unwrap();
        message.set_text(Some("two")).unwrap();
        assert_eq!(message.text().unwrap().as_deref(), Some("two"));

        message.message_mut().on_send();
        assert!(matches!(
            message.set_text(Some("three")),
            Err(OpenWireError::WriteToReadOnly)
        ));
        assert_eq!(message.text().unwrap().as_deref(), Some("two"));
    }
}
