//! Error types for openwire-client.

use thiserror::Error;

use crate::primitive::PrimitiveKind;

/// Main error type for all OpenWire operations.
#[derive(Debug, Error)]
pub enum OpenWireError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (configuration loading only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input ended before a complete value or frame was read.
    #[error("Unexpected end of stream: needed {needed} bytes, {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// No marshaller is registered for the type code.
    #[error("Unknown data type: {0}")]
    UnknownDataType(u8),

    /// Protocol error (bad length, bad magic, wrong nested type, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Requested protocol version is outside 1..=MAX_SUPPORTED_VERSION.
    #[error("Unsupported wire format version: {0}")]
    UnsupportedVersion(i32),

    /// Operation not valid in the current codec state.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A primitive value was accessed as a kind it does not hold.
    #[error("Wrong kind: expected {expected}, found {found}")]
    WrongKind {
        expected: PrimitiveKind,
        found: PrimitiveKind,
    },

    /// Missing key or index in a primitive collection.
    #[error("No such element: {0}")]
    NoSuchElement(String),

    /// A stream body read found no bytes at all.
    #[error("Reached end of message data")]
    EndOfData,

    /// A stream body read found a null value.
    #[error("Value is null")]
    NullValue,

    /// The stored value cannot be read as the requested kind.
    #[error("Cannot read {found} value as {requested}")]
    IncompatibleKind {
        requested: PrimitiveKind,
        found: PrimitiveKind,
    },

    /// Message body content is malformed or could not be converted.
    #[error("Message format error: {0}")]
    MessageFormat(String),

    /// Body write attempted on a read-only body.
    #[error("Message body is read-only")]
    WriteToReadOnly,

    /// Body read attempted before any content was written or received.
    #[error("Message body has no readable content")]
    ReadBeforeContent,

    /// Property write attempted on read-only properties.
    #[error("Message properties are read-only")]
    PropertiesReadOnly,

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The writer queue stayed full past the send timeout.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

impl OpenWireError {
    /// True for failures that leave the stream position undefined.
    ///
    /// These belong to the communication layer: the connection should be
    /// considered broken after one of them.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(
            self,
            OpenWireError::Io(_)
                | OpenWireError::UnexpectedEof { .. }
                | OpenWireError::UnknownDataType(_)
                | OpenWireError::Protocol(_)
        )
    }

    /// True for recoverable stream body conversion failures.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            OpenWireError::IncompatibleKind { .. } | OpenWireError::MessageFormat(_)
        )
    }

    pub(crate) fn eof(needed: usize, available: usize) -> Self {
        OpenWireError::UnexpectedEof { needed, available }
    }
}

/// Result type alias using OpenWireError.
pub type Result<T> = std::result::Result<T, OpenWireError>;
