//! # openwire-client
//!
//! OpenWire wire-protocol codec for message-broker clients.
//!
//! This crate turns broker commands into OpenWire frames and back, in
//! either the tight or the loose encoding, with or without size prefix,
//! for protocol versions 1 through 9.
//!
//! ## Layout
//!
//! - **Values** ([`primitive`]): the typed scalars, maps and lists carried
//!   in message properties and bodies
//! - **Codec** ([`protocol`], [`marshal`]): flag packing, the marshaller
//!   registry and the [`WireFormat`] engine with its negotiation
//! - **Model** ([`commands`], [`message`]): commands, identifiers and the
//!   message body lifecycle
//! - **Transport** ([`transport`]): reading and writing frames over any
//!   async byte stream, including the opening handshake
//!
//! ## Example
//!
//! ```
//! use openwire_client::commands::KeepAliveInfo;
//! use openwire_client::{WireFormat, WireFormatConfig};
//!
//! let mut wf = WireFormat::new(&WireFormatConfig::default());
//! let remote = WireFormatConfig::default().with_version(6).to_wire_format_info();
//! wf.renegotiate(&remote).unwrap();
//! assert_eq!(wf.version(), 6);
//!
//! let frame = wf.marshal_to_bytes(Some(&KeepAliveInfo::default())).unwrap();
//! let decoded = wf.unmarshal_bytes(&frame).unwrap().unwrap();
//! assert_eq!(decoded.data_structure_type(), 10);
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod marshal;
pub mod message;
pub mod primitive;
pub mod protocol;
pub mod transport;

pub use commands::{Command, DataStructure, MessageCommand};
pub use config::WireFormatConfig;
pub use error::{OpenWireError, Result};
pub use marshal::MarshallerRegistry;
pub use message::{Envelope, StreamMessage, TextMessage};
pub use primitive::{PrimitiveKind, PrimitiveList, PrimitiveMap, PrimitiveValue};
pub use protocol::{BooleanStream, WireFormat};
pub use transport::{negotiate, CommandReader, WriterHandle};
