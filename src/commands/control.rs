//! Connection control commands: wire format negotiation, keep-alive,
//! shutdown and responses.

use std::fmt;

use super::{types, Command, DataStructure};
use crate::primitive::{PrimitiveMap, PrimitiveValue};

/// Magic prefix identifying an OpenWire peer.
pub const MAGIC: [u8; 8] = *b"ActiveMQ";

/// Property keys exchanged in a `WireFormatInfo`.
pub(crate) mod keys {
    pub const STACK_TRACE_ENABLED: &str = "StackTraceEnabled";
    pub const TCP_NO_DELAY_ENABLED: &str = "TcpNoDelayEnabled";
    pub const CACHE_ENABLED: &str = "CacheEnabled";
    pub const CACHE_SIZE: &str = "CacheSize";
    pub const TIGHT_ENCODING_ENABLED: &str = "TightEncodingEnabled";
    pub const SIZE_PREFIX_DISABLED: &str = "SizePrefixDisabled";
    pub const MAX_INACTIVITY_DURATION: &str = "MaxInactivityDuration";
    // Spelled as the brokers expect it.
    pub const MAX_INACTIVITY_DURATION_INITIAL_DELAY: &str = "MaxInactivityDurationInitalDelay";
}

/// Wire format preferences offered by one peer during the handshake.
///
/// It has no command id on the wire; `command_id()` is always 0.
#[derive(Debug, Clone, PartialEq)]
pub struct WireFormatInfo {
    pub magic: [u8; 8],
    pub version: i32,
    properties: PrimitiveMap,
}

impl Default for WireFormatInfo {
    fn default() -> Self {
        Self {
            magic: MAGIC,
            version: 0,
            properties: PrimitiveMap::new(),
        }
    }
}

macro_rules! bool_property {
    ($get:ident, $set:ident, $key:expr) => {
        pub fn $get(&self) -> bool {
            matches!(self.properties.get($key), Some(PrimitiveValue::Boolean(true)))
        }

        pub fn $set(&mut self, value: bool) {
            self.properties.set($key, value);
        }
    };
}

macro_rules! long_property {
    ($get:ident, $set:ident, $key:expr) => {
        pub fn $get(&self) -> i64 {
            match self.properties.get($key) {
                Some(PrimitiveValue::Long(v)) => *v,
                Some(PrimitiveValue::Integer(v)) => *v as i64,
                _ => 0,
            }
        }

        pub fn $set(&mut self, value: i64) {
            self.properties.set($key, value);
        }
    };
}

impl WireFormatInfo {
    pub fn new(version: i32) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// True if the magic identifies an OpenWire peer.
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn properties(&self) -> &PrimitiveMap {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PrimitiveMap {
        &mut self.properties
    }

    pub(crate) fn set_properties(&mut self, properties: PrimitiveMap) {
        self.properties = properties;
    }

    bool_property!(is_stack_trace_enabled, set_stack_trace_enabled, keys::STACK_TRACE_ENABLED);
    bool_property!(is_tcp_no_delay_enabled, set_tcp_no_delay_enabled, keys::TCP_NO_DELAY_ENABLED);
    bool_property!(is_cache_enabled, set_cache_enabled, keys::CACHE_ENABLED);
    bool_property!(
        is_tight_encoding_enabled,
        set_tight_encoding_enabled,
        keys::TIGHT_ENCODING_ENABLED
    );
    bool_property!(is_size_prefix_disabled, set_size_prefix_disabled, keys::SIZE_PREFIX_DISABLED);
    long_property!(
        max_inactivity_duration,
        set_max_inactivity_duration,
        keys::MAX_INACTIVITY_DURATION
    );
    long_property!(
        max_inactivity_duration_initial_delay,
        set_max_inactivity_duration_initial_delay,
        keys::MAX_INACTIVITY_DURATION_INITIAL_DELAY
    );

    pub fn cache_size(&self) -> i32 {
        match self.properties.get(keys::CACHE_SIZE) {
            Some(PrimitiveValue::Integer(v)) => *v,
            Some(PrimitiveValue::Long(v)) => {
                (*v).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
            }
            _ => 0,
        }
    }

    pub fn set_cache_size(&mut self, value: i32) {
        self.properties.set(keys::CACHE_SIZE, value);
    }
}

impl DataStructure for WireFormatInfo {
    fn data_structure_type(&self) -> u8 {
        types::WIREFORMAT_INFO
    }

    fn is_marshal_aware(&self) -> bool {
        true
    }

    fn as_command(&self) -> Option<&dyn Command> {
        Some(self)
    }

    fn into_command(self: Box<Self>) -> Option<Box<dyn Command>> {
        Some(self)
    }
}

impl Command for WireFormatInfo {
    fn command_id(&self) -> i32 {
        0
    }

    fn set_command_id(&mut self, _id: i32) {}

    fn is_response_required(&self) -> bool {
        false
    }

    fn set_response_required(&mut self, _required: bool) {}

    fn as_data_structure(&self) -> &dyn DataStructure {
        self
    }
}

impl fmt::Display for WireFormatInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WireFormatInfo {{ version={}, properties={}, magic={} }}",
            self.version,
            self.properties,
            String::from_utf8_lossy(&self.magic)
        )
    }
}

/// Heartbeat.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeepAliveInfo {
    pub command_id: i32,
    pub response_required: bool,
}

impl_command!(KeepAliveInfo, types::KEEP_ALIVE_INFO);

/// Orderly disconnect notice.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShutdownInfo {
    pub command_id: i32,
    pub response_required: bool,
}

impl_command!(ShutdownInfo, types::SHUTDOWN_INFO);

/// Reply to a command that had `response_required` set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
    pub command_id: i32,
    pub response_required: bool,
    /// `command_id` of the request being answered.
    pub correlation_id: i32,
}

impl Response {
    pub fn for_command(command: &dyn Command) -> Self {
        Self {
            correlation_id: command.command_id(),
            ..Self::default()
        }
    }
}

impl_command!(Response, types::RESPONSE, response);

/// Reply carrying a broker-side failure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExceptionResponse {
    pub command_id: i32,
    pub response_required: bool,
    pub correlation_id: i32,
    pub exception: Option<BrokerError>,
}

impl_command!(ExceptionResponse, types::EXCEPTION_RESPONSE, response);

/// One frame of a remote stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackTraceElement {
    pub class_name: Option<String>,
    pub method_name: Option<String>,
    pub file_name: Option<String>,
    pub line_number: i32,
}

/// Error raised on the broker, as carried by an `ExceptionResponse`.
///
/// The stack trace and cause only survive the wire when stack trace
/// propagation was negotiated on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BrokerError {
    pub exception_class: Option<String>,
    pub message: Option<String>,
    pub stack_trace: Vec<StackTraceElement>,
    pub cause: Option<Box<BrokerError>>,
}

impl BrokerError {
    pub fn new(exception_class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception_class: Some(exception_class.into()),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = self.exception_class.as_deref().unwrap_or("BrokerError");
        match &self.message {
            Some(message) => write!(f, "{class}: {message}"),
            None => f.write_str(class),
        }
    }
}

impl std::error::Error for BrokerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
