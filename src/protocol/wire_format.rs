//! The OpenWire marshalling engine.
//!
//! A frame on the wire is:
//! ```text
//! ┌──────────────┬─────────┬──────────────────────────────┐
//! │ Size         │ Type    │ Payload                      │
//! │ i32 BE       │ u8      │ tight: flags + fields        │
//! │ (optional)   │         │ loose: fields with markers   │
//! └──────────────┴─────────┴──────────────────────────────┘
//! ```
//!
//! The size counts the type byte and the payload. It is omitted when the
//! peers negotiated `SizePrefixDisabled`. Type 0 is the null frame.
//!
//! Until a handshake completes the engine speaks the protocol defaults
//! (version 1, loose, size-prefixed). [`WireFormat::renegotiate`] combines
//! the locally preferred [`WireFormatInfo`] with the remote offer.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use super::{BooleanStream, DataInput, DataOutput};
use crate::commands::{types, Command, DataStructure, MessageCommand, WireFormatInfo};
use crate::config::WireFormatConfig;
use crate::error::{OpenWireError, Result};
use crate::marshal::{DataStreamMarshaller, MarshallerRegistry};

/// Type code of the null frame.
pub const NULL_TYPE: u8 = types::NULL;

/// Version spoken before negotiation.
pub const DEFAULT_VERSION: i32 = 1;

/// Highest protocol version this codec can produce.
pub const MAX_SUPPORTED_VERSION: i32 = 9;

/// Largest frame accepted unless configured otherwise.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = i32::MAX as u32;

/// Size prefix length in bytes.
pub const SIZE_PREFIX_LEN: usize = 4;

/// Effective session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFormatSettings {
    pub version: i32,
    pub stack_trace_enabled: bool,
    pub tcp_no_delay_enabled: bool,
    pub cache_enabled: bool,
    pub cache_size: i32,
    pub tight_encoding_enabled: bool,
    pub size_prefix_disabled: bool,
    pub max_inactivity_duration: i64,
    pub max_inactivity_duration_initial_delay: i64,
}

impl Default for WireFormatSettings {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            stack_trace_enabled: true,
            tcp_no_delay_enabled: false,
            cache_enabled: false,
            cache_size: 0,
            tight_encoding_enabled: false,
            size_prefix_disabled: false,
            max_inactivity_duration: 0,
            max_inactivity_duration_initial_delay: 0,
        }
    }
}

impl WireFormatSettings {
    /// Settings offered by one peer.
    pub fn from_info(info: &WireFormatInfo) -> Self {
        Self {
            version: info.version,
            stack_trace_enabled: info.is_stack_trace_enabled(),
            tcp_no_delay_enabled: info.is_tcp_no_delay_enabled(),
            cache_enabled: info.is_cache_enabled(),
            cache_size: info.cache_size(),
            tight_encoding_enabled: info.is_tight_encoding_enabled(),
            size_prefix_disabled: info.is_size_prefix_disabled(),
            max_inactivity_duration: info.max_inactivity_duration(),
            max_inactivity_duration_initial_delay: info.max_inactivity_duration_initial_delay(),
        }
    }

    /// Minimum of every numeric setting, AND of every flag.
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            version: self.version.min(other.version),
            stack_trace_enabled: self.stack_trace_enabled && other.stack_trace_enabled,
            tcp_no_delay_enabled: self.tcp_no_delay_enabled && other.tcp_no_delay_enabled,
            cache_enabled: self.cache_enabled && other.cache_enabled,
            cache_size: self.cache_size.min(other.cache_size),
            tight_encoding_enabled: self.tight_encoding_enabled && other.tight_encoding_enabled,
            size_prefix_disabled: self.size_prefix_disabled && other.size_prefix_disabled,
            max_inactivity_duration: self.max_inactivity_duration.min(other.max_inactivity_duration),
            max_inactivity_duration_initial_delay: self
                .max_inactivity_duration_initial_delay
                .min(other.max_inactivity_duration_initial_delay),
        }
    }
}

/// Clears the receiving flag on every exit path.
struct ReceivingGuard<'a>(&'a AtomicBool);

impl<'a> ReceivingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ReceivingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Marshals commands to frames and back.
///
/// Configuration and negotiation take `&mut self`; marshalling takes `&self`
/// so one negotiated instance can be shared by a reader and a writer.
/// Callers sharing one output stream must still hand whole frames to it one
/// at a time.
pub struct WireFormat {
    registry: MarshallerRegistry,
    settings: WireFormatSettings,
    preferred: Option<WireFormatInfo>,
    negotiated: bool,
    max_frame_size: u32,
    traffic_started: AtomicBool,
    receiving: AtomicBool,
}

impl WireFormat {
    /// Engine with every built-in marshaller and `config` as the preferred
    /// settings for the handshake.
    pub fn new(config: &WireFormatConfig) -> Self {
        let mut wf = Self::default();
        wf.preferred = Some(config.to_wire_format_info());
        wf.max_frame_size = config.max_frame_size;
        wf
    }

    /// Engine over a caller-supplied registry, with no preferred settings.
    pub fn with_registry(registry: MarshallerRegistry) -> Self {
        Self {
            registry,
            settings: WireFormatSettings::default(),
            preferred: None,
            negotiated: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            traffic_started: AtomicBool::new(false),
            receiving: AtomicBool::new(false),
        }
    }

    // ---- settings ----

    #[inline]
    pub fn version(&self) -> i32 {
        self.settings.version
    }

    #[inline]
    pub fn is_stack_trace_enabled(&self) -> bool {
        self.settings.stack_trace_enabled
    }

    #[inline]
    pub fn is_tight_encoding_enabled(&self) -> bool {
        self.settings.tight_encoding_enabled
    }

    #[inline]
    pub fn is_size_prefix_disabled(&self) -> bool {
        self.settings.size_prefix_disabled
    }

    #[inline]
    pub fn is_cache_enabled(&self) -> bool {
        self.settings.cache_enabled
    }

    #[inline]
    pub fn is_tcp_no_delay_enabled(&self) -> bool {
        self.settings.tcp_no_delay_enabled
    }

    pub fn settings(&self) -> WireFormatSettings {
        self.settings
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: u32) {
        self.max_frame_size = max_frame_size;
    }

    /// True once a handshake completed.
    pub fn is_negotiated(&self) -> bool {
        self.negotiated
    }

    /// True once a frame other than a `WireFormatInfo` was marshalled or
    /// unmarshalled.
    pub fn traffic_started(&self) -> bool {
        self.traffic_started.load(Ordering::Acquire)
    }

    /// True while an unmarshal call is in progress.
    pub fn is_receiving(&self) -> bool {
        self.receiving.load(Ordering::Acquire)
    }

    /// Select the protocol version. Out-of-range values leave the current
    /// version untouched. After negotiation the version may only be lowered,
    /// and only before traffic flows.
    pub fn set_version(&mut self, version: i32) -> Result<()> {
        if !(1..=MAX_SUPPORTED_VERSION).contains(&version) {
            return Err(OpenWireError::UnsupportedVersion(version));
        }
        if self.negotiated && (version > self.settings.version || self.traffic_started()) {
            return Err(OpenWireError::IllegalState(format!(
                "Cannot change negotiated version {} to {version}",
                self.settings.version
            )));
        }
        self.settings.version = version;
        Ok(())
    }

    fn ensure_not_negotiated(&self, setting: &str) -> Result<()> {
        if self.negotiated {
            return Err(OpenWireError::IllegalState(format!(
                "{setting} is fixed once negotiation completed"
            )));
        }
        Ok(())
    }

    pub fn set_stack_trace_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_not_negotiated("StackTraceEnabled")?;
        self.settings.stack_trace_enabled = enabled;
        Ok(())
    }

    pub fn set_tight_encoding_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_not_negotiated("TightEncodingEnabled")?;
        self.settings.tight_encoding_enabled = enabled;
        Ok(())
    }

    pub fn set_size_prefix_disabled(&mut self, disabled: bool) -> Result<()> {
        self.ensure_not_negotiated("SizePrefixDisabled")?;
        self.settings.size_prefix_disabled = disabled;
        Ok(())
    }

    pub fn set_tcp_no_delay_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_not_negotiated("TcpNoDelayEnabled")?;
        self.settings.tcp_no_delay_enabled = enabled;
        Ok(())
    }

    /// Cache encoding is never produced by this codec; enabling it is only
    /// recorded so it can be advertised as off.
    pub fn set_cache_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_not_negotiated("CacheEnabled")?;
        if enabled {
            warn!("Cache encoding requested; cached fields are written in nested form");
        }
        self.settings.cache_enabled = false;
        Ok(())
    }

    // ---- preferred info and negotiation ----

    pub fn preferred(&self) -> Option<&WireFormatInfo> {
        self.preferred.as_ref()
    }

    /// Install the local preferences used by the next handshake.
    pub fn set_preferred(&mut self, info: WireFormatInfo) -> Result<()> {
        self.ensure_not_negotiated("Preferred wire format")?;
        debug!(preferred = %info, "Preferred wire format installed");
        self.preferred = Some(info);
        Ok(())
    }

    /// Apply the remote peer's offer.
    ///
    /// The first call sets every setting to the intersection of the local
    /// preference and the remote offer. Later calls can only lower the
    /// version, and only before traffic has started.
    pub fn renegotiate(&mut self, remote: &WireFormatInfo) -> Result<()> {
        let Some(preferred) = &self.preferred else {
            return Err(OpenWireError::IllegalState(
                "Wire format cannot be negotiated without a preferred WireFormatInfo".into(),
            ));
        };
        if !remote.is_valid() {
            warn!(magic = ?remote.magic, "Remote WireFormatInfo has invalid magic");
            return Err(OpenWireError::Protocol(
                "Remote WireFormatInfo does not carry the OpenWire magic".into(),
            ));
        }
        if remote.version < 1 {
            return Err(OpenWireError::UnsupportedVersion(remote.version));
        }

        let local = WireFormatSettings::from_info(preferred);
        let offered = WireFormatSettings::from_info(remote);

        if self.negotiated {
            if self.traffic_started() {
                return Err(OpenWireError::IllegalState(
                    "Wire format cannot be renegotiated after traffic started".into(),
                ));
            }
            let version = self.settings.version.min(offered.version);
            debug!(
                previous = self.settings.version,
                version, "Wire format version renegotiated"
            );
            self.settings.version = version;
            return Ok(());
        }

        let mut effective = local.intersect(&offered);
        effective.version = effective.version.clamp(1, MAX_SUPPORTED_VERSION);
        if effective.cache_enabled {
            warn!("Cache encoding negotiated on; cached fields are written in nested form");
            effective.cache_enabled = false;
        }

        debug!(
            local_version = local.version,
            remote_version = offered.version,
            version = effective.version,
            tight = effective.tight_encoding_enabled,
            size_prefix_disabled = effective.size_prefix_disabled,
            stack_trace = effective.stack_trace_enabled,
            cache_size = effective.cache_size,
            "Wire format negotiated"
        );

        self.settings = effective;
        self.negotiated = true;
        Ok(())
    }

    // ---- registry ----

    pub fn registry(&self) -> &MarshallerRegistry {
        &self.registry
    }

    /// Install an additional marshaller, replacing any registered for the
    /// same type code. Only allowed before traffic flows.
    pub fn register(
        &mut self,
        marshaller: Box<dyn DataStreamMarshaller>,
    ) -> Result<Option<Box<dyn DataStreamMarshaller>>> {
        if self.traffic_started() {
            return Err(OpenWireError::IllegalState(
                "Marshallers must be registered before traffic starts".into(),
            ));
        }
        self.registry.register(marshaller)
    }

    fn note_traffic(&self, code: u8) {
        if code != types::WIREFORMAT_INFO {
            self.traffic_started.store(true, Ordering::Release);
        }
    }

    // ---- top-level frames ----

    /// Append one frame for `command` (or the null frame for `None`).
    ///
    /// On error `out` is left exactly as it was.
    pub fn marshal(&self, command: Option<&dyn Command>, out: &mut BytesMut) -> Result<()> {
        let start = out.len();
        let result = match command {
            None => {
                self.marshal_null(out);
                Ok(())
            }
            Some(command) => self.marshal_command(command.as_data_structure(), out),
        };
        if result.is_err() {
            out.truncate(start);
        }
        result
    }

    /// Marshal into a fresh buffer.
    pub fn marshal_to_bytes(&self, command: Option<&dyn Command>) -> Result<Bytes> {
        let mut out = BytesMut::new();
        self.marshal(command, &mut out)?;
        Ok(out.freeze())
    }

    fn marshal_null(&self, out: &mut BytesMut) {
        if !self.settings.size_prefix_disabled {
            out.put_i32(1);
        }
        out.put_u8(NULL_TYPE);
        trace!("Marshalled null frame");
    }

    fn marshal_command(&self, o: &dyn DataStructure, out: &mut BytesMut) -> Result<()> {
        let code = o.data_structure_type();
        let marshaller = self.registry.lookup(code)?;
        self.note_traffic(code);

        if self.settings.tight_encoding_enabled {
            self.tight_frame(marshaller, o, !self.settings.size_prefix_disabled, out)
        } else {
            self.loose_frame(marshaller, o, out)
        }
    }

    fn check_frame_size(&self, size: usize) -> Result<i32> {
        match i32::try_from(size) {
            Ok(size) if size as u32 <= self.max_frame_size => Ok(size),
            _ => Err(OpenWireError::Protocol(format!(
                "Frame size of {size} is larger than the maximum of {}",
                self.max_frame_size
            ))),
        }
    }

    fn tight_frame(
        &self,
        marshaller: &dyn DataStreamMarshaller,
        o: &dyn DataStructure,
        size_prefixed: bool,
        out: &mut BytesMut,
    ) -> Result<()> {
        let code = marshaller.data_structure_type();
        let mut bs = BooleanStream::new();
        let payload = marshaller.tight_marshal1(self, o, &mut bs)?;
        let size = 1 + bs.marshalled_size() + payload;
        let size_field = self.check_frame_size(size)?;

        out.reserve(size + SIZE_PREFIX_LEN);
        if size_prefixed {
            out.put_i32(size_field);
        }
        out.put_u8(code);
        bs.marshal(out)?;
        marshaller.tight_marshal2(self, o, out, &mut bs)?;

        trace!(data_type = code, size, encoding = "tight", "Marshalled frame");
        Ok(())
    }

    fn loose_frame(
        &self,
        marshaller: &dyn DataStreamMarshaller,
        o: &dyn DataStructure,
        out: &mut BytesMut,
    ) -> Result<()> {
        let code = marshaller.data_structure_type();
        if self.settings.size_prefix_disabled {
            out.put_u8(code);
            marshaller.loose_marshal(self, o, out)?;
            trace!(data_type = code, encoding = "loose", "Marshalled frame");
            return Ok(());
        }

        // Reserve the prefix and fill it in once the frame is complete.
        let prefix_at = out.len();
        out.put_i32(0);
        out.put_u8(code);
        marshaller.loose_marshal(self, o, out)?;
        let size = out.len() - prefix_at - SIZE_PREFIX_LEN;
        let size_field = self.check_frame_size(size)?;
        out[prefix_at..prefix_at + SIZE_PREFIX_LEN].copy_from_slice(&size_field.to_be_bytes());

        trace!(data_type = code, size, encoding = "loose", "Marshalled frame");
        Ok(())
    }

    /// Read one frame. `Ok(None)` is the null frame.
    ///
    /// On error the cursor is moved back to where the frame started, so a
    /// caller that ran out of bytes can retry once more data arrived.
    pub fn unmarshal(&self, input: &mut DataInput<'_>) -> Result<Option<Box<dyn Command>>> {
        let _guard = ReceivingGuard::enter(&self.receiving);
        let start = input.position();
        let result = if self.settings.size_prefix_disabled {
            self.unmarshal_body(input)
        } else {
            self.read_size(input).and_then(|size| {
                let frame = input.read_bytes(size)?;
                self.unmarshal_body(&mut DataInput::new(frame))
            })
        };
        if result.is_err() {
            input.set_position(start);
        }
        result
    }

    /// Decode a frame whose size prefix was already consumed.
    pub fn unmarshal_frame(&self, frame: &[u8]) -> Result<Option<Box<dyn Command>>> {
        let _guard = ReceivingGuard::enter(&self.receiving);
        self.unmarshal_body(&mut DataInput::new(frame))
    }

    /// Unmarshal one frame from the start of `bytes`.
    pub fn unmarshal_bytes(&self, bytes: &[u8]) -> Result<Option<Box<dyn Command>>> {
        self.unmarshal(&mut DataInput::new(bytes))
    }

    fn read_size(&self, input: &mut DataInput<'_>) -> Result<usize> {
        let size = input.read_i32()?;
        if size < 1 {
            return Err(OpenWireError::Protocol(format!("Invalid frame size: {size}")));
        }
        if size as u32 > self.max_frame_size {
            warn!(size, max = self.max_frame_size, "Inbound frame exceeds maximum size");
            return Err(OpenWireError::Protocol(format!(
                "Frame size of {size} is larger than the maximum of {}",
                self.max_frame_size
            )));
        }
        Ok(size as usize)
    }

    fn unmarshal_body(&self, input: &mut DataInput<'_>) -> Result<Option<Box<dyn Command>>> {
        let code = input.read_u8()?;
        if code == NULL_TYPE {
            trace!("Unmarshalled null frame");
            return Ok(None);
        }
        let marshaller = self.registry.lookup(code)?;
        let mut o = marshaller.create_object();
        if self.settings.tight_encoding_enabled {
            let mut bs = BooleanStream::unmarshal(input)?;
            marshaller.tight_unmarshal(self, o.as_mut(), input, &mut bs)?;
        } else {
            marshaller.loose_unmarshal(self, o.as_mut(), input)?;
        }
        o.after_unmarshal(self)?;
        self.note_traffic(code);

        trace!(
            data_type = code,
            encoding = if self.settings.tight_encoding_enabled { "tight" } else { "loose" },
            "Unmarshalled frame"
        );
        o.into_command().map(Some).ok_or_else(|| {
            OpenWireError::Protocol(format!("Data structure type {code} is not a command"))
        })
    }

    // ---- nested objects ----

    /// First tight pass for an embedded object.
    pub fn tight_marshal_nested1(
        &self,
        o: Option<&dyn DataStructure>,
        bs: &mut BooleanStream,
    ) -> Result<usize> {
        bs.write_boolean(o.is_some());
        let Some(o) = o else {
            return Ok(0);
        };
        if o.is_marshal_aware() {
            let cached = o.marshaled_form();
            bs.write_boolean(cached.is_some());
            if let Some(form) = cached {
                return Ok(1 + form.len());
            }
        }
        let marshaller = self.registry.lookup(o.data_structure_type())?;
        Ok(1 + marshaller.tight_marshal1(self, o, bs)?)
    }

    pub fn tight_marshal_nested2(
        &self,
        o: Option<&dyn DataStructure>,
        out: &mut BytesMut,
        bs: &mut BooleanStream,
    ) -> Result<()> {
        if !bs.read_boolean()? {
            return Ok(());
        }
        let Some(o) = o else {
            return Err(OpenWireError::IllegalState(
                "Nested value vanished between marshal passes".into(),
            ));
        };
        let code = o.data_structure_type();
        out.put_u8(code);
        if o.is_marshal_aware() && bs.read_boolean()? {
            let form = o.marshaled_form().ok_or_else(|| {
                OpenWireError::IllegalState("Cached form vanished between marshal passes".into())
            })?;
            out.put_slice(&form);
            return Ok(());
        }
        self.registry.lookup(code)?.tight_marshal2(self, o, out, bs)
    }

    pub fn tight_unmarshal_nested(
        &self,
        input: &mut DataInput<'_>,
        bs: &mut BooleanStream,
    ) -> Result<Option<Box<dyn DataStructure>>> {
        if !bs.read_boolean()? {
            return Ok(None);
        }
        let code = input.read_u8()?;
        let marshaller = self.registry.lookup(code)?;
        let mut o = marshaller.create_object();
        if o.is_marshal_aware() && bs.read_boolean()? {
            // A cached form is a complete tight frame with its own flags.
            input.read_i32()?;
            input.read_u8()?;
            let mut cached_bs = BooleanStream::unmarshal(input)?;
            marshaller.tight_unmarshal(self, o.as_mut(), input, &mut cached_bs)?;
        } else {
            marshaller.tight_unmarshal(self, o.as_mut(), input, bs)?;
        }
        o.after_unmarshal(self)?;
        Ok(Some(o))
    }

    /// Loose nested objects never use a cached form.
    pub fn loose_marshal_nested(
        &self,
        o: Option<&dyn DataStructure>,
        out: &mut BytesMut,
    ) -> Result<()> {
        out.write_bool(o.is_some());
        let Some(o) = o else {
            return Ok(());
        };
        let code = o.data_structure_type();
        out.put_u8(code);
        self.registry.lookup(code)?.loose_marshal(self, o, out)
    }

    pub fn loose_unmarshal_nested(
        &self,
        input: &mut DataInput<'_>,
    ) -> Result<Option<Box<dyn DataStructure>>> {
        if !input.read_bool()? {
            return Ok(None);
        }
        let code = input.read_u8()?;
        let marshaller = self.registry.lookup(code)?;
        let mut o = marshaller.create_object();
        marshaller.loose_unmarshal(self, o.as_mut(), input)?;
        o.after_unmarshal(self)?;
        Ok(Some(o))
    }

    // ---- cached forms ----

    /// Produce the tight, size-prefixed frame for `message`, store it as the
    /// message's cached form and return it. Tight nested positions then emit
    /// it verbatim until the message is modified.
    pub fn cache_marshaled_form(&self, message: &dyn MessageCommand) -> Result<Bytes> {
        let o = message.as_data_structure();
        let marshaller = self.registry.lookup(o.data_structure_type())?;
        let mut out = BytesMut::new();
        self.tight_frame(marshaller, o, true, &mut out)?;
        let form = out.freeze();
        message.message().set_marshaled_form(form.clone());
        Ok(form)
    }
}

impl Default for WireFormat {
    fn default() -> Self {
        Self::with_registry(MarshallerRegistry::with_defaults())
    }
}

impl std::fmt::Debug for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireFormat")
            .field("settings", &self.settings)
            .field("negotiated", &self.negotiated)
            .field("max_frame_size", &self.max_frame_size)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{
        ActiveMQDestination, ConnectionId, KeepAliveInfo, Response, SessionId, SessionInfo,
    };

    fn offer(version: i32, tight: bool, cache_size: i32) -> WireFormatInfo {
        let mut info = WireFormatInfo::new(version);
        info.set_tight_encoding_enabled(tight);
        info.set_cache_size(cache_size);
        info.set_stack_trace_enabled(true);
        info
    }

    fn negotiated(tight: bool, size_prefix_disabled: bool, version: i32) -> WireFormat {
        let mut local = offer(version, tight, 0);
        local.set_size_prefix_disabled(size_prefix_disabled);
        let mut wf = WireFormat::default();
        wf.set_preferred(local.clone()).unwrap();
        wf.renegotiate(&local).unwrap();
        wf
    }

    #[test]
    fn test_defaults_before_negotiation() {
        let wf = WireFormat::default();
        assert_eq!(wf.version(), DEFAULT_VERSION);
        assert!(!wf.is_tight_encoding_enabled());
        assert!(!wf.is_size_prefix_disabled());
        assert!(!wf.is_negotiated());
        assert!(wf.preferred().is_none());
    }

    #[test]
    fn test_negotiation_takes_minimum() {
        let mut wf = WireFormat::default();
        wf.set_preferred(offer(9, true, 2048)).unwrap();
        wf.renegotiate(&offer(5, false, 4096)).unwrap();

        assert_eq!(wf.version(), 5);
        assert!(!wf.is_tight_encoding_enabled());
        assert_eq!(wf.settings().cache_size, 2048);
        assert!(wf.is_negotiated());
    }

    #[test]
    fn test_renegotiate_without_preference_fails() {
        let mut wf = WireFormat::default();
        assert!(matches!(
            wf.renegotiate(&offer(9, true, 0)),
            Err(OpenWireError::IllegalState(_))
        ));
    }

    #[test]
    fn test_renegotiate_rejects_bad_magic() {
        let mut wf = WireFormat::default();
        wf.set_preferred(offer(9, true, 0)).unwrap();
        let mut remote = offer(9, true, 0);
        remote.magic = *b"NotOpenW";
        assert!(matches!(
            wf.renegotiate(&remote),
            Err(OpenWireError::Protocol(_))
        ));
        assert!(!wf.is_negotiated());
    }

    #[test]
    fn test_second_renegotiation_only_lowers_version() {
        let mut wf = WireFormat::default();
        wf.set_preferred(offer(6, true, 0)).unwrap();
        wf.renegotiate(&offer(6, true, 0)).unwrap();
        wf.renegotiate(&offer(9, false, 0)).unwrap();
        assert_eq!(wf.version(), 6);
        assert!(wf.is_tight_encoding_enabled());

        wf.renegotiate(&offer(3, true, 0)).unwrap();
        assert_eq!(wf.version(), 3);
    }

    #[test]
    fn test_set_version_bounds() {
        let mut wf = WireFormat::default();
        wf.set_version(7).unwrap();
        assert!(matches!(
            wf.set_version(10),
            Err(OpenWireError::UnsupportedVersion(10))
        ));
        assert!(matches!(
            wf.set_version(0),
            Err(OpenWireError::UnsupportedVersion(0))
        ));
        assert_eq!(wf.version(), 7);
    }

    #[test]
    fn test_settings_fixed_after_negotiation() {
        let mut wf = negotiated(true, false, 9);
        assert!(wf.set_tight_encoding_enabled(false).is_err());
        assert!(wf.set_preferred(WireFormatInfo::new(1)).is_err());
        assert!(wf.set_version(10).is_err());
        wf.set_version(4).unwrap();
        assert!(wf.set_version(5).is_err());
    }

    #[test]
    fn test_null_frame() {
        let wf = WireFormat::default();
        let bytes = wf.marshal_to_bytes(None).unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 1, 0]);
        assert!(wf.unmarshal_bytes(&bytes).unwrap().is_none());

        let wf = negotiated(false, true, 9);
        let bytes = wf.marshal_to_bytes(None).unwrap();
        assert_eq!(&bytes[..], &[0]);
    }

    #[test]
    fn test_size_prefix_counts_type_and_payload() {
        for tight in [false, true] {
            let wf = negotiated(tight, false, 9);
            let info = KeepAliveInfo::default();
            let bytes = wf.marshal_to_bytes(Some(&info)).unwrap();
            let size = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            assert_eq!(size as usize, bytes.len() - 4);
            assert_eq!(bytes[4], types::KEEP_ALIVE_INFO);
        }
    }

    #[test]
    fn test_tight_keep_alive_layout() {
        let wf = negotiated(true, false, 9);
        let mut info = KeepAliveInfo::default();
        info.command_id = 7;
        info.response_required = true;
        let bytes = wf.marshal_to_bytes(Some(&info)).unwrap();
        // size, type, flag count, flags, command id
        assert_eq!(&bytes[..], &[0, 0, 0, 7, 10, 1, 1, 0, 0, 0, 7]);
    }

    #[test]
    fn test_unknown_type_code() {
        let wf = WireFormat::default();
        let frame = [0, 0, 0, 1, 99];
        assert!(matches!(
            wf.unmarshal_bytes(&frame),
            Err(OpenWireError::UnknownDataType(99))
        ));

        let empty = WireFormat::with_registry(MarshallerRegistry::new());
        let mut out = BytesMut::from(&b"keep"[..]);
        assert!(matches!(
            empty.marshal(Some(&KeepAliveInfo::default()), &mut out),
            Err(OpenWireError::UnknownDataType(types::KEEP_ALIVE_INFO))
        ));
        assert_eq!(&out[..], b"keep");
    }

    #[test]
    fn test_non_command_top_level_rejected() {
        let wf = WireFormat::default();
        // loose ConnectionId with a null value
        let mut frame = BytesMut::new();
        frame.put_i32(2);
        frame.put_u8(types::CONNECTION_ID);
        frame.write_bool(false);
        assert!(matches!(
            wf.unmarshal_bytes(&frame),
            Err(OpenWireError::Protocol(_))
        ));
    }

    #[test]
    fn test_truncated_frame_rewinds() {
        let wf = WireFormat::default();
        let bytes = wf
            .marshal_to_bytes(Some(&Response::for_command(&KeepAliveInfo::default())))
            .unwrap();
        let short = &bytes[..bytes.len() - 1];
        let mut input = DataInput::new(short);
        assert!(matches!(
            wf.unmarshal(&mut input),
            Err(OpenWireError::UnexpectedEof { .. })
        ));
        assert_eq!(input.position(), 0);
        assert!(!wf.is_receiving());
    }

    #[test]
    fn test_frame_size_limit() {
        let mut wf = WireFormat::default();
        wf.set_max_frame_size(8);
        let frame = [0, 0, 0, 9, 10, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            wf.unmarshal_bytes(&frame),
            Err(OpenWireError::Protocol(_))
        ));

        let connection = ConnectionId::new("ID:long-connection");
        let info = SessionInfo::new(SessionId::new(&connection, 1));
        assert!(wf.marshal_to_bytes(Some(&info)).is_err());
    }

    #[test]
    fn test_nested_null_is_single_flag() {
        let wf = WireFormat::default();
        let mut bs = BooleanStream::new();
        assert_eq!(wf.tight_marshal_nested1(None, &mut bs).unwrap(), 0);
        assert_eq!(bs.len(), 1);

        let mut out = BytesMut::new();
        wf.loose_marshal_nested(None, &mut out).unwrap();
        assert_eq!(&out[..], &[0]);
    }

    #[test]
    fn test_nested_round_trip() {
        let wf = negotiated(true, false, 9);
        let dest = ActiveMQDestination::topic("prices");
        let mut bs = BooleanStream::new();
        let size = wf.tight_marshal_nested1(Some(&dest), &mut bs).unwrap();
        let mut out = BytesMut::new();
        bs.rewind();
        wf.tight_marshal_nested2(Some(&dest), &mut out, &mut bs).unwrap();
        assert_eq!(out.len(), size);

        bs.rewind();
        let mut input = DataInput::new(&out);
        let decoded = wf.tight_unmarshal_nested(&mut input, &mut bs).unwrap().unwrap();
        assert_eq!(decoded.downcast_ref::<ActiveMQDestination>(), Some(&dest));
    }

    #[test]
    fn test_receiving_flag_cleared() {
        let wf = WireFormat::default();
        assert!(!wf.is_receiving());
        let _ = wf.unmarshal_bytes(&[0, 0, 0, 1, 77]);
        assert!(!wf.is_receiving());
        let _ = wf.unmarshal_bytes(&[0, 0, 0, 1, 0]);
        assert!(!wf.is_receiving());
    }

    #[test]
    fn test_traffic_tracking() {
        let wf = WireFormat::default();
        wf.marshal_to_bytes(Some(&WireFormatInfo::new(9))).unwrap();
        assert!(!wf.traffic_started());
        wf.marshal_to_bytes(Some(&KeepAliveInfo::default())).unwrap();
        assert!(wf.traffic_started());
    }
}
