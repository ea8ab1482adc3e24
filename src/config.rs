//! Locally preferred wire format settings.
//!
//! These are what this side offers during the handshake; the effective
//! settings are the intersection with the remote offer.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::commands::WireFormatInfo;
use crate::error::{OpenWireError, Result};
use crate::protocol::{DEFAULT_MAX_FRAME_SIZE, MAX_SUPPORTED_VERSION};

/// Default cache size offered to the peer.
pub const DEFAULT_CACHE_SIZE: i32 = 1024;

/// Default maximum inactivity before a connection is considered dead (ms).
pub const DEFAULT_MAX_INACTIVITY_DURATION: i64 = 30_000;

/// Default delay before inactivity monitoring starts (ms).
pub const DEFAULT_MAX_INACTIVITY_INITIAL_DELAY: i64 = 10_000;

/// Prefix of wire format keys in URI-style property lists.
pub const PROPERTY_PREFIX: &str = "wireFormat.";

/// Preferred wire format settings.
///
/// Deserializes from camelCase JSON; absent fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WireFormatConfig {
    pub version: i32,
    pub stack_trace_enabled: bool,
    pub tcp_no_delay_enabled: bool,
    pub cache_enabled: bool,
    pub cache_size: i32,
    pub tight_encoding_enabled: bool,
    pub size_prefix_disabled: bool,
    pub max_inactivity_duration: i64,
    #[serde(alias = "maxInactivityDurationInitalDelay")]
    pub max_inactivity_duration_initial_delay: i64,
    pub max_frame_size: u32,
}

impl Default for WireFormatConfig {
    fn default() -> Self {
        Self {
            version: MAX_SUPPORTED_VERSION,
            stack_trace_enabled: true,
            tcp_no_delay_enabled: true,
            cache_enabled: false,
            cache_size: DEFAULT_CACHE_SIZE,
            tight_encoding_enabled: true,
            size_prefix_disabled: false,
            max_inactivity_duration: DEFAULT_MAX_INACTIVITY_DURATION,
            max_inactivity_duration_initial_delay: DEFAULT_MAX_INACTIVITY_INITIAL_DELAY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl WireFormatConfig {
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn with_stack_trace_enabled(mut self, enabled: bool) -> Self {
        self.stack_trace_enabled = enabled;
        self
    }

    pub fn with_tcp_no_delay_enabled(mut self, enabled: bool) -> Self {
        self.tcp_no_delay_enabled = enabled;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cache_size(mut self, size: i32) -> Self {
        self.cache_size = size;
        self
    }

    pub fn with_tight_encoding_enabled(mut self, enabled: bool) -> Self {
        self.tight_encoding_enabled = enabled;
        self
    }

    pub fn with_size_prefix_disabled(mut self, disabled: bool) -> Self {
        self.size_prefix_disabled = disabled;
        self
    }

    pub fn with_max_inactivity_duration(mut self, millis: i64) -> Self {
        self.max_inactivity_duration = millis;
        self
    }

    pub fn with_max_inactivity_duration_initial_delay(mut self, millis: i64) -> Self {
        self.max_inactivity_duration_initial_delay = millis;
        self
    }

    pub fn with_max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SUPPORTED_VERSION).contains(&self.version) {
            return Err(OpenWireError::UnsupportedVersion(self.version));
        }
        if self.cache_size < 0 {
            return Err(invalid("cacheSize", self.cache_size));
        }
        if self.max_inactivity_duration < 0 {
            return Err(invalid("maxInactivityDuration", self.max_inactivity_duration));
        }
        if self.max_inactivity_duration_initial_delay < 0 {
            return Err(invalid(
                "maxInactivityDurationInitalDelay",
                self.max_inactivity_duration_initial_delay,
            ));
        }
        if self.max_frame_size == 0 {
            return Err(invalid("maxFrameSize", self.max_frame_size));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from `wireFormat.`-prefixed key/value pairs, as found in broker
    /// URIs. Other keys are ignored.
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in properties {
            let Some(name) = key.as_ref().strip_prefix(PROPERTY_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "version" => config.version = parse(name, value)?,
                "stackTraceEnabled" => config.stack_trace_enabled = parse_bool(name, value)?,
                "tcpNoDelayEnabled" => config.tcp_no_delay_enabled = parse_bool(name, value)?,
                "cacheEnabled" => config.cache_enabled = parse_bool(name, value)?,
                "cacheSize" => config.cache_size = parse(name, value)?,
                "tightEncodingEnabled" => {
                    config.tight_encoding_enabled = parse_bool(name, value)?
                }
                "sizePrefixDisabled" => config.size_prefix_disabled = parse_bool(name, value)?,
                "maxInactivityDuration" => config.max_inactivity_duration = parse(name, value)?,
                "maxInactivityDurationInitalDelay" => {
                    config.max_inactivity_duration_initial_delay = parse(name, value)?
                }
                "maxFrameSize" => config.max_frame_size = parse(name, value)?,
                _ => {}
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// The `WireFormatInfo` offered to the peer.
    ///
    /// Cache encoding is always offered as off.
    pub fn to_wire_format_info(&self) -> WireFormatInfo {
        if self.cache_enabled {
            warn!("Cache encoding requested; offering it as disabled");
        }
        let mut info = WireFormatInfo::new(self.version);
        info.set_stack_trace_enabled(self.stack_trace_enabled);
        info.set_tcp_no_delay_enabled(self.tcp_no_delay_enabled);
        info.set_cache_enabled(false);
        info.set_cache_size(self.cache_size);
        info.set_tight_encoding_enabled(self.tight_encoding_enabled);
        info.set_size_prefix_disabled(self.size_prefix_disabled);
        info.set_max_inactivity_duration(self.max_inactivity_duration);
        info.set_max_inactivity_duration_initial_delay(self.max_inactivity_duration_initial_delay);
        info
    }
}

fn invalid(name: &str, value: impl std::fmt::Display) -> OpenWireError {
    OpenWireError::Protocol(format!("Invalid wire format setting {name}: {value}"))
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WireFormatConfig::default();
        assert_eq!(config.version, 9);
        assert!(config.tight_encoding_enabled);
        assert!(!config.size_prefix_disabled);
        assert!(!config.cache_enabled);
        assert_eq!(config.cache_size, 1024);
        assert_eq!(config.max_inactivity_duration, 30_000);
        assert_eq!(config.max_frame_size, i32::MAX as u32);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            WireFormatConfig::from_json(r#"{"version": 6, "tightEncodingEnabled": false}"#)
                .unwrap();
        assert_eq!(config.version, 6);
        assert!(!config.tight_encoding_enabled);
        assert!(config.stack_trace_enabled);
    }

    #[test]
    fn test_from_json_rejects_bad_version() {
        assert!(matches!(
            WireFormatConfig::from_json(r#"{"version": 12}"#),
            Err(OpenWireError::UnsupportedVersion(12))
        ));
        assert!(matches!(
            WireFormatConfig::from_json("{not json"),
            Err(OpenWireError::Json(_))
        ));
    }

    #[test]
    fn test_from_properties() {
        let config = WireFormatConfig::from_properties([
            ("wireFormat.version", "3"),
            ("wireFormat.tightEncodingEnabled", "FALSE"),
            ("wireFormat.maxInactivityDurationInitalDelay", "500"),
            ("jms.prefetch", "10"),
            ("wireFormat.somethingElse", "x"),
        ])
        .unwrap();
        assert_eq!(config.version, 3);
        assert!(!config.tight_encoding_enabled);
        assert_eq!(config.max_inactivity_duration_initial_delay, 500);
    }

    #[test]
    fn test_from_properties_bad_value() {
        let err = WireFormatConfig::from_properties([("wireFormat.cacheSize", "lots")])
            .unwrap_err();
        assert!(matches!(err, OpenWireError::Protocol(_)));
    }

    #[test]
    fn test_info_never_offers_cache() {
        let info = WireFormatConfig::default()
            .with_cache_enabled(true)
            .with_version(7)
            .to_wire_format_info();
        assert_eq!(info.version, 7);
        assert!(!info.is_cache_enabled());
        assert_eq!(info.cache_size(), 1024);
        assert!(info.is_tight_encoding_enabled());
        assert_eq!(info.max_inactivity_duration(), 30_000);
    }
}
