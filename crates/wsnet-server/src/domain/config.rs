//! Server configuration.
//!
//! [`ServerConfig`] holds every runtime setting of a wsnet server.  It can be
//! built in code (start from [`ServerConfig::default`]), loaded from a TOML
//! file, or assembled by the binary from CLI flags.
//!
//! # TOML format
//!
//! Every key is optional; missing keys keep their default.  Durations are
//! written in milliseconds.
//!
//! ```toml
//! bind_addr = "0.0.0.0:11311"
//! handshake_timeout_ms = 10000
//! close_timeout_ms = 2000
//! max_frame_len = 16777216
//! max_header_line = 8192
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

/// Default listener port.
pub const DEFAULT_PORT: u16 = 11311;

/// Shortest handshake line limit accepted by [`ServerConfig::validate`].
///
/// A request line plus a `Sec-WebSocket-Key` header must fit comfortably.
pub const MIN_HEADER_LINE: usize = 256;

/// All runtime configuration for a wsnet server.
///
/// # Example
///
/// ```rust
/// use wsnet_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 11311);
/// assert!(cfg.bind_addr.ip().is_loopback());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.  Port 0 picks a free port.
    pub bind_addr: SocketAddr,

    /// Upper bound on reading the upgrade request and writing the response.
    #[serde(rename = "handshake_timeout_ms", with = "millis")]
    pub handshake_timeout: Duration,

    /// How long closing a connection waits for its receive loop to stop.
    #[serde(rename = "close_timeout_ms", with = "millis")]
    pub close_timeout: Duration,

    /// Largest accepted frame payload in bytes.  Larger declared lengths are
    /// a protocol violation and are rejected before any allocation.
    pub max_frame_len: u64,

    /// Longest accepted handshake line in bytes, terminator included.
    pub max_header_line: usize,
}

impl Default for ServerConfig {
    /// | Field             | Default            |
    /// |-------------------|--------------------|
    /// | bind_addr         | `127.0.0.1:11311`  |
    /// | handshake_timeout | 10 seconds         |
    /// | close_timeout     | 2 seconds          |
    /// | max_frame_len     | 16 MiB             |
    /// | max_header_line   | 8 KiB              |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
            max_frame_len: 16 * 1024 * 1024,
            max_header_line: 8 * 1024,
        }
    }
}

impl ServerConfig {
    /// Reads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Io`] if the file cannot be read.
    /// - [`ConfigError::Parse`] if the TOML is malformed or has unknown types.
    /// - [`ConfigError::InvalidValue`] if a value fails [`Self::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`], minus the I/O case.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handshake_timeout.is_zero() {
            return Err(invalid("handshake_timeout_ms", "must be greater than zero"));
        }
        if self.close_timeout.is_zero() {
            return Err(invalid("close_timeout_ms", "must be greater than zero"));
        }
        if self.max_frame_len == 0 {
            return Err(invalid("max_frame_len", "must be greater than zero"));
        }
        if self.max_header_line < MIN_HEADER_LINE {
            return Err(invalid(
                "max_header_line",
                format!("must be at least {MIN_HEADER_LINE}"),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
