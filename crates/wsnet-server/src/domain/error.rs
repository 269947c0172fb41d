//! Startup-time error types.
//!
//! Everything here is fatal: a server whose configuration, handler table, or
//! route table fails validation never starts accepting connections.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// A configuration or registration problem detected before the server runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ServerConfig`](crate::domain::ServerConfig).
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A config value is out of range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// A handler URL is empty or has characters outside `[A-Za-z0-9_-]`.
    #[error("invalid handler URL '{0}'")]
    InvalidHandlerUrl(String),

    /// Two handlers were registered for the same URL.
    #[error("more than one handler registered for URL '{0}'")]
    DuplicateHandlerUrl(String),

    /// No handler was registered for the empty path.
    #[error("no root handler registered")]
    MissingRootHandler,

    /// A route name is empty or has characters outside `[A-Za-z0-9_-]`.
    #[error("invalid route name '{0}'")]
    InvalidRouteName(String),

    /// Two routes on one dispatcher share a name.
    #[error("more than one route named '{0}'")]
    DuplicateRoute(String),

    /// A route dispatcher was built without any routes.
    #[error("route dispatcher has no routes")]
    EmptyRouteTable,

    /// A payload decoder content type is empty or has characters other than
    /// alphanumerics, `-` and `_`.
    #[error("invalid content type '{0}'")]
    InvalidContentType(String),
}

/// Failure to start a configured server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind (port in use, permission denied, ...).
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The bound listener could not report its local address.
    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        assert_eq!(
            ConfigError::DuplicateRoute("log".to_string()).to_string(),
            "more than one route named 'log'"
        );
        assert_eq!(
            ConfigError::InvalidHandlerUrl("a/b".to_string()).to_string(),
            "invalid handler URL 'a/b'"
        );
    }

    #[test]
    fn test_bind_error_mentions_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:11311".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().contains("127.0.0.1:11311"));
    }
}
