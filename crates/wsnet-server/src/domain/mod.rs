//! Domain layer for wsnet-server.
//!
//! Plain data with no I/O: the runtime configuration and the startup-time
//! error types.  Nothing in here touches sockets or the async runtime.

pub mod config;
pub mod error;

pub use config::ServerConfig;
pub use error::{ConfigError, ServerError};
