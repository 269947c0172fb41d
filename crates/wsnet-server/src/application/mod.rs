//! Application layer: connections, registries, handlers, and SEP routing.
//!
//! Nothing here touches a socket directly.  Connections write through a boxed
//! `AsyncWrite`, which lets every module be tested over in-memory pipes.

pub mod connection;
pub mod endpoint;
pub mod handler;
pub mod registry;
pub mod router;
pub mod sep;

pub use connection::{Connection, ConnectionState, SendError};
pub use endpoint::Endpoint;
pub use handler::{HandlerContext, HandlerError, HandlerResult, MessageHandler};
pub use registry::ConnectionRegistry;
pub use router::Router;
