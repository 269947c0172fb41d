//! SEP (Simple End Point) routing on top of plain text messages.
//!
//! A [`RouteDispatcher`] is an ordinary [`MessageHandler`](crate::application::handler::MessageHandler),
//! so it is mounted on a URL like any other handler:
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use wsnet_server::application::handler::HandlerError;
//! # use wsnet_server::application::sep::RouteDispatcher;
//! # use wsnet_server::domain::ServerConfig;
//! # use wsnet_server::infrastructure::server::ServerBuilder;
//! # fn demo(root: Arc<dyn wsnet_server::application::handler::MessageHandler>) -> anyhow::Result<()> {
//! let sep = RouteDispatcher::builder()
//!     .route_with_id("whoami", |req, id: u32| async move {
//!         req.reply(&format!("you asked for {id}, you are {}", req.connection_id)).await?;
//!         Ok::<(), HandlerError>(())
//!     })
//!     .build()?;
//!
//! let server = ServerBuilder::new(ServerConfig::default())
//!     .root_handler(root)
//!     .handler("sep", Arc::new(sep))
//!     .build()?;
//! # let _ = server;
//! # Ok(())
//! # }
//! ```

pub mod decoder;
pub mod dispatcher;
pub mod route;

pub use decoder::{DecodeError, DecoderSet, JsonDecoder, PayloadDecoder};
pub use dispatcher::{RouteDispatcher, RouteDispatcherBuilder};
pub use route::{
    PayloadKind, RouteDescriptor, RouteId, RoutePayload, RouteRequest, RouteShape, Structured,
};
