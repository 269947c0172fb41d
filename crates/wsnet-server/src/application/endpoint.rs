//! A handler bound to its URL and registry.
//!
//! The receive loop talks to handlers only through an [`Endpoint`], which
//! enforces the registration ordering:
//!
//! - a connection is registered before `on_connect` and before any message;
//! - it is deregistered before its socket is released;
//! - `on_disconnect` runs exactly once, after deregistration.

use std::sync::Arc;

use crate::application::connection::Connection;
use crate::application::handler::{HandlerContext, HandlerResult, MessageHandler};
use crate::application::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct Endpoint {
    context: HandlerContext,
    handler: Arc<dyn MessageHandler>,
}

impl Endpoint {
    pub fn new(url: &str, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            context: HandlerContext::new(url, ConnectionRegistry::new()),
            handler,
        }
    }

    pub fn url(&self) -> &str {
        self.context.url()
    }

    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Registers `connection` and runs `on_connect`.
    pub async fn connect(&self, connection: &Connection) {
        self.context.registry().add(connection.clone());
        self.handler.on_connect(&self.context, connection).await;
    }

    /// Delivers one message to the handler.
    pub async fn deliver(&self, connection: &Connection, message: String) -> HandlerResult {
        self.handler.handle(&self.context, connection, message).await
    }

    /// Removes `connection` from the registry.  Returns `false` if it was
    /// already gone, in which case `on_disconnect` must not run again.
    pub fn deregister(&self, connection: &Connection) -> bool {
        self.context.registry().remove(connection)
    }

    /// Runs `on_disconnect`.  Call only after a successful
    /// [`Endpoint::deregister`].
    pub async fn notify_disconnect(&self, connection: &Connection) {
        self.handler.on_disconnect(&self.context, connection).await;
    }

    /// Requests a close on every live connection and waits for them.
    pub async fn close_all(&self) {
        let connections = self.context.connections();
        futures_util::future::join_all(connections.iter().map(Connection::close)).await;
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url())
            .field("connections", &self.context.registry().len())
            .finish()
    }
}
