//! The message-handler contract.
//!
//! A server owns one root handler (empty path) and any number of named
//! handlers, each bound to one URL segment.  Every connection belongs to
//! exactly one handler for its whole lifetime.
//!
//! # For beginners: what runs where?
//!
//! Each connection has its own receive task.  All three callbacks run on the
//! task of the connection they concern, so messages from one connection are
//! handled strictly in arrival order.  Two connections on the same handler
//! may call into it at the same time, which is why handlers are `Send + Sync`
//! and keep shared state behind locks.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::debug;

use crate::application::connection::Connection;
use crate::application::registry::ConnectionRegistry;
use crate::domain::ConfigError;

/// Error type handlers may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type of [`MessageHandler::handle`].
pub type HandlerResult = Result<(), HandlerError>;

/// Per-URL endpoint receiving connection events.
///
/// An `Err` from [`MessageHandler::handle`] is logged with the peer address
/// and the connection is torn down.  Other connections are unaffected.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Called once the connection is registered, before its first message.
    async fn on_connect(&self, _ctx: &HandlerContext, _connection: &Connection) {}

    /// Called exactly once after the connection has been deregistered.
    async fn on_disconnect(&self, _ctx: &HandlerContext, _connection: &Connection) {}

    /// Called for every text message received on `connection`.
    async fn handle(
        &self,
        ctx: &HandlerContext,
        connection: &Connection,
        message: String,
    ) -> HandlerResult;

    /// Startup-time self check, run when the server is built.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// A handler's view of its own connections.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    url: Arc<str>,
    registry: ConnectionRegistry,
}

impl HandlerContext {
    pub fn new(url: &str, registry: ConnectionRegistry) -> Self {
        Self {
            url: Arc::from(url),
            registry,
        }
    }

    /// The URL segment this handler is bound to; empty for the root handler.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Snapshot of the handler's live connections.
    pub fn connections(&self) -> Vec<Connection> {
        self.registry.all()
    }

    /// Sends `text` to every connection of this handler.
    ///
    /// Sends run concurrently and this returns once all of them have
    /// completed or failed.  Returns the number of successful deliveries.
    pub async fn broadcast(&self, text: &str) -> usize {
        send_all(self.registry.all(), text).await
    }

    /// Like [`HandlerContext::broadcast`] but skips `sender`.
    pub async fn broadcast_except(&self, sender: &Connection, text: &str) -> usize {
        send_all(self.registry.matching(|c| c != sender), text).await
    }
}

/// Sends to every target; one failure never stops the others.
async fn send_all(targets: Vec<Connection>, text: &str) -> usize {
    let results = join_all(targets.iter().map(|c| c.send(text))).await;
    let mut delivered = 0;
    for (target, result) in targets.iter().zip(results) {
        match result {
            Ok(()) => delivered += 1,
            Err(e) => debug!("broadcast to {} skipped: {e}", target.peer_addr()),
        }
    }
    delivered
}
