//! wsnet-server library crate.
//!
//! An embeddable WebSocket server.  Each URL path is served by one
//! [`MessageHandler`](application::MessageHandler); the SEP route dispatcher
//! is one such handler, turning text messages into typed route calls.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! WebSocket client
//!         ↕
//! [wsnet-server]
//!   ├── domain/           ServerConfig, startup errors
//!   ├── application/      Connection, registry, handler contract, SEP routing
//!   └── infrastructure/
//!         ├── server/     Listener, accept loop, per-socket tasks
//!         ├── handshake/  Async HTTP upgrade
//!         ├── frame_reader/ Incremental frame reads
//!         └── session/    Receive loop and teardown
//!         ↕
//! [wsnet-core]            Frame codec, handshake parsing, SEP grammar
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no network I/O; its only side effect is
//!   `ServerConfig::load` reading a config file.
//! - `application` writes through a boxed `AsyncWrite` and never opens a
//!   socket, so it is tested over in-memory pipes.
//! - `infrastructure` depends on all other layers plus `tokio::net`.
//!
//! # For beginners: what happens to one message?
//!
//! The session task reads a frame, unmasks it, and passes the text to the
//! endpoint's handler.  The next frame is not read until the handler
//! returns, which is what keeps one connection's messages in order.

/// Domain layer: configuration and startup errors.
pub mod domain;

/// Application layer: connections, handlers, SEP routing.
pub mod application;

/// Infrastructure layer: listener, handshake, frame reading, sessions.
pub mod infrastructure;
