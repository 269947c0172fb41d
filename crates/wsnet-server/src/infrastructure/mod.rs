//! Infrastructure layer: everything that touches a socket.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and running the accept loop (`server`)
//! - Reading and answering the HTTP upgrade request (`handshake`)
//! - Reading client frames from the upgraded stream (`frame_reader`)
//! - Running each connection's receive loop and teardown (`session`)
//!
//! # What does NOT belong here?
//!
//! - Handler contracts, registries, and SEP routing (application layer)
//! - Configuration types (domain layer)
//! - Byte-level codec rules (the `wsnet-core` crate)

pub mod frame_reader;
pub mod handshake;
pub mod server;
pub mod session;

pub use server::{Server, ServerBuilder, ServerHandle};
