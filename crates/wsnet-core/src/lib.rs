//! # wsnet-core
//!
//! Pure protocol building blocks for the wsnet WebSocket server.
//!
//! This crate has zero dependencies on sockets or async runtimes.  Everything
//! in it operates on byte slices and string slices, which keeps the
//! attacker-facing parsing code easy to unit test in isolation.
//!
//! # Architecture overview
//!
//! A WebSocket session goes through two phases:
//!
//! 1. **Handshake** – the client sends an HTTP/1.1 `GET` request asking to
//!    "upgrade" the TCP connection.  The server answers with
//!    `101 Switching Protocols` and a `Sec-WebSocket-Accept` key derived from
//!    the client's `Sec-WebSocket-Key`.
//! 2. **Framing** – after the upgrade, both sides exchange binary frames.
//!    Client frames are always masked with a 4-byte key; server frames never
//!    are.
//!
//! On top of the text messages carried by those frames, wsnet defines a small
//! routing grammar called **SEP** (Simple End Point):
//!
//! ```text
//! [<contentType> ]<routeName>[:<id>]
//! <payload...>
//! ```
//!
//! The modules map onto those layers:
//!
//! - **`protocol::frame`** – frame header parsing, unmasking, and encoding.
//! - **`protocol::handshake`** – request-line and header validation plus the
//!   RFC 6455 accept-key computation.
//! - **`sep`** – the SEP request grammar, scalar value parsing, error values,
//!   and the recycling connection-id pool.

pub mod naming;
pub mod protocol;
pub mod sep;

pub use naming::is_valid_segment;
pub use protocol::frame::{
    decode_frame, encode_frame, encode_masked_frame, encode_text_frame, DecodedFrame, FrameError,
    OpCode,
};
pub use protocol::handshake::{compute_accept_key, HandshakeError, HandshakeRequest};
pub use sep::{IdPool, Scalar, ScalarKind, SepError, SepErrorKind, SepRequest};
