//! Protocol module containing the frame codec and the upgrade handshake.

pub mod frame;
pub mod handshake;

pub use frame::{
    apply_mask, decode_frame, encode_frame, encode_masked_frame, encode_text_frame, DecodedFrame,
    FrameError, FramePrefix, OpCode,
};
pub use handshake::{
    compute_accept_key, parse_request_line, HandshakeError, HandshakeRequest, HeaderCollector,
};
