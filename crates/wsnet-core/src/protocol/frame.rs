//! WebSocket frame codec (RFC 6455 section 5.2).
//!
//! Wire format:
//! ```text
//! byte 0: [FIN:1][RSV:3][OPCODE:4]
//! byte 1: [MASK:1][LEN7:7]
//! LEN7 == 126 → 2 extra length bytes (big-endian u16)
//! LEN7 == 127 → 8 extra length bytes (big-endian u64)
//! MASK == 1   → 4 mask-key bytes
//! payload
//! ```
//!
//! Clients must mask every frame they send; servers never mask.  An unmasked
//! inbound frame is a protocol violation that ends the connection.
//!
//! # Message boundaries
//!
//! Each frame is treated as one complete message.  The FIN bit is parsed but
//! continuation frames are not reassembled: a frame with opcode `0x0` is
//! delivered as a message of its own.
//!
//! # Outbound opcode
//!
//! [`encode_text_frame`] always emits opcode `0x2` (binary) even though the
//! payload is UTF-8 text.  Peers decode by opcode, so they receive the text
//! as a binary message.

use thiserror::Error;

/// FIN flag in byte 0.
pub const FIN_BIT: u8 = 0x80;
/// MASK flag in byte 1.
pub const MASK_BIT: u8 = 0x80;
/// `LEN7` marker announcing a 2-byte extended length.
pub const LEN_16_MARKER: u8 = 126;
/// `LEN7` marker announcing an 8-byte extended length.
pub const LEN_64_MARKER: u8 = 127;
/// Size of the fixed frame prefix (bytes 0 and 1).
pub const PREFIX_SIZE: usize = 2;
/// Size of the client mask key.
pub const MASK_KEY_SIZE: usize = 4;
/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: u64 = 125;

const OPCODE_BITS: u8 = 0x0F;
const LEN7_BITS: u8 = 0x7F;

/// Errors produced while decoding an inbound frame.
///
/// Every variant except [`FrameError::InsufficientData`] is a protocol
/// violation: the connection that produced it must be terminated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The byte slice ends before the frame does.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The MASK bit is not set on a client frame.
    #[error("protocol violation: unmasked frame")]
    UnmaskedFrame,

    /// The opcode nibble is not one defined by RFC 6455.
    #[error("protocol violation: unknown opcode 0x{0:X}")]
    UnknownOpcode(u8),

    /// A data frame declared a payload length of zero.
    #[error("protocol violation: zero-length payload")]
    EmptyPayload,

    /// A control frame declared more than 125 payload bytes.
    #[error("protocol violation: control frame payload of {0} bytes exceeds 125")]
    ControlFrameTooLong(u64),

    /// The declared length exceeds the configured limit.
    #[error("protocol violation: payload of {declared} bytes exceeds limit of {limit}")]
    TooLarge { declared: u64, limit: u64 },

    /// The unmasked payload of a data frame is not UTF-8.
    #[error("protocol violation: payload is not valid UTF-8")]
    InvalidUtf8,
}

impl FrameError {
    /// Returns `true` for errors that must terminate the connection.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, Self::InsufficientData { .. })
    }
}

/// Frame opcodes defined by RFC 6455.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    /// Control frames (close, ping, pong) carry at most 125 bytes and may be empty.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

/// The information carried by the first two bytes of a frame.
///
/// Decoding is two-phase because the frame length is unknown until these
/// bytes have been read: [`FramePrefix::extended_len_size`] tells the reader
/// how many more length bytes to fetch before the mask key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePrefix {
    pub fin: bool,
    pub opcode: OpCode,
    /// Low 7 bits of byte 1: a literal length or one of the extended markers.
    pub len7: u8,
}

impl FramePrefix {
    /// Parses the two prefix bytes of a client frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::UnmaskedFrame`] if the MASK bit is clear, or
    /// [`FrameError::UnknownOpcode`] for reserved opcodes.
    pub fn parse(bytes: [u8; PREFIX_SIZE]) -> Result<Self, FrameError> {
        if bytes[1] & MASK_BIT == 0 {
            return Err(FrameError::UnmaskedFrame);
        }
        let opcode = OpCode::try_from(bytes[0] & OPCODE_BITS)?;
        Ok(Self {
            fin: bytes[0] & FIN_BIT != 0,
            opcode,
            len7: bytes[1] & LEN7_BITS,
        })
    }

    /// Number of extended length bytes that follow the prefix (0, 2 or 8).
    pub fn extended_len_size(&self) -> usize {
        match self.len7 {
            LEN_16_MARKER => 2,
            LEN_64_MARKER => 8,
            _ => 0,
        }
    }

    /// Resolves the true payload length from the extended length bytes.
    ///
    /// `extended` must hold at least [`FramePrefix::extended_len_size`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InsufficientData`] when `extended` is too short.
    pub fn payload_len(&self, extended: &[u8]) -> Result<u64, FrameError> {
        let needed = self.extended_len_size();
        if extended.len() < needed {
            return Err(FrameError::InsufficientData {
                needed,
                available: extended.len(),
            });
        }
        Ok(match self.len7 {
            LEN_16_MARKER => u64::from(u16::from_be_bytes([extended[0], extended[1]])),
            LEN_64_MARKER => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&extended[..8]);
                u64::from_be_bytes(raw)
            }
            literal => u64::from(literal),
        })
    }

    /// Checks a resolved length against the frame kind and `limit`.
    ///
    /// Returns the length as a `usize` ready for buffer allocation.
    ///
    /// # Errors
    ///
    /// - [`FrameError::EmptyPayload`] for a zero-length data frame.
    /// - [`FrameError::ControlFrameTooLong`] for control frames over 125 bytes.
    /// - [`FrameError::TooLarge`] when `len` exceeds `limit`.
    pub fn validate_len(&self, len: u64, limit: u64) -> Result<usize, FrameError> {
        if self.opcode.is_control() {
            if len > MAX_CONTROL_PAYLOAD {
                return Err(FrameError::ControlFrameTooLong(len));
            }
        } else if len == 0 {
            return Err(FrameError::EmptyPayload);
        }
        if len > limit {
            return Err(FrameError::TooLarge {
                declared: len,
                limit,
            });
        }
        usize::try_from(len).map_err(|_| FrameError::TooLarge {
            declared: len,
            limit,
        })
    }
}

/// A fully decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    /// A data frame (text, binary or continuation) interpreted as UTF-8.
    Message(String),
    /// The peer asked to close the connection.
    Close,
    /// A ping whose payload must be echoed in a pong.
    Ping(Vec<u8>),
    /// An unsolicited or answering pong.
    Pong(Vec<u8>),
}

/// XORs `payload` in place with the repeating 4-byte `key`.
///
/// Masking is its own inverse, so the same call masks and unmasks.
pub fn apply_mask(payload: &mut [u8], key: [u8; MASK_KEY_SIZE]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % MASK_KEY_SIZE];
    }
}

/// Turns an unmasked payload into a [`DecodedFrame`] according to its opcode.
///
/// # Errors
///
/// Returns [`FrameError::InvalidUtf8`] when a data frame is not valid UTF-8.
pub fn finish_frame(opcode: OpCode, payload: Vec<u8>) -> Result<DecodedFrame, FrameError> {
    match opcode {
        OpCode::Close => Ok(DecodedFrame::Close),
        OpCode::Ping => Ok(DecodedFrame::Ping(payload)),
        OpCode::Pong => Ok(DecodedFrame::Pong(payload)),
        OpCode::Text | OpCode::Binary | OpCode::Continuation => String::from_utf8(payload)
            .map(DecodedFrame::Message)
            .map_err(|_| FrameError::InvalidUtf8),
    }
}

// ── Slice decoding ────────────────────────────────────────────────────────────

/// Decodes one client frame from the beginning of `bytes`.
///
/// Returns the decoded frame and the number of bytes consumed so the caller
/// can advance its read cursor.  A close frame ends the session, so only its
/// prefix is consumed and any status payload is left uninspected.
///
/// # Errors
///
/// Returns [`FrameError::InsufficientData`] if `bytes` ends before the frame
/// does, or any protocol-violation variant for malformed frames.
///
/// # Examples
///
/// ```rust
/// use wsnet_core::{decode_frame, encode_masked_frame, DecodedFrame, OpCode};
///
/// let bytes = encode_masked_frame(OpCode::Text, b"hi", [1, 2, 3, 4]);
/// let (frame, consumed) = decode_frame(&bytes, 1024).unwrap();
/// assert_eq!(frame, DecodedFrame::Message("hi".to_string()));
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn decode_frame(
    bytes: &[u8],
    max_payload_len: u64,
) -> Result<(DecodedFrame, usize), FrameError> {
    require(bytes, PREFIX_SIZE)?;
    let prefix = FramePrefix::parse([bytes[0], bytes[1]])?;
    if prefix.opcode == OpCode::Close {
        return Ok((DecodedFrame::Close, PREFIX_SIZE));
    }

    let mut off = PREFIX_SIZE;
    let ext_size = prefix.extended_len_size();
    require(bytes, off + ext_size)?;
    let declared = prefix.payload_len(&bytes[off..off + ext_size])?;
    off += ext_size;

    let len = prefix.validate_len(declared, max_payload_len)?;

    require(bytes, off + MASK_KEY_SIZE)?;
    let key = [bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]];
    off += MASK_KEY_SIZE;

    require(bytes, off + len)?;
    let mut payload = bytes[off..off + len].to_vec();
    apply_mask(&mut payload, key);

    let frame = finish_frame(prefix.opcode, payload)?;
    Ok((frame, off + len))
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes an unmasked server frame with the FIN bit set.
pub fn encode_frame(opcode: OpCode, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PREFIX_SIZE + 8 + payload.len());
    write_header(&mut buf, opcode, payload.len(), false);
    buf.extend_from_slice(payload);
    buf
}

/// Encodes an outbound text message.
///
/// The frame uses opcode `0x2` (see the module docs).
pub fn encode_text_frame(text: &str) -> Vec<u8> {
    encode_frame(OpCode::Binary, text.as_bytes())
}

/// Encodes a masked frame as a client would send it.
///
/// The server never sends masked frames; this exists for tests and for
/// embedding applications that talk to a wsnet server.
pub fn encode_masked_frame(opcode: OpCode, payload: &[u8], key: [u8; MASK_KEY_SIZE]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PREFIX_SIZE + 8 + MASK_KEY_SIZE + payload.len());
    write_header(&mut buf, opcode, payload.len(), true);
    buf.extend_from_slice(&key);
    let start = buf.len();
    buf.extend_from_slice(payload);
    apply_mask(&mut buf[start..], key);
    buf
}

fn write_header(buf: &mut Vec<u8>, opcode: OpCode, len: usize, masked: bool) {
    buf.push(FIN_BIT | opcode as u8);
    let mask = if masked { MASK_BIT } else { 0 };
    if len < usize::from(LEN_16_MARKER) {
        buf.push(mask | len as u8);
    } else if len <= usize::from(u16::MAX) {
        buf.push(mask | LEN_16_MARKER);
        buf.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        buf.push(mask | LEN_64_MARKER);
        buf.extend_from_slice(&(len as u64).to_be_bytes());
    }
}

fn require(buf: &[u8], needed: usize) -> Result<(), FrameError> {
    if buf.len() < needed {
        Err(FrameError::InsufficientData {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: u64 = 1 << 20;
    const KEY: [u8; 4] = [0x37, 0xFA, 0x21, 0x3D];

    /// Rewrites an unmasked server frame as if a client had sent it masked.
    fn as_client_frame(server_frame: &[u8], key: [u8; 4]) -> Vec<u8> {
        let prefix = FramePrefix {
            fin: true,
            opcode: OpCode::Binary,
            len7: server_frame[1] & LEN7_BITS,
        };
        let header_len = PREFIX_SIZE + prefix.extended_len_size();
        let mut out = server_frame[..header_len].to_vec();
        out[1] |= MASK_BIT;
        out.extend_from_slice(&key);
        let mut payload = server_frame[header_len..].to_vec();
        apply_mask(&mut payload, key);
        out.extend_from_slice(&payload);
        out
    }

    // ── Length encoding thresholds ───────────────────────────────────────────

    #[test]
    fn test_length_encoding_thresholds_and_round_trip() {
        for (len, marker, header_len) in [
            (1usize, 1u8, 2usize),
            (125, 125, 2),
            (126, LEN_16_MARKER, 4),
            (65_535, LEN_16_MARKER, 4),
            (65_536, LEN_64_MARKER, 10),
        ] {
            let text = "x".repeat(len);
            let encoded = encode_text_frame(&text);
            assert_eq!(encoded[1], marker, "length byte for {len}");
            assert_eq!(encoded.len(), header_len + len);

            let client = as_client_frame(&encoded, KEY);
            let (frame, consumed) = decode_frame(&client, LIMIT).expect("decode");
            assert_eq!(frame, DecodedFrame::Message(text));
            assert_eq!(consumed, client.len());
        }
    }

    #[test]
    fn test_zero_length_data_frame_is_rejected() {
        let bytes = encode_masked_frame(OpCode::Text, b"", KEY);
        assert_eq!(decode_frame(&bytes, LIMIT), Err(FrameError::EmptyPayload));
    }

    #[test]
    fn test_extended_lengths_are_big_endian() {
        let encoded = encode_text_frame(&"a".repeat(0x0102));
        assert_eq!(&encoded[2..4], &[0x01, 0x02]);

        let encoded = encode_text_frame(&"a".repeat(0x01_0203));
        assert_eq!(&encoded[2..10], &[0, 0, 0, 0, 0, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_outbound_frames_use_binary_opcode_fin_and_no_mask() {
        let encoded = encode_text_frame("hello");
        assert_eq!(encoded[0], 0x82);
        assert_eq!(encoded[1] & MASK_BIT, 0);
        assert_eq!(&encoded[2..], b"hello");
    }

    // ── Masking ───────────────────────────────────────────────────────────────

    #[test]
    fn test_masking_round_trip_for_various_keys() {
        let text = "The quick brown fox – ünïcödé";
        for seed in [0u32, 1, 0xDEAD_BEEF, u32::MAX, 0x8000_0001] {
            let key = seed.to_be_bytes();
            let bytes = encode_masked_frame(OpCode::Text, text.as_bytes(), key);
            let (frame, _) = decode_frame(&bytes, LIMIT).expect("decode");
            assert_eq!(frame, DecodedFrame::Message(text.to_string()), "key {seed:#x}");
        }
    }

    #[test]
    fn test_apply_mask_is_self_inverse() {
        let mut data = b"abcdefg".to_vec();
        apply_mask(&mut data, KEY);
        assert_ne!(data, b"abcdefg");
        apply_mask(&mut data, KEY);
        assert_eq!(data, b"abcdefg");
    }

    // ── Protocol violations ───────────────────────────────────────────────────

    #[test]
    fn test_unmasked_frame_is_rejected() {
        let bytes = encode_frame(OpCode::Text, b"hello");
        let err = decode_frame(&bytes, LIMIT).unwrap_err();
        assert_eq!(err, FrameError::UnmaskedFrame);
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let bytes = encode_masked_frame(OpCode::Text, &[0xC3, 0x28], KEY);
        assert_eq!(decode_frame(&bytes, LIMIT), Err(FrameError::InvalidUtf8));
    }

    #[test]
    fn test_reserved_opcode_is_rejected() {
        let mut bytes = encode_masked_frame(OpCode::Text, b"x", KEY);
        bytes[0] = FIN_BIT | 0x3;
        assert_eq!(decode_frame(&bytes, LIMIT), Err(FrameError::UnknownOpcode(0x3)));
    }

    #[test]
    fn test_declared_length_over_limit_is_rejected_before_payload() {
        // Header only: claims 2^40 bytes, no payload follows.
        let mut bytes = vec![FIN_BIT | 0x1, MASK_BIT | LEN_64_MARKER];
        bytes.extend_from_slice(&(1u64 << 40).to_be_bytes());
        assert_eq!(
            decode_frame(&bytes, LIMIT),
            Err(FrameError::TooLarge {
                declared: 1 << 40,
                limit: LIMIT
            })
        );
    }

    #[test]
    fn test_oversized_control_frame_is_rejected() {
        let bytes = encode_masked_frame(OpCode::Ping, &[0u8; 126], KEY);
        assert_eq!(
            decode_frame(&bytes, LIMIT),
            Err(FrameError::ControlFrameTooLong(126))
        );
    }

    // ── Control frames ────────────────────────────────────────────────────────

    #[test]
    fn test_close_frame_yields_close_signal() {
        let bytes = encode_masked_frame(OpCode::Close, &[0x03, 0xE8], KEY);
        let (frame, consumed) = decode_frame(&bytes, LIMIT).expect("decode");
        assert_eq!(frame, DecodedFrame::Close);
        assert_eq!(consumed, PREFIX_SIZE);
    }

    #[test]
    fn test_empty_ping_is_allowed() {
        let bytes = encode_masked_frame(OpCode::Ping, b"", KEY);
        let (frame, _) = decode_frame(&bytes, LIMIT).expect("decode");
        assert_eq!(frame, DecodedFrame::Ping(Vec::new()));
    }

    #[test]
    fn test_continuation_frame_is_delivered_as_message() {
        let mut bytes = encode_masked_frame(OpCode::Continuation, b"tail", KEY);
        bytes[0] &= !FIN_BIT;
        let (frame, _) = decode_frame(&bytes, LIMIT).expect("decode");
        assert_eq!(frame, DecodedFrame::Message("tail".to_string()));
    }

    // ── Partial input ─────────────────────────────────────────────────────────

    #[test]
    fn test_truncated_frames_report_insufficient_data() {
        let bytes = encode_masked_frame(OpCode::Text, &[b'z'; 300], KEY);
        for cut in [0, 1, 3, 7, bytes.len() - 1] {
            let err = decode_frame(&bytes[..cut], LIMIT).unwrap_err();
            assert!(
                matches!(err, FrameError::InsufficientData { .. }),
                "cut at {cut} gave {err:?}"
            );
            assert!(!err.is_protocol_violation());
        }
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut bytes = encode_masked_frame(OpCode::Text, b"one", KEY);
        bytes.extend(encode_masked_frame(OpCode::Text, b"two", [9, 9, 9, 9]));
        let (first, n) = decode_frame(&bytes, LIMIT).unwrap();
        let (second, m) = decode_frame(&bytes[n..], LIMIT).unwrap();
        assert_eq!(first, DecodedFrame::Message("one".into()));
        assert_eq!(second, DecodedFrame::Message("two".into()));
        assert_eq!(n + m, bytes.len());
    }
}
