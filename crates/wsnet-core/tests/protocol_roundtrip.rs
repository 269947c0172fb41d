//! Integration tests for the wsnet-core public API.
//!
//! These tests drive the frame codec, the handshake parser, and the SEP
//! grammar together the way a server would see a client session: upgrade
//! request first, then a stream of masked frames.

use wsnet_core::{
    decode_frame, encode_masked_frame, encode_text_frame, DecodedFrame, FrameError,
    HandshakeError, HandshakeRequest, OpCode, SepErrorKind, SepRequest,
};

const LIMIT: u64 = 16 * 1024 * 1024;

/// Decodes frames from `bytes` until the stream runs out or a close frame
/// ends the session.
fn decode_all(mut bytes: &[u8]) -> Vec<DecodedFrame> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        let (frame, consumed) = decode_frame(bytes, LIMIT).expect("decode must succeed");
        let closed = frame == DecodedFrame::Close;
        frames.push(frame);
        if closed {
            break;
        }
        bytes = &bytes[consumed..];
    }
    frames
}

#[test]
fn test_browser_style_upgrade_request() {
    // Arrange
    let text = "GET /chat?token=abc HTTP/1.1\r\n\
                Host: localhost:11311\r\n\
                Connection: upgrade\r\n\
                Upgrade: websocket\r\n\
                Sec-WebSocket-Version: 13\r\n\
                Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                Origin: http://localhost\r\n\r\n";

    // Act
    let request = HandshakeRequest::parse(text).expect("handshake must parse");

    // Assert
    assert_eq!(request.path, "chat");
    assert!(request
        .response()
        .contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
}

#[test]
fn test_upgrade_request_missing_key_is_rejected() {
    let text = "GET / HTTP/1.1\r\n\
                Connection: Upgrade\r\n\
                Upgrade: websocket\r\n\
                Sec-WebSocket-Version: 13\r\n\r\n";

    let result = HandshakeRequest::parse(text);

    assert!(matches!(result, Err(HandshakeError::MissingOrInvalidHeader(_))));
}

#[test]
fn test_pipelined_frames_decode_in_order() {
    // Arrange
    let mut stream = Vec::new();
    stream.extend(encode_masked_frame(OpCode::Text, b"first", [1, 2, 3, 4]));
    stream.extend(encode_masked_frame(OpCode::Ping, b"p", [9, 9, 9, 9]));
    stream.extend(encode_masked_frame(OpCode::Text, "zwölf".as_bytes(), [0, 0, 0, 0]));
    stream.extend(encode_masked_frame(OpCode::Close, b"", [5, 6, 7, 8]));

    // Act
    let frames = decode_all(&stream);

    // Assert
    assert_eq!(
        frames,
        vec![
            DecodedFrame::Message("first".to_string()),
            DecodedFrame::Ping(b"p".to_vec()),
            DecodedFrame::Message("zwölf".to_string()),
            DecodedFrame::Close,
        ]
    );
}

#[test]
fn test_large_message_uses_64_bit_length() {
    let text = "x".repeat(70_000);
    let bytes = encode_masked_frame(OpCode::Text, text.as_bytes(), [0xAA, 0xBB, 0xCC, 0xDD]);

    assert_eq!(bytes[1] & 0x7F, 127);
    let (frame, consumed) = decode_frame(&bytes, LIMIT).unwrap();
    assert_eq!(consumed, bytes.len());
    assert_eq!(frame, DecodedFrame::Message(text));
}

#[test]
fn test_server_frame_is_rejected_as_client_frame() {
    // A server frame is never masked, so reading it back as a client frame fails.
    let bytes = encode_text_frame("hello");

    assert_eq!(decode_frame(&bytes, LIMIT), Err(FrameError::UnmaskedFrame));
}

#[test]
fn test_decoded_message_feeds_sep_parser() {
    // Arrange
    let bytes = encode_masked_frame(OpCode::Text, b"json save:7\n{\"v\":1}", [3, 1, 4, 1]);

    // Act
    let (frame, _) = decode_frame(&bytes, LIMIT).unwrap();
    let DecodedFrame::Message(text) = frame else {
        panic!("expected a message frame");
    };
    let request = SepRequest::parse(&text).unwrap();

    // Assert
    assert_eq!(request.content_type, Some("json"));
    assert_eq!(request.route, "save");
    assert_eq!(request.id, Some("7"));
    assert_eq!(request.body, Some("{\"v\":1}"));
}

#[test]
fn test_sep_error_wire_format() {
    let err = SepRequest::parse("echo:").unwrap_err();

    assert_eq!(err.kind, SepErrorKind::BadRequest);
    assert!(err.to_string().starts_with("400 Bad Request: echo\n"));
}
