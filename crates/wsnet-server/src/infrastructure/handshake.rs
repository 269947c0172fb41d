//! Server side of the HTTP upgrade handshake.
//!
//! Reads the request line and headers from a buffered stream, validates them
//! with the parsers in `wsnet_core::protocol::handshake`, resolves the path to
//! a handler, and only then writes the `101 Switching Protocols` response.
//! Any failure leaves the response unwritten; the caller drops the socket.
//!
//! Lines are read through `take(max_line)` so a peer cannot make the server
//! buffer an unbounded header.  Bytes that arrive after the blank line stay
//! in the `BufReader` and become the first bytes of the frame stream.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wsnet_core::protocol::{parse_request_line, HeaderCollector};
use wsnet_core::{HandshakeError, HandshakeRequest};

/// Most header lines accepted before the blank line.
pub const MAX_HEADER_LINES: usize = 100;

/// Why an upgrade was refused.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The request is not a valid WebSocket upgrade.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// No handler is registered for the requested path.
    #[error("no handler registered for path '/{0}'")]
    UnknownPath(String),

    /// A request or header line exceeded the configured limit.
    #[error("handshake line exceeds {0} bytes")]
    LineTooLong(usize),

    /// The peer closed the stream before the blank line.
    #[error("connection closed during handshake")]
    UnexpectedEof,

    /// The handshake did not finish in time.
    #[error("handshake not completed within {0:?}")]
    Timeout(Duration),

    /// The server began stopping before the handshake finished.
    #[error("server stopping")]
    ServerStopped,

    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads and validates an upgrade request, then answers it.
///
/// `resolve` maps the trimmed request path to the handler that will own the
/// connection.  It runs before the response is written, so an unknown path
/// is refused without a `101`.
///
/// # Errors
///
/// Returns the first [`UpgradeError`] encountered.
pub async fn accept_upgrade<R, W, T, F>(
    reader: &mut R,
    writer: &mut W,
    max_line: usize,
    resolve: F,
) -> Result<(HandshakeRequest, T), UpgradeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnOnce(&str) -> Option<T>,
{
    let request_line = read_line(reader, max_line).await?;
    let path = parse_request_line(&request_line)?;

    let mut headers = HeaderCollector::new();
    let mut count = 0;
    loop {
        let line = read_line(reader, max_line).await?;
        if line.trim().is_empty() {
            break;
        }
        count += 1;
        if count > MAX_HEADER_LINES {
            return Err(HandshakeError::MalformedRequest(format!(
                "more than {MAX_HEADER_LINES} header lines"
            ))
            .into());
        }
        headers.feed(&line)?;
    }
    let request = headers.finish(path)?;

    let target = resolve(&request.path).ok_or_else(|| UpgradeError::UnknownPath(request.path.clone()))?;

    writer.write_all(request.response().as_bytes()).await?;
    writer.flush().await?;
    Ok((request, target))
}

/// Reads one `\n`-terminated line of at most `max_line` bytes.
async fn read_line<R>(reader: &mut R, max_line: usize) -> Result<String, UpgradeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = u64::try_from(max_line).unwrap_or(u64::MAX);
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Err(UpgradeError::UnexpectedEof);
    }
    if buf.last() != Some(&b'\n') {
        return Err(if buf.len() >= max_line {
            UpgradeError::LineTooLong(max_line)
        } else {
            UpgradeError::UnexpectedEof
        });
    }
    String::from_utf8(buf).map_err(|_| {
        HandshakeError::MalformedRequest("handshake line is not valid UTF-8".to_string()).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;
    use tokio_test::io::Builder;

    const REQUEST: &str = "GET /chat HTTP/1.1\r\n\
        Host: localhost\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    fn chat_only(path: &str) -> Option<&'static str> {
        (path == "chat").then_some("chat-handler")
    }

    #[tokio::test]
    async fn test_valid_request_gets_101_with_accept_key() {
        // Arrange
        let mut reader = BufReader::new(Builder::new().read(REQUEST.as_bytes()).build());
        let mut writer = Vec::new();

        // Act
        let (request, target) = accept_upgrade(&mut reader, &mut writer, 1024, chat_only)
            .await
            .unwrap();

        // Assert
        assert_eq!(request.path, "chat");
        assert_eq!(target, "chat-handler");
        let response = String::from_utf8(writer).unwrap();
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let (head, tail) = REQUEST.split_at(37);
        let mock = Builder::new()
            .read(head.as_bytes())
            .read(tail.as_bytes())
            .build();
        let mut reader = BufReader::new(mock);
        let mut writer = Vec::new();

        let result = accept_upgrade(&mut reader, &mut writer, 1024, chat_only).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_path_is_refused_without_response() {
        // Arrange
        let request = REQUEST.replace("/chat", "/nowhere");
        let mut reader = BufReader::new(Builder::new().read(request.as_bytes()).build());
        let mut writer = Vec::new();

        // Act
        let err = accept_upgrade(&mut reader, &mut writer, 1024, chat_only)
            .await
            .unwrap_err();

        // Assert
        assert!(matches!(err, UpgradeError::UnknownPath(p) if p == "nowhere"));
        assert!(writer.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_header_is_refused() {
        let request = REQUEST.replace(
            "Sec-WebSocket-Version: 13\r\n",
            "Sec-WebSocket-Version: 13\r\nSec-WebSocket-Version: 13\r\n",
        );
        let mut reader = BufReader::new(Builder::new().read(request.as_bytes()).build());
        let mut writer = Vec::new();

        let err = accept_upgrade(&mut reader, &mut writer, 1024, chat_only)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UpgradeError::Handshake(HandshakeError::DuplicateHeader(_))
        ));
        assert!(writer.is_empty());
    }

    #[tokio::test]
    async fn test_overlong_line_is_refused() {
        let request = format!("GET /{} HTTP/1.1\r\n", "a".repeat(600));
        let mut reader = BufReader::new(Builder::new().read(request.as_bytes()).build());
        let mut writer = Vec::new();

        let err = accept_upgrade(&mut reader, &mut writer, 256, chat_only)
            .await
            .unwrap_err();

        assert!(matches!(err, UpgradeError::LineTooLong(256)));
    }

    #[tokio::test]
    async fn test_eof_before_blank_line() {
        let request = "GET /chat HTTP/1.1\r\nUpgrade: websocket\r\n";
        let mut reader = BufReader::new(Builder::new().read(request.as_bytes()).build());
        let mut writer = Vec::new();

        let err = accept_upgrade(&mut reader, &mut writer, 1024, chat_only)
            .await
            .unwrap_err();

        assert!(matches!(err, UpgradeError::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_bytes_after_blank_line_stay_buffered() {
        // Arrange: a client that pipelines its first frame with the request.
        let mut bytes = REQUEST.as_bytes().to_vec();
        bytes.extend_from_slice(&[0x81, 0x80, 1, 2, 3, 4]);
        let mut reader = BufReader::new(Builder::new().read(&bytes).build());
        let mut writer = Vec::new();

        // Act
        accept_upgrade(&mut reader, &mut writer, 1024, chat_only)
            .await
            .unwrap();
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();

        // Assert
        assert_eq!(rest, vec![0x81, 0x80, 1, 2, 3, 4]);
    }
}
