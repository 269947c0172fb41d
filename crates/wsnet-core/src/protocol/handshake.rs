//! HTTP/1.1 → WebSocket upgrade handshake (RFC 6455 section 4.2).
//!
//! The server reads a request of the form:
//!
//! ```text
//! GET /chat HTTP/1.1
//! Connection: Upgrade
//! Upgrade: websocket
//! Sec-WebSocket-Version: 13
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! <blank line>
//! ```
//!
//! and answers with `101 Switching Protocols` plus a `Sec-WebSocket-Accept`
//! header.  This module only parses and validates text; reading lines from
//! the socket is done by the server crate.
//!
//! # Validation rules
//!
//! - The request line must start with `GET ` and end with `HTTP/1.1`.
//! - The path between them is trimmed of `/`, `\` and whitespace.  An empty
//!   path addresses the root handler.
//! - `Connection`, `Upgrade`, `Sec-WebSocket-Version` and `Sec-WebSocket-Key`
//!   must each appear exactly once.  Unknown headers are ignored.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Magic string appended to the client key before hashing (RFC 6455).
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this server speaks.
pub const SUPPORTED_VERSION: &str = "13";

/// Decoded length of a well-formed `Sec-WebSocket-Key`.
const KEY_NONCE_LEN: usize = 16;

/// Reasons a handshake request is rejected.
///
/// A rejected request is never answered: the socket is closed and the error
/// is logged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// The request line or a header line does not follow HTTP/1.1 syntax.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A required header is absent or carries an unexpected value.
    #[error("missing or invalid header: {0}")]
    MissingOrInvalidHeader(String),

    /// A recognised header appeared more than once.
    #[error("duplicate header: {0}")]
    DuplicateHeader(&'static str),
}

/// Parses a request line and returns the routing path.
///
/// # Errors
///
/// Returns [`HandshakeError::MalformedRequest`] unless the trimmed line starts
/// with `GET ` and ends with `HTTP/1.1`.
///
/// # Examples
///
/// ```rust
/// use wsnet_core::protocol::parse_request_line;
///
/// assert_eq!(parse_request_line("GET /chat/ HTTP/1.1").unwrap(), "chat");
/// assert_eq!(parse_request_line("GET / HTTP/1.1").unwrap(), "");
/// assert!(parse_request_line("POST / HTTP/1.1").is_err());
/// ```
pub fn parse_request_line(line: &str) -> Result<String, HandshakeError> {
    let line = line.trim();
    let target = line
        .strip_prefix("GET ")
        .ok_or_else(|| HandshakeError::MalformedRequest(format!("expected 'GET': {line}")))?
        .strip_suffix("HTTP/1.1")
        .ok_or_else(|| {
            HandshakeError::MalformedRequest(format!("expected 'HTTP/1.1' at the end: {line}"))
        })?;

    // The query string plays no part in routing.
    let target = target.split('?').next().unwrap_or_default();

    Ok(target
        .trim_matches(|c: char| c == '/' || c == '\\' || c.is_whitespace())
        .to_string())
}

/// Accumulates header lines and enforces the at-most-once rule.
///
/// Feed each header line to [`HeaderCollector::feed`] until the blank line,
/// then call [`HeaderCollector::finish`].
#[derive(Debug, Default)]
pub struct HeaderCollector {
    connection: bool,
    upgrade: bool,
    version: bool,
    key: Option<String>,
}

impl HeaderCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one `Name: value` header line.
    ///
    /// # Errors
    ///
    /// - [`HandshakeError::MalformedRequest`] if the line has no `:`.
    /// - [`HandshakeError::DuplicateHeader`] on a second occurrence of a
    ///   recognised header.
    /// - [`HandshakeError::MissingOrInvalidHeader`] if a recognised header has
    ///   the wrong value.
    pub fn feed(&mut self, line: &str) -> Result<(), HandshakeError> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HandshakeError::MalformedRequest(format!("invalid header: {line}")))?;
        let value = value.trim();

        match name.trim().to_ascii_lowercase().as_str() {
            "connection" => {
                mark_once(&mut self.connection, "Connection")?;
                expect_value("Connection", value, "Upgrade", true)
            }
            "upgrade" => {
                mark_once(&mut self.upgrade, "Upgrade")?;
                expect_value("Upgrade", value, "websocket", true)
            }
            "sec-websocket-version" => {
                mark_once(&mut self.version, "Sec-WebSocket-Version")?;
                expect_value("Sec-WebSocket-Version", value, SUPPORTED_VERSION, false)
            }
            "sec-websocket-key" => {
                if self.key.is_some() {
                    return Err(HandshakeError::DuplicateHeader("Sec-WebSocket-Key"));
                }
                self.key = Some(value.to_string());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Checks that every required header was present and builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::MissingOrInvalidHeader`] naming the first
    /// missing header, or if the key is not base64 for a 16-byte nonce.
    pub fn finish(self, path: String) -> Result<HandshakeRequest, HandshakeError> {
        if !self.connection {
            return Err(missing("Connection"));
        }
        if !self.upgrade {
            return Err(missing("Upgrade"));
        }
        if !self.version {
            return Err(missing("Sec-WebSocket-Version"));
        }
        let key = self.key.ok_or_else(|| missing("Sec-WebSocket-Key"))?;
        match BASE64_STANDARD.decode(&key) {
            Ok(nonce) if nonce.len() == KEY_NONCE_LEN => {}
            _ => {
                return Err(HandshakeError::MissingOrInvalidHeader(format!(
                    "Sec-WebSocket-Key is not a base64-encoded 16-byte nonce: '{key}'"
                )))
            }
        }
        Ok(HandshakeRequest { path, key })
    }
}

fn mark_once(seen: &mut bool, name: &'static str) -> Result<(), HandshakeError> {
    if *seen {
        return Err(HandshakeError::DuplicateHeader(name));
    }
    *seen = true;
    Ok(())
}

fn expect_value(
    name: &str,
    value: &str,
    expected: &str,
    ignore_case: bool,
) -> Result<(), HandshakeError> {
    let matches = if ignore_case {
        value.eq_ignore_ascii_case(expected)
    } else {
        value == expected
    };
    if matches {
        Ok(())
    } else {
        Err(HandshakeError::MissingOrInvalidHeader(format!(
            "'{name}' expected '{expected}', got '{value}'"
        )))
    }
}

fn missing(name: &str) -> HandshakeError {
    HandshakeError::MissingOrInvalidHeader(format!("expected a '{name}' header"))
}

/// A validated upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Routing key; empty for the root handler.
    pub path: String,
    key: String,
}

impl HandshakeRequest {
    /// Parses a complete request (request line, headers, blank line).
    ///
    /// Lines may be terminated by `\r\n` or `\n`.  Anything after the blank
    /// line is ignored.
    ///
    /// # Errors
    ///
    /// Returns the first [`HandshakeError`] encountered.
    pub fn parse(text: &str) -> Result<Self, HandshakeError> {
        let mut lines = text.lines();
        let path = parse_request_line(lines.next().unwrap_or_default())?;
        let mut headers = HeaderCollector::new();
        for line in lines {
            if line.trim().is_empty() {
                break;
            }
            headers.feed(line)?;
        }
        headers.finish(path)
    }

    /// The raw `Sec-WebSocket-Key` sent by the client.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The `Sec-WebSocket-Accept` value for this request.
    pub fn accept_key(&self) -> String {
        compute_accept_key(&self.key)
    }

    /// The complete `101 Switching Protocols` response, blank line included.
    pub fn response(&self) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Connection: Upgrade\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            self.accept_key()
        )
    }
}

/// Computes `base64(sha1(key + WEBSOCKET_GUID))`.
///
/// # Examples
///
/// ```rust
/// use wsnet_core::compute_accept_key;
///
/// // RFC 6455 section 1.3 test vector.
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn request(path: &str, headers: &[&str]) -> String {
        let mut text = format!("GET {path} HTTP/1.1\r\n");
        for h in headers {
            text.push_str(h);
            text.push_str("\r\n");
        }
        text.push_str("\r\n");
        text
    }

    fn valid_headers() -> Vec<&'static str> {
        vec![
            "Host: example.com",
            "Connection: Upgrade",
            "Upgrade: websocket",
            "Sec-WebSocket-Version: 13",
            "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==",
        ]
    }

    #[test]
    fn test_rfc6455_accept_key_vector() {
        assert_eq!(compute_accept_key(SAMPLE_KEY), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_valid_request_parses_path_and_key() {
        let req = HandshakeRequest::parse(&request("/sep", &valid_headers())).unwrap();
        assert_eq!(req.path, "sep");
        assert_eq!(req.key(), SAMPLE_KEY);
    }

    #[test]
    fn test_root_path_variants_are_empty() {
        for line in ["GET / HTTP/1.1", "GET  HTTP/1.1", "GET \\/ HTTP/1.1", "  GET / HTTP/1.1  "] {
            assert_eq!(parse_request_line(line).unwrap(), "", "{line:?}");
        }
    }

    #[test]
    fn test_path_is_trimmed_and_query_dropped() {
        assert_eq!(parse_request_line("GET //chat// HTTP/1.1").unwrap(), "chat");
        assert_eq!(parse_request_line("GET /chat?token=1 HTTP/1.1").unwrap(), "chat");
    }

    #[test]
    fn test_non_get_request_is_malformed() {
        assert!(matches!(
            parse_request_line("POST /chat HTTP/1.1"),
            Err(HandshakeError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_wrong_http_version_is_malformed() {
        assert!(matches!(
            parse_request_line("GET /chat HTTP/1.0"),
            Err(HandshakeError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_header_without_colon_is_malformed() {
        let mut headers = valid_headers();
        headers.push("garbage");
        assert!(matches!(
            HandshakeRequest::parse(&request("/", &headers)),
            Err(HandshakeError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_header_names_and_values_are_case_insensitive() {
        let headers = [
            "connection: upgrade",
            "UPGRADE: WebSocket",
            "sec-websocket-version: 13",
            "SEC-WEBSOCKET-KEY: dGhlIHNhbXBsZSBub25jZQ==",
        ];
        assert!(HandshakeRequest::parse(&request("/", &headers)).is_ok());
    }

    #[test]
    fn test_each_duplicate_header_is_rejected() {
        for (dup, name) in [
            ("Connection: Upgrade", "Connection"),
            ("Upgrade: websocket", "Upgrade"),
            ("Sec-WebSocket-Version: 13", "Sec-WebSocket-Version"),
            ("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==", "Sec-WebSocket-Key"),
        ] {
            let mut headers = valid_headers();
            headers.push(dup);
            assert_eq!(
                HandshakeRequest::parse(&request("/", &headers)),
                Err(HandshakeError::DuplicateHeader(name))
            );
        }
    }

    #[test]
    fn test_each_missing_header_is_rejected() {
        for skip in 1..valid_headers().len() {
            let headers: Vec<_> = valid_headers()
                .into_iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, h)| h)
                .collect();
            assert!(
                matches!(
                    HandshakeRequest::parse(&request("/", &headers)),
                    Err(HandshakeError::MissingOrInvalidHeader(_))
                ),
                "missing header #{skip} must be rejected"
            );
        }
    }

    #[test]
    fn test_wrong_header_values_are_rejected() {
        for (index, bad) in [
            (1, "Connection: keep-alive"),
            (2, "Upgrade: h2c"),
            (3, "Sec-WebSocket-Version: 8"),
            (4, "Sec-WebSocket-Key: not base64!"),
        ] {
            let mut headers = valid_headers();
            headers[index] = bad;
            assert!(
                matches!(
                    HandshakeRequest::parse(&request("/", &headers)),
                    Err(HandshakeError::MissingOrInvalidHeader(_))
                ),
                "{bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_response_contains_accept_and_blank_line() {
        let req = HandshakeRequest::parse(&request("/", &valid_headers())).unwrap();
        let response = req.response();
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Connection: Upgrade\r\n"));
        assert!(response.contains("Upgrade: websocket\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }
}
