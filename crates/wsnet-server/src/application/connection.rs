//! Connection handle and lifecycle state machine.
//!
//! A [`Connection`] is a cheap, cloneable handle to one upgraded socket.  The
//! receive loop (see `infrastructure::session`) owns the read half; the
//! handle owns the write half and the cancellation signals.
//!
//! # Lifecycle
//!
//! ```text
//!   Open ──(stream error | violation | close frame | close())──► Closing
//!   Closing ──(receive loop stopped, writer released)──────────► Closed
//! ```
//!
//! `Closed` is terminal.  Closing twice is a no-op, and every send after
//! `Closed` fails with [`SendError::ConnectionClosed`].
//!
//! # Identity
//!
//! Two handles are equal when they refer to the same socket, regardless of
//! peer address.  This is what registries and broadcast-except rely on.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wsnet_core::{encode_frame, encode_text_frame, OpCode};

/// Write half of an upgraded socket.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered with its handler; the receive loop is running.
    Open,
    /// Close requested; the receive loop is being cancelled.
    Closing,
    /// Deregistered and released.  Irreversible.
    Closed,
}

impl ConnectionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            OPEN => Self::Open,
            CLOSING => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Errors returned by [`Connection::send`].
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection closed before or during the send.  Broadcasters treat
    /// this as benign.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The socket write failed.  The connection is closing as a result.
    #[error("I/O error while sending: {0}")]
    Io(#[from] std::io::Error),
}

struct Shared {
    peer_addr: SocketAddr,
    writer: Mutex<Option<BoxedWriter>>,
    state: AtomicU8,
    /// Fired when a close is requested; interrupts reads and blocked writes.
    cancel: CancellationToken,
    /// Fired once teardown has completed.
    finished: CancellationToken,
    close_timeout: Duration,
}

/// Handle to one established WebSocket connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Wraps the write half of an upgraded socket.
    ///
    /// The server calls this after a successful handshake.  It is public so
    /// handlers can be driven in tests over an in-memory stream.
    pub fn new(peer_addr: SocketAddr, writer: BoxedWriter, close_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                peer_addr,
                writer: Mutex::new(Some(writer)),
                state: AtomicU8::new(OPEN),
                cancel: CancellationToken::new(),
                finished: CancellationToken::new(),
                close_timeout,
            }),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.shared.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_raw(self.shared.state.load(Ordering::Acquire))
    }

    /// Sends `text` as one unmasked frame.
    ///
    /// Concurrent sends on the same connection are serialised; frames are
    /// never interleaved.
    ///
    /// # Errors
    ///
    /// - [`SendError::ConnectionClosed`] once the connection is closed, or if
    ///   it is closed while this send is blocked.
    /// - [`SendError::Io`] if the socket write fails.  The connection is
    ///   closed as a side effect.
    pub async fn send(&self, text: &str) -> Result<(), SendError> {
        self.send_frame(&encode_text_frame(text)).await
    }

    /// Sends a control frame (pong, close).
    pub(crate) async fn send_control(&self, opcode: OpCode, payload: &[u8]) -> Result<(), SendError> {
        self.send_frame(&encode_frame(opcode, payload)).await
    }

    async fn send_frame(&self, frame: &[u8]) -> Result<(), SendError> {
        if self.state() == ConnectionState::Closed {
            return Err(SendError::ConnectionClosed);
        }
        let mut guard = self.shared.writer.lock().await;
        let writer = guard.as_mut().ok_or(SendError::ConnectionClosed)?;

        // A write blocked on a slow peer must not outlive a close request.
        let result = tokio::select! {
            biased;
            result = write_frame(writer, frame) => result,
            _ = self.shared.cancel.cancelled() => return Err(SendError::ConnectionClosed),
        };
        drop(guard);

        if let Err(e) = result {
            debug!("send to {} failed: {e}", self.shared.peer_addr);
            self.request_close();
            return Err(SendError::Io(e));
        }
        Ok(())
    }

    /// Requests a close without waiting for it.
    ///
    /// Safe to call from inside a handler running on this connection's own
    /// receive loop, where [`Connection::close`] would wait on itself.
    pub fn request_close(&self) {
        let _ = self
            .shared
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire);
        self.shared.cancel.cancel();
    }

    /// Closes the connection and waits, up to the configured close timeout,
    /// for teardown to finish.
    pub async fn close(&self) {
        self.request_close();
        let wait = tokio::time::timeout(self.shared.close_timeout, self.closed()).await;
        if wait.is_err() {
            warn!(
                "connection {} did not finish closing within {:?}",
                self.shared.peer_addr, self.shared.close_timeout
            );
        }
    }

    /// Resolves once teardown has completed.
    pub async fn closed(&self) {
        self.shared.finished.cancelled().await;
    }

    /// Resolves once a close has been requested.
    pub(crate) async fn close_requested(&self) {
        self.shared.cancel.cancelled().await;
    }

    /// Moves to `Closed` and shuts the write half down.
    ///
    /// Must run after the connection has been deregistered.
    pub(crate) async fn release(&self) {
        self.request_close();
        self.shared.state.store(CLOSED, Ordering::Release);

        let writer = self.shared.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let shutdown = tokio::time::timeout(self.shared.close_timeout, writer.shutdown()).await;
            if !matches!(shutdown, Ok(Ok(()))) {
                debug!("connection {}: unclean shutdown of write half", self.shared.peer_addr);
            }
        }
    }

    /// Signals [`Connection::closed`] waiters.
    pub(crate) fn mark_finished(&self) {
        self.shared.finished.cancel();
    }
}

async fn write_frame(writer: &mut BoxedWriter, frame: &[u8]) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.shared) as usize).hash(state);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.shared.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

// ── Test support ──────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    /// A connection whose writes land in the returned in-memory stream.
    pub(crate) fn duplex_connection(port: u16) -> (Connection, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let conn = Connection::new(addr, Box::new(ours), Duration::from_millis(200));
        (conn, theirs)
    }

    /// Reads one unmasked server frame, returning `(opcode, payload)`.
    pub(crate) async fn read_server_frame(stream: &mut DuplexStream) -> (u8, Vec<u8>) {
        let mut prefix = [0u8; 2];
        stream.read_exact(&mut prefix).await.unwrap();
        let len = match prefix[1] & 0x7F {
            126 => stream.read_u16().await.unwrap() as usize,
            127 => stream.read_u64().await.unwrap() as usize,
            n => n as usize,
        };
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        (prefix[0] & 0x0F, payload)
    }

    /// Reads one server frame and returns its payload as text.
    pub(crate) async fn read_server_text(stream: &mut DuplexStream) -> String {
        let (_, payload) = read_server_frame(stream).await;
        String::from_utf8(payload).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_send_writes_one_binary_frame() {
        // Arrange
        let (conn, mut peer) = duplex_connection(1);

        // Act
        conn.send("hello").await.unwrap();

        // Assert
        let (opcode, payload) = read_server_frame(&mut peer).await;
        assert_eq!(opcode, 0x2);
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn test_send_after_release_fails_with_connection_closed() {
        let (conn, _peer) = duplex_connection(1);
        conn.release().await;

        let result = conn.send("late").await;

        assert!(matches!(result, Err(SendError::ConnectionClosed)));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_request_close_moves_to_closing_and_is_idempotent() {
        let (conn, _peer) = duplex_connection(1);

        conn.request_close();
        conn.request_close();

        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[tokio::test]
    async fn test_release_after_release_stays_closed() {
        let (conn, _peer) = duplex_connection(1);
        conn.release().await;
        conn.release().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_returns_after_timeout_when_nothing_finishes() {
        // No receive loop is running, so close() must give up after the
        // bounded wait instead of hanging.
        let (conn, _peer) = duplex_connection(1);

        let waited = tokio::time::timeout(Duration::from_secs(5), conn.close()).await;

        assert!(waited.is_ok());
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[tokio::test]
    async fn test_clones_are_equal_distinct_connections_are_not() {
        let (a, _pa) = duplex_connection(1);
        let (b, _pb) = duplex_connection(1);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_write_failure_closes_connection() {
        // Arrange: drop the peer so the next write hits a broken pipe.
        let (conn, peer) = duplex_connection(1);
        drop(peer);

        // Act
        let result = conn.send("nobody home").await;

        // Assert
        assert!(matches!(result, Err(SendError::Io(_))));
        assert_eq!(conn.state(), ConnectionState::Closing);
    }
}
