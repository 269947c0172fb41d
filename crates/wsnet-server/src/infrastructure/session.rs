//! The per-connection receive loop.
//!
//! [`serve`] runs on the connection's own task from registration to teardown:
//!
//! 1. Register with the endpoint and run `on_connect`.
//! 2. Read frames in order, delivering each text message to the handler
//!    before reading the next.
//! 3. Stop on a close frame, end of stream, protocol violation, handler
//!    failure, a close request, or server shutdown.
//! 4. Tear down: deregister, release the socket, run `on_disconnect` once,
//!    then wake anyone waiting in `Connection::closed`.

use std::fmt;

use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use wsnet_core::{DecodedFrame, OpCode};

use crate::application::connection::Connection;
use crate::application::endpoint::Endpoint;
use crate::application::handler::HandlerError;
use crate::infrastructure::frame_reader::{FrameReadError, FrameReader};

/// Why a receive loop ended with an error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Read(#[from] FrameReadError),

    #[error("handler failed: {0}")]
    Handler(HandlerError),
}

/// Why a receive loop ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    PeerClosed,
    EndOfStream,
    CloseRequested,
    ServerStopped,
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PeerClosed => "peer sent close",
            Self::EndOfStream => "peer disconnected",
            Self::CloseRequested => "close requested",
            Self::ServerStopped => "server stopping",
        })
    }
}

/// Runs one connection from registration to teardown.
pub async fn serve<R>(
    endpoint: Endpoint,
    connection: Connection,
    mut frames: FrameReader<R>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let peer = connection.peer_addr();
    endpoint.connect(&connection).await;
    info!("connection {peer} opened on '/{}'", endpoint.url());

    match receive_loop(&endpoint, &connection, &mut frames, &shutdown).await {
        Ok(stop) => info!("connection {peer} closed: {stop}"),
        Err(e) => error!("connection {peer} terminated: {e}"),
    }

    teardown(&endpoint, &connection).await;
}

async fn receive_loop<R>(
    endpoint: &Endpoint,
    connection: &Connection,
    frames: &mut FrameReader<R>,
    shutdown: &CancellationToken,
) -> Result<Stop, SessionError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = connection.close_requested() => return Ok(Stop::CloseRequested),
            _ = shutdown.cancelled() => return Ok(Stop::ServerStopped),
            frame = frames.next_frame() => frame?,
        };

        match frame {
            None => return Ok(Stop::EndOfStream),
            Some(DecodedFrame::Message(text)) => endpoint
                .deliver(connection, text)
                .await
                .map_err(SessionError::Handler)?,
            Some(DecodedFrame::Ping(payload)) => {
                if let Err(e) = connection.send_control(OpCode::Pong, &payload).await {
                    debug!("pong to {} failed: {e}", connection.peer_addr());
                }
            }
            Some(DecodedFrame::Pong(_)) => {}
            Some(DecodedFrame::Close) => {
                if let Err(e) = connection.send_control(OpCode::Close, &[]).await {
                    debug!("close echo to {} failed: {e}", connection.peer_addr());
                }
                return Ok(Stop::PeerClosed);
            }
        }
    }
}

async fn teardown(endpoint: &Endpoint, connection: &Connection) {
    let removed = endpoint.deregister(connection);
    connection.release().await;
    if removed {
        endpoint.notify_disconnect(connection).await;
    }
    connection.mark_finished();
}
