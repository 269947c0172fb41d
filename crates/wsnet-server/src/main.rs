//! wsnet demo server: entry point.
//!
//! Runs a wsnet server with three endpoints:
//!
//! | Path    | Handler                                                    |
//! |---------|------------------------------------------------------------|
//! | `/`     | Logs every message it receives                             |
//! | `/chat` | Relays each message to every other chat connection         |
//! | `/sep`  | SEP routes `log`, `echo`, `whoami`, `note` (json payload)  |
//!
//! # Usage
//!
//! ```text
//! wsnet-server [OPTIONS]
//!
//! Options:
//!   --bind   <IP>    Listener IP address
//!   --port   <PORT>  Listener port
//!   --config <FILE>  TOML config file; --bind/--port override its bind_addr
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable       | Flag       |
//! |----------------|------------|
//! | `WSNET_BIND`   | `--bind`   |
//! | `WSNET_PORT`   | `--port`   |
//! | `WSNET_CONFIG` | `--config` |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wsnet_server::application::handler::HandlerError;
use wsnet_server::application::sep::{RouteDispatcher, RouteRequest, Structured};
use wsnet_server::application::{Connection, HandlerContext, HandlerResult, MessageHandler};
use wsnet_server::domain::ServerConfig;
use wsnet_server::infrastructure::ServerBuilder;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// wsnet WebSocket server.
#[derive(Debug, Parser)]
#[command(
    name = "wsnet-server",
    about = "Embeddable WebSocket server with SEP routing (demo binary)",
    version
)]
struct Cli {
    /// IP address to bind to.  Defaults to the config file's, or 127.0.0.1.
    #[arg(long, env = "WSNET_BIND")]
    bind: Option<IpAddr>,

    /// Port to listen on.  Defaults to the config file's, or 11311.
    #[arg(long, env = "WSNET_PORT")]
    port: Option<u16>,

    /// Path to a TOML config file.
    #[arg(long, env = "WSNET_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Builds the [`ServerConfig`]: the config file (or defaults), then the
    /// `--bind`/`--port` overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        let ip = self.bind.unwrap_or(config.bind_addr.ip());
        let port = self.port.unwrap_or(config.bind_addr.port());
        config.bind_addr = SocketAddr::new(ip, port);
        Ok(config)
    }
}

// ── Demo handlers ─────────────────────────────────────────────────────────────

/// Root handler: logs what it receives.
struct MessagePrinter;

#[async_trait]
impl MessageHandler for MessagePrinter {
    async fn on_connect(&self, _ctx: &HandlerContext, connection: &Connection) {
        info!("[root] {} connected", connection.peer_addr());
    }

    async fn on_disconnect(&self, _ctx: &HandlerContext, connection: &Connection) {
        info!("[root] {} disconnected", connection.peer_addr());
    }

    async fn handle(
        &self,
        _ctx: &HandlerContext,
        connection: &Connection,
        message: String,
    ) -> HandlerResult {
        info!("[root] {}: {message}", connection.peer_addr());
        Ok(())
    }
}

/// `/chat`: relays every message to the other chat connections.
struct ChatRelay;

#[async_trait]
impl MessageHandler for ChatRelay {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        connection: &Connection,
        message: String,
    ) -> HandlerResult {
        let line = format!("{}: {message}", connection.peer_addr());
        ctx.broadcast_except(connection, &line).await;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Note {
    title: String,
    #[serde(default)]
    body: String,
}

fn sep_dispatcher() -> anyhow::Result<RouteDispatcher> {
    let dispatcher = RouteDispatcher::builder()
        .route_with_payload("log", |req: RouteRequest, text: String| async move {
            info!("[sep] #{} logs: {text}", req.connection_id);
            Ok::<(), HandlerError>(())
        })
        .route_with_payload("echo", |req: RouteRequest, text: String| async move {
            req.reply(&text).await?;
            Ok::<(), HandlerError>(())
        })
        .route("whoami", |req: RouteRequest| async move {
            req.reply(&req.connection_id.to_string()).await?;
            Ok::<(), HandlerError>(())
        })
        .route_with_id_and_payload(
            "note",
            |req: RouteRequest, id: u32, note: Structured<Note>| async move {
                let note = note.into_inner();
                info!(
                    "[sep] #{} note {id}: {} ({} bytes)",
                    req.connection_id,
                    note.title,
                    note.body.len()
                );
                let delivered = req
                    .context
                    .broadcast(&format!("note {id}: {}", note.title))
                    .await;
                req.reply(&format!("delivered to {delivered}")).await?;
                Ok::<(), HandlerError>(())
            },
        )
        .build()
        .context("invalid SEP route table")?;
    Ok(dispatcher)
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Initialise `tracing_subscriber` from `RUST_LOG` (default `info`).
/// 2. Parse the CLI into a [`ServerConfig`].
/// 3. Build and start the server.
/// 4. Wait for Ctrl+C, then stop the server gracefully.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;
    info!("wsnet server starting on {}", config.bind_addr);

    let server = ServerBuilder::new(config)
        .root_handler(Arc::new(MessagePrinter))
        .handler("chat", Arc::new(ChatRelay))
        .handler("sep", Arc::new(sep_dispatcher()?))
        .build()
        .context("invalid server configuration")?;
    let handle = server.start().await.context("failed to start server")?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C; shutting down"),
        Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}; shutting down"),
    }

    handle.stop().await;
    info!("wsnet server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
