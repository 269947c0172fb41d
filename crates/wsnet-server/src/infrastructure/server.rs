//! Listener, accept loop, and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Validating the handler table at build time ([`ServerBuilder::build`]).
//! 2. Binding the TCP listener ([`Server::start`]).
//! 3. Accepting sockets and spawning one task per socket.
//! 4. Running the upgrade handshake on that task, bounded by the configured
//!    timeout and abandoned if the server stops, and resolving the path to
//!    its endpoint.
//! 5. Handing the upgraded stream to the session receive loop.
//! 6. Stopping: ending the accept loop and closing every live connection
//!    ([`ServerHandle::stop`]).
//!
//! # Scalability
//!
//! The accept loop never waits on a client.  It accepts a socket and spawns
//! its task before accepting the next, so a slow handshake on one socket
//! never delays others.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use wsnet_core::is_valid_segment;

use crate::application::connection::Connection;
use crate::application::endpoint::Endpoint;
use crate::application::handler::MessageHandler;
use crate::application::router::Router;
use crate::domain::{ConfigError, ServerConfig, ServerError};
use crate::infrastructure::frame_reader::FrameReader;
use crate::infrastructure::handshake::{accept_upgrade, UpgradeError};
use crate::infrastructure::session;

// ── Builder ───────────────────────────────────────────────────────────────────

/// Collects the handler table for a [`Server`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use wsnet_server::application::{Connection, HandlerContext, HandlerResult, MessageHandler};
/// use wsnet_server::domain::ServerConfig;
/// use wsnet_server::infrastructure::server::ServerBuilder;
///
/// struct Echo;
///
/// #[async_trait]
/// impl MessageHandler for Echo {
///     async fn handle(&self, _ctx: &HandlerContext, conn: &Connection, msg: String) -> HandlerResult {
///         conn.send(&msg).await?;
///         Ok(())
///     }
/// }
///
/// # async fn run() -> anyhow::Result<()> {
/// let handle = ServerBuilder::new(ServerConfig::default())
///     .root_handler(Arc::new(Echo))
///     .handler("/echo/", Arc::new(Echo))
///     .build()?
///     .start()
///     .await?;
/// println!("listening on {}", handle.local_addr());
/// handle.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
    root: Option<Arc<dyn MessageHandler>>,
    handlers: Vec<(String, Arc<dyn MessageHandler>)>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            root: None,
            handlers: Vec::new(),
        }
    }

    /// Sets the handler for the empty path.  Required.
    pub fn root_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.root = Some(handler);
        self
    }

    /// Binds `handler` to `url`.  Leading and trailing slashes are ignored.
    pub fn handler(mut self, url: &str, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.push((url.to_string(), handler));
        self
    }

    /// Validates the configuration and the handler table.
    ///
    /// # Errors
    ///
    /// - Any error from [`ServerConfig::validate`].
    /// - [`ConfigError::MissingRootHandler`] if no root handler was set.
    /// - [`ConfigError::InvalidHandlerUrl`] for an empty URL or one with
    ///   characters other than alphanumerics, `-` and `_`.
    /// - [`ConfigError::DuplicateHandlerUrl`] if two handlers share a URL.
    /// - Any error from a handler's [`MessageHandler::validate`].
    pub fn build(self) -> Result<Server, ConfigError> {
        self.config.validate()?;
        let root = self.root.ok_or(ConfigError::MissingRootHandler)?;
        root.validate()?;

        let mut router = Router::new(Endpoint::new("", root));
        let mut seen = HashSet::new();
        for (url, handler) in self.handlers {
            let trimmed = url.trim_matches('/');
            if !is_valid_segment(trimmed) {
                return Err(ConfigError::InvalidHandlerUrl(url));
            }
            if !seen.insert(trimmed.to_string()) {
                return Err(ConfigError::DuplicateHandlerUrl(trimmed.to_string()));
            }
            handler.validate()?;
            router.insert(Endpoint::new(trimmed, handler));
        }

        Ok(Server {
            config: Arc::new(self.config),
            router: Arc::new(router),
        })
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// A validated server, ready to bind.
#[derive(Debug)]
pub struct Server {
    config: Arc<ServerConfig>,
    router: Arc<Router>,
}

impl Server {
    /// Binds the listener and spawns the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound, for
    /// example because the port is in use.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let urls: Vec<&str> = self.router.endpoints().map(Endpoint::url).collect();
        info!("wsnet server listening on {local_addr}, handlers {urls:?}");

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.config),
            Arc::clone(&self.router),
            shutdown.clone(),
            tracker.clone(),
        ));

        Ok(ServerHandle {
            local_addr,
            config: self.config,
            router: self.router,
            shutdown,
            tracker,
            accept_task,
        })
    }
}

/// A running server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    config: Arc<ServerConfig>,
    router: Arc<Router>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    accept_task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address; useful when the config asked for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Live connections on the endpoint for `url` (`""` for the root).
    pub fn connections(&self, url: &str) -> Vec<Connection> {
        self.router
            .resolve(url.trim_matches('/'))
            .map(|endpoint| endpoint.context().connections())
            .unwrap_or_default()
    }

    /// Stops accepting, closes every connection, and waits for their tasks.
    ///
    /// Each wait is bounded by the configured close timeout.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.accept_task.await {
            error!("accept loop ended abnormally: {e}");
        }

        join_all(self.router.endpoints().map(Endpoint::close_all)).await;

        self.tracker.close();
        if timeout(self.config.close_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "{} connection task(s) still running after {:?}",
                self.tracker.len(),
                self.config.close_timeout
            );
        }
        info!("wsnet server on {} stopped", self.local_addr);
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    router: Arc<Router>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested; stopping accept loop");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                debug!("accepted TCP connection from {peer_addr}");
                let config = Arc::clone(&config);
                let router = Arc::clone(&router);
                let shutdown = shutdown.clone();
                tracker.spawn(async move {
                    handle_connection(stream, peer_addr, config, router, shutdown).await;
                });
            }
            Err(e) => {
                // Transient (e.g. too many open files); keep accepting.
                error!("accept error: {e}");
            }
        }
    }
}

// ── Per-connection task ───────────────────────────────────────────────────────

/// Upgrades one socket and runs its session, logging a failed handshake.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    router: Arc<Router>,
    shutdown: CancellationToken,
) {
    match upgrade_connection(stream, peer_addr, &config, &router, &shutdown).await {
        Ok((endpoint, connection, frames)) => {
            session::serve(endpoint, connection, frames, shutdown).await;
        }
        Err(UpgradeError::ServerStopped) => {
            debug!("handshake with {peer_addr} abandoned: server stopping");
        }
        Err(e) => error!("handshake with {peer_addr} failed: {e}"),
    }
}

async fn upgrade_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: &ServerConfig,
    router: &Router,
    shutdown: &CancellationToken,
) -> Result<(Endpoint, Connection, FrameReader<BufReader<OwnedReadHalf>>), UpgradeError> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not set TCP_NODELAY for {peer_addr}: {e}");
    }
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let upgrade = timeout(
        config.handshake_timeout,
        accept_upgrade(&mut reader, &mut write_half, config.max_header_line, |path| {
            router.resolve(path).cloned()
        }),
    );
    let (request, endpoint) = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Err(UpgradeError::ServerStopped),
        upgraded = upgrade => {
            upgraded.map_err(|_| UpgradeError::Timeout(config.handshake_timeout))??
        }
    };

    info!("handshake with {peer_addr} succeeded for '/{}'", request.path);
    let connection = Connection::new(peer_addr, Box::new(write_half), config.close_timeout);
    Ok((
        endpoint,
        connection,
        FrameReader::new(reader, config.max_frame_len),
    ))
}
