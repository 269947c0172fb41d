//! The SEP route dispatcher.
//!
//! [`RouteDispatcher`] is a [`MessageHandler`] that parses each message with
//! the SEP grammar, checks it against the addressed route's shape, and runs
//! the route.  It also numbers its connections with recycled ids.
//!
//! # Dispatch steps
//!
//! 1. Parse `[<contentType> ]<route>[:<id>]\n<body>` ([`SepRequest::parse`]).
//! 2. Look the route up; unknown names are `404`.
//! 3. Check the request shape against the route shape; mismatches are `400`.
//! 4. Parse the id, decode the payload (`400`, or `415` for an unknown
//!    content type).
//! 5. Run the route; a route failure is a `500` tagged with its name.
//!
//! Failures are logged and, unless disabled with
//! [`RouteDispatcherBuilder::error_responses`], sent back to the connection
//! as `"<code> <reason>[: <route>]\n<message>"`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, warn};
use wsnet_core::{is_valid_segment, IdPool, SepError, SepErrorKind, SepRequest};

use crate::application::connection::Connection;
use crate::application::handler::{HandlerContext, HandlerError, HandlerResult, MessageHandler};
use crate::application::sep::decoder::{DecoderSet, PayloadDecoder};
use crate::application::sep::route::{
    RawArgs, RouteDescriptor, RouteId, RoutePayload, RouteRequest, RouteShape,
};
use crate::domain::ConfigError;

// ── Builder ───────────────────────────────────────────────────────────────────

/// Collects routes, decoders, and options, then validates them in
/// [`RouteDispatcherBuilder::build`].
///
/// ```rust
/// use wsnet_server::application::handler::HandlerError;
/// use wsnet_server::application::sep::RouteDispatcher;
///
/// let dispatcher = RouteDispatcher::builder()
///     .route_with_payload("echo", |req, text: String| async move {
///         req.reply(&text).await?;
///         Ok::<(), HandlerError>(())
///     })
///     .build()
///     .unwrap();
/// assert_eq!(dispatcher.route_names(), vec!["echo"]);
/// ```
pub struct RouteDispatcherBuilder {
    routes: Vec<RouteDescriptor>,
    decoders: Vec<(String, Arc<dyn PayloadDecoder>)>,
    inner: Option<Arc<dyn MessageHandler>>,
    error_responses: bool,
}

impl RouteDispatcherBuilder {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            decoders: Vec::new(),
            inner: None,
            error_responses: true,
        }
    }

    /// Adds a route taking no id and no payload.
    pub fn route<F, Fut, E>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        self.routes.push(RouteDescriptor::no_args(name, f));
        self
    }

    /// Adds a route taking an id of type `I`.
    pub fn route_with_id<I, F, Fut, E>(mut self, name: &str, f: F) -> Self
    where
        I: RouteId,
        F: Fn(RouteRequest, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        self.routes.push(RouteDescriptor::with_id(name, f));
        self
    }

    /// Adds a route taking a payload of type `P`.
    pub fn route_with_payload<P, F, Fut, E>(mut self, name: &str, f: F) -> Self
    where
        P: RoutePayload,
        F: Fn(RouteRequest, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        self.routes.push(RouteDescriptor::with_payload(name, f));
        self
    }

    /// Adds a route taking both an id and a payload.
    pub fn route_with_id_and_payload<I, P, F, Fut, E>(mut self, name: &str, f: F) -> Self
    where
        I: RouteId,
        P: RoutePayload,
        F: Fn(RouteRequest, I, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        self.routes.push(RouteDescriptor::with_id_and_payload(name, f));
        self
    }

    /// Registers a payload decoder for `content_type`.  Replaces the
    /// built-in `json` decoder when `content_type` is `json`.
    pub fn decoder(mut self, content_type: &str, decoder: Arc<dyn PayloadDecoder>) -> Self {
        self.decoders.push((content_type.to_string(), decoder));
        self
    }

    /// Forwards connect and disconnect events to `handler` after the
    /// dispatcher's own bookkeeping.
    pub fn inner(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.inner = Some(handler);
        self
    }

    /// Whether failed requests get an error message back.  On by default.
    pub fn error_responses(mut self, enabled: bool) -> Self {
        self.error_responses = enabled;
        self
    }

    /// Validates the route table and builds the dispatcher.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyRouteTable`] without any route.
    /// - [`ConfigError::InvalidRouteName`] for an empty name or one with
    ///   characters other than alphanumerics, `-` and `_`.
    /// - [`ConfigError::DuplicateRoute`] when two routes share a name.
    /// - [`ConfigError::InvalidContentType`] for a decoder tag breaking the
    ///   same rule as route names.
    pub fn build(self) -> Result<RouteDispatcher, ConfigError> {
        if self.routes.is_empty() {
            return Err(ConfigError::EmptyRouteTable);
        }

        let mut routes = HashMap::with_capacity(self.routes.len());
        for route in self.routes {
            if !is_valid_segment(route.name()) {
                return Err(ConfigError::InvalidRouteName(route.name().to_string()));
            }
            match routes.entry(route.name().to_string()) {
                Entry::Occupied(_) => {
                    return Err(ConfigError::DuplicateRoute(route.name().to_string()))
                }
                Entry::Vacant(slot) => {
                    slot.insert(route);
                }
            }
        }

        let mut decoders = DecoderSet::new();
        for (content_type, decoder) in self.decoders {
            if !is_valid_segment(&content_type) {
                return Err(ConfigError::InvalidContentType(content_type));
            }
            decoders.insert(&content_type, decoder);
        }

        Ok(RouteDispatcher {
            routes,
            decoders,
            inner: self.inner,
            error_responses: self.error_responses,
            ids: Mutex::new(ConnectionIds::default()),
        })
    }
}

impl Default for RouteDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Connection ids ────────────────────────────────────────────────────────────

#[derive(Default)]
struct ConnectionIds {
    pool: IdPool,
    by_id: HashMap<u64, Connection>,
    by_connection: HashMap<Connection, u64>,
}

impl ConnectionIds {
    fn assign(&mut self, connection: &Connection) -> u64 {
        if let Some(id) = self.by_connection.get(connection) {
            return *id;
        }
        let id = self.pool.acquire();
        self.by_id.insert(id, connection.clone());
        self.by_connection.insert(connection.clone(), id);
        id
    }

    fn release(&mut self, connection: &Connection) -> Option<u64> {
        let id = self.by_connection.remove(connection)?;
        self.by_id.remove(&id);
        self.pool.release(id);
        Some(id)
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// A [`MessageHandler`] routing SEP messages to typed routes.
pub struct RouteDispatcher {
    routes: HashMap<String, RouteDescriptor>,
    decoders: DecoderSet,
    inner: Option<Arc<dyn MessageHandler>>,
    error_responses: bool,
    ids: Mutex<ConnectionIds>,
}

impl RouteDispatcher {
    pub fn builder() -> RouteDispatcherBuilder {
        RouteDispatcherBuilder::new()
    }

    /// The numeric id of a connection on this dispatcher.
    pub fn connection_id(&self, connection: &Connection) -> Option<u64> {
        self.ids.lock().by_connection.get(connection).copied()
    }

    /// The live connection holding `id`.
    pub fn connection(&self, id: u64) -> Option<Connection> {
        self.ids.lock().by_id.get(&id).cloned()
    }

    /// Route names, sorted.
    pub fn route_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn shape(&self, route: &str) -> Option<RouteShape> {
        self.routes.get(route).map(RouteDescriptor::shape)
    }

    /// Parses, validates, and runs one SEP request.
    ///
    /// # Errors
    ///
    /// Returns the [`SepError`] describing why the request failed.
    pub async fn dispatch(
        &self,
        ctx: &HandlerContext,
        connection: &Connection,
        message: &str,
    ) -> Result<(), SepError> {
        let request = SepRequest::parse(message)?;
        let route = self
            .routes
            .get(request.route)
            .ok_or_else(|| SepError::route_not_found(request.route))?;
        check_shape(route, &request)?;

        let connection_id = self.connection_id(connection).ok_or_else(|| {
            SepError::internal(route.name(), "connection is not registered with this dispatcher")
        })?;
        let route_request = RouteRequest {
            connection: connection.clone(),
            context: ctx.clone(),
            connection_id,
        };
        let args = RawArgs {
            content_type: request.content_type,
            id: request.id,
            body: request.body,
        };

        let future = route.invoke(route_request, args, &self.decoders)?;
        future
            .await
            .map_err(|e| SepError::internal(route.name(), e.to_string()))
    }

    async fn report(&self, connection: &Connection, err: &SepError) {
        let route = err.route.as_deref().unwrap_or("-");
        if err.kind == SepErrorKind::Internal {
            error!(
                "SEP route '{route}' failed for {}: {}",
                connection.peer_addr(),
                err.message
            );
        } else {
            warn!(
                "SEP request from {} rejected: {} {} ({route}): {}",
                connection.peer_addr(),
                err.code(),
                err.kind.reason(),
                err.message
            );
        }

        if self.error_responses {
            if let Err(e) = connection.send(&err.to_string()).await {
                debug!("could not send SEP error to {}: {e}", connection.peer_addr());
            }
        }
    }
}

/// The request's parts must match the route's shape.
fn check_shape(route: &RouteDescriptor, request: &SepRequest<'_>) -> Result<(), SepError> {
    let name = route.name();
    let shape = route.shape();
    let payload = shape.payload();

    if let Some(content_type) = request.content_type {
        match payload {
            Some(kind) if kind.is_scalar() => {
                return Err(SepError::bad_request(
                    Some(name),
                    format!("The type '{content_type}' is specified but '{name}' only accepts raw values"),
                ))
            }
            None => {
                return Err(SepError::bad_request(
                    Some(name),
                    format!("The type '{content_type}' is specified but '{name}' takes no payload"),
                ))
            }
            Some(_) => {}
        }
    }

    match (request.id.is_some(), shape.takes_id()) {
        (false, true) => return Err(SepError::bad_request(Some(name), "Expected id")),
        (true, false) => return Err(SepError::bad_request(Some(name), "Ids not supported")),
        _ => {}
    }

    match (request.body, payload) {
        (None, Some(_)) => Err(SepError::bad_request(Some(name), "Expected payload")),
        (Some(_), None) => Err(SepError::bad_request(Some(name), "Payloads not supported")),
        (Some(""), Some(_)) => Err(SepError::bad_request(Some(name), "Empty payload")),
        (Some(_), Some(kind)) if !kind.is_scalar() && request.content_type.is_none() => {
            Err(SepError::bad_request(
                Some(name),
                "Expected a content type for a structured payload",
            ))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl MessageHandler for RouteDispatcher {
    async fn on_connect(&self, ctx: &HandlerContext, connection: &Connection) {
        let id = self.ids.lock().assign(connection);
        debug!("SEP connection {} assigned id {id}", connection.peer_addr());
        if let Some(inner) = &self.inner {
            inner.on_connect(ctx, connection).await;
        }
    }

    async fn on_disconnect(&self, ctx: &HandlerContext, connection: &Connection) {
        let released = self.ids.lock().release(connection);
        if let Some(id) = released {
            debug!("SEP connection {} released id {id}", connection.peer_addr());
        }
        if let Some(inner) = &self.inner {
            inner.on_disconnect(ctx, connection).await;
        }
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        connection: &Connection,
        message: String,
    ) -> HandlerResult {
        if let Err(err) = self.dispatch(ctx, connection, &message).await {
            self.report(connection, &err).await;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.routes.is_empty() {
            return Err(ConfigError::EmptyRouteTable);
        }
        match &self.inner {
            Some(inner) => inner.validate(),
            None => Ok(()),
        }
    }
}
