//! Route descriptors and the typed argument traits.
//!
//! A route is registered with a closure whose parameter types declare its
//! shape.  The builder captures each closure in a type-erased invoker that
//! parses the raw id and payload text into those types, so the dispatcher
//! itself only ever sees strings.
//!
//! | Builder method               | Shape          | Message example        |
//! |------------------------------|----------------|------------------------|
//! | `route`                      | `NoArgs`       | `ping`                 |
//! | `route_with_id`              | `IdOnly`       | `whoami:42`            |
//! | `route_with_payload`         | `PayloadOnly`  | `echo\nhello`          |
//! | `route_with_id_and_payload`  | `IdAndPayload` | `json save:7\n{...}`   |

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use uuid::Uuid;
use wsnet_core::{Scalar, ScalarKind, SepError};

use crate::application::connection::{Connection, SendError};
use crate::application::handler::{HandlerContext, HandlerError, HandlerResult};
use crate::application::sep::decoder::DecoderSet;

// ── Shapes ────────────────────────────────────────────────────────────────────

/// What a route's payload parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Parsed directly from the body; a content-type tag is not allowed.
    Scalar(ScalarKind),
    /// Decoded by the decoder named in the content-type tag.
    Structured { type_name: &'static str },
}

impl PayloadKind {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }
}

/// The argument shape of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteShape {
    NoArgs,
    IdOnly(ScalarKind),
    PayloadOnly(PayloadKind),
    IdAndPayload(ScalarKind, PayloadKind),
}

impl RouteShape {
    pub fn takes_id(&self) -> bool {
        matches!(self, Self::IdOnly(_) | Self::IdAndPayload(..))
    }

    pub fn payload(&self) -> Option<PayloadKind> {
        match self {
            Self::PayloadOnly(kind) | Self::IdAndPayload(_, kind) => Some(*kind),
            Self::NoArgs | Self::IdOnly(_) => None,
        }
    }
}

// ── Argument traits ───────────────────────────────────────────────────────────

/// Types accepted as a route id: text, fixed-width integers, and GUIDs.
pub trait RouteId: Scalar {}

impl RouteId for String {}
impl RouteId for i8 {}
impl RouteId for i16 {}
impl RouteId for i32 {}
impl RouteId for i64 {}
impl RouteId for u8 {}
impl RouteId for u16 {}
impl RouteId for u32 {}
impl RouteId for u64 {}
impl RouteId for Uuid {}

/// Types accepted as a route payload.
pub trait RoutePayload: Sized + Send + 'static {
    fn kind() -> PayloadKind;

    /// Decodes the message body for `route`.
    ///
    /// # Errors
    ///
    /// Returns a `BadRequest` [`SepError`] for text that does not parse, or
    /// `UnsupportedMediaType` when no decoder matches the content type.
    fn decode_payload(
        route: &str,
        content_type: Option<&str>,
        text: &str,
        decoders: &DecoderSet,
    ) -> Result<Self, SepError>;
}

macro_rules! scalar_payload {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RoutePayload for $ty {
                fn kind() -> PayloadKind {
                    PayloadKind::Scalar(<$ty as Scalar>::KIND)
                }

                fn decode_payload(
                    route: &str,
                    _content_type: Option<&str>,
                    text: &str,
                    _decoders: &DecoderSet,
                ) -> Result<Self, SepError> {
                    <$ty as Scalar>::parse_scalar(text)
                        .map_err(|reason| SepError::bad_request(Some(route), reason))
                }
            }
        )*
    };
}

scalar_payload!(String, bool, i8, i16, i32, i64, u8, u16, u32, u64, Uuid);

/// A structured payload deserialised from the value produced by a decoder.
///
/// ```rust
/// use serde::Deserialize;
/// use wsnet_server::application::sep::Structured;
///
/// #[derive(Deserialize)]
/// struct Save {
///     v: u32,
/// }
///
/// let payload = Structured(Save { v: 1 });
/// assert_eq!(payload.v, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structured<T>(pub T);

impl<T> Structured<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Structured<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: DeserializeOwned + Send + 'static> RoutePayload for Structured<T> {
    fn kind() -> PayloadKind {
        PayloadKind::Structured {
            type_name: type_name::<T>(),
        }
    }

    fn decode_payload(
        route: &str,
        content_type: Option<&str>,
        text: &str,
        decoders: &DecoderSet,
    ) -> Result<Self, SepError> {
        let content_type = content_type.ok_or_else(|| {
            SepError::bad_request(Some(route), "Expected a content type for a structured payload")
        })?;
        let decoder = decoders
            .get(content_type)
            .ok_or_else(|| SepError::unsupported_media_type(route, content_type))?;
        let value = decoder
            .decode(type_name::<T>(), content_type, text)
            .map_err(|e| SepError::bad_request(Some(route), e.to_string()))?;
        serde_json::from_value(value).map(Structured).map_err(|e| {
            SepError::bad_request(
                Some(route),
                format!("Payload does not match {}: {e}", type_name::<T>()),
            )
        })
    }
}

// ── Invocation ────────────────────────────────────────────────────────────────

/// Everything a route closure gets besides its typed arguments.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// The connection the request arrived on.
    pub connection: Connection,
    /// The dispatcher's handler context, for broadcasts.
    pub context: HandlerContext,
    /// The connection's numeric id on this dispatcher.
    pub connection_id: u64,
}

impl RouteRequest {
    /// Sends `text` back to the requesting connection.
    pub async fn reply(&self, text: &str) -> Result<(), SendError> {
        self.connection.send(text).await
    }
}

/// Raw request parts after grammar and shape validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawArgs<'a> {
    pub content_type: Option<&'a str>,
    pub id: Option<&'a str>,
    pub body: Option<&'a str>,
}

pub(crate) type RouteFuture = BoxFuture<'static, HandlerResult>;

type Invoke =
    dyn Fn(RouteRequest, RawArgs<'_>, &DecoderSet) -> Result<RouteFuture, SepError> + Send + Sync;

/// One registered route: name, shape, and its type-erased invoker.
#[derive(Clone)]
pub struct RouteDescriptor {
    name: String,
    shape: RouteShape,
    invoke: Arc<Invoke>,
}

impl RouteDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> RouteShape {
        self.shape
    }

    /// Parses the id and payload and starts the route.
    ///
    /// Parsing failures come back as `Err` before the route runs.
    pub(crate) fn invoke(
        &self,
        request: RouteRequest,
        args: RawArgs<'_>,
        decoders: &DecoderSet,
    ) -> Result<RouteFuture, SepError> {
        (self.invoke)(request, args, decoders)
    }

    pub(crate) fn no_args<F, Fut, E>(name: &str, f: F) -> Self
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        Self::erase(name, RouteShape::NoArgs, move |request, _args, _decoders| {
            Ok(boxed(f(request)))
        })
    }

    pub(crate) fn with_id<I, F, Fut, E>(name: &str, f: F) -> Self
    where
        I: RouteId,
        F: Fn(RouteRequest, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        let route = name.to_string();
        Self::erase(name, RouteShape::IdOnly(I::KIND), move |request, args, _decoders| {
            let id = parse_id::<I>(&route, args.id)?;
            Ok(boxed(f(request, id)))
        })
    }

    pub(crate) fn with_payload<P, F, Fut, E>(name: &str, f: F) -> Self
    where
        P: RoutePayload,
        F: Fn(RouteRequest, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        let route = name.to_string();
        Self::erase(name, RouteShape::PayloadOnly(P::kind()), move |request, args, decoders| {
            let payload = decode_body::<P>(&route, args, decoders)?;
            Ok(boxed(f(request, payload)))
        })
    }

    pub(crate) fn with_id_and_payload<I, P, F, Fut, E>(name: &str, f: F) -> Self
    where
        I: RouteId,
        P: RoutePayload,
        F: Fn(RouteRequest, I, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        let route = name.to_string();
        let shape = RouteShape::IdAndPayload(I::KIND, P::kind());
        Self::erase(name, shape, move |request, args, decoders| {
            let id = parse_id::<I>(&route, args.id)?;
            let payload = decode_body::<P>(&route, args, decoders)?;
            Ok(boxed(f(request, id, payload)))
        })
    }

    fn erase<F>(name: &str, shape: RouteShape, invoke: F) -> Self
    where
        F: Fn(RouteRequest, RawArgs<'_>, &DecoderSet) -> Result<RouteFuture, SepError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            shape,
            invoke: Arc::new(invoke),
        }
    }
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

fn boxed<Fut, E>(future: Fut) -> RouteFuture
where
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<HandlerError> + 'static,
{
    async move { future.await.map_err(Into::into) }.boxed()
}

fn parse_id<I: RouteId>(route: &str, raw: Option<&str>) -> Result<I, SepError> {
    let raw = raw.ok_or_else(|| SepError::bad_request(Some(route), "Expected id"))?;
    I::parse_scalar(raw).map_err(|reason| SepError::bad_request(Some(route), reason))
}

fn decode_body<P: RoutePayload>(
    route: &str,
    args: RawArgs<'_>,
    decoders: &DecoderSet,
) -> Result<P, SepError> {
    let body = args
        .body
        .ok_or_else(|| SepError::bad_request(Some(route), "Expected payload"))?;
    P::decode_payload(route, args.content_type, body, decoders)
}
