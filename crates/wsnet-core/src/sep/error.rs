//! SEP request errors.
//!
//! A [`SepError`] is a value, not an exception: the route name is recorded
//! where the failure is detected and never patched in later.  The same value
//! is logged and, unless disabled, sent back to the client as a text message
//! in an HTTP-like format:
//!
//! ```text
//! 400 Bad Request: echo
//! Expected payload
//! ```

use std::fmt;

/// Classification of a failed SEP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SepErrorKind {
    /// The request does not match the grammar or the route's shape.
    BadRequest,
    /// No route with the requested name exists.
    RouteNotFound,
    /// The content-type tag has no registered decoder.
    UnsupportedMediaType,
    /// The route itself failed while handling a well-formed request.
    Internal,
}

impl SepErrorKind {
    /// HTTP-style status code.
    pub fn code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::RouteNotFound => 404,
            Self::UnsupportedMediaType => 415,
            Self::Internal => 500,
        }
    }

    /// HTTP-style reason phrase.
    pub fn reason(self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::RouteNotFound => "Not Found",
            Self::UnsupportedMediaType => "Unsupported Media Type",
            Self::Internal => "Internal Server Error",
        }
    }
}

/// A failed SEP request: `{kind, route, message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SepError {
    pub kind: SepErrorKind,
    /// The route the request addressed, when it got far enough to name one.
    pub route: Option<String>,
    pub message: String,
}

impl SepError {
    pub fn new(kind: SepErrorKind, route: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            route: route.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn bad_request(route: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(SepErrorKind::BadRequest, route, message)
    }

    pub fn route_not_found(route: &str) -> Self {
        Self::new(
            SepErrorKind::RouteNotFound,
            Some(route),
            format!("No route named '{route}'"),
        )
    }

    pub fn unsupported_media_type(route: &str, content_type: &str) -> Self {
        Self::new(
            SepErrorKind::UnsupportedMediaType,
            Some(route),
            format!("No decoder for content type '{content_type}'"),
        )
    }

    pub fn internal(route: &str, message: impl Into<String>) -> Self {
        Self::new(SepErrorKind::Internal, Some(route), message)
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }
}

impl fmt::Display for SepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.code(), self.kind.reason())?;
        if let Some(route) = &self.route {
            write!(f, ": {route}")?;
        }
        write!(f, "\n{}", self.message)
    }
}

impl std::error::Error for SepError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_route() {
        let err = SepError::bad_request(Some("echo"), "Expected payload");
        assert_eq!(err.to_string(), "400 Bad Request: echo\nExpected payload");
    }

    #[test]
    fn test_display_without_route() {
        let err = SepError::bad_request(None, "Expected a route name before ':'");
        assert_eq!(
            err.to_string(),
            "400 Bad Request\nExpected a route name before ':'"
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(SepError::route_not_found("x").code(), 404);
        assert_eq!(SepError::unsupported_media_type("x", "xml").code(), 415);
        assert_eq!(SepError::internal("x", "boom").code(), 500);
    }
}
