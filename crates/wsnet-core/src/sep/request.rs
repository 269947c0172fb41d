//! SEP request grammar.

use crate::naming::is_valid_segment;
use crate::sep::error::SepError;

/// The parts of a SEP message, borrowed from the message text.
///
/// Parsing only checks the grammar.  Whether the id and body fit the route's
/// declared shape is decided by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SepRequest<'a> {
    /// Optional tag before the route name, e.g. `json`.
    pub content_type: Option<&'a str>,
    pub route: &'a str,
    /// Text after the `:` separator.
    pub id: Option<&'a str>,
    /// Everything after the first newline; `Some("")` when the newline is
    /// present but nothing follows it.
    pub body: Option<&'a str>,
}

impl<'a> SepRequest<'a> {
    /// Parses `message` according to `[<contentType> ]<routeName>[:<id>]\n<body>`.
    ///
    /// 1. The header ends at the first newline; the rest is the body.
    /// 2. The header splits at its last `:` into target and id.
    /// 3. The target splits at its first space into content type and route.
    /// 4. The route name must be a valid segment.
    ///
    /// # Errors
    ///
    /// Returns a [`SepError`] of kind `BadRequest` for an empty segment on
    /// either side of `:`, an empty content-type tag, or an invalid route name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wsnet_core::SepRequest;
    ///
    /// let req = SepRequest::parse("json save:7\n{\"v\":1}").unwrap();
    /// assert_eq!(req.content_type, Some("json"));
    /// assert_eq!(req.route, "save");
    /// assert_eq!(req.id, Some("7"));
    /// assert_eq!(req.body, Some("{\"v\":1}"));
    /// ```
    pub fn parse(message: &'a str) -> Result<Self, SepError> {
        let (header, body) = match message.split_once('\n') {
            Some((header, body)) => (header, Some(body)),
            None => (message, None),
        };
        let header = header.strip_suffix('\r').unwrap_or(header);

        let (target, id) = match header.rsplit_once(':') {
            Some(("", _)) => {
                return Err(SepError::bad_request(
                    None,
                    "Expected a route name before the id separator",
                ))
            }
            Some((target, "")) => {
                return Err(SepError::bad_request(
                    Some(target),
                    "Expected an id after the id separator",
                ))
            }
            Some((target, id)) => (target, Some(id)),
            None => (header, None),
        };

        let (content_type, route) = match target.split_once(' ') {
            Some(("", _)) => {
                return Err(SepError::bad_request(None, "Expected a content type before ' '"))
            }
            Some((content_type, route)) => (Some(content_type), route),
            None => (None, target),
        };

        if route.is_empty() {
            return Err(SepError::bad_request(None, "Expected a route name"));
        }
        if !is_valid_segment(route) {
            return Err(SepError::bad_request(
                Some(route),
                "The route name contains invalid characters",
            ));
        }

        Ok(Self {
            content_type,
            route,
            id,
            body,
        })
    }
}
