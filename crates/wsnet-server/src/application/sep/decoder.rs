//! Pluggable payload decoders keyed by content-type tag.
//!
//! A structured SEP payload is first turned into a `serde_json::Value` by the
//! decoder registered for its content-type tag, then deserialised into the
//! route's payload type.  `json` is registered by default; applications add
//! other formats with
//! [`RouteDispatcherBuilder::decoder`](crate::application::sep::RouteDispatcherBuilder::decoder).
//!
//! Decoders are only consulted for routes whose payload is structured and
//! only when the request carries a content-type tag.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Content-type tag of the built-in decoder.
pub const JSON: &str = "json";

/// Why a decoder rejected a payload.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct DecodeError(pub String);

/// Turns payload text into a generic value.
#[cfg_attr(test, mockall::automock)]
pub trait PayloadDecoder: Send + Sync {
    /// Decodes `text` tagged with `content_type` for a route expecting
    /// `target_type` (a Rust type name, for diagnostics and format hints).
    fn decode(&self, target_type: &str, content_type: &str, text: &str)
        -> Result<Value, DecodeError>;
}

/// The built-in `json` decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl PayloadDecoder for JsonDecoder {
    fn decode(&self, _target_type: &str, _content_type: &str, text: &str) -> Result<Value, DecodeError> {
        serde_json::from_str(text).map_err(|e| DecodeError(format!("invalid JSON: {e}")))
    }
}

/// Decoders by content-type tag.  Tags are matched case-insensitively.
#[derive(Clone)]
pub struct DecoderSet {
    decoders: HashMap<String, Arc<dyn PayloadDecoder>>,
}

impl DecoderSet {
    /// A set holding only the built-in `json` decoder.
    pub fn new() -> Self {
        let mut set = Self::empty();
        set.insert(JSON, Arc::new(JsonDecoder));
        set
    }

    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers `decoder` for `content_type`, replacing any previous one.
    pub fn insert(&mut self, content_type: &str, decoder: Arc<dyn PayloadDecoder>) {
        self.decoders.insert(content_type.to_ascii_lowercase(), decoder);
    }

    pub fn get(&self, content_type: &str) -> Option<&Arc<dyn PayloadDecoder>> {
        self.decoders.get(&content_type.to_ascii_lowercase())
    }
}

impl Default for DecoderSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DecoderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.decoders.keys().collect();
        tags.sort();
        f.debug_struct("DecoderSet").field("content_types", &tags).finish()
    }
}
