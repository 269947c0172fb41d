//! Maps request paths to endpoints.

use std::collections::HashMap;

use crate::application::endpoint::Endpoint;

/// The fixed set of endpoints a server routes to.
///
/// Built once by the server builder; read-only afterwards.
#[derive(Debug, Clone)]
pub struct Router {
    root: Endpoint,
    named: HashMap<String, Endpoint>,
}

impl Router {
    pub fn new(root: Endpoint) -> Self {
        Self {
            root,
            named: HashMap::new(),
        }
    }

    /// Adds a named endpoint.  Returns `false`, leaving the router unchanged,
    /// if its URL is already taken.
    pub fn insert(&mut self, endpoint: Endpoint) -> bool {
        if endpoint.url().is_empty() || self.named.contains_key(endpoint.url()) {
            return false;
        }
        self.named.insert(endpoint.url().to_string(), endpoint);
        true
    }

    /// The endpoint for a trimmed request path; the empty path is the root.
    pub fn resolve(&self, path: &str) -> Option<&Endpoint> {
        if path.is_empty() {
            Some(&self.root)
        } else {
            self.named.get(path)
        }
    }

    /// Every endpoint, root first.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        std::iter::once(&self.root).chain(self.named.values())
    }
}
