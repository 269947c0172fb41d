//! Per-handler registry of live connections.
//!
//! Every mutation and every snapshot read takes the same mutex, and the lock
//! is only held for the `Vec` operation itself.  Callers iterate over a
//! copied snapshot, so sends never race with concurrent add/remove.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::connection::Connection;

/// Thread-safe set of the connections owned by one handler.
///
/// Cloning shares the underlying set.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<Vec<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `connection`.  Adding a connection twice has no effect.
    pub fn add(&self, connection: Connection) {
        let mut connections = self.connections.lock();
        if !connections.contains(&connection) {
            connections.push(connection);
        }
    }

    /// Removes `connection`, returning `true` if it was registered.
    pub fn remove(&self, connection: &Connection) -> bool {
        let mut connections = self.connections.lock();
        match connections.iter().position(|c| c == connection) {
            Some(index) => {
                connections.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, connection: &Connection) -> bool {
        self.connections.lock().contains(connection)
    }

    /// Snapshot of every registered connection.
    pub fn all(&self) -> Vec<Connection> {
        self.connections.lock().clone()
    }

    /// Snapshot of the registered connections for which `predicate` holds.
    pub fn matching(&self, predicate: impl Fn(&Connection) -> bool) -> Vec<Connection> {
        self.connections
            .lock()
            .iter()
            .filter(|c| predicate(c))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.len())
            .finish()
    }
}
