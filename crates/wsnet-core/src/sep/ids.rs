//! Recycling pool of numeric connection ids.
//!
//! Every connection on a SEP dispatcher gets a small integer id.  Ids of
//! closed connections are handed out again before the counter grows, so ids
//! stay compact on long-running servers.
//!
//! The pool itself is not synchronised; the dispatcher keeps it behind the
//! same mutex as its id ↔ connection maps.

use std::collections::BTreeSet;

/// Hands out the smallest free id, or the next unused one.
#[derive(Debug, Default)]
pub struct IdPool {
    next: u64,
    free: BTreeSet<u64>,
}

impl IdPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes an id: the smallest released one if any, otherwise a fresh one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wsnet_core::IdPool;
    ///
    /// let mut pool = IdPool::new();
    /// assert_eq!(pool.acquire(), 0);
    /// assert_eq!(pool.acquire(), 1);
    /// pool.release(0);
    /// assert_eq!(pool.acquire(), 0);
    /// assert_eq!(pool.acquire(), 2);
    /// ```
    pub fn acquire(&mut self) -> u64 {
        if let Some(id) = self.free.pop_first() {
            return id;
        }
        let id = self.next;
        self.next += 1;
        id
    }

    /// Returns `id` to the pool.  Ids that were never issued are ignored.
    pub fn release(&mut self, id: u64) {
        if id < self.next {
            self.free.insert(id);
        }
    }
}
