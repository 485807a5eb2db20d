//! Dedup caches for flooded requests
//!
//! Every copy of a flooded request carries the same request id. The first
//! copy to reach this node inserts an entry; later copies find it and are
//! dropped, which is what stops requests from looping.
//!
//! Entries expire `timeout` after they were first seen. Expired entries are
//! replaced on touch and swept by [`RequestCache::prune`] from the router's
//! maintenance tick, so the map stays bounded even for request ids that
//! are never seen again.

use crate::routing::requests::{CachedRequest, SearchRequest, TunnelRequest};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Insert-if-absent store of live requests keyed by request id
pub struct RequestCache<T> {
    entries: DashMap<u32, T>,
    capacity: usize,
    timeout: Duration,
}

/// Cache of search requests
pub type SearchRequestCache = RequestCache<SearchRequest>;

/// Cache of tunnel requests
pub type TunnelRequestCache = RequestCache<TunnelRequest>;

impl<T: CachedRequest + Clone> RequestCache<T> {
    /// Create an empty cache holding at most `capacity` live requests
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            timeout,
        }
    }

    /// Check for `request_id`, inserting `supplier()` if absent.
    ///
    /// Returns false when the request was inserted (first sight) and true
    /// when a live entry already existed. The supplier only runs on insert.
    pub fn exists(&self, request_id: u32, supplier: impl FnOnce() -> T) -> bool {
        self.exists_at(request_id, Instant::now(), supplier)
    }

    /// [`exists`](Self::exists) with an explicit clock reading
    pub fn exists_at(&self, request_id: u32, now: Instant, supplier: impl FnOnce() -> T) -> bool {
        match self.entries.entry(request_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_stale(now, self.timeout) {
                    entry.insert(supplier());
                    false
                } else {
                    true
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(supplier());
                false
            },
        }
    }

    /// Copy of the entry for `request_id`
    pub fn get(&self, request_id: u32) -> Option<T> {
        self.entries.get(&request_id).map(|entry| entry.clone())
    }

    /// Run `f` on the entry for `request_id` under the shard lock
    pub fn update<R>(&self, request_id: u32, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.entries.get_mut(&request_id).map(|mut entry| f(entry.value_mut()))
    }

    /// True once the ceiling is reached
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Drop entries older than the timeout, returning how many went
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_id, request| !request.is_stale(now, self.timeout));
        before.saturating_sub(self.entries.len())
    }

    /// Number of cached requests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured ceiling
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured entry lifetime
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
