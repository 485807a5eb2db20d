//! Per-request state kept while a flood is alive

use crate::identity::LocationId;
use crate::routing::client::TurtleRsClient;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State every cached request exposes to the cache
pub trait CachedRequest {
    /// When the request was first seen or last refreshed
    fn last_used(&self) -> Instant;

    /// True once older than `timeout` at `now`
    fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_used()) > timeout
    }
}

/// A search request seen by this node
#[derive(Clone)]
pub struct SearchRequest {
    /// Peer the request came from (this node for own searches)
    source: LocationId,
    depth: u16,
    keywords: String,
    result_count: usize,
    hit_limit: usize,
    last_used: Instant,
    /// Set when a local client started the search
    client: Option<Arc<dyn TurtleRsClient>>,
}

impl SearchRequest {
    /// Create a request first seen at `now`
    pub fn new(
        source: LocationId,
        depth: u16,
        keywords: impl Into<String>,
        hit_limit: usize,
        now: Instant,
    ) -> Self {
        Self {
            source,
            depth,
            keywords: keywords.into(),
            result_count: 0,
            hit_limit,
            last_used: now,
            client: None,
        }
    }

    /// Attach the local client that started the search
    pub fn with_client(mut self, client: Arc<dyn TurtleRsClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Peer results are sent back to
    pub fn source(&self) -> LocationId {
        self.source
    }

    /// Depth at which the request was seen
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Search keywords
    pub fn keywords(&self) -> &str {
        &self.keywords
    }

    /// Results seen so far
    pub fn result_count(&self) -> usize {
        self.result_count
    }

    /// Maximum results passed back
    ///
    /// The limit is soft: a result arriving while any budget remains is
    /// passed back whole, even if it carries more hits than remain.
    pub fn hit_limit(&self) -> usize {
        self.hit_limit
    }

    /// Results that can still pass
    pub fn remaining_hits(&self) -> usize {
        self.hit_limit.saturating_sub(self.result_count)
    }

    /// Account results passed back
    pub fn add_result_count(&mut self, count: usize) {
        self.result_count = self.result_count.saturating_add(count);
    }

    /// Local client that started the search, if any
    pub fn client(&self) -> Option<&Arc<dyn TurtleRsClient>> {
        self.client.as_ref()
    }
}

impl CachedRequest for SearchRequest {
    fn last_used(&self) -> Instant {
        self.last_used
    }
}

impl fmt::Debug for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchRequest")
            .field("source", &self.source)
            .field("depth", &self.depth)
            .field("keywords", &self.keywords)
            .field("result_count", &self.result_count)
            .field("hit_limit", &self.hit_limit)
            .field("local", &self.client.is_some())
            .finish()
    }
}

/// A tunnel request seen by this node
#[derive(Debug, Clone)]
pub struct TunnelRequest {
    /// Peer the request came from (this node for own digs)
    source: LocationId,
    depth: u16,
    last_used: Instant,
    /// Tunnel ids already answered for this request
    responses: HashSet<u32>,
}

impl TunnelRequest {
    /// Create a request first seen at `now`
    pub fn new(source: LocationId, depth: u16, now: Instant) -> Self {
        Self {
            source,
            depth,
            last_used: now,
            responses: HashSet::new(),
        }
    }

    /// Peer the request came from
    pub fn source(&self) -> LocationId {
        self.source
    }

    /// Depth at which the request was seen
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Record an answer; false if this tunnel id was already seen
    pub fn add_response(&mut self, tunnel_id: u32) -> bool {
        self.responses.insert(tunnel_id)
    }

    /// Answers recorded so far
    pub fn responses(&self) -> &HashSet<u32> {
        &self.responses
    }
}

impl CachedRequest for TunnelRequest {
    fn last_used(&self) -> Instant {
        self.last_used
    }
}
