//! The turtle router
//!
//! [`TurtleRsService`] receives every turtle item from the friend layer and
//! decides, per item, whether to serve it locally, pass it on, or drop it.
//!
//! Search and tunnel requests are flooded: each is remembered by request id
//! for a short while so copies arriving over other paths are ignored, and
//! the peer it came from is remembered so answers can walk back the same
//! way. Tunnels are only established between the two endpoints; a node in
//! the middle forwards the request and keeps nothing else.
//!
//! Handlers never hold a map guard while calling into a client, so clients
//! may call back into the router from their callbacks.

use crate::error::{ConfigError, Result, RoutingError};
use crate::identity::{self, LocationId, Sha1Sum};
use crate::network::PeerConnections;
use crate::protocol::{
    SearchRequestItem, SearchResultItem, TunnelDataItem, TunnelDirection, TunnelRequestItem,
    TunnelResultItem, TurtleItem,
};
use crate::routing::bloom::TurtleBloomFilter;
use crate::routing::client::{TurtleRouter, TurtleRsClient};
use crate::routing::file_hash::{FileHash, HashInfo};
use crate::routing::forwarding::TunnelProbability;
use crate::routing::request_cache::{SearchRequestCache, TunnelRequestCache};
use crate::routing::requests::{CachedRequest, SearchRequest, TunnelRequest};
use crate::routing::statistics::{TrafficStatistics, TurtleStatistics};
use crate::routing::tunnel::Tunnel;
use crate::storage::TurtleConfig;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// A tunnel together with the client it belongs to
struct TunnelEntry {
    tunnel: Tunnel,
    client: Arc<dyn TurtleRsClient>,
}

/// Routing state of one node
pub struct TurtleRsService {
    own_id: LocationId,
    config: TurtleConfig,
    peers: Arc<dyn PeerConnections>,
    probability: TunnelProbability,

    search_requests: SearchRequestCache,
    tunnel_requests: TunnelRequestCache,
    /// Tunnel requests this node started, by request id
    own_digs: DashMap<u32, Sha1Sum>,

    tunnels: DashMap<u32, TunnelEntry>,
    file_hashes: DashMap<Sha1Sum, FileHash>,
    clients: RwLock<Vec<Arc<dyn TurtleRsClient>>>,

    /// Live counters for the current interval
    statistics: TurtleStatistics,
    /// Smoothed per-second rates
    average: RwLock<TurtleStatistics>,
    /// Smoothed rates read by the forwarding throttle
    traffic: RwLock<TrafficStatistics>,

    /// Search results already handed to local clients
    seen_results: TurtleBloomFilter,
    last_filter_reset: Mutex<Instant>,
    last_tick: Mutex<Instant>,
}

impl TurtleRsService {
    /// Create a router for `own_id` sending through `peers`
    pub fn new(
        own_id: LocationId,
        peers: Arc<dyn PeerConnections>,
        config: TurtleConfig,
    ) -> Result<Self> {
        Self::with_probability(own_id, peers, config, TunnelProbability::new())
    }

    fn with_probability(
        own_id: LocationId,
        peers: Arc<dyn PeerConnections>,
        config: TurtleConfig,
        probability: TunnelProbability,
    ) -> Result<Self> {
        config.validate()?;

        let probability = probability.with_limits(
            config.max_tunnel_depth,
            config.tunnel_request_packet_size,
            config.max_tunnel_request_forward_per_second,
        );
        let now = Instant::now();

        Ok(Self {
            own_id,
            search_requests: SearchRequestCache::new(
                config.max_search_requests_in_cache,
                config.search_request_timeout(),
            ),
            tunnel_requests: TunnelRequestCache::new(
                config.max_tunnel_requests_in_cache,
                config.tunnel_request_timeout(),
            ),
            own_digs: DashMap::new(),
            tunnels: DashMap::new(),
            file_hashes: DashMap::new(),
            clients: RwLock::new(Vec::new()),
            statistics: TurtleStatistics::new(),
            average: RwLock::new(TurtleStatistics::new()),
            traffic: RwLock::new(TrafficStatistics::default()),
            seen_results: TurtleBloomFilter::new(
                config.search_result_filter_bytes,
                config.search_result_filter_items,
            ),
            last_filter_reset: Mutex::new(now),
            last_tick: Mutex::new(now),
            probability,
            peers,
            config,
        })
    }

    /// This node's location id
    pub fn own_id(&self) -> LocationId {
        self.own_id
    }

    /// Active configuration
    pub fn config(&self) -> &TurtleConfig {
        &self.config
    }

    /// Forwarding policy in use
    pub fn probability(&self) -> &TunnelProbability {
        &self.probability
    }

    /// Register a client asked to serve tunnel requests and searches
    pub fn register_client(&self, client: Arc<dyn TurtleRsClient>) {
        let mut clients = self.clients.write();
        if !clients.iter().any(|c| Arc::ptr_eq(c, &client)) {
            clients.push(client);
        }
    }

    /// Number of registered clients
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Handle an item received from `sender`
    pub fn handle_item(&self, sender: &LocationId, item: TurtleItem) {
        self.handle_item_at(sender, item, Instant::now());
    }

    /// [`handle_item`](Self::handle_item) with an explicit clock reading
    pub fn handle_item_at(&self, sender: &LocationId, item: TurtleItem, now: Instant) {
        let size = item.wire_size();
        self.statistics.add_to_total_download(size);
        match &item {
            TurtleItem::TunnelRequest(_) => self.statistics.add_to_tunnel_requests_download(size),
            TurtleItem::SearchRequest(_) => self.statistics.add_to_search_requests_download(size),
            TurtleItem::TunnelData(data) => self.statistics.add_to_data_download(data.payload.len()),
            TurtleItem::TunnelResult(_) | TurtleItem::SearchResult(_) => {},
        }

        match item {
            TurtleItem::TunnelRequest(request) => self.handle_tunnel_request(sender, request, now),
            TurtleItem::TunnelResult(result) => self.handle_tunnel_result(sender, result, now),
            TurtleItem::SearchRequest(request) => self.handle_search_request(sender, request, now),
            TurtleItem::SearchResult(result) => self.handle_search_result(sender, result, now),
            TurtleItem::TunnelData(data) => self.handle_tunnel_data(sender, data, now),
        }
    }

    fn handle_tunnel_request(&self, sender: &LocationId, item: TunnelRequestItem, now: Instant) {
        trace!(
            peer = %sender,
            request_id = item.request_id,
            depth = item.depth,
            hash = %item.file_hash,
            "Received tunnel request"
        );

        if self.is_banned(&item.file_hash) {
            debug!(hash = %item.file_hash, "Dropping tunnel request for banned hash");
            return;
        }

        if self.tunnel_requests.is_full() && self.tunnel_requests.prune(now) == 0 {
            debug!(
                request_id = item.request_id,
                capacity = self.tunnel_requests.capacity(),
                "Tunnel request cache full, dropping request"
            );
            return;
        }

        let source = *sender;
        let depth = item.depth;
        if self
            .tunnel_requests
            .exists_at(item.request_id, now, || TunnelRequest::new(source, depth, now))
        {
            trace!(request_id = item.request_id, "Tunnel request already seen");
            return;
        }

        if self.serve_tunnel_request(sender, &item, now) {
            return;
        }

        if !self.probability.is_tunnel_request_forwardable(&item) {
            trace!(request_id = item.request_id, depth = item.depth, "Tunnel request too deep");
            return;
        }

        let forwarded = self.probability.next_tunnel_request(&item);
        let probability = if self.config.throttle_tunnel_requests {
            let traffic = self.traffic.read();
            self.probability.forwarding_probability(
                &item,
                traffic.tunnel_requests_upload,
                traffic.tunnel_requests_download,
                self.peers.peer_count(),
            )
        } else {
            1.0
        };

        let mut rng = rand::thread_rng();
        let mut sent = 0usize;
        self.peers.do_for_all_peers_except_sender(sender, &mut |peer: &LocationId| {
            if probability >= 1.0 || rng.gen::<f64>() < probability {
                self.send_item(peer, TurtleItem::TunnelRequest(forwarded.clone()), true);
                sent += 1;
            }
        });

        debug!(
            request_id = item.request_id,
            depth = forwarded.depth,
            probability,
            peers = sent,
            "Forwarded tunnel request"
        );
    }

    /// Answer a tunnel request from local content. True if a client took it.
    fn serve_tunnel_request(
        &self,
        sender: &LocationId,
        item: &TunnelRequestItem,
        now: Instant,
    ) -> bool {
        let clients = self.clients.read().clone();
        let Some(client) = clients
            .into_iter()
            .find(|client| client.handle_tunnel_request(sender, &item.file_hash))
        else {
            return false;
        };

        let tunnel_id =
            item.partial_tunnel_id ^ self.own_print(&item.file_hash, TunnelDirection::Server);

        if self.tunnels.contains_key(&tunnel_id) {
            debug!(tunnel_id, "Tunnel already open, answering again");
        } else {
            let mut tunnel = Tunnel::new(
                tunnel_id,
                *sender,
                self.own_id,
                item.file_hash,
                TunnelDirection::Server,
            );
            tunnel.stamp_at(now);
            let virtual_location = tunnel.virtual_location().clone();

            self.tunnels.insert(
                tunnel_id,
                TunnelEntry {
                    tunnel,
                    client: Arc::clone(&client),
                },
            );
            client.add_virtual_peer(&item.file_hash, &virtual_location, TunnelDirection::Server);

            info!(
                tunnel_id,
                peer = %sender,
                hash = %item.file_hash,
                "Opened server tunnel"
            );
        }

        self.send_item(
            sender,
            TurtleItem::TunnelResult(TunnelResultItem {
                request_id: item.request_id,
                tunnel_id,
            }),
            false,
        );
        true
    }

    fn handle_tunnel_result(&self, sender: &LocationId, item: TunnelResultItem, now: Instant) {
        let Some(hash) = self.own_digs.get(&item.request_id).map(|entry| *entry) else {
            debug!(
                peer = %sender,
                request_id = item.request_id,
                tunnel_id = item.tunnel_id,
                "Tunnel result for a request this node did not start"
            );
            return;
        };

        match self
            .tunnel_requests
            .update(item.request_id, |request| request.add_response(item.tunnel_id))
        {
            Some(true) => {},
            Some(false) => {
                trace!(tunnel_id = item.tunnel_id, "Duplicate tunnel result");
                return;
            },
            None => {
                debug!(request_id = item.request_id, "Tunnel result for an expired request");
                return;
            },
        }

        if self.tunnels.contains_key(&item.tunnel_id) {
            debug!(
                peer = %sender,
                tunnel_id = item.tunnel_id,
                "Tunnel id already in use, ignoring result"
            );
            return;
        }

        let client = match self.file_hashes.get_mut(&hash) {
            Some(mut file_hash) => {
                if !file_hash.is_aggressive() && !file_hash.tunnels().is_empty() {
                    debug!(hash = %hash, "Already tunnelled, ignoring result");
                    return;
                }
                file_hash.add_tunnel(item.tunnel_id);
                Arc::clone(file_hash.client())
            },
            None => {
                debug!(hash = %hash, "Hash no longer monitored, ignoring result");
                return;
            },
        };

        let mut tunnel = Tunnel::new(
            item.tunnel_id,
            self.own_id,
            *sender,
            hash,
            TunnelDirection::Client,
        );
        tunnel.stamp_at(now);
        let virtual_location = tunnel.virtual_location().clone();

        let inserted = match self.tunnels.entry(item.tunnel_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(TunnelEntry {
                    tunnel,
                    client: Arc::clone(&client),
                });
                true
            },
        };
        if !inserted {
            if let Some(mut file_hash) = self.file_hashes.get_mut(&hash) {
                file_hash.remove_tunnel(item.tunnel_id);
            }
            debug!(tunnel_id = item.tunnel_id, "Tunnel id taken concurrently, ignoring result");
            return;
        }
        client.add_virtual_peer(&hash, &virtual_location, TunnelDirection::Client);

        info!(
            tunnel_id = item.tunnel_id,
            peer = %sender,
            hash = %hash,
            "Opened client tunnel"
        );
    }

    fn handle_search_request(&self, sender: &LocationId, item: SearchRequestItem, now: Instant) {
        trace!(
            peer = %sender,
            request_id = item.request_id,
            depth = item.depth,
            "Received search request"
        );

        if self.search_requests.is_full() {
            debug!(
                request_id = item.request_id,
                capacity = self.search_requests.capacity(),
                "Search request cache full, refusing request"
            );
            return;
        }

        let source = *sender;
        let hit_limit = self.config.max_search_hits;
        if self.search_requests.exists_at(item.request_id, now, || {
            SearchRequest::new(source, item.depth, item.keywords.clone(), hit_limit, now)
        }) {
            trace!(request_id = item.request_id, "Search request already seen");
            return;
        }

        self.search_locally(sender, &item);

        if !self.probability.is_search_request_forwardable(&item) {
            trace!(request_id = item.request_id, depth = item.depth, "Search request too deep");
            return;
        }

        let forwarded = self.probability.next_search_request(&item);
        self.peers.do_for_all_peers_except_sender(sender, &mut |peer: &LocationId| {
            self.send_item(peer, TurtleItem::SearchRequest(forwarded.clone()), true);
        });
    }

    /// Ask local clients for hits and send them back to `sender`
    fn search_locally(&self, sender: &LocationId, item: &SearchRequestItem) {
        let clients = self.clients.read().clone();
        let limit = self.config.max_search_hits;
        let mut results = Vec::new();

        for client in clients {
            let remaining = limit.saturating_sub(results.len());
            if remaining == 0 {
                break;
            }
            results.extend(
                client
                    .receive_search_request(&item.keywords, remaining)
                    .into_iter()
                    .take(remaining),
            );
        }

        if results.is_empty() {
            return;
        }

        let hits = results.len();
        self.search_requests
            .update(item.request_id, |request| request.add_result_count(hits));

        debug!(request_id = item.request_id, hits, "Answering search locally");
        self.send_item(
            sender,
            TurtleItem::SearchResult(SearchResultItem {
                request_id: item.request_id,
                depth: item.depth,
                results,
            }),
            false,
        );
    }

    fn handle_search_result(&self, sender: &LocationId, item: SearchResultItem, now: Instant) {
        let Some(request) = self.search_requests.get(item.request_id) else {
            debug!(
                peer = %sender,
                request_id = item.request_id,
                "Search result for an unknown request"
            );
            return;
        };

        if request.is_stale(now, self.search_requests.timeout()) {
            debug!(request_id = item.request_id, "Search result arrived too late");
            return;
        }

        if request.remaining_hits() == 0 {
            debug!(
                request_id = item.request_id,
                hits = request.result_count(),
                "Search hit limit reached, dropping result"
            );
            return;
        }

        let hits = item.results.len();
        self.search_requests
            .update(item.request_id, |request| request.add_result_count(hits));

        match request.client() {
            Some(client) => {
                if self.seen_results.check_and_insert(&result_key(&item)) {
                    trace!(request_id = item.request_id, "Duplicate search result");
                    return;
                }
                client.receive_search_result(item.request_id, &item);
            },
            None => {
                let source = request.source();
                self.send_item(&source, TurtleItem::SearchResult(item), true);
            },
        }
    }

    fn handle_tunnel_data(&self, sender: &LocationId, item: TunnelDataItem, now: Instant) {
        let found = self.tunnels.get_mut(&item.tunnel_id).and_then(|mut entry| {
            if entry.tunnel.next_hop() != *sender {
                return None;
            }
            entry.tunnel.stamp_at(now);
            entry.tunnel.add_transferred_bytes(item.payload.len() as u64);
            Some((
                entry.tunnel.hash(),
                entry.tunnel.virtual_location().clone(),
                Arc::clone(&entry.client),
            ))
        });

        let Some((hash, virtual_location, client)) = found else {
            debug!(
                peer = %sender,
                tunnel_id = item.tunnel_id,
                "Data for an unknown tunnel"
            );
            return;
        };

        if let Some(mut file_hash) = self.file_hashes.get_mut(&hash) {
            file_hash.set_last_data(now);
        }

        client.receive_turtle_data(&item.payload, &hash, &virtual_location, item.direction);
    }

    fn send_item(&self, target: &LocationId, item: TurtleItem, forwarded: bool) {
        let size = item.wire_size();
        self.statistics.add_to_total_upload(size);
        if forwarded {
            self.statistics.add_to_forward_total(size);
        }

        match &item {
            TurtleItem::TunnelRequest(_) => self.statistics.add_to_tunnel_requests_upload(size),
            TurtleItem::SearchRequest(_) => self.statistics.add_to_search_requests_upload(size),
            TurtleItem::TunnelData(data) => self.statistics.add_to_data_upload(data.payload.len()),
            TurtleItem::TunnelResult(_) | TurtleItem::SearchResult(_) => {},
        }

        self.peers.write_item(target, item);
    }

    /// Per-node value mixed into tunnel ids, stable for a hash and role
    fn own_print(&self, hash: &Sha1Sum, direction: TunnelDirection) -> u32 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(hash.as_bytes());
        hasher.update(self.own_id.as_bytes());
        hasher.update(&self.probability.bias().to_be_bytes());
        hasher.update(&[matches!(direction, TunnelDirection::Client) as u8]);

        let digest = hasher.finalize();
        let bytes = digest.as_bytes();
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    // No ban list is kept yet; every hash passes.
    fn is_banned(&self, _hash: &Sha1Sum) -> bool {
        false
    }

    /// Send a fresh tunnel request for `hash` to every peer
    fn dig_tunnel(&self, hash: &Sha1Sum, now: Instant) {
        let own_id = self.own_id;
        let mut rng = rand::thread_rng();
        let request_id = loop {
            let candidate: u32 = rng.gen();
            if !self
                .tunnel_requests
                .exists_at(candidate, now, || TunnelRequest::new(own_id, 0, now))
            {
                break candidate;
            }
        };

        self.own_digs.insert(request_id, *hash);
        if let Some(mut file_hash) = self.file_hashes.get_mut(hash) {
            file_hash.set_last_request(now);
        }

        let item = TunnelRequestItem {
            request_id,
            partial_tunnel_id: self.own_print(hash, TunnelDirection::Client),
            depth: 0,
            file_hash: *hash,
        };

        let peers = self.peers.connected_peers();
        for peer in &peers {
            self.send_item(peer, TurtleItem::TunnelRequest(item.clone()), false);
        }

        debug!(request_id, hash = %hash, peers = peers.len(), "Digging tunnel");
    }

    /// Close a tunnel and tell its client
    fn close_tunnel(&self, tunnel_id: u32) {
        let Some((_, entry)) = self.tunnels.remove(&tunnel_id) else {
            return;
        };

        let hash = entry.tunnel.hash();
        if let Some(mut file_hash) = self.file_hashes.get_mut(&hash) {
            file_hash.remove_tunnel(tunnel_id);
        }
        entry
            .client
            .remove_virtual_peer(&hash, entry.tunnel.virtual_location());

        info!(tunnel_id, hash = %hash, "Closed tunnel");
    }

    /// Periodic maintenance.
    ///
    /// Expires cached requests, rolls the traffic counters into the smoothed
    /// rates, clears the search result filter when due, closes idle tunnels
    /// and digs for hashes that need it.
    pub fn tick(&self, now: Instant) {
        let elapsed = {
            let mut last = self.last_tick.lock();
            let elapsed = now.saturating_duration_since(*last);
            *last = now;
            elapsed
        };

        let searches = self.search_requests.prune(now);
        let tunnel_requests = self.tunnel_requests.prune(now);
        self.own_digs
            .retain(|request_id, _| self.tunnel_requests.get(*request_id).is_some());
        if searches + tunnel_requests > 0 {
            trace!(searches, tunnel_requests, "Expired cached requests");
        }

        self.roll_statistics(elapsed);

        {
            let mut last_reset = self.last_filter_reset.lock();
            if now.saturating_duration_since(*last_reset) >= self.config.filter_reset_interval() {
                self.seen_results.clear();
                *last_reset = now;
            }
        }

        self.manage_tunnels(now, elapsed);

        let due: Vec<Sha1Sum> = self
            .file_hashes
            .iter()
            .filter(|entry| {
                entry.needs_digging(
                    now,
                    self.config.empty_tunnels_digging_time(),
                    self.config.regular_tunnels_digging_time(),
                )
            })
            .map(|entry| *entry.key())
            .collect();
        for hash in due {
            self.dig_tunnel(&hash, now);
        }
    }

    fn roll_statistics(&self, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return;
        }

        let sample = self.statistics.take().multiply((1.0 / seconds) as f32);
        let factor = self.config.traffic_smoothing_factor;

        {
            let mut average = self.average.write();
            *average = average
                .multiply((1.0 - factor) as f32)
                .add(&sample.multiply(factor as f32));
        }

        let peer_count = self.peers.peer_count();
        let mut traffic = self.traffic.write();
        let next = traffic
            .multiply(1.0 - factor)
            .add(&TrafficStatistics::from(&sample).multiply(factor));
        let table = self.probability.probability_table(
            next.tunnel_requests_upload,
            next.tunnel_requests_download,
            peer_count,
        );
        *traffic = next.with_forward_probabilities(table);
    }

    fn manage_tunnels(&self, now: Instant, elapsed: Duration) {
        let max_idle = self.config.maximum_tunnel_idle_time();
        let seconds = elapsed.as_secs_f64();
        let mut closed = Vec::new();

        self.tunnels.retain(|tunnel_id, entry| {
            if entry.tunnel.is_idle(now, max_idle) {
                closed.push((
                    *tunnel_id,
                    entry.tunnel.hash(),
                    entry.tunnel.virtual_location().clone(),
                    Arc::clone(&entry.client),
                ));
                return false;
            }
            if seconds > 0.0 {
                let speed = entry.tunnel.transferred_bytes() as f64 / seconds;
                entry.tunnel.set_speed_bps(speed);
                entry.tunnel.clear_transferred_bytes();
            }
            true
        });

        for (tunnel_id, hash, virtual_location, client) in closed {
            if let Some(mut file_hash) = self.file_hashes.get_mut(&hash) {
                file_hash.remove_tunnel(tunnel_id);
            }
            client.remove_virtual_peer(&hash, &virtual_location);
            info!(tunnel_id, hash = %hash, "Closed idle tunnel");
        }
    }

    /// Run [`tick`](Self::tick) every `period` until the handle is aborted
    pub fn spawn_maintenance(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.tick(Instant::now());
            }
        })
    }

    /// Live counters for the current interval
    pub fn statistics(&self) -> TurtleStatistics {
        self.statistics.snapshot()
    }

    /// Smoothed per-second rates
    pub fn average_statistics(&self) -> TurtleStatistics {
        self.average.read().clone()
    }

    /// Smoothed traffic used by the throttle
    pub fn traffic(&self) -> TrafficStatistics {
        self.traffic.read().clone()
    }

    /// Copy of a cached search request
    pub fn search_request(&self, request_id: u32) -> Option<SearchRequest> {
        self.search_requests.get(request_id)
    }

    /// Copy of a cached tunnel request
    pub fn tunnel_request(&self, request_id: u32) -> Option<TunnelRequest> {
        self.tunnel_requests.get(request_id)
    }

    /// Number of cached search requests
    pub fn search_request_count(&self) -> usize {
        self.search_requests.len()
    }

    /// Number of cached tunnel requests
    pub fn tunnel_request_count(&self) -> usize {
        self.tunnel_requests.len()
    }

    /// Copy of an open tunnel
    pub fn tunnel(&self, tunnel_id: u32) -> Option<Tunnel> {
        self.tunnels.get(&tunnel_id).map(|entry| entry.tunnel.clone())
    }

    /// Number of open tunnels
    pub fn tunnel_count(&self) -> usize {
        self.tunnels.len()
    }

    /// Snapshot of a monitored hash
    pub fn hash_info(&self, hash: &Sha1Sum) -> Option<HashInfo> {
        self.file_hashes.get(hash).map(|file_hash| file_hash.info())
    }

    /// Whether `hash` is monitored
    pub fn is_monitored(&self, hash: &Sha1Sum) -> bool {
        self.file_hashes.contains_key(hash)
    }
}

impl TurtleRouter for TurtleRsService {
    fn start_monitoring_tunnels(
        &self,
        hash: Sha1Sum,
        client: Arc<dyn TurtleRsClient>,
        allow_multi_tunnels: bool,
    ) {
        if self.file_hashes.contains_key(&hash) {
            debug!(hash = %hash, "Hash already monitored");
            return;
        }

        self.register_client(Arc::clone(&client));
        self.file_hashes
            .insert(hash, FileHash::new(hash, client, allow_multi_tunnels));
        info!(hash = %hash, aggressive = allow_multi_tunnels, "Monitoring tunnels");

        self.dig_tunnel(&hash, Instant::now());
    }

    fn stop_monitoring_tunnels(&self, hash: &Sha1Sum) {
        let Some((_, file_hash)) = self.file_hashes.remove(hash) else {
            return;
        };

        self.own_digs.retain(|_, dug| dug != hash);
        for tunnel_id in file_hash.tunnels() {
            self.close_tunnel(*tunnel_id);
        }
        info!(hash = %hash, "Stopped monitoring tunnels");
    }

    fn force_re_digg_tunnel(&self, hash: &Sha1Sum) {
        if !self.file_hashes.contains_key(hash) {
            warn!(hash = %hash, "Cannot dig for a hash that is not monitored");
            return;
        }
        self.dig_tunnel(hash, Instant::now());
    }

    fn send_turtle_data(&self, virtual_peer: &LocationId, payload: Vec<u8>) -> Result<()> {
        let unknown = || RoutingError::UnknownVirtualPeer {
            location: *virtual_peer,
        };
        let tunnel_id = identity::tunnel_id_of(virtual_peer).ok_or_else(unknown)?;

        let (next_hop, direction) = {
            let mut entry = self.tunnels.get_mut(&tunnel_id).ok_or_else(unknown)?;
            entry.tunnel.stamp();
            entry.tunnel.add_transferred_bytes(payload.len() as u64);
            (entry.tunnel.next_hop(), entry.tunnel.direction())
        };

        self.send_item(
            &next_hop,
            TurtleItem::TunnelData(TunnelDataItem {
                tunnel_id,
                direction,
                payload,
            }),
            false,
        );
        Ok(())
    }

    fn is_virtual_peer(&self, location: &LocationId) -> bool {
        identity::tunnel_id_of(location).is_some_and(|tunnel_id| self.tunnels.contains_key(&tunnel_id))
    }

    fn turtle_search(&self, keywords: &str, client: Arc<dyn TurtleRsClient>) -> Result<u32> {
        let keywords = keywords.trim();
        if keywords.is_empty() {
            return Err(RoutingError::EmptySearch.into());
        }
        if self.search_requests.is_full() {
            return Err(RoutingError::SearchCacheFull {
                capacity: self.search_requests.capacity(),
            }
            .into());
        }

        let now = Instant::now();
        let own_id = self.own_id;
        let hit_limit = self.config.max_search_hits;
        let mut rng = rand::thread_rng();
        let request_id = loop {
            let candidate: u32 = rng.gen();
            if !self.search_requests.exists_at(candidate, now, || {
                SearchRequest::new(own_id, 0, keywords, hit_limit, now).with_client(Arc::clone(&client))
            }) {
                break candidate;
            }
        };

        let item = SearchRequestItem {
            request_id,
            depth: 0,
            keywords: keywords.to_string(),
        };
        for peer in self.peers.connected_peers() {
            self.send_item(&peer, TurtleItem::SearchRequest(item.clone()), false);
        }

        info!(request_id, keywords, "Started turtle search");
        Ok(request_id)
    }
}

/// Dedup key of a search result: request id plus a digest of the hits
fn result_key(item: &SearchResultItem) -> [u8; 36] {
    let mut hasher = blake3::Hasher::new();
    for result in &item.results {
        hasher.update(&(result.len() as u32).to_be_bytes());
        hasher.update(result);
    }

    let mut key = [0u8; 36];
    key[..4].copy_from_slice(&item.request_id.to_be_bytes());
    key[4..].copy_from_slice(hasher.finalize().as_bytes());
    key
}

/// Builder for [`TurtleRsService`]
pub struct TurtleServiceBuilder {
    own_id: Option<LocationId>,
    peers: Option<Arc<dyn PeerConnections>>,
    config: TurtleConfig,
    bias: Option<u32>,
}

impl TurtleServiceBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self {
            own_id: None,
            peers: None,
            config: TurtleConfig::default(),
            bias: None,
        }
    }

    /// Set this node's location id
    pub fn own_id(mut self, own_id: LocationId) -> Self {
        self.own_id = Some(own_id);
        self
    }

    /// Set the peer connections
    pub fn peers(mut self, peers: Arc<dyn PeerConnections>) -> Self {
        self.peers = Some(peers);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: TurtleConfig) -> Self {
        self.config = config;
        self
    }

    /// Fix the forwarding bias instead of drawing one
    pub fn bias(mut self, bias: u32) -> Self {
        self.bias = Some(bias);
        self
    }

    /// Build the service
    pub fn build(self) -> Result<TurtleRsService> {
        let own_id = self.own_id.ok_or_else(|| ConfigError::MissingRequiredField {
            field: "own_id".to_string(),
        })?;
        let peers = self.peers.ok_or_else(|| ConfigError::MissingRequiredField {
            field: "peers".to_string(),
        })?;
        let probability = match self.bias {
            Some(bias) => TunnelProbability::with_bias(bias),
            None => TunnelProbability::new(),
        };

        TurtleRsService::with_probability(own_id, peers, self.config, probability)
    }
}

impl Default for TurtleServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ChannelPeerConnections, OutgoingItem};
    use crate::routing::client::NullClient;
    use tokio::sync::mpsc::UnboundedReceiver;

    type Fixture = (
        TurtleRsService,
        Arc<ChannelPeerConnections>,
        UnboundedReceiver<OutgoingItem>,
    );

    fn service() -> Fixture {
        let (peers, rx) = ChannelPeerConnections::new();
        let peers = Arc::new(peers);
        peers.add_peer(LocationId::random());

        let service = TurtleServiceBuilder::new()
            .own_id(LocationId::random())
            .peers(peers.clone())
            .bias(0)
            .build()
            .unwrap();
        (service, peers, rx)
    }

    #[test]
    fn test_builder_requires_fields() {
        assert!(TurtleServiceBuilder::new().build().is_err());
        assert!(TurtleServiceBuilder::new()
            .own_id(LocationId::random())
            .build()
            .is_err());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let (peers, _rx) = ChannelPeerConnections::new();
        let config = TurtleConfig::default().with_max_search_hits(0);

        let result = TurtleServiceBuilder::new()
            .own_id(LocationId::random())
            .peers(Arc::new(peers))
            .config(config)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_own_print_depends_on_direction() {
        let (service, _, _) = service();
        let hash = Sha1Sum::from_bytes([3; 20]);

        assert_eq!(
            service.own_print(&hash, TunnelDirection::Client),
            service.own_print(&hash, TunnelDirection::Client)
        );
        assert_ne!(
            service.own_print(&hash, TunnelDirection::Client),
            service.own_print(&hash, TunnelDirection::Server)
        );
    }

    #[test]
    fn test_register_client_once() {
        let (service, _, _) = service();
        let client: Arc<dyn TurtleRsClient> = Arc::new(NullClient);

        service.register_client(client.clone());
        service.register_client(client);
        assert_eq!(service.client_count(), 1);
    }

    #[test]
    fn test_result_key_depends_on_request_and_hits() {
        let item = SearchResultItem {
            request_id: 1,
            depth: 0,
            results: vec![b"a".to_vec()],
        };
        let other_request = SearchResultItem {
            request_id: 2,
            ..item.clone()
        };
        let other_hits = SearchResultItem {
            results: vec![b"b".to_vec()],
            ..item.clone()
        };

        assert_eq!(result_key(&item), result_key(&item.clone()));
        assert_ne!(result_key(&item), result_key(&other_request));
        assert_ne!(result_key(&item), result_key(&other_hits));
    }

    #[test]
    fn test_unknown_virtual_peer() {
        let (service, _, _) = service();
        let location = identity::virtual_location_id(77);

        assert!(!service.is_virtual_peer(&location));
        assert!(service.send_turtle_data(&location, vec![1]).is_err());
        assert!(service
            .send_turtle_data(&LocationId::random(), vec![1])
            .is_err());
    }

    #[test]
    fn test_dig_records_own_request() {
        let (service, peers, mut rx) = service();
        let hash = Sha1Sum::from_bytes([9; 20]);

        service.start_monitoring_tunnels(hash, Arc::new(NullClient), false);

        assert!(service.is_monitored(&hash));
        assert_eq!(service.tunnel_request_count(), 1);
        assert_eq!(peers.items_sent(), 1);
        match rx.try_recv().unwrap().item {
            TurtleItem::TunnelRequest(item) => {
                assert_eq!(item.depth, 0);
                assert_eq!(item.file_hash, hash);
            },
            other => panic!("unexpected item {other}"),
        }
        assert!(service.hash_info(&hash).unwrap().last_request.is_some());
    }

    #[test]
    fn test_stop_monitoring_forgets_hash() {
        let (service, _, _) = service();
        let hash = Sha1Sum::from_bytes([9; 20]);

        service.start_monitoring_tunnels(hash, Arc::new(NullClient), false);
        service.stop_monitoring_tunnels(&hash);

        assert!(!service.is_monitored(&hash));
        assert!(service.own_digs.is_empty());
    }

    #[tokio::test]
    async fn test_maintenance_task_ticks() {
        let (service, _peers, _rx) = service();
        let service = Arc::new(service);

        let handle = Arc::clone(&service).spawn_maintenance(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(service.traffic().forward_probabilities.len(), 7);
    }
}
