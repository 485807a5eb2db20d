//! Common test helpers and utilities
//!
//! Fakes for the two ports of the router: a [`RecordingPeers`] that keeps
//! every item written instead of sending it, and a [`ScriptedClient`] whose
//! answers are fixed up front and whose callbacks are recorded.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use turtle_router::identity::{Location, LocationId, Sha1Sum};
use turtle_router::protocol::{SearchResultItem, TunnelDirection, TurtleItem};
use turtle_router::routing::{TurtleRsClient, TurtleRsService, TurtleServiceBuilder};
use turtle_router::storage::TurtleConfig;

/// Peer connections that record what would have been sent
#[derive(Default)]
pub struct RecordingPeers {
    peers: Mutex<Vec<LocationId>>,
    sent: Mutex<Vec<(LocationId, TurtleItem)>>,
}

impl RecordingPeers {
    /// Create fake connections to `count` random peers
    pub fn with_peers(count: usize) -> Arc<Self> {
        let peers = Self::default();
        *peers.peers.lock() = (0..count).map(|_| LocationId::random()).collect();
        Arc::new(peers)
    }

    /// Create fake connections to the given peers
    pub fn with_ids(ids: Vec<LocationId>) -> Arc<Self> {
        let peers = Self::default();
        *peers.peers.lock() = ids;
        Arc::new(peers)
    }

    /// The connected peers, in a stable order
    pub fn peers(&self) -> Vec<LocationId> {
        self.peers.lock().clone()
    }

    /// Peer at `index`
    pub fn peer(&self, index: usize) -> LocationId {
        self.peers.lock()[index]
    }

    /// Everything written so far, draining the record
    pub fn take_sent(&self) -> Vec<(LocationId, TurtleItem)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Targets of everything written so far, without draining
    pub fn targets(&self) -> Vec<LocationId> {
        self.sent.lock().iter().map(|(target, _)| *target).collect()
    }

    /// Number of items written so far
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl turtle_router::network::PeerConnections for RecordingPeers {
    fn connected_peers(&self) -> Vec<LocationId> {
        self.peers.lock().clone()
    }

    fn write_item(&self, target: &LocationId, item: TurtleItem) {
        self.sent.lock().push((*target, item));
    }
}

/// Client with fixed answers that records every callback
#[derive(Default)]
pub struct ScriptedClient {
    /// Hashes served locally
    pub served: Mutex<HashSet<Sha1Sum>>,
    /// Hits returned for any search
    pub hits: Mutex<Vec<Vec<u8>>>,
    /// Data received through tunnels
    pub received_data: Mutex<Vec<(Vec<u8>, Sha1Sum, LocationId, TunnelDirection)>>,
    /// Search results delivered
    pub search_results: Mutex<Vec<(u32, SearchResultItem)>>,
    /// Virtual peers added and not yet removed
    pub virtual_peers: Mutex<Vec<(Sha1Sum, Location, TunnelDirection)>>,
    /// Virtual peers removed
    pub removed_peers: Mutex<Vec<Location>>,
}

impl ScriptedClient {
    /// A client with nothing to serve
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A client serving `hash`
    pub fn serving(hash: Sha1Sum) -> Arc<Self> {
        let client = Self::default();
        client.served.lock().insert(hash);
        Arc::new(client)
    }

    /// A client answering every search with `hits`
    pub fn with_hits(hits: Vec<Vec<u8>>) -> Arc<Self> {
        let client = Self::default();
        *client.hits.lock() = hits;
        Arc::new(client)
    }
}

impl TurtleRsClient for ScriptedClient {
    fn handle_tunnel_request(&self, _sender: &LocationId, hash: &Sha1Sum) -> bool {
        self.served.lock().contains(hash)
    }

    fn receive_turtle_data(
        &self,
        payload: &[u8],
        hash: &Sha1Sum,
        virtual_location: &Location,
        direction: TunnelDirection,
    ) {
        self.received_data
            .lock()
            .push((payload.to_vec(), *hash, virtual_location.id(), direction));
    }

    fn receive_search_request(&self, _keywords: &str, max_hits: usize) -> Vec<Vec<u8>> {
        self.hits.lock().iter().take(max_hits).cloned().collect()
    }

    fn receive_search_result(&self, request_id: u32, item: &SearchResultItem) {
        self.search_results.lock().push((request_id, item.clone()));
    }

    fn add_virtual_peer(&self, hash: &Sha1Sum, virtual_location: &Location, direction: TunnelDirection) {
        self.virtual_peers
            .lock()
            .push((*hash, virtual_location.clone(), direction));
    }

    fn remove_virtual_peer(&self, _hash: &Sha1Sum, virtual_location: &Location) {
        self.virtual_peers
            .lock()
            .retain(|(_, location, _)| location != virtual_location);
        self.removed_peers.lock().push(virtual_location.clone());
    }
}

/// Router with a fixed zero bias connected to `peers`
pub fn create_service(peers: Arc<RecordingPeers>, config: TurtleConfig) -> TurtleRsService {
    create_service_as(LocationId::random(), peers, config)
}

/// [`create_service`] for a known location id
pub fn create_service_as(
    own_id: LocationId,
    peers: Arc<RecordingPeers>,
    config: TurtleConfig,
) -> TurtleRsService {
    TurtleServiceBuilder::new()
        .own_id(own_id)
        .peers(peers)
        .config(config)
        .bias(0)
        .build()
        .unwrap()
}

/// A hash built from one repeated byte
pub fn test_hash(byte: u8) -> Sha1Sum {
    Sha1Sum::from_bytes([byte; 20])
}
