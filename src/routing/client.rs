//! Ports between the turtle router and the content services using it
//!
//! A content service (file transfer, for instance) implements
//! [`TurtleRsClient`] and drives the router through [`TurtleRouter`].
//! Only encrypted hashes are handled.

use crate::error::Result;
use crate::identity::{Location, LocationId, Sha1Sum};
use crate::protocol::{SearchResultItem, TunnelDirection};
use std::sync::Arc;

/// Operations the router offers to its clients
pub trait TurtleRouter: Send + Sync {
    /// Start keeping tunnels open for `hash`.
    ///
    /// With `allow_multi_tunnels` the router keeps digging even once a tunnel
    /// exists (aggressive mode).
    fn start_monitoring_tunnels(
        &self,
        hash: Sha1Sum,
        client: Arc<dyn TurtleRsClient>,
        allow_multi_tunnels: bool,
    );

    /// Stop monitoring `hash` and close its tunnels
    fn stop_monitoring_tunnels(&self, hash: &Sha1Sum);

    /// Dig for `hash` now instead of waiting for the next round
    fn force_re_digg_tunnel(&self, hash: &Sha1Sum);

    /// Send a payload to the far end of the tunnel behind `virtual_peer`
    fn send_turtle_data(&self, virtual_peer: &LocationId, payload: Vec<u8>) -> Result<()>;

    /// Whether `location` addresses a tunnel endpoint rather than a real peer
    fn is_virtual_peer(&self, location: &LocationId) -> bool;

    /// Flood a keyword search; results go to `client`. Returns the request id.
    fn turtle_search(&self, keywords: &str, client: Arc<dyn TurtleRsClient>) -> Result<u32>;
}

/// Callbacks a content service receives from the router
pub trait TurtleRsClient: Send + Sync {
    /// Can this node serve `hash` locally?
    fn handle_tunnel_request(&self, sender: &LocationId, hash: &Sha1Sum) -> bool;

    /// Data arrived through a tunnel. `direction` tells which end sent it.
    fn receive_turtle_data(
        &self,
        payload: &[u8],
        hash: &Sha1Sum,
        virtual_location: &Location,
        direction: TunnelDirection,
    );

    /// Search local content, returning at most `max_hits` results
    fn receive_search_request(&self, _keywords: &str, _max_hits: usize) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Results for a search this client started
    fn receive_search_result(&self, _request_id: u32, _item: &SearchResultItem) {}

    /// A tunnel for `hash` is ready
    fn add_virtual_peer(&self, hash: &Sha1Sum, virtual_location: &Location, direction: TunnelDirection);

    /// A tunnel for `hash` was closed
    fn remove_virtual_peer(&self, hash: &Sha1Sum, virtual_location: &Location);
}

/// Client that serves nothing and ignores every callback
#[cfg(test)]
pub(crate) struct NullClient;

#[cfg(test)]
impl TurtleRsClient for NullClient {
    fn handle_tunnel_request(&self, _sender: &LocationId, _hash: &Sha1Sum) -> bool {
        false
    }

    fn receive_turtle_data(
        &self,
        _payload: &[u8],
        _hash: &Sha1Sum,
        _virtual_location: &Location,
        _direction: TunnelDirection,
    ) {
    }

    fn add_virtual_peer(&self, _hash: &Sha1Sum, _location: &Location, _direction: TunnelDirection) {}

    fn remove_virtual_peer(&self, _hash: &Sha1Sum, _location: &Location) {}
}
