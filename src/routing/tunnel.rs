//! Established tunnels
//!
//! A tunnel is recorded by the two endpoints only: the client end that dug
//! it and the server end that answered. The far end is addressed through the
//! tunnel's virtual location.

use crate::identity::{self, Location, LocationId, Sha1Sum};
use crate::protocol::TunnelDirection;
use std::time::{Duration, Instant};

/// One tunnel known to this node
#[derive(Debug, Clone)]
pub struct Tunnel {
    tunnel_id: u32,
    /// Peer on the requesting side
    source: LocationId,
    /// Peer on the answering side
    destination: LocationId,
    /// Derived once from the tunnel id
    virtual_location: Location,
    hash: Sha1Sum,
    /// Role of this node for the tunnel
    direction: TunnelDirection,
    last_used: Instant,
    transferred_bytes: u64,
    speed_bps: f64,
}

impl Tunnel {
    /// Create a tunnel, stamped now
    pub fn new(
        tunnel_id: u32,
        source: LocationId,
        destination: LocationId,
        hash: Sha1Sum,
        direction: TunnelDirection,
    ) -> Self {
        Self {
            tunnel_id,
            source,
            destination,
            virtual_location: identity::from_tunnel(tunnel_id),
            hash,
            direction,
            last_used: Instant::now(),
            transferred_bytes: 0,
            speed_bps: 0.0,
        }
    }

    /// Tunnel identifier
    pub fn tunnel_id(&self) -> u32 {
        self.tunnel_id
    }

    /// Peer on the requesting side
    pub fn source(&self) -> LocationId {
        self.source
    }

    /// Peer on the answering side
    pub fn destination(&self) -> LocationId {
        self.destination
    }

    /// Location standing in for the far end
    pub fn virtual_location(&self) -> &Location {
        &self.virtual_location
    }

    /// Content hash this tunnel serves
    pub fn hash(&self) -> Sha1Sum {
        self.hash
    }

    /// Point the tunnel at another hash
    pub fn set_hash(&mut self, hash: Sha1Sum) {
        self.hash = hash;
    }

    /// Which end of the tunnel this node is
    pub fn direction(&self) -> TunnelDirection {
        self.direction
    }

    /// The real peer data for this tunnel is written to
    pub fn next_hop(&self) -> LocationId {
        match self.direction {
            TunnelDirection::Client => self.destination,
            TunnelDirection::Server => self.source,
        }
    }

    /// When the tunnel last carried data
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Mark the tunnel as used now
    pub fn stamp(&mut self) {
        self.stamp_at(Instant::now());
    }

    /// Mark the tunnel as used at `now`
    pub fn stamp_at(&mut self, now: Instant) {
        self.last_used = now;
    }

    /// True if unused for longer than `max_idle`
    pub fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        now.saturating_duration_since(self.last_used) > max_idle
    }

    /// Bytes carried since the last speed estimate
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    /// Account carried bytes
    pub fn add_transferred_bytes(&mut self, bytes: u64) {
        self.transferred_bytes = self.transferred_bytes.saturating_add(bytes);
    }

    /// Reset the carried bytes counter
    pub fn clear_transferred_bytes(&mut self) {
        self.transferred_bytes = 0;
    }

    /// Estimated speed in bytes per second
    pub fn speed_bps(&self) -> f64 {
        self.speed_bps
    }

    /// Set the estimated speed
    pub fn set_speed_bps(&mut self, speed_bps: f64) {
        self.speed_bps = speed_bps;
    }
}
