//! # Turtle Router
//!
//! Anonymous routing overlay for friend-to-friend networks. Nodes only talk
//! to directly connected friends; searches and tunnel requests are flooded
//! with a bounded depth, and data flows through tunnels whose endpoints
//! never learn each other's identity.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use turtle_router::{ChannelPeerConnections, LocationId, TurtleConfig, TurtleRsService};
//!
//! # fn main() -> turtle_router::Result<()> {
//! let (peers, mut outgoing) = ChannelPeerConnections::new();
//! let service = TurtleRsService::new(LocationId::random(), Arc::new(peers), TurtleConfig::default())?;
//!
//! // Items queued for friends arrive on `outgoing`.
//! # let _ = (service, outgoing.try_recv());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod identity;
pub mod network;
pub mod protocol;
pub mod routing;
pub mod storage;

// Re-export main types
pub use error::{ConfigError, IdentityError, Result, RoutingError, StorageError, TurtleError};
pub use identity::{Location, LocationId, Sha1Sum};
pub use network::{ChannelPeerConnections, OutgoingItem, PeerConnections};
pub use protocol::{TunnelDirection, TurtleItem};
pub use routing::{
    TrafficStatistics, TurtleRouter, TurtleRsClient, TurtleRsService, TurtleServiceBuilder,
    TurtleStatistics,
};
pub use storage::TurtleConfig;
