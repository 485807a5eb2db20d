//! Turtle routing
//!
//! Anonymous, depth-limited flooding of search and tunnel requests among
//! friends, and the end-to-end tunnels built from them.
//!
//! # Architecture
//!
//! - **TurtleRsService**: receives items, applies the forwarding policy and
//!   owns all routing state
//! - **RequestCache**: remembers flooded request ids so duplicates are dropped
//!   and answers can be sent back the way the request came
//! - **TunnelProbability**: depth limit, depth obfuscation and the bandwidth
//!   throttle for tunnel requests
//! - **Tunnel** / **FileHash**: tunnels this node is an endpoint of, and the
//!   hashes its clients asked tunnels for
//! - **TurtleStatistics**: bandwidth accounting feeding the throttle
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use turtle_router::identity::LocationId;
//! use turtle_router::network::ChannelPeerConnections;
//! use turtle_router::routing::TurtleServiceBuilder;
//!
//! # fn example() -> turtle_router::error::Result<()> {
//! let (peers, _outgoing) = ChannelPeerConnections::new();
//! let service = TurtleServiceBuilder::new()
//!     .own_id(LocationId::random())
//!     .peers(Arc::new(peers))
//!     .build()?;
//!
//! // Feed items from friends into service.handle_item(..) and call
//! // service.tick(..) periodically.
//! # let _ = service;
//! # Ok(())
//! # }
//! ```

pub mod bloom;
pub mod client;
pub mod file_hash;
pub mod forwarding;
pub mod request_cache;
pub mod requests;
pub mod service;
pub mod statistics;
pub mod tunnel;

pub use bloom::TurtleBloomFilter;
pub use client::{TurtleRouter, TurtleRsClient};
pub use file_hash::{FileHash, HashInfo};
pub use forwarding::{TunnelProbability, MAX_TUNNEL_DEPTH};
pub use request_cache::{RequestCache, SearchRequestCache, TunnelRequestCache};
pub use requests::{CachedRequest, SearchRequest, TunnelRequest};
pub use service::{TurtleRsService, TurtleServiceBuilder};
pub use statistics::{TrafficStatistics, TurtleStatistics};
pub use tunnel::Tunnel;
