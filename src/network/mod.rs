//! Network module
//!
//! The turtle service never touches sockets. It sees the friend connections
//! through the `PeerConnections` port: a list of connected locations and a
//! fire-and-forget unicast. Flooding is built on top of those two.

mod peers;

pub use peers::{ChannelPeerConnections, OutgoingItem, PeerConnections};
