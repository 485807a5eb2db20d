//! Peer connection port and a channel-backed implementation

use crate::identity::LocationId;
use crate::protocol::TurtleItem;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

/// Access to the directly connected friend locations
///
/// `write_item` must not block: implementations enqueue and return.
pub trait PeerConnections: Send + Sync {
    /// Locations currently connected
    fn connected_peers(&self) -> Vec<LocationId>;

    /// Queue an item for one connected peer
    fn write_item(&self, target: &LocationId, item: TurtleItem);

    /// Run `action` for every connected peer but `sender`
    fn do_for_all_peers_except_sender(
        &self,
        sender: &LocationId,
        action: &mut dyn FnMut(&LocationId),
    ) {
        for peer in self.connected_peers().iter().filter(|peer| *peer != sender) {
            action(peer);
        }
    }

    /// Number of connected peers
    fn peer_count(&self) -> usize {
        self.connected_peers().len()
    }
}

/// Item queued for delivery to a peer
#[derive(Debug, Clone)]
pub struct OutgoingItem {
    /// Destination peer
    pub target: LocationId,
    /// The item to send
    pub item: TurtleItem,
}

/// `PeerConnections` backed by an unbounded channel
///
/// The transport owns the receiving half and drains it onto the real
/// connections; connect and disconnect events are mirrored here.
pub struct ChannelPeerConnections {
    /// Connected peers and when they connected
    peers: DashMap<LocationId, Instant>,
    /// Outbound queue
    outgoing_tx: mpsc::UnboundedSender<OutgoingItem>,
    /// Items accepted for sending
    items_sent: AtomicU64,
}

impl ChannelPeerConnections {
    /// Create the adapter and the receiver the transport should drain
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutgoingItem>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        (
            Self {
                peers: DashMap::new(),
                outgoing_tx,
                items_sent: AtomicU64::new(0),
            },
            outgoing_rx,
        )
    }

    /// Record a newly connected peer
    pub fn add_peer(&self, peer: LocationId) {
        self.peers.entry(peer).or_insert_with(Instant::now);
    }

    /// Forget a disconnected peer
    pub fn remove_peer(&self, peer: &LocationId) -> bool {
        self.peers.remove(peer).is_some()
    }

    /// Check if a peer is connected
    pub fn is_connected(&self, peer: &LocationId) -> bool {
        self.peers.contains_key(peer)
    }

    /// Total items accepted for sending
    pub fn items_sent(&self) -> u64 {
        self.items_sent.load(Ordering::Relaxed)
    }
}

impl PeerConnections for ChannelPeerConnections {
    fn connected_peers(&self) -> Vec<LocationId> {
        self.peers.iter().map(|entry| *entry.key()).collect()
    }

    fn write_item(&self, target: &LocationId, item: TurtleItem) {
        if !self.peers.contains_key(target) {
            debug!(peer = %target, "dropping item for disconnected peer");
            return;
        }

        let outgoing = OutgoingItem {
            target: *target,
            item,
        };

        match self.outgoing_tx.send(outgoing) {
            Ok(()) => {
                self.items_sent.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => debug!(peer = %target, error = %e, "outbound queue closed"),
        }
    }

    fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TunnelResultItem;

    fn item() -> TurtleItem {
        TurtleItem::TunnelResult(TunnelResultItem {
            request_id: 1,
            tunnel_id: 2,
        })
    }

    #[tokio::test]
    async fn test_write_item_is_queued() {
        let (peers, mut rx) = ChannelPeerConnections::new();
        let peer = LocationId::random();
        peers.add_peer(peer);

        peers.write_item(&peer, item());

        let outgoing = rx.recv().await.unwrap();
        assert_eq!(outgoing.target, peer);
        assert_eq!(outgoing.item, item());
        assert_eq!(peers.items_sent(), 1);
    }

    #[tokio::test]
    async fn test_write_to_unknown_peer_dropped() {
        let (peers, mut rx) = ChannelPeerConnections::new();

        peers.write_item(&LocationId::random(), item());

        assert!(rx.try_recv().is_err());
        assert_eq!(peers.items_sent(), 0);
    }

    #[test]
    fn test_all_peers_except_sender() {
        let (peers, _rx) = ChannelPeerConnections::new();
        let sender = LocationId::random();
        let other1 = LocationId::random();
        let other2 = LocationId::random();
        peers.add_peer(sender);
        peers.add_peer(other1);
        peers.add_peer(other2);

        let mut visited = Vec::new();
        peers.do_for_all_peers_except_sender(&sender, &mut |peer| visited.push(*peer));

        assert_eq!(visited.len(), 2);
        assert!(!visited.contains(&sender));
        assert!(visited.contains(&other1));
        assert!(visited.contains(&other2));
    }

    #[test]
    fn test_remove_peer() {
        let (peers, _rx) = ChannelPeerConnections::new();
        let peer = LocationId::random();
        peers.add_peer(peer);

        assert!(peers.is_connected(&peer));
        assert!(peers.remove_peer(&peer));
        assert!(!peers.is_connected(&peer));
        assert_eq!(peers.peer_count(), 0);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (peers, rx) = ChannelPeerConnections::new();
        let peer = LocationId::random();
        peers.add_peer(peer);
        drop(rx);

        peers.write_item(&peer, item());
        assert_eq!(peers.items_sent(), 0);
    }
}
