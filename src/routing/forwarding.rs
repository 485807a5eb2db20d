//! Forwarding policy for flooded requests
//!
//! Depth bounds how far a request travels. Two tweaks keep observers from
//! learning a node's distance to the origin from the depth alone:
//!
//! - at the depth limit, about one id in eight is still forwarded
//! - at depth 1, about one id in eight is forwarded without growing depth
//!
//! Both decisions come from `(bias ^ id) & 0x7` with a bias drawn once per
//! process, so the same node always answers the same way for the same id.
//!
//! Tunnel requests are additionally throttled by the bandwidth they use,
//! see [`TunnelProbability::forwarding_probability`].

use crate::protocol::{SearchRequestItem, TunnelRequestItem};

/// Depth past which requests stop being forwarded
pub const MAX_TUNNEL_DEPTH: u16 = 6;

/// Tunnel request rate the throttle aims at
pub const MAX_TUNNEL_REQUEST_FORWARD_PER_SECOND: f64 = 20.0;

/// Assumed size of one tunnel request on the wire
pub const TUNNEL_REQUEST_PACKET_SIZE: f64 = 50.0;

/// Exponent flattening the throttle curve until close to the ceiling
pub const DISTANCE_SQUEEZING_POWER: i32 = 8;

/// Base forwarding probability by depth; shallow requests are favoured
pub const DEPTH_PEER_PROBABILITY: [f64; 7] = [1.0, 0.99, 0.9, 0.7, 0.6, 0.5, 0.4];

const BYPASS_SLOT: u32 = 2;
const DEPTH_SKIP_SLOT: u32 = 6;

/// Per-process forwarding decisions
#[derive(Debug, Clone)]
pub struct TunnelProbability {
    bias: u32,
    max_depth: u16,
    /// Tunnel request upload ceiling in bytes per second
    ceiling: f64,
}

impl TunnelProbability {
    /// Create a policy with a fresh random bias
    pub fn new() -> Self {
        Self::with_bias(rand::random())
    }

    /// Create a policy with a known bias
    pub fn with_bias(bias: u32) -> Self {
        Self {
            bias,
            max_depth: MAX_TUNNEL_DEPTH,
            ceiling: TUNNEL_REQUEST_PACKET_SIZE * MAX_TUNNEL_REQUEST_FORWARD_PER_SECOND,
        }
    }

    /// Override the depth limit and the throttle ceiling
    pub fn with_limits(mut self, max_depth: u16, packet_size: f64, max_per_second: f64) -> Self {
        self.max_depth = max_depth;
        self.ceiling = packet_size * max_per_second;
        self
    }

    /// The bias fixed at construction
    pub fn bias(&self) -> u32 {
        self.bias
    }

    fn slot(&self, id: u32) -> u32 {
        (self.bias ^ id) & 0x7
    }

    /// Whether a request with this id and depth may be forwarded
    pub fn is_forwardable(&self, id: u32, depth: u16) -> bool {
        let random_bypass = depth >= self.max_depth && self.slot(id) == BYPASS_SLOT;

        depth < self.max_depth || random_bypass
    }

    /// Depth to put on a forwarded copy
    pub fn increment_depth(&self, id: u32, depth: u16) -> u16 {
        let random_depth_skip = depth == 1 && self.slot(id) == DEPTH_SKIP_SLOT;

        if random_depth_skip {
            depth
        } else {
            depth.saturating_add(1)
        }
    }

    /// Whether a tunnel request may be forwarded (keyed on its partial tunnel id)
    pub fn is_tunnel_request_forwardable(&self, item: &TunnelRequestItem) -> bool {
        self.is_forwardable(item.partial_tunnel_id, item.depth)
    }

    /// Whether a search request may be forwarded (keyed on its request id)
    pub fn is_search_request_forwardable(&self, item: &SearchRequestItem) -> bool {
        self.is_forwardable(item.request_id, item.depth)
    }

    /// Copy of a tunnel request ready to forward
    pub fn next_tunnel_request(&self, item: &TunnelRequestItem) -> TunnelRequestItem {
        item.with_depth(self.increment_depth(item.partial_tunnel_id, item.depth))
    }

    /// Copy of a search request ready to forward
    pub fn next_search_request(&self, item: &SearchRequestItem) -> SearchRequestItem {
        item.with_depth(self.increment_depth(item.request_id, item.depth))
    }

    /// Probability of forwarding a tunnel request to each peer.
    ///
    /// Stays near the depth's base probability until the smoothed tunnel
    /// request upload nears the ceiling, then collapses. The result never
    /// drops below `1 / number_of_peers` unless the download side is over
    /// the ceiling as well, in which case it is scaled down further.
    pub fn forwarding_probability(
        &self,
        item: &TunnelRequestItem,
        tunnel_request_upload: f64,
        tunnel_request_download: f64,
        number_of_peers: usize,
    ) -> f64 {
        self.forwarding_probability_at_depth(
            item.depth,
            tunnel_request_upload,
            tunnel_request_download,
            number_of_peers,
        )
    }

    /// [`forwarding_probability`](Self::forwarding_probability) for a bare depth
    pub fn forwarding_probability_at_depth(
        &self,
        depth: u16,
        tunnel_request_upload: f64,
        tunnel_request_download: f64,
        number_of_peers: usize,
    ) -> f64 {
        let distance_to_maximum = (tunnel_request_upload.max(0.0) / self.ceiling).min(100.0);
        let corrected_distance = distance_to_maximum.powi(DISTANCE_SQUEEZING_POWER);

        let index = usize::from(depth).min(DEPTH_PEER_PROBABILITY.len() - 1);
        let mut probability = DEPTH_PEER_PROBABILITY[index].powf(corrected_distance);

        if number_of_peers > 0 && probability * (number_of_peers as f64) < 1.0 {
            probability = 1.0 / number_of_peers as f64;

            let download_distance = tunnel_request_download.max(0.0) / self.ceiling;
            if download_distance > 1.0 {
                probability /= download_distance;
            }
        }

        if probability.is_nan() {
            return 0.0;
        }
        probability.clamp(0.0, 1.0)
    }

    /// Forwarding probability for every depth up to the limit, for reporting
    pub fn probability_table(
        &self,
        tunnel_request_upload: f64,
        tunnel_request_download: f64,
        number_of_peers: usize,
    ) -> Vec<f64> {
        (0..=MAX_TUNNEL_DEPTH)
            .map(|depth| {
                self.forwarding_probability_at_depth(
                    depth,
                    tunnel_request_upload,
                    tunnel_request_download,
                    number_of_peers,
                )
            })
            .collect()
    }
}

impl Default for TunnelProbability {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Sha1Sum, SHA1_LENGTH};

    fn tunnel_request(depth: u16) -> TunnelRequestItem {
        TunnelRequestItem {
            request_id: 1,
            partial_tunnel_id: 2,
            depth,
            file_hash: Sha1Sum::from_bytes([0; SHA1_LENGTH]),
        }
    }

    #[test]
    fn test_shallow_always_forwardable() {
        for bias in [0u32, 1, 0xdead_beef, u32::MAX] {
            let policy = TunnelProbability::with_bias(bias);
            for id in 0u32..64 {
                for depth in 0..MAX_TUNNEL_DEPTH {
                    assert!(policy.is_forwardable(id, depth));
                }
            }
        }
    }

    #[test]
    fn test_bypass_at_limit_is_one_eighth() {
        let policy = TunnelProbability::with_bias(0x1234_5678);
        let passing = (0u32..8000)
            .filter(|id| policy.is_forwardable(*id, MAX_TUNNEL_DEPTH))
            .count();
        assert_eq!(passing, 1000);
    }

    #[test]
    fn test_bypass_exact_ids() {
        let policy = TunnelProbability::with_bias(0);
        assert!(policy.is_forwardable(2, MAX_TUNNEL_DEPTH));
        assert!(policy.is_forwardable(10, MAX_TUNNEL_DEPTH));
        assert!(!policy.is_forwardable(3, MAX_TUNNEL_DEPTH));
        assert!(!policy.is_forwardable(6, MAX_TUNNEL_DEPTH));
    }

    #[test]
    fn test_increment_depth() {
        let policy = TunnelProbability::with_bias(0);

        for depth in [0u16, 2, 3, 5, 6] {
            for id in 0u32..16 {
                assert_eq!(policy.increment_depth(id, depth), depth + 1);
            }
        }

        // depth 1 is held for ids landing in slot 6
        assert_eq!(policy.increment_depth(6, 1), 1);
        assert_eq!(policy.increment_depth(14, 1), 1);
        assert_eq!(policy.increment_depth(5, 1), 2);
    }

    #[test]
    fn test_increment_depth_never_decreases() {
        let policy = TunnelProbability::with_bias(0xffff_0000);
        for id in 0u32..256 {
            for depth in 0u16..10 {
                assert!(policy.increment_depth(id, depth) >= depth);
            }
        }
        assert_eq!(policy.increment_depth(0, u16::MAX), u16::MAX);
    }

    #[test]
    fn test_next_requests_use_their_own_ids() {
        let policy = TunnelProbability::with_bias(0);

        let tunnel = TunnelRequestItem {
            request_id: 6,
            partial_tunnel_id: 5,
            depth: 1,
            file_hash: Sha1Sum::from_bytes([0; SHA1_LENGTH]),
        };
        // keyed on partial tunnel id 5, so depth grows
        assert_eq!(policy.next_tunnel_request(&tunnel).depth, 2);

        let search = SearchRequestItem {
            request_id: 6,
            depth: 1,
            keywords: "abc".to_string(),
        };
        // keyed on request id 6, so depth is held
        assert_eq!(policy.next_search_request(&search).depth, 1);
    }

    #[test]
    fn test_probability_idle_is_base() {
        let policy = TunnelProbability::with_bias(0);
        for depth in 0..=MAX_TUNNEL_DEPTH {
            let p = policy.forwarding_probability(&tunnel_request(depth), 0.0, 0.0, 5);
            assert_eq!(p, 1.0);
        }
    }

    #[test]
    fn test_probability_collapses_over_ceiling() {
        let policy = TunnelProbability::with_bias(0);
        let ceiling = TUNNEL_REQUEST_PACKET_SIZE * MAX_TUNNEL_REQUEST_FORWARD_PER_SECOND;

        let near = policy.forwarding_probability(&tunnel_request(3), ceiling * 0.5, 0.0, 100);
        let over = policy.forwarding_probability(&tunnel_request(3), ceiling * 1.5, 0.0, 100);

        assert!(near > 0.99);
        assert!(over < near);
    }

    #[test]
    fn test_probability_fairness_floor() {
        let policy = TunnelProbability::with_bias(0);
        let ceiling = TUNNEL_REQUEST_PACKET_SIZE * MAX_TUNNEL_REQUEST_FORWARD_PER_SECOND;

        let p = policy.forwarding_probability(&tunnel_request(6), ceiling * 10.0, 0.0, 4);
        assert_eq!(p, 0.25);

        let flooded = policy.forwarding_probability(&tunnel_request(6), ceiling * 10.0, ceiling * 2.0, 4);
        assert_eq!(flooded, 0.125);
    }

    #[test]
    fn test_probability_in_range() {
        let policy = TunnelProbability::with_bias(0);
        let loads = [0.0, 1.0, 500.0, 1000.0, 1e6, 1e300, f64::INFINITY];
        for depth in [0u16, 3, 6, 100] {
            for up in loads {
                for down in loads {
                    for peers in [0usize, 1, 2, 50] {
                        let p = policy.forwarding_probability(&tunnel_request(depth), up, down, peers);
                        assert!((0.0..=1.0).contains(&p), "p={} depth={} up={} down={} peers={}", p, depth, up, down, peers);
                    }
                }
            }
        }
    }

    #[test]
    fn test_probability_table() {
        let policy = TunnelProbability::with_bias(0);
        let table = policy.probability_table(0.0, 0.0, 3);
        assert_eq!(table.len(), usize::from(MAX_TUNNEL_DEPTH) + 1);
        assert!(table.iter().all(|p| *p == 1.0));
    }

    #[test]
    fn test_custom_limits() {
        let policy = TunnelProbability::with_bias(0).with_limits(3, 50.0, 20.0);
        assert!(policy.is_forwardable(1, 2));
        assert!(!policy.is_forwardable(1, 3));
    }
}
