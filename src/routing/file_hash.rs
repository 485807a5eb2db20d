//! Per-hash bookkeeping for monitored content

use crate::identity::Sha1Sum;
use crate::routing::client::TurtleRsClient;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A hash a client asked the router to keep tunnels open for
#[derive(Clone)]
pub struct FileHash {
    hash: Sha1Sum,
    tunnels: HashSet<u32>,
    /// Last tunnel request sent for this hash, if any
    last_request: Option<Instant>,
    /// Last time a tunnel of this hash carried data
    last_data: Option<Instant>,
    client: Arc<dyn TurtleRsClient>,
    aggressive_mode: bool,
}

impl FileHash {
    /// Start tracking a hash for `client`
    pub fn new(hash: Sha1Sum, client: Arc<dyn TurtleRsClient>, aggressive_mode: bool) -> Self {
        Self {
            hash,
            tunnels: HashSet::new(),
            last_request: None,
            last_data: None,
            client,
            aggressive_mode,
        }
    }

    /// The monitored hash
    pub fn hash(&self) -> Sha1Sum {
        self.hash
    }

    /// Client owning this hash
    pub fn client(&self) -> &Arc<dyn TurtleRsClient> {
        &self.client
    }

    /// Whether multiple tunnels are wanted
    pub fn is_aggressive(&self) -> bool {
        self.aggressive_mode
    }

    /// Tunnel ids currently serving this hash
    pub fn tunnels(&self) -> &HashSet<u32> {
        &self.tunnels
    }

    /// Register a tunnel; false if already known
    pub fn add_tunnel(&mut self, tunnel_id: u32) -> bool {
        self.tunnels.insert(tunnel_id)
    }

    /// Drop a tunnel; false if unknown
    pub fn remove_tunnel(&mut self, tunnel_id: u32) -> bool {
        self.tunnels.remove(&tunnel_id)
    }

    /// When tunnels were last requested
    pub fn last_request(&self) -> Option<Instant> {
        self.last_request
    }

    /// Record that tunnels were requested at `now`
    pub fn set_last_request(&mut self, now: Instant) {
        self.last_request = Some(now);
    }

    /// Record that data flowed at `now`
    pub fn set_last_data(&mut self, now: Instant) {
        self.last_data = Some(now);
    }

    /// Whether a new tunnel request is due.
    ///
    /// Hashes without tunnels are re-dug every `empty_interval`. Hashes that
    /// already have one are only re-dug in aggressive mode, every
    /// `regular_interval`.
    pub fn needs_digging(
        &self,
        now: Instant,
        empty_interval: Duration,
        regular_interval: Duration,
    ) -> bool {
        let since = |interval: Duration| match self.last_request {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        };

        if self.tunnels.is_empty() {
            since(empty_interval)
        } else {
            self.aggressive_mode && since(regular_interval)
        }
    }

    /// Read-only snapshot of the tunnel state
    pub fn info(&self) -> HashInfo {
        HashInfo {
            tunnels: self.tunnels.clone(),
            last_request: self.last_request,
            last_time: self.last_data,
        }
    }
}

impl fmt::Debug for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHash")
            .field("hash", &self.hash)
            .field("tunnels", &self.tunnels)
            .field("last_request", &self.last_request)
            .field("aggressive_mode", &self.aggressive_mode)
            .finish_non_exhaustive()
    }
}

/// Client-free view of a monitored hash, for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashInfo {
    /// Tunnel ids serving the hash
    pub tunnels: HashSet<u32>,
    /// Last tunnel request sent
    pub last_request: Option<Instant>,
    /// Last time data flowed
    pub last_time: Option<Instant>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SHA1_LENGTH;
    use crate::routing::client::NullClient;

    fn file_hash(aggressive: bool) -> FileHash {
        FileHash::new(
            Sha1Sum::from_bytes([5; SHA1_LENGTH]),
            Arc::new(NullClient),
            aggressive,
        )
    }

    #[test]
    fn test_tunnels() {
        let mut hash = file_hash(false);
        assert!(hash.add_tunnel(1));
        assert!(!hash.add_tunnel(1));
        assert!(hash.add_tunnel(2));
        assert_eq!(hash.tunnels().len(), 2);
        assert!(hash.remove_tunnel(1));
        assert!(!hash.remove_tunnel(1));
    }

    #[test]
    fn test_never_requested_needs_digging() {
        let hash = file_hash(false);
        assert!(hash.needs_digging(
            Instant::now(),
            Duration::from_secs(50),
            Duration::from_secs(300)
        ));
    }

    #[test]
    fn test_empty_hash_redug_after_interval() {
        let mut hash = file_hash(false);
        let now = Instant::now();
        hash.set_last_request(now);

        let empty = Duration::from_secs(50);
        let regular = Duration::from_secs(300);
        assert!(!hash.needs_digging(now + Duration::from_secs(49), empty, regular));
        assert!(hash.needs_digging(now + Duration::from_secs(50), empty, regular));
    }

    #[test]
    fn test_served_hash_only_redug_when_aggressive() {
        let now = Instant::now();
        let later = now + Duration::from_secs(400);
        let empty = Duration::from_secs(50);
        let regular = Duration::from_secs(300);

        let mut calm = file_hash(false);
        calm.add_tunnel(7);
        calm.set_last_request(now);
        assert!(!calm.needs_digging(later, empty, regular));

        let mut eager = file_hash(true);
        eager.add_tunnel(7);
        eager.set_last_request(now);
        assert!(!eager.needs_digging(now + Duration::from_secs(100), empty, regular));
        assert!(eager.needs_digging(later, empty, regular));
    }

    #[test]
    fn test_info_snapshot() {
        let mut hash = file_hash(false);
        let now = Instant::now();
        hash.add_tunnel(3);
        hash.set_last_request(now);
        hash.set_last_data(now);

        let info = hash.info();
        hash.add_tunnel(4);

        assert_eq!(info.tunnels.len(), 1);
        assert_eq!(info.last_request, Some(now));
        assert_eq!(info.last_time, Some(now));
    }
}
