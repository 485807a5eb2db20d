//! Router configuration and its persistence
//!
//! Configuration is stored as human-readable JSON. Every field has a
//! default, so a file only needs the settings it changes.

use crate::error::{ConfigError, Result, StorageError};
use crate::routing::bloom::{DEFAULT_FILTER_BYTES, DEFAULT_FILTER_ITEMS};
use crate::routing::forwarding::{
    MAX_TUNNEL_DEPTH, MAX_TUNNEL_REQUEST_FORWARD_PER_SECOND, TUNNEL_REQUEST_PACKET_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Maximum number of search requests kept at once
pub const MAX_SEARCH_REQUEST_IN_CACHE: usize = 120;

/// Maximum number of tunnel requests kept at once
pub const MAX_TUNNEL_REQUEST_IN_CACHE: usize = 5000;

/// Maximum number of search hits passed back per request
pub const MAX_SEARCH_HITS: usize = 100;

/// How long search results are honored after the request was seen
pub const SEARCH_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// How long a tunnel request stays in the dedup cache
pub const TUNNEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Re-dig interval for monitored hashes without tunnels
pub const EMPTY_TUNNELS_DIGGING_TIME: Duration = Duration::from_secs(50);

/// Re-dig interval for monitored hashes in aggressive mode
pub const REGULAR_TUNNELS_DIGGING_TIME: Duration = Duration::from_secs(300);

/// Tunnels unused for this long are closed
pub const MAXIMUM_TUNNEL_IDLE_TIME: Duration = Duration::from_secs(60);

/// Turtle router configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurtleConfig {
    /// Depth past which requests stop being forwarded
    pub max_tunnel_depth: u16,

    /// Search request cache ceiling; new searches are refused once reached
    pub max_search_requests_in_cache: usize,

    /// Tunnel request cache ceiling
    pub max_tunnel_requests_in_cache: usize,

    /// Search hits passed back per request
    pub max_search_hits: usize,

    /// Seconds a search request accepts results
    pub search_request_timeout_secs: u64,

    /// Seconds a tunnel request stays cached
    pub tunnel_request_timeout_secs: u64,

    /// Tunnel request rate the throttle aims at
    pub max_tunnel_request_forward_per_second: f64,

    /// Assumed size of one tunnel request in bytes
    pub tunnel_request_packet_size: f64,

    /// Sample the bandwidth throttle before forwarding tunnel requests
    pub throttle_tunnel_requests: bool,

    /// Re-dig interval for hashes without tunnels, in seconds
    pub empty_tunnels_digging_secs: u64,

    /// Re-dig interval for aggressive hashes, in seconds
    pub regular_tunnels_digging_secs: u64,

    /// Idle time after which tunnels are closed, in seconds
    pub maximum_tunnel_idle_secs: u64,

    /// Weight of the newest sample in the traffic average, in (0, 1]
    pub traffic_smoothing_factor: f64,

    /// Bitmap size of the search result filter in bytes
    pub search_result_filter_bytes: usize,

    /// Item count the search result filter is sized for
    pub search_result_filter_items: usize,

    /// Seconds between search result filter resets
    pub filter_reset_interval_secs: u64,
}

impl Default for TurtleConfig {
    fn default() -> Self {
        Self {
            max_tunnel_depth: MAX_TUNNEL_DEPTH,
            max_search_requests_in_cache: MAX_SEARCH_REQUEST_IN_CACHE,
            max_tunnel_requests_in_cache: MAX_TUNNEL_REQUEST_IN_CACHE,
            max_search_hits: MAX_SEARCH_HITS,
            search_request_timeout_secs: SEARCH_REQUEST_TIMEOUT.as_secs(),
            tunnel_request_timeout_secs: TUNNEL_REQUEST_TIMEOUT.as_secs(),
            max_tunnel_request_forward_per_second: MAX_TUNNEL_REQUEST_FORWARD_PER_SECOND,
            tunnel_request_packet_size: TUNNEL_REQUEST_PACKET_SIZE,
            throttle_tunnel_requests: true,
            empty_tunnels_digging_secs: EMPTY_TUNNELS_DIGGING_TIME.as_secs(),
            regular_tunnels_digging_secs: REGULAR_TUNNELS_DIGGING_TIME.as_secs(),
            maximum_tunnel_idle_secs: MAXIMUM_TUNNEL_IDLE_TIME.as_secs(),
            traffic_smoothing_factor: 0.1,
            search_result_filter_bytes: DEFAULT_FILTER_BYTES,
            search_result_filter_items: DEFAULT_FILTER_ITEMS,
            filter_reset_interval_secs: 60,
        }
    }
}

impl TurtleConfig {
    /// Set the depth limit
    pub fn with_max_tunnel_depth(mut self, depth: u16) -> Self {
        self.max_tunnel_depth = depth;
        self
    }

    /// Set the search request cache ceiling
    pub fn with_max_search_requests(mut self, capacity: usize) -> Self {
        self.max_search_requests_in_cache = capacity;
        self
    }

    /// Set the tunnel request cache ceiling
    pub fn with_max_tunnel_requests(mut self, capacity: usize) -> Self {
        self.max_tunnel_requests_in_cache = capacity;
        self
    }

    /// Set the per-request search hit limit
    pub fn with_max_search_hits(mut self, hits: usize) -> Self {
        self.max_search_hits = hits;
        self
    }

    /// Enable or disable the tunnel request throttle
    pub fn with_throttle(mut self, enabled: bool) -> Self {
        self.throttle_tunnel_requests = enabled;
        self
    }

    /// Search request lifetime
    pub fn search_request_timeout(&self) -> Duration {
        Duration::from_secs(self.search_request_timeout_secs)
    }

    /// Tunnel request lifetime
    pub fn tunnel_request_timeout(&self) -> Duration {
        Duration::from_secs(self.tunnel_request_timeout_secs)
    }

    /// Re-dig interval for hashes without tunnels
    pub fn empty_tunnels_digging_time(&self) -> Duration {
        Duration::from_secs(self.empty_tunnels_digging_secs)
    }

    /// Re-dig interval for aggressive hashes
    pub fn regular_tunnels_digging_time(&self) -> Duration {
        Duration::from_secs(self.regular_tunnels_digging_secs)
    }

    /// Idle time after which tunnels are closed
    pub fn maximum_tunnel_idle_time(&self) -> Duration {
        Duration::from_secs(self.maximum_tunnel_idle_secs)
    }

    /// Interval between search result filter resets
    pub fn filter_reset_interval(&self) -> Duration {
        Duration::from_secs(self.filter_reset_interval_secs)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a count, interval or rate is zero, or if
    /// the smoothing factor is outside (0, 1].
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_tunnel_depth", u64::from(self.max_tunnel_depth)),
            (
                "max_search_requests_in_cache",
                self.max_search_requests_in_cache as u64,
            ),
            (
                "max_tunnel_requests_in_cache",
                self.max_tunnel_requests_in_cache as u64,
            ),
            ("max_search_hits", self.max_search_hits as u64),
            ("search_request_timeout_secs", self.search_request_timeout_secs),
            ("tunnel_request_timeout_secs", self.tunnel_request_timeout_secs),
            ("empty_tunnels_digging_secs", self.empty_tunnels_digging_secs),
            ("regular_tunnels_digging_secs", self.regular_tunnels_digging_secs),
            ("maximum_tunnel_idle_secs", self.maximum_tunnel_idle_secs),
            ("search_result_filter_bytes", self.search_result_filter_bytes as u64),
            ("search_result_filter_items", self.search_result_filter_items as u64),
            ("filter_reset_interval_secs", self.filter_reset_interval_secs),
        ];

        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::MustBePositive {
                field: field.to_string(),
            }
            .into());
        }

        for (field, value) in [
            (
                "max_tunnel_request_forward_per_second",
                self.max_tunnel_request_forward_per_second,
            ),
            ("tunnel_request_packet_size", self.tunnel_request_packet_size),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::MustBePositive {
                    field: field.to_string(),
                }
                .into());
            }
        }

        if !(self.traffic_smoothing_factor > 0.0 && self.traffic_smoothing_factor <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "traffic_smoothing_factor".to_string(),
                reason: "must be in (0, 1]".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Save configuration to a JSON file
pub fn save_config(path: &Path, config: &TurtleConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(StorageError::from)?;
    }

    let json =
        serde_json::to_string_pretty(config).map_err(|e| StorageError::SerializationFailed {
            reason: format!("Failed to serialize config: {}", e),
        })?;

    std::fs::write(path, json).map_err(StorageError::from)?;

    Ok(())
}

/// Load and validate configuration from a JSON file
///
/// # Errors
///
/// Returns an error if:
/// - The file doesn't exist
/// - The file contains invalid JSON
/// - The values fail validation
pub fn load_config(path: &Path) -> Result<TurtleConfig> {
    if !path.exists() {
        return Err(StorageError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    let json = std::fs::read_to_string(path).map_err(StorageError::from)?;

    let config: TurtleConfig =
        serde_json::from_str(&json).map_err(|e| StorageError::SerializationFailed {
            reason: format!("Failed to deserialize config: {}", e),
        })?;

    config.validate()?;

    Ok(config)
}

/// Check if a configuration file exists
pub fn config_exists(path: &Path) -> bool {
    path.exists() && path.is_file()
}

/// Get default configuration
pub fn default_config() -> TurtleConfig {
    TurtleConfig::default()
}
