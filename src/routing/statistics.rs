//! Bandwidth accounting for the turtle router
//!
//! All figures are bytes per second once rolled over.
//!
//! - [`TurtleStatistics`] is the live accumulator: packet handlers add to it
//!   while the maintenance tick reads and resets it, so every accessor locks.
//! - [`TrafficStatistics`] is the smoothed value the forwarding throttle
//!   reads. It is replaced as a whole, never patched field by field.
//!
//! `add` and `multiply` build new instances with every field transformed,
//! which keeps exponential averaging (`avg.multiply(1 - a).add(&sample.multiply(a))`)
//! free of torn reads.

use parking_lot::Mutex;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Counters {
    forward_total: f32,
    data_upload: f32,
    data_download: f32,
    tunnel_requests_upload: f32,
    tunnel_requests_download: f32,
    search_requests_upload: f32,
    search_requests_download: f32,
    total_upload: f32,
    total_download: f32,
}

impl Counters {
    fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            forward_total: f(self.forward_total),
            data_upload: f(self.data_upload),
            data_download: f(self.data_download),
            tunnel_requests_upload: f(self.tunnel_requests_upload),
            tunnel_requests_download: f(self.tunnel_requests_download),
            search_requests_upload: f(self.search_requests_upload),
            search_requests_download: f(self.search_requests_download),
            total_upload: f(self.total_upload),
            total_download: f(self.total_download),
        }
    }

    fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        Self {
            forward_total: f(self.forward_total, other.forward_total),
            data_upload: f(self.data_upload, other.data_upload),
            data_download: f(self.data_download, other.data_download),
            tunnel_requests_upload: f(self.tunnel_requests_upload, other.tunnel_requests_upload),
            tunnel_requests_download: f(
                self.tunnel_requests_download,
                other.tunnel_requests_download,
            ),
            search_requests_upload: f(self.search_requests_upload, other.search_requests_upload),
            search_requests_download: f(
                self.search_requests_download,
                other.search_requests_download,
            ),
            total_upload: f(self.total_upload, other.total_upload),
            total_download: f(self.total_download, other.total_download),
        }
    }
}

/// Thread-safe turtle traffic counters
///
/// Totals are counted on their own: adding data upload does not change
/// `total_upload`.
#[derive(Default)]
pub struct TurtleStatistics {
    counters: Mutex<Counters>,
}

impl TurtleStatistics {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    fn from_counters(counters: Counters) -> Self {
        Self {
            counters: Mutex::new(counters),
        }
    }

    fn counters(&self) -> Counters {
        *self.counters.lock()
    }

    /// Zero every counter
    pub fn reset(&self) {
        *self.counters.lock() = Counters::default();
    }

    /// Copy of the current values
    pub fn snapshot(&self) -> Self {
        Self::from_counters(self.counters())
    }

    /// Copy of the current values, resetting the live counters atomically
    pub fn take(&self) -> Self {
        let counters = std::mem::take(&mut *self.counters.lock());
        Self::from_counters(counters)
    }

    /// New instance with every counter multiplied by `number`
    pub fn multiply(&self, number: f32) -> Self {
        Self::from_counters(self.counters().map(|v| v * number))
    }

    /// New instance with `number` added to every counter
    pub fn add_scalar(&self, number: f32) -> Self {
        Self::from_counters(self.counters().map(|v| v + number))
    }

    /// New instance holding the field-wise sum with `other`
    pub fn add(&self, other: &TurtleStatistics) -> Self {
        let other = other.counters();
        Self::from_counters(self.counters().zip(other, |a, b| a + b))
    }

    /// Account tunnel requests received
    pub fn add_to_tunnel_requests_download(&self, size: usize) {
        self.counters.lock().tunnel_requests_download += size as f32;
    }

    /// Account tunnel requests sent
    pub fn add_to_tunnel_requests_upload(&self, size: usize) {
        self.counters.lock().tunnel_requests_upload += size as f32;
    }

    /// Account search requests received
    pub fn add_to_search_requests_download(&self, size: usize) {
        self.counters.lock().search_requests_download += size as f32;
    }

    /// Account search requests sent
    pub fn add_to_search_requests_upload(&self, size: usize) {
        self.counters.lock().search_requests_upload += size as f32;
    }

    /// Account relayed traffic
    pub fn add_to_forward_total(&self, size: usize) {
        self.counters.lock().forward_total += size as f32;
    }

    /// Account tunnel data received
    pub fn add_to_data_download(&self, size: usize) {
        self.counters.lock().data_download += size as f32;
    }

    /// Account tunnel data sent
    pub fn add_to_data_upload(&self, size: usize) {
        self.counters.lock().data_upload += size as f32;
    }

    /// Account any turtle item sent
    pub fn add_to_total_upload(&self, size: usize) {
        self.counters.lock().total_upload += size as f32;
    }

    /// Account any turtle item received
    pub fn add_to_total_download(&self, size: usize) {
        self.counters.lock().total_download += size as f32;
    }

    /// Relayed traffic
    pub fn forward_total(&self) -> f32 {
        self.counters.lock().forward_total
    }

    /// Tunnel data sent
    pub fn data_upload(&self) -> f32 {
        self.counters.lock().data_upload
    }

    /// Tunnel data received
    pub fn data_download(&self) -> f32 {
        self.counters.lock().data_download
    }

    /// Tunnel requests sent
    pub fn tunnel_requests_upload(&self) -> f32 {
        self.counters.lock().tunnel_requests_upload
    }

    /// Tunnel requests received
    pub fn tunnel_requests_download(&self) -> f32 {
        self.counters.lock().tunnel_requests_download
    }

    /// Search requests sent
    pub fn search_requests_upload(&self) -> f32 {
        self.counters.lock().search_requests_upload
    }

    /// Search requests received
    pub fn search_requests_download(&self) -> f32 {
        self.counters.lock().search_requests_download
    }

    /// Everything sent
    pub fn total_upload(&self) -> f32 {
        self.counters.lock().total_upload
    }

    /// Everything received
    pub fn total_download(&self) -> f32 {
        self.counters.lock().total_download
    }
}

impl Clone for TurtleStatistics {
    fn clone(&self) -> Self {
        self.snapshot()
    }
}

impl PartialEq for TurtleStatistics {
    fn eq(&self, other: &Self) -> bool {
        self.counters() == other.counters()
    }
}

impl fmt::Debug for TurtleStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.counters();
        f.debug_struct("TurtleStatistics")
            .field("forward_total", &c.forward_total)
            .field("data_upload", &c.data_upload)
            .field("data_download", &c.data_download)
            .field("tunnel_requests_upload", &c.tunnel_requests_upload)
            .field("tunnel_requests_download", &c.tunnel_requests_download)
            .field("search_requests_upload", &c.search_requests_upload)
            .field("search_requests_download", &c.search_requests_download)
            .field("total_upload", &c.total_upload)
            .field("total_download", &c.total_download)
            .finish()
    }
}

/// Smoothed traffic figures feeding the forwarding throttle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficStatistics {
    /// Relayed traffic
    pub unknown_total: f64,
    /// Tunnel data sent
    pub data_upload: f64,
    /// Tunnel data received
    pub data_download: f64,
    /// Tunnel requests sent
    pub tunnel_requests_upload: f64,
    /// Tunnel requests received
    pub tunnel_requests_download: f64,
    /// Everything sent
    pub total_upload: f64,
    /// Everything received
    pub total_download: f64,
    /// Tunnel request forwarding probability per depth, for display
    pub forward_probabilities: Vec<f64>,
}

impl TrafficStatistics {
    fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            unknown_total: f(self.unknown_total),
            data_upload: f(self.data_upload),
            data_download: f(self.data_download),
            tunnel_requests_upload: f(self.tunnel_requests_upload),
            tunnel_requests_download: f(self.tunnel_requests_download),
            total_upload: f(self.total_upload),
            total_download: f(self.total_download),
            forward_probabilities: self.forward_probabilities.clone(),
        }
    }

    /// New instance with every counter multiplied by `number`
    pub fn multiply(&self, number: f64) -> Self {
        self.map(|v| v * number)
    }

    /// New instance with `number` added to every counter
    pub fn add_scalar(&self, number: f64) -> Self {
        self.map(|v| v + number)
    }

    /// New instance holding the field-wise sum with `other`
    pub fn add(&self, other: &TrafficStatistics) -> Self {
        Self {
            unknown_total: self.unknown_total + other.unknown_total,
            data_upload: self.data_upload + other.data_upload,
            data_download: self.data_download + other.data_download,
            tunnel_requests_upload: self.tunnel_requests_upload + other.tunnel_requests_upload,
            tunnel_requests_download: self.tunnel_requests_download
                + other.tunnel_requests_download,
            total_upload: self.total_upload + other.total_upload,
            total_download: self.total_download + other.total_download,
            forward_probabilities: self.forward_probabilities.clone(),
        }
    }

    /// Same figures with new per-depth forwarding probabilities
    pub fn with_forward_probabilities(mut self, probabilities: Vec<f64>) -> Self {
        self.forward_probabilities = probabilities;
        self
    }
}

impl From<&TurtleStatistics> for TrafficStatistics {
    fn from(stats: &TurtleStatistics) -> Self {
        let c = stats.counters();
        Self {
            unknown_total: f64::from(c.forward_total),
            data_upload: f64::from(c.data_upload),
            data_download: f64::from(c.data_download),
            tunnel_requests_upload: f64::from(c.tunnel_requests_upload),
            tunnel_requests_download: f64::from(c.tunnel_requests_download),
            total_upload: f64::from(c.total_upload),
            total_download: f64::from(c.total_download),
            forward_probabilities: Vec::new(),
        }
    }
}
