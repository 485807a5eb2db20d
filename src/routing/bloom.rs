//! Bounded-memory "have I seen this" filter
//!
//! False positives are possible, false negatives are not. The filter is
//! cleared wholesale on each maintenance interval instead of growing.

use bloomfilter::Bloom;
use parking_lot::Mutex;

/// Default number of items the filter is sized for
pub const DEFAULT_FILTER_ITEMS: usize = 10_000;

/// Default bitmap size in bytes
pub const DEFAULT_FILTER_BYTES: usize = 16 * 1024;

/// Thread-safe fixed-size bloom filter
pub struct TurtleBloomFilter {
    bloom: Mutex<Bloom<[u8]>>,
    bitmap_bytes: usize,
    items: usize,
}

impl TurtleBloomFilter {
    /// Create a filter of `bitmap_bytes` bytes sized for `items` entries
    pub fn new(bitmap_bytes: usize, items: usize) -> Self {
        Self {
            bloom: Mutex::new(Bloom::new(bitmap_bytes, items)),
            bitmap_bytes,
            items,
        }
    }

    /// Check whether `key` may have been added
    pub fn contains(&self, key: &[u8]) -> bool {
        self.bloom.lock().check(key)
    }

    /// Add `key`
    pub fn insert(&self, key: &[u8]) {
        self.bloom.lock().set(key);
    }

    /// Add `key`, returning whether it may have been present already
    pub fn check_and_insert(&self, key: &[u8]) -> bool {
        self.bloom.lock().check_and_set(key)
    }

    /// Forget everything
    pub fn clear(&self) {
        *self.bloom.lock() = Bloom::new(self.bitmap_bytes, self.items);
    }
}

impl Default for TurtleBloomFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_BYTES, DEFAULT_FILTER_ITEMS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_false_negatives() {
        let filter = TurtleBloomFilter::default();
        for i in 0u32..1000 {
            filter.insert(&i.to_be_bytes());
        }
        for i in 0u32..1000 {
            assert!(filter.contains(&i.to_be_bytes()));
        }
    }

    #[test]
    fn test_check_and_insert() {
        let filter = TurtleBloomFilter::default();
        assert!(!filter.check_and_insert(b"result"));
        assert!(filter.check_and_insert(b"result"));
    }

    #[test]
    fn test_clear() {
        let filter = TurtleBloomFilter::default();
        filter.insert(b"seen");
        assert!(filter.contains(b"seen"));

        filter.clear();
        assert!(!filter.contains(b"seen"));
    }
}
