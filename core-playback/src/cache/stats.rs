//! Cache statistics and monitoring

use serde::{Deserialize, Serialize};

/// Statistics about the resource cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of resident entries (any state).
    pub resident: usize,

    /// Number of resident entries with at least one pin.
    pub pinned: usize,

    /// Number of resident entries still loading.
    pub loading: usize,

    /// Lookups that found an existing entry.
    pub hits: u64,

    /// Lookups that admitted a new entry.
    pub misses: u64,

    /// Entries evicted under admission pressure.
    pub evictions: u64,

    /// In-flight loads whose result was discarded after eviction.
    pub absorbed_loads: u64,
}

impl CacheStats {
    /// Cache usage as a percentage of the configured bound.
    pub fn usage_percentage(&self, max_resident: usize) -> f64 {
        if max_resident == 0 {
            return 0.0;
        }

        (self.resident as f64 / max_resident as f64) * 100.0
    }

    /// Returns `true` if the bound is currently exceeded (possible only
    /// while every resident entry is pinned).
    pub fn is_over_bound(&self, max_resident: usize) -> bool {
        self.resident > max_resident
    }

    /// Hit rate percentage across all lookups.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 100.0;
        }

        (self.hits as f64 / lookups as f64) * 100.0
    }
}
