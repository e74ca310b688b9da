//! Cache configuration

use serde::{Deserialize, Serialize};

/// Configuration for the playback resource cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident resources (default: 5).
    ///
    /// The bound may be temporarily exceeded when every resident entry is
    /// pinned; pinned entries are never starved to satisfy the bound.
    #[serde(default = "default_max_resident")]
    pub max_resident: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_resident: default_max_resident(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum resident count.
    pub fn with_max_resident(mut self, count: usize) -> Self {
        self.max_resident = count;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_resident == 0 {
            return Err("max_resident must be at least 1".to_string());
        }

        Ok(())
    }
}

fn default_max_resident() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_resident, 5);
    }

    #[test]
    fn test_config_validation() {
        let invalid = CacheConfig::default().with_max_resident(0);
        assert!(invalid.validate().is_err());

        let valid = CacheConfig::new().with_max_resident(2);
        assert!(valid.validate().is_ok());
    }
}
