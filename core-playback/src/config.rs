//! # Player Configuration
//!
//! Startup configuration for the transport controller. The values mirror
//! what an external settings store would hand the player at launch; the
//! core reads them once and is otherwise indifferent to persistence.

use crate::transport::RepeatMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Volume applied at startup, in `[0.0, 1.0]` (default: 1.0).
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    /// Repeat mode applied at startup (default: off).
    #[serde(default)]
    pub repeat_mode: RepeatMode,

    /// Elapsed-time threshold below which `previous()` navigates to the
    /// prior track instead of restarting the current one (default: 5s).
    ///
    /// The asymmetry is user-visible product behavior: a quick double-tap
    /// goes back a track, a late press restarts.
    #[serde(default = "default_previous_restart_threshold")]
    pub previous_restart_threshold: Duration,

    /// Whether to warm playlist neighbors after a track becomes ready
    /// (default: true).
    #[serde(default = "default_prefetch_enabled")]
    pub prefetch_enabled: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            initial_volume: default_initial_volume(),
            repeat_mode: RepeatMode::default(),
            previous_restart_threshold: default_previous_restart_threshold(),
            prefetch_enabled: default_prefetch_enabled(),
        }
    }
}

impl PlayerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the startup volume.
    pub fn with_initial_volume(mut self, volume: f32) -> Self {
        self.initial_volume = volume;
        self
    }

    /// Set the startup repeat mode.
    pub fn with_repeat_mode(mut self, mode: RepeatMode) -> Self {
        self.repeat_mode = mode;
        self
    }

    /// Set the previous-vs-restart threshold.
    pub fn with_previous_restart_threshold(mut self, threshold: Duration) -> Self {
        self.previous_restart_threshold = threshold;
        self
    }

    /// Enable or disable neighbor prefetch.
    pub fn with_prefetch(mut self, enabled: bool) -> Self {
        self.prefetch_enabled = enabled;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err("initial_volume must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }
}

fn default_initial_volume() -> f32 {
    1.0
}

fn default_previous_restart_threshold() -> Duration {
    Duration::from_secs(5)
}

fn default_prefetch_enabled() -> bool {
    true
}
