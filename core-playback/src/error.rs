//! # Playback Error Types
//!
//! Error taxonomy for the playback core. Load failures surface when a
//! foreground track cannot be fetched or decoded; playback failures surface
//! when the platform output rejects a resource. Prefetch failures never
//! leave the cache/prefetch layer.

use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// Track was not found by the track source.
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// Track source failed to read the underlying bytes.
    #[error("Failed to read audio source: {0}")]
    SourceIo(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Load Errors
    // ========================================================================
    /// Fetched bytes could not be decoded into a playable resource.
    #[error("Failed to decode audio resource: {0}")]
    DecodeFailed(String),

    /// A cached load settled in the failed state.
    #[error("Failed to load track {track_id}: {message}")]
    LoadFailed {
        /// The track whose load failed.
        track_id: String,
        /// The stored failure message.
        message: String,
    },

    // ========================================================================
    // Playback Control Errors
    // ========================================================================
    /// The platform output rejected the operation.
    #[error("Playback operation failed: {0}")]
    PlaybackFailed(String),

    /// Attempted operation when no track is loaded.
    #[error("No track loaded")]
    NoTrackLoaded,

    /// Navigation requested on an empty playlist.
    #[error("Playlist is empty")]
    EmptyPlaylist,

    /// Invalid volume value (must be in range [0.0, 1.0]).
    #[error("Invalid volume: {0} (must be between 0.0 and 1.0)")]
    InvalidVolume(f32),

    // ========================================================================
    // Cache Errors
    // ========================================================================
    /// Resource cache operation failed.
    #[error("Cache error: {0}")]
    CacheError(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error came from fetching or decoding a
    /// resource. Load errors return the transport to `Idle`.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::TrackNotFound(_)
                | PlaybackError::SourceIo(_)
                | PlaybackError::Io(_)
                | PlaybackError::DecodeFailed(_)
                | PlaybackError::LoadFailed { .. }
        )
    }

    /// Returns `true` if this error came from the platform output.
    /// Playback errors leave the transport in `Paused`.
    pub fn is_playback_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::PlaybackFailed(_) | PlaybackError::InvalidVolume(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
