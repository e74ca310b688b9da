//! # Core Playback Traits
//!
//! This module defines the seams between the playback core and its external
//! collaborators. The core never touches the filesystem or an audio device
//! directly; it consumes these traits:
//!
//! - [`TrackSource`]: asynchronously produces raw audio bytes for a track
//!   identifier. Backed by the host's file manager in the desktop player.
//! - [`ResourceDecoder`]: turns raw bytes into an opaque, playable
//!   [`AudioResource`]. Backed by the platform audio API.
//! - [`AudioOutput`]: drives the platform output for one resource at a time
//!   (start, stop, seek, volume).
//!
//! ## Threading Model
//!
//! The cache calls `TrackSource`/`ResourceDecoder` concurrently from the
//! foreground selection path and background prefetch tasks, so all traits
//! are `Send + Sync`. Implementations must tolerate concurrent calls for
//! distinct track identifiers.
//!
//! ## Resource Ownership
//!
//! The cache is the single owner of every decoded [`AudioResource`]. The
//! transport only borrows `Arc` clones transiently while handing a resource
//! to the output; the underlying platform object is released exactly once,
//! when the last `Arc` drops after eviction or cache shutdown.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Track Identity
// ============================================================================

/// Stable, unique identifier for a track.
///
/// The identifier is assigned by the external track list (the folder
/// scanner in the desktop player) and is opaque to the core. It is the
/// identity key for caching and equality; ordering of tracks is defined by
/// position in the external playlist, not by the identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Wrap an externally assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Track Source
// ============================================================================

/// Produces raw audio bytes for a track identifier.
///
/// May fail (I/O error, missing file) or be slow (large file, cold disk).
/// The cache issues at most one outstanding fetch per registered track at a
/// time; implementations must be safe to call concurrently for distinct
/// identifiers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Fetch the raw (encoded) bytes for `track_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PlaybackError::TrackNotFound`] when the
    /// identifier does not resolve to a file, or
    /// [`crate::error::PlaybackError::SourceIo`] /
    /// [`crate::error::PlaybackError::Io`] when reading fails. A stalled
    /// read should fail with a timeout error rather than hang forever; the
    /// core has no hard cancellation.
    async fn fetch(&self, track_id: &TrackId) -> Result<Bytes>;
}

// ============================================================================
// Decoded Resource
// ============================================================================

/// An opaque, loaded audio resource owned by the cache.
///
/// The core never inspects the decoded audio; it only reads the duration
/// and pushes volume changes so that resumed or prefetched tracks play at a
/// consistent level. Releasing the underlying platform object happens when
/// the implementing type is dropped.
pub trait AudioResource: Send + Sync + fmt::Debug {
    /// Total duration of the decoded resource.
    fn duration(&self) -> Duration;

    /// Apply an output volume in `[0.0, 1.0]` to this resource.
    fn set_volume(&self, volume: f32);
}

/// Decodes fetched bytes into a playable [`AudioResource`].
///
/// Platform analog of `decodeAudioData`: the decode is asynchronous and may
/// reject unsupported or corrupted data.
#[async_trait]
pub trait ResourceDecoder: Send + Sync {
    /// Decode `data` into a playable resource.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PlaybackError::DecodeFailed`] when the bytes
    /// cannot be decoded.
    async fn decode(&self, track_id: &TrackId, data: Bytes) -> Result<Arc<dyn AudioResource>>;
}

// ============================================================================
// Audio Output
// ============================================================================

/// Platform audio output, driving one resource at a time.
///
/// Control methods are expected to be fast and non-blocking; the transport
/// calls them from its single logical control path. Starting a new resource
/// implicitly replaces whatever was audible before.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Begin (or resume) output of `resource` from `position`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PlaybackError::PlaybackFailed`] when the
    /// output rejects the resource (e.g., unsupported data, device
    /// unavailable). The transport reports the error and stays in `Paused`.
    async fn start(&self, resource: Arc<dyn AudioResource>, position: Duration) -> Result<()>;

    /// Halt output. Position bookkeeping is the transport's concern.
    async fn stop(&self) -> Result<()>;

    /// Reposition the active output without stopping it.
    async fn seek(&self, position: Duration) -> Result<()>;

    /// Apply an output volume in `[0.0, 1.0]`.
    async fn set_volume(&self, volume: f32) -> Result<()>;
}

// ============================================================================
// Tests
// ============================================================================
