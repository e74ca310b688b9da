//! Resource handle snapshots

use crate::traits::{AudioResource, TrackId};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle state of a cached resource, as seen through a handle snapshot.
#[derive(Debug, Clone)]
pub enum HandleState {
    /// The resource bytes are being fetched and decoded.
    Loading,
    /// The resource is decoded and playable.
    Ready {
        /// The opaque decoded resource; the cache remains its owner.
        payload: Arc<dyn AudioResource>,
        /// Duration reported by the decoded resource.
        duration: Duration,
    },
    /// The load settled with an error.
    Failed {
        /// The stored failure message.
        message: String,
    },
}

/// Snapshot of one cache entry.
///
/// A handle is a point-in-time view: the entry's state may advance after
/// the snapshot is taken (a `Loading` handle from `peek` does not update
/// when the load settles). [`crate::cache::ResourceCache::acquire`] only
/// returns settled handles.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    track_id: TrackId,
    state: HandleState,
}

impl ResourceHandle {
    pub(crate) fn new(track_id: TrackId, state: HandleState) -> Self {
        Self { track_id, state }
    }

    /// The owning track identifier.
    pub fn track_id(&self) -> &TrackId {
        &self.track_id
    }

    /// The snapshotted lifecycle state.
    pub fn state(&self) -> &HandleState {
        &self.state
    }

    /// Returns `true` if the resource is decoded and playable.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready { .. })
    }

    /// Returns `true` if the load settled with an error.
    pub fn is_failed(&self) -> bool {
        matches!(self.state, HandleState::Failed { .. })
    }

    /// Returns `true` if the load has not settled yet.
    pub fn is_loading(&self) -> bool {
        matches!(self.state, HandleState::Loading)
    }

    /// The decoded payload, if ready.
    pub fn payload(&self) -> Option<Arc<dyn AudioResource>> {
        match &self.state {
            HandleState::Ready { payload, .. } => Some(payload.clone()),
            _ => None,
        }
    }

    /// The resource duration, if ready.
    pub fn duration(&self) -> Option<Duration> {
        match &self.state {
            HandleState::Ready { duration, .. } => Some(*duration),
            _ => None,
        }
    }

    /// The failure message, if failed.
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            HandleState::Failed { message } => Some(message),
            _ => None,
        }
    }
}
