//! # Neighbor Prefetcher
//!
//! Opportunistically warms the cache for the tracks adjacent to the current
//! selection, hiding load latency behind playback. Prefetch is best effort:
//! it dedups in-flight warms per track, never pins anything, and swallows
//! failures so foreground playback is never affected.

use crate::cache::ResourceCache;
use crate::traits::TrackId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Warms playlist neighbors of the selected track in background tasks.
pub struct Prefetcher {
    cache: Arc<ResourceCache>,
    /// Tracks with a warm request currently in flight.
    in_flight: Arc<Mutex<HashSet<TrackId>>>,
}

impl Prefetcher {
    /// Create a prefetcher over the shared cache.
    pub fn new(cache: Arc<ResourceCache>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Warm the immediate predecessor and successor of `current` in
    /// `playlist`.
    ///
    /// Neighbors are positional: no wraparound across the playlist
    /// boundary. A neighbor already resident or already being warmed is
    /// skipped, guaranteeing at most one in-flight warm per track at a
    /// time.
    pub fn on_selection_changed(&self, current: &TrackId, playlist: &[TrackId]) {
        let Some(index) = playlist.iter().position(|track| track == current) else {
            debug!(track = %current, "selected track not in playlist; skipping prefetch");
            return;
        };

        if index > 0 {
            self.spawn_warm(playlist[index - 1].clone());
        }
        if index + 1 < playlist.len() {
            self.spawn_warm(playlist[index + 1].clone());
        }
    }

    /// Number of warm requests currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Returns `true` if a warm request for `track_id` is in flight.
    pub fn is_warming(&self, track_id: &TrackId) -> bool {
        self.in_flight.lock().contains(track_id)
    }

    fn spawn_warm(&self, track_id: TrackId) {
        if self.cache.peek(&track_id).is_some() {
            return;
        }

        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(track_id.clone()) {
                return;
            }
        }

        let cache = self.cache.clone();
        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            debug!(track = %track_id, "prefetching neighbor");
            if let Err(e) = cache.warm(&track_id).await {
                // Best effort: prefetch failures never reach the foreground.
                debug!(track = %track_id, error = %e, "prefetch failed");
            }
            in_flight.lock().remove(&track_id);
        });
    }
}
