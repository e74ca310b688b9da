//! # Playback Resource Cache
//!
//! Bounded mapping from track identifier to a loaded audio resource.
//!
//! ## Overview
//!
//! The cache loads resources on demand through the injected
//! [`TrackSource`] (raw bytes) and [`ResourceDecoder`] (opaque playable
//! payload), bounds memory with least-recently-used eviction, and
//! guarantees that a resource pinned by the transport is never evicted.
//!
//! Key behaviors:
//! - At most one handle, and at most one in-flight load, per registered
//!   track identifier: concurrent `acquire`s share a single load.
//! - Eviction runs on admission pressure only, never on `release`, so a
//!   resource freed by navigation stays warm for a likely "previous".
//! - When every resident entry is pinned the bound is temporarily exceeded
//!   rather than starving a pinned entry.
//! - An unpinned entry evicted while its load is still in flight is
//!   absorbed: the eventual result is discarded and the resource dropped,
//!   never published (evict-then-absorb, not cancel-the-request).
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │     ResourceCache                      │
//! │  - acquire() / release()  (pinning)    │
//! │  - warm()                 (prefetch)   │
//! │  - peek() / set_volume() / clear()     │
//! └────────┬───────────────────────────────┘
//!          │
//!          ├──> TrackSource     (raw bytes)
//!          ├──> ResourceDecoder (opaque payload)
//!          └──> EventBus        (optional observability)
//! ```

pub mod config;
pub mod handle;
pub mod stats;

pub use config::CacheConfig;
pub use handle::{HandleState, ResourceHandle};
pub use stats::CacheStats;

use crate::error::{PlaybackError, Result};
use crate::traits::{AudioResource, ResourceDecoder, TrackId, TrackSource};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

// ============================================================================
// Internal Entry Model
// ============================================================================

enum EntryState {
    Loading,
    Ready {
        payload: Arc<dyn AudioResource>,
        duration: Duration,
    },
    Failed {
        message: String,
    },
}

struct Entry {
    state: EntryState,
    ref_count: usize,
    /// Logical access tick; sole input to LRU ordering.
    last_accessed: u64,
    /// Insertion tick; tie-break for eviction.
    inserted_at: u64,
    /// Guards against a superseded load publishing into a re-admitted entry.
    generation: u64,
    /// Fires once when the load settles; waiters subscribe under the lock.
    settled: watch::Sender<bool>,
}

impl Entry {
    fn snapshot(&self, track_id: &TrackId) -> ResourceHandle {
        let state = match &self.state {
            EntryState::Loading => HandleState::Loading,
            EntryState::Ready { payload, duration } => HandleState::Ready {
                payload: payload.clone(),
                duration: *duration,
            },
            EntryState::Failed { message } => HandleState::Failed {
                message: message.clone(),
            },
        };
        ResourceHandle::new(track_id.clone(), state)
    }
}

struct CacheInner {
    entries: HashMap<TrackId, Entry>,
    /// Monotonic logical clock, bumped on every registering lookup.
    tick: u64,
    next_generation: u64,
    /// Cache-wide volume, applied to every payload at publish time.
    volume: f32,
    hits: u64,
    misses: u64,
    evictions: u64,
    absorbed_loads: u64,
}

impl CacheInner {
    /// Evict the least-recently-used unpinned entry, if any.
    fn evict_lru_unpinned(&mut self) -> Option<TrackId> {
        let victim = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.ref_count == 0)
            .min_by_key(|(_, entry)| (entry.last_accessed, entry.inserted_at))
            .map(|(id, _)| id.clone())?;

        // Dropping the entry drops any payload; an in-flight load is left
        // to settle and absorb its own result (generation mismatch).
        self.entries.remove(&victim);
        self.evictions += 1;
        Some(victim)
    }
}

/// Outcome of registering interest in a track.
enum Registration {
    /// The entry is settled; here is its snapshot.
    Settled(ResourceHandle),
    /// Another caller is loading this track; wait for the settle signal.
    Wait(watch::Receiver<bool>),
    /// This caller admitted the entry and must drive the load.
    Load(u64),
}

// ============================================================================
// ResourceCache
// ============================================================================

/// Bounded, pin-aware resource cache for playback.
///
/// Safe to call concurrently from the foreground selection path and
/// background prefetch tasks. All synchronous methods take a short internal
/// lock; `acquire` and `warm` suspend only while the underlying load is in
/// flight.
pub struct ResourceCache {
    inner: Mutex<CacheInner>,
    source: Arc<dyn TrackSource>,
    decoder: Arc<dyn ResourceDecoder>,
    config: CacheConfig,
    event_bus: Option<EventBus>,
}

impl ResourceCache {
    /// Create a new cache over the given source and decoder.
    pub fn new(
        source: Arc<dyn TrackSource>,
        decoder: Arc<dyn ResourceDecoder>,
        config: CacheConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
                next_generation: 0,
                volume: 1.0,
                hits: 0,
                misses: 0,
                evictions: 0,
                absorbed_loads: 0,
            }),
            source,
            decoder,
            config,
            event_bus: None,
        }
    }

    /// Attach an event bus for cache observability events.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Acquire a pinned handle for `track_id`, loading on miss.
    ///
    /// On a hit the existing entry's pin count is incremented and its LRU
    /// position refreshed. On a miss a `Loading` entry is admitted (evicting
    /// the least-recently-used unpinned entry first when at capacity) and
    /// the load runs in the caller's task. The call suspends until the
    /// entry settles and always returns a `Ready` or `Failed` handle.
    ///
    /// Every successful `acquire` must be balanced by one
    /// [`ResourceCache::release`], including when the returned handle is
    /// `Failed`.
    pub async fn acquire(&self, track_id: &TrackId) -> ResourceHandle {
        match self.register(track_id, true) {
            Registration::Settled(handle) => handle,
            Registration::Wait(rx) => self
                .wait_settled(track_id, rx)
                .await
                .unwrap_or_else(|| Self::evicted_handle(track_id)),
            Registration::Load(generation) => self
                .drive_load(track_id, generation)
                .await
                .unwrap_or_else(|| Self::evicted_handle(track_id)),
        }
    }

    /// Drop one pin for `track_id`.
    ///
    /// Never evicts: eviction is driven by admission pressure so that a
    /// just-released resource remains available for reuse.
    pub fn release(&self, track_id: &TrackId) {
        let mut guard = self.inner.lock();
        match guard.entries.get_mut(track_id) {
            Some(entry) if entry.ref_count > 0 => entry.ref_count -= 1,
            Some(_) => warn!(track = %track_id, "release on unpinned cache entry"),
            None => warn!(track = %track_id, "release on unknown cache entry"),
        }
    }

    /// Populate the cache for `track_id` without pinning.
    ///
    /// Equivalent to an `acquire` followed immediately by a `release`: the
    /// entry is unpinned while loading (and therefore eviction-eligible
    /// immediately), its LRU position is refreshed on a hit, and the call
    /// resolves when the load settles.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::LoadFailed`] when the load settles in the
    /// failed state. Callers on the prefetch path swallow this.
    pub async fn warm(&self, track_id: &TrackId) -> Result<()> {
        let handle = match self.register(track_id, false) {
            Registration::Settled(handle) => Some(handle),
            Registration::Wait(rx) => self.wait_settled(track_id, rx).await,
            Registration::Load(generation) => self.drive_load(track_id, generation).await,
        };

        match handle {
            Some(handle) if handle.is_failed() => Err(PlaybackError::LoadFailed {
                track_id: track_id.to_string(),
                message: handle.failure().unwrap_or("load failed").to_string(),
            }),
            // Evicted mid-load (None) counts as done: warm is best effort.
            _ => Ok(()),
        }
    }

    /// Non-mutating lookup: no pin, no LRU refresh.
    pub fn peek(&self, track_id: &TrackId) -> Option<ResourceHandle> {
        let guard = self.inner.lock();
        guard
            .entries
            .get(track_id)
            .map(|entry| entry.snapshot(track_id))
    }

    /// Apply `volume` to every resident resource and to loads that settle
    /// from now on.
    ///
    /// Runs under the cache lock, so an entry admitted mid-broadcast still
    /// ends up with the latest volume: publish reads the stored value under
    /// the same lock.
    pub fn set_volume(&self, volume: f32) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.volume = volume;
        for entry in inner.entries.values() {
            if let EntryState::Ready { payload, .. } = &entry.state {
                payload.set_volume(volume);
            }
        }
    }

    /// Drop every entry, releasing all resident resources. Shutdown path.
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        let pinned = guard
            .entries
            .values()
            .filter(|entry| entry.ref_count > 0)
            .count();
        if pinned > 0 {
            warn!(pinned, "clearing cache with pinned entries");
        }
        guard.entries.clear();
    }

    /// Current pin count for `track_id` (zero when not resident).
    pub fn pin_count(&self, track_id: &TrackId) -> usize {
        let guard = self.inner.lock();
        guard
            .entries
            .get(track_id)
            .map(|entry| entry.ref_count)
            .unwrap_or(0)
    }

    /// Number of resident entries.
    pub fn resident_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Snapshot of cache counters.
    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.lock();
        CacheStats {
            resident: guard.entries.len(),
            pinned: guard
                .entries
                .values()
                .filter(|entry| entry.ref_count > 0)
                .count(),
            loading: guard
                .entries
                .values()
                .filter(|entry| matches!(entry.state, EntryState::Loading))
                .count(),
            hits: guard.hits,
            misses: guard.misses,
            evictions: guard.evictions,
            absorbed_loads: guard.absorbed_loads,
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Register interest in `track_id` under one lock scope.
    ///
    /// A hit bumps the LRU position (and the pin when `pin` is set). A miss
    /// admits a `Loading` entry, evicting first under admission pressure.
    fn register(&self, track_id: &TrackId, pin: bool) -> Registration {
        let (registration, evicted) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            inner.tick += 1;
            let tick = inner.tick;

            if let Some(entry) = inner.entries.get_mut(track_id) {
                if pin {
                    entry.ref_count += 1;
                }
                entry.last_accessed = tick;
                inner.hits += 1;
                let registration = match entry.state {
                    EntryState::Loading => Registration::Wait(entry.settled.subscribe()),
                    _ => Registration::Settled(entry.snapshot(track_id)),
                };
                (registration, Vec::new())
            } else {
                inner.misses += 1;

                // Evict down to the bound; stop when only pinned entries
                // remain (they are never starved to satisfy the bound).
                let mut evicted = Vec::new();
                while inner.entries.len() >= self.config.max_resident {
                    match inner.evict_lru_unpinned() {
                        Some(id) => evicted.push(id),
                        None => {
                            debug!(
                                track = %track_id,
                                resident = inner.entries.len(),
                                "all resident entries pinned; admitting over bound"
                            );
                            break;
                        }
                    }
                }

                inner.next_generation += 1;
                let generation = inner.next_generation;
                let (settled, _) = watch::channel(false);
                inner.entries.insert(
                    track_id.clone(),
                    Entry {
                        state: EntryState::Loading,
                        ref_count: usize::from(pin),
                        last_accessed: tick,
                        inserted_at: tick,
                        generation,
                        settled,
                    },
                );
                (Registration::Load(generation), evicted)
            }
        };

        for evicted_id in evicted {
            debug!(track = %evicted_id, "evicted least-recently-used entry");
            self.emit(CacheEvent::Evicted {
                track_id: evicted_id.to_string(),
            });
        }

        registration
    }

    /// Wait until the entry settles, then snapshot it.
    ///
    /// Returns `None` when the entry was evicted before settling (possible
    /// only for unpinned waiters).
    async fn wait_settled(
        &self,
        track_id: &TrackId,
        mut rx: watch::Receiver<bool>,
    ) -> Option<ResourceHandle> {
        loop {
            if rx.changed().await.is_err() {
                // Sender dropped: the entry was evicted mid-load.
                return None;
            }

            let guard = self.inner.lock();
            match guard.entries.get(track_id) {
                Some(entry) if !matches!(entry.state, EntryState::Loading) => {
                    return Some(entry.snapshot(track_id));
                }
                Some(_) => continue,
                None => return None,
            }
        }
    }

    /// Fetch and decode `track_id`, then publish the result.
    ///
    /// Returns `None` when the entry was evicted while the load was in
    /// flight: the result is discarded and the resource dropped.
    async fn drive_load(&self, track_id: &TrackId, generation: u64) -> Option<ResourceHandle> {
        debug!(track = %track_id, "loading resource");

        let loaded = match self.source.fetch(track_id).await {
            Ok(bytes) => self.decoder.decode(track_id, bytes).await,
            Err(e) => Err(e),
        };

        let snapshot = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match inner.entries.get_mut(track_id) {
                Some(entry) if entry.generation == generation => {
                    match loaded {
                        Ok(payload) => {
                            // Publish with the latest cache-wide volume.
                            payload.set_volume(inner.volume);
                            let duration = payload.duration();
                            entry.state = EntryState::Ready { payload, duration };
                        }
                        Err(e) => {
                            warn!(track = %track_id, error = %e, "resource load failed");
                            entry.state = EntryState::Failed {
                                message: e.to_string(),
                            };
                        }
                    }
                    let _ = entry.settled.send(true);
                    Some(entry.snapshot(track_id))
                }
                _ => {
                    inner.absorbed_loads += 1;
                    None
                }
            }
        };

        if snapshot.is_none() {
            debug!(track = %track_id, "load settled after eviction; absorbing result");
            self.emit(CacheEvent::LoadAbsorbed {
                track_id: track_id.to_string(),
            });
        }

        snapshot
    }

    fn evicted_handle(track_id: &TrackId) -> ResourceHandle {
        ResourceHandle::new(
            track_id.clone(),
            HandleState::Failed {
                message: "entry evicted during load".to_string(),
            },
        )
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is fine; emission is fire-and-forget.
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
