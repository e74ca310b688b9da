//! Shared fake collaborators for integration tests.
//!
//! `FakeSource` supports holding individual fetches open so tests can
//! interleave navigation with slow loads deterministically; `FakeDecoder`
//! tracks every resource it creates (weakly, so drop counting observes
//! eviction); `FakeOutput` records control calls.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use core_playback::{
    AudioOutput, AudioResource, CacheConfig, PlaybackError, PlayerConfig, Prefetcher,
    ResourceCache, ResourceDecoder, Result, TrackId, TrackSource, TransportController,
};
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// FakeSource
// ============================================================================

pub struct FakeSource {
    held: Mutex<HashSet<TrackId>>,
    fail: Mutex<HashSet<TrackId>>,
    fetch_counts: Mutex<HashMap<TrackId, usize>>,
    gate: watch::Sender<()>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(());
        Arc::new(Self {
            held: Mutex::new(HashSet::new()),
            fail: Mutex::new(HashSet::new()),
            fetch_counts: Mutex::new(HashMap::new()),
            gate,
        })
    }

    /// Keep fetches for `track_id` pending until released.
    pub fn hold(&self, track_id: &TrackId) {
        self.held.lock().insert(track_id.clone());
    }

    /// Release pending fetches for `track_id`.
    pub fn release(&self, track_id: &TrackId) {
        self.held.lock().remove(track_id);
        self.gate.send_replace(());
    }

    /// Release every pending fetch.
    pub fn release_all(&self) {
        self.held.lock().clear();
        self.gate.send_replace(());
    }

    /// Make fetches for `track_id` fail with `TrackNotFound`.
    pub fn fail_track(&self, track_id: &TrackId) {
        self.fail.lock().insert(track_id.clone());
    }

    /// Number of fetch calls observed for `track_id`.
    pub fn fetch_count(&self, track_id: &TrackId) -> usize {
        self.fetch_counts.lock().get(track_id).copied().unwrap_or(0)
    }

    /// Total fetch calls across all tracks.
    pub fn total_fetches(&self) -> usize {
        self.fetch_counts.lock().values().sum()
    }
}

#[async_trait]
impl TrackSource for FakeSource {
    async fn fetch(&self, track_id: &TrackId) -> Result<Bytes> {
        *self
            .fetch_counts
            .lock()
            .entry(track_id.clone())
            .or_insert(0) += 1;

        // Subscribe before checking so a release between the check and the
        // await still wakes us.
        let mut rx = self.gate.subscribe();
        loop {
            if !self.held.lock().contains(track_id) {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }

        if self.fail.lock().contains(track_id) {
            return Err(PlaybackError::TrackNotFound(track_id.to_string()));
        }

        Ok(Bytes::from(track_id.as_str().as_bytes().to_vec()))
    }
}

// ============================================================================
// FakeResource / FakeDecoder
// ============================================================================

#[derive(Debug)]
pub struct FakeResource {
    duration: Duration,
    volume: Mutex<f32>,
    drops: Arc<AtomicUsize>,
}

impl FakeResource {
    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }
}

impl AudioResource for FakeResource {
    fn duration(&self) -> Duration {
        self.duration
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume;
    }
}

impl Drop for FakeResource {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeDecoder {
    duration: Duration,
    fail: Mutex<HashSet<TrackId>>,
    created: Mutex<Vec<(TrackId, Weak<FakeResource>)>>,
    drops: Arc<AtomicUsize>,
}

impl FakeDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            duration: Duration::from_secs(180),
            fail: Mutex::new(HashSet::new()),
            created: Mutex::new(Vec::new()),
            drops: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Make decodes for `track_id` fail.
    pub fn fail_track(&self, track_id: &TrackId) {
        self.fail.lock().insert(track_id.clone());
    }

    /// Number of resources released so far.
    pub fn drop_count(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    /// Number of resources created for `track_id`.
    pub fn created_count(&self, track_id: &TrackId) -> usize {
        self.created
            .lock()
            .iter()
            .filter(|(id, _)| id == track_id)
            .count()
    }

    /// The most recent still-alive resource for `track_id`.
    pub fn resource_for(&self, track_id: &TrackId) -> Option<Arc<FakeResource>> {
        self.created
            .lock()
            .iter()
            .rev()
            .filter(|(id, _)| id == track_id)
            .find_map(|(_, weak)| weak.upgrade())
    }

    /// Volume last applied to the live resource for `track_id`.
    pub fn volume_of(&self, track_id: &TrackId) -> Option<f32> {
        self.resource_for(track_id).map(|r| r.volume())
    }
}

#[async_trait]
impl ResourceDecoder for FakeDecoder {
    async fn decode(&self, track_id: &TrackId, _data: Bytes) -> Result<Arc<dyn AudioResource>> {
        if self.fail.lock().contains(track_id) {
            return Err(PlaybackError::DecodeFailed(format!(
                "unsupported data for {}",
                track_id
            )));
        }

        let resource = Arc::new(FakeResource {
            duration: self.duration,
            volume: Mutex::new(1.0),
            drops: self.drops.clone(),
        });
        self.created
            .lock()
            .push((track_id.clone(), Arc::downgrade(&resource)));
        Ok(resource)
    }
}

// ============================================================================
// FakeOutput
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    Start(Duration),
    Stop,
    Seek(Duration),
    SetVolume(f32),
}

pub struct FakeOutput {
    calls: Mutex<Vec<OutputCall>>,
    fail_start: AtomicBool,
}

impl FakeOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_start: AtomicBool::new(false),
        })
    }

    /// Make subsequent `start` calls fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.calls.lock().clone()
    }

    pub fn start_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, OutputCall::Start(_)))
            .count()
    }

    pub fn last_start(&self) -> Option<Duration> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find_map(|call| match call {
                OutputCall::Start(position) => Some(*position),
                _ => None,
            })
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    async fn start(&self, _resource: Arc<dyn AudioResource>, position: Duration) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(PlaybackError::PlaybackFailed("output rejected".into()));
        }
        self.calls.lock().push(OutputCall::Start(position));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.calls.lock().push(OutputCall::Stop);
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        self.calls.lock().push(OutputCall::Seek(position));
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        self.calls.lock().push(OutputCall::SetVolume(volume));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub decoder: Arc<FakeDecoder>,
    pub output: Arc<FakeOutput>,
    pub cache: Arc<ResourceCache>,
    pub prefetcher: Arc<Prefetcher>,
    pub transport: TransportController,
    pub events: EventBus,
}

pub fn harness(player: PlayerConfig, cache_config: CacheConfig) -> Harness {
    let source = FakeSource::new();
    let decoder = FakeDecoder::new();
    let output = FakeOutput::new();
    let events = EventBus::default();

    let cache = Arc::new(
        ResourceCache::new(source.clone(), decoder.clone(), cache_config)
            .with_event_bus(events.clone()),
    );
    let prefetcher = Arc::new(Prefetcher::new(cache.clone()));
    let transport = TransportController::new(
        cache.clone(),
        prefetcher.clone(),
        output.clone(),
        player,
        events.clone(),
    );

    Harness {
        source,
        decoder,
        output,
        cache,
        prefetcher,
        transport,
        events,
    }
}

pub fn default_harness() -> Harness {
    harness(PlayerConfig::default(), CacheConfig::default())
}

/// Track identifiers `t0..tN`.
pub fn track_ids(n: usize) -> Vec<TrackId> {
    (0..n).map(|i| TrackId::new(format!("t{}", i))).collect()
}

/// Drive background tasks until all loads, warms, and completions settle.
pub async fn wait_idle(h: &Harness) {
    loop {
        let busy = h.transport.active_loads() > 0
            || h.prefetcher.in_flight_count() > 0
            || h.cache.stats().loading > 0;
        if !busy {
            break;
        }
        tokio::task::yield_now().await;
    }
    // Let just-finished tasks run their tails.
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
