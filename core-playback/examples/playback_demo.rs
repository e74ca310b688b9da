//! # Playback Core Usage Example
//!
//! Wires the resource cache, prefetcher, and transport controller against
//! in-memory collaborators and walks through a small listening session.
//!
//! Run with: `cargo run --example playback_demo --package core-playback`

use async_trait::async_trait;
use bytes::Bytes;
use core_playback::{
    AudioOutput, AudioResource, CacheConfig, PlaybackPhase, PlayerConfig, Prefetcher,
    ResourceCache, ResourceDecoder, Result, TrackId, TrackSource, TransportController,
};
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// In-Memory Collaborators (for demonstration)
// ============================================================================

struct FolderSource;

#[async_trait]
impl TrackSource for FolderSource {
    async fn fetch(&self, track_id: &TrackId) -> Result<Bytes> {
        // Stand-in for reading the file from disk.
        Ok(Bytes::from(format!("encoded audio for {}", track_id)))
    }
}

#[derive(Debug)]
struct InMemoryResource {
    duration: Duration,
    volume: Mutex<f32>,
}

impl AudioResource for InMemoryResource {
    fn duration(&self) -> Duration {
        self.duration
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume;
    }
}

struct InMemoryDecoder;

#[async_trait]
impl ResourceDecoder for InMemoryDecoder {
    async fn decode(&self, _track_id: &TrackId, data: Bytes) -> Result<Arc<dyn AudioResource>> {
        Ok(Arc::new(InMemoryResource {
            duration: Duration::from_secs(data.len() as u64),
            volume: Mutex::new(1.0),
        }))
    }
}

struct ConsoleOutput;

#[async_trait]
impl AudioOutput for ConsoleOutput {
    async fn start(&self, resource: Arc<dyn AudioResource>, position: Duration) -> Result<()> {
        println!(
            "[output] start at {:?} of {:?}",
            position,
            resource.duration()
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        println!("[output] stop");
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        println!("[output] seek to {:?}", position);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        println!("[output] volume {:.2}", volume);
        Ok(())
    }
}

// ============================================================================
// Demo Flow
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let events = EventBus::default();
    let cache = Arc::new(
        ResourceCache::new(
            Arc::new(FolderSource),
            Arc::new(InMemoryDecoder),
            CacheConfig::default(),
        )
        .with_event_bus(events.clone()),
    );
    let prefetcher = Arc::new(Prefetcher::new(cache.clone()));
    let transport = TransportController::new(
        cache.clone(),
        prefetcher,
        Arc::new(ConsoleOutput),
        PlayerConfig::default(),
        events.clone(),
    );

    // Views subscribe once to the bus instead of wiring per-track callbacks.
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            println!("[event] {}", event.description());
        }
    });

    let playlist: Vec<TrackId> = (1..=4)
        .map(|i| TrackId::new(format!("track-{:02}", i)))
        .collect();
    transport.set_playlist(playlist.clone());

    transport.select(playlist[0].clone()).await?;
    while transport.snapshot().phase != PlaybackPhase::Ready {
        tokio::task::yield_now().await;
    }

    transport.play().await?;
    transport.set_volume(0.8).await?;
    transport.seek(Duration::from_secs(5)).await?;
    transport.next().await?;

    // Let background loads and prefetches settle before reading the state.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let state = transport.snapshot();
    println!("now at {:?} ({:?})", state.current_track_id, state.phase);
    println!(
        "cache: {} resident, {} pinned",
        cache.stats().resident,
        cache.stats().pinned
    );

    Ok(())
}
