//! # Playback Core
//!
//! The playback resource cache and transport controller for the folder
//! player. This crate holds the part of the player with real invariants:
//! bounded resource caching with pin-aware LRU eviction, opportunistic
//! neighbor prefetch, and a playback state machine that stays consistent
//! under rapid navigation.
//!
//! ## Overview
//!
//! - [`cache::ResourceCache`]: bounded `TrackId -> resource` map. Loads on
//!   demand through the injected [`traits::TrackSource`] and
//!   [`traits::ResourceDecoder`], dedupes in-flight loads per track, and
//!   evicts the least-recently-used unpinned entry under admission
//!   pressure. A pinned entry (held by the transport as current) is never
//!   evicted.
//! - [`prefetch::Prefetcher`]: warms the playlist neighbors of the selected
//!   track in the background, best effort.
//! - [`transport::TransportController`]: the state machine driving
//!   `Idle -> Loading -> Ready -> Playing/Paused -> Ended`, repeat modes,
//!   and next/previous navigation with wraparound. Publishes every state
//!   transition on a [`core_runtime::events::EventBus`].
//!
//! ## Wiring
//!
//! ```ignore
//! use core_playback::{
//!     CacheConfig, PlayerConfig, Prefetcher, ResourceCache, TransportController,
//! };
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//!
//! let events = EventBus::default();
//! let cache = Arc::new(
//!     ResourceCache::new(source, decoder, CacheConfig::default())
//!         .with_event_bus(events.clone()),
//! );
//! let prefetcher = Arc::new(Prefetcher::new(cache.clone()));
//! let transport = TransportController::new(
//!     cache, prefetcher, output, PlayerConfig::default(), events,
//! );
//!
//! transport.set_playlist(track_ids);
//! transport.select(first_track).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod prefetch;
pub mod traits;
pub mod transport;

pub use cache::{CacheConfig, CacheStats, HandleState, ResourceCache, ResourceHandle};
pub use config::PlayerConfig;
pub use error::{PlaybackError, Result};
pub use prefetch::Prefetcher;
pub use traits::{AudioOutput, AudioResource, ResourceDecoder, TrackId, TrackSource};
pub use transport::{PlaybackPhase, RepeatMode, TransportController, TransportState};
