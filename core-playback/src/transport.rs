//! # Transport Controller
//!
//! The playback state machine. Owns the current track selection, drives
//! `load -> ready -> playing/paused -> ended` transitions, applies seek and
//! volume, and implements repeat-mode and next/previous navigation with
//! wraparound.
//!
//! ## State Machine
//!
//! ```text
//!            select()               ready              play()
//!   Idle ─────────────▶ Loading ──────────▶ Ready ─────────────▶ Playing
//!    ▲                     │                  ▲                  │    ▲
//!    │              failed │                  │ stop()   pause() │    │ play()
//!    └─────────────────────┘                  └────────── Paused ◀────┘
//!                                                                │
//!                                      end of resource: Playing ─▶ Ended
//!                                      Ended ─▶ Playing (repeat-one)
//!                                      Ended ─▶ Loading (auto-advance)
//! ```
//!
//! ## Rapid-Navigation Correctness
//!
//! Every `select` releases the previous current pin and registers a fresh
//! acquire; the load completion checks a generation counter and unpins
//! itself when superseded. Spamming `next()` N times before any load
//! completes therefore leaves exactly one final current track and zero
//! leaked pins.
//!
//! The controller is a single emission point for state-change
//! notifications: every transition is published once on the shared
//! [`EventBus`], and views subscribe to the bus instead of attaching
//! per-resource callbacks.

use crate::cache::{HandleState, ResourceCache, ResourceHandle};
use crate::config::PlayerConfig;
use crate::error::{PlaybackError, Result};
use crate::prefetch::Prefetcher;
use crate::traits::{AudioOutput, AudioResource, TrackId};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent, Receiver};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

// ============================================================================
// Transport State Types
// ============================================================================

/// Phase of the playback state machine.
///
/// `Idle` is initial (no track selected). No phase is terminal: `Ended`
/// transitions out immediately according to the repeat mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    /// No track selected.
    Idle,
    /// A track is selected and its resource load is in flight.
    Loading,
    /// The resource is loaded and playable, output not started.
    Ready,
    /// Output is active.
    Playing,
    /// Output is halted, position retained.
    Paused,
    /// The resource played to its end; transient.
    Ended,
}

impl PlaybackPhase {
    /// Returns `true` if a track is selected in this phase.
    pub fn has_track(&self) -> bool {
        !matches!(self, PlaybackPhase::Idle)
    }
}

/// Repeat behavior applied when a track plays to its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Advance to the next track (wrapping at the playlist end).
    #[default]
    Off,
    /// Replay the same resource from the start, without cache traffic.
    RepeatOne,
}

/// Published snapshot of the transport state.
///
/// Views read this for rendering; it carries no resource payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportState {
    /// The selected track, if any.
    pub current_track_id: Option<TrackId>,
    /// Current phase of the state machine.
    pub phase: PlaybackPhase,
    /// Playback position within the current track.
    pub position: Duration,
    /// Duration of the current resource (zero until ready).
    pub duration: Duration,
    /// Output volume in `[0.0, 1.0]`.
    pub volume: f32,
    /// Repeat behavior at end of track.
    pub repeat_mode: RepeatMode,
    /// Deferred intent to start playback once the loading resource becomes
    /// ready; consumed exactly once.
    pub pending_auto_play: bool,
}

/// Internal state guarded by the controller mutex.
struct ControllerState {
    transport: TransportState,
    /// Ordered track list; consulted only for navigation neighbors.
    playlist: Vec<TrackId>,
    /// Bumped on every `select`; stale load completions detect themselves.
    generation: u64,
    /// Track currently holding our cache pin, once its load completed.
    pinned: Option<TrackId>,
    /// Settled handle for the current track.
    handle: Option<ResourceHandle>,
}

enum NavDirection {
    Forward,
    Backward,
}

// ============================================================================
// TransportController
// ============================================================================

struct ControllerInner {
    state: Mutex<ControllerState>,
    cache: Arc<ResourceCache>,
    prefetcher: Arc<Prefetcher>,
    output: Arc<dyn AudioOutput>,
    events: EventBus,
    config: PlayerConfig,
    /// Spawned load completions not yet finished; diagnostics and tests.
    active_loads: AtomicUsize,
}

/// The playback state machine over an injected cache, prefetcher, and
/// platform output.
///
/// Cheap to clone (shared inner); all methods take `&self` and are safe to
/// call from the UI intent path while background loads complete.
#[derive(Clone)]
pub struct TransportController {
    inner: Arc<ControllerInner>,
}

impl TransportController {
    /// Create a controller.
    ///
    /// `config` carries the startup values an external settings store
    /// provides (volume, repeat mode, thresholds). The initial volume is
    /// clamped and broadcast to the cache immediately.
    pub fn new(
        cache: Arc<ResourceCache>,
        prefetcher: Arc<Prefetcher>,
        output: Arc<dyn AudioOutput>,
        config: PlayerConfig,
        events: EventBus,
    ) -> Self {
        let volume = config.initial_volume.clamp(0.0, 1.0);
        cache.set_volume(volume);

        Self {
            inner: Arc::new(ControllerInner {
                state: Mutex::new(ControllerState {
                    transport: TransportState {
                        current_track_id: None,
                        phase: PlaybackPhase::Idle,
                        position: Duration::ZERO,
                        duration: Duration::ZERO,
                        volume,
                        repeat_mode: config.repeat_mode,
                        pending_auto_play: false,
                    },
                    playlist: Vec::new(),
                    generation: 0,
                    pinned: None,
                    handle: None,
                }),
                cache,
                prefetcher,
                output,
                events,
                config,
                active_loads: AtomicUsize::new(0),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    /// Install the ordered track list for this playback session.
    pub fn set_playlist(&self, tracks: Vec<TrackId>) {
        self.inner.state.lock().playlist = tracks;
    }

    /// Select `track_id` as the current track and start loading it.
    ///
    /// Releases the previous current pin (the superseded resource stays
    /// cached for reuse), resets the position, and enters `Loading`. The
    /// load completes in a background task; playback does not start until
    /// [`TransportController::play`] unless a pending auto-play was set by
    /// navigation.
    #[instrument(skip(self))]
    pub async fn select(&self, track_id: TrackId) -> Result<()> {
        self.select_inner(track_id, false).await
    }

    /// Start or resume playback of the current track.
    ///
    /// From `Ready` or `Paused` the output starts at the retained position.
    /// While `Loading`, records the deferred auto-play intent instead.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::NoTrackLoaded`] with no usable track, or
    /// the output error when the platform rejects the resource; in that
    /// case the transport stays in `Paused`.
    #[instrument(skip(self))]
    pub async fn play(&self) -> Result<()> {
        enum Intent {
            Start {
                payload: Arc<dyn AudioResource>,
                position: Duration,
                track_id: TrackId,
            },
            Deferred,
            Noop,
        }

        let intent = {
            let mut st = self.inner.state.lock();
            match st.transport.phase {
                PlaybackPhase::Playing => Intent::Noop,
                PlaybackPhase::Loading => {
                    st.transport.pending_auto_play = true;
                    Intent::Deferred
                }
                PlaybackPhase::Ready | PlaybackPhase::Paused => {
                    let payload = st.handle.as_ref().and_then(ResourceHandle::payload);
                    match (payload, st.transport.current_track_id.clone()) {
                        (Some(payload), Some(track_id)) => Intent::Start {
                            payload,
                            position: st.transport.position,
                            track_id,
                        },
                        _ => return Err(PlaybackError::NoTrackLoaded),
                    }
                }
                PlaybackPhase::Idle | PlaybackPhase::Ended => {
                    return Err(PlaybackError::NoTrackLoaded)
                }
            }
        };

        let Intent::Start {
            payload,
            position,
            track_id,
        } = intent
        else {
            return Ok(());
        };

        self.start_output(payload, position, track_id).await
    }

    /// Pause playback, retaining the position.
    #[instrument(skip(self))]
    pub async fn pause(&self) -> Result<()> {
        let paused = {
            let mut st = self.inner.state.lock();
            if st.transport.phase != PlaybackPhase::Playing {
                return Ok(());
            }
            st.transport.phase = PlaybackPhase::Paused;
            st.transport
                .current_track_id
                .clone()
                .map(|id| (id, st.transport.position))
        };

        if let Err(e) = self.inner.output.stop().await {
            warn!(error = %e, "failed to stop output on pause");
        }

        if let Some((track_id, position)) = paused {
            self.emit(PlaybackEvent::Paused {
                track_id: track_id.to_string(),
                position_ms: as_ms(position),
            });
        }
        Ok(())
    }

    /// Stop playback: halt output, reset the position to zero, and return
    /// to `Ready` with the resource still loaded.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let stopped = {
            let mut st = self.inner.state.lock();
            if !matches!(
                st.transport.phase,
                PlaybackPhase::Playing | PlaybackPhase::Paused
            ) {
                return Ok(());
            }
            st.transport.phase = PlaybackPhase::Ready;
            st.transport.position = Duration::ZERO;
            st.transport.current_track_id.clone()
        };

        if let Err(e) = self.inner.output.stop().await {
            warn!(error = %e, "failed to stop output");
        }

        if let Some(track_id) = stopped {
            self.emit(PlaybackEvent::Stopped {
                track_id: track_id.to_string(),
            });
        }
        Ok(())
    }

    /// Seek to `position`, clamped to `[0, duration]`.
    ///
    /// While `Playing` the output is repositioned without leaving the
    /// phase; in every other phase only the retained position changes.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::NoTrackLoaded`] when no track is selected.
    #[instrument(skip(self))]
    pub async fn seek(&self, position: Duration) -> Result<()> {
        let (track_id, clamped, duration, playing) = {
            let mut st = self.inner.state.lock();
            let Some(track_id) = st.transport.current_track_id.clone() else {
                return Err(PlaybackError::NoTrackLoaded);
            };
            let clamped = position.min(st.transport.duration);
            st.transport.position = clamped;
            (
                track_id,
                clamped,
                st.transport.duration,
                st.transport.phase == PlaybackPhase::Playing,
            )
        };

        if playing {
            if let Err(e) = self.inner.output.seek(clamped).await {
                self.emit(PlaybackEvent::Error {
                    track_id: Some(track_id.to_string()),
                    message: e.to_string(),
                    recoverable: true,
                });
                return Err(e);
            }
        }

        self.emit(PlaybackEvent::PositionChanged {
            track_id: track_id.to_string(),
            position_ms: as_ms(clamped),
            duration_ms: as_ms(duration),
        });
        Ok(())
    }

    /// Set the output volume, clamped to `[0.0, 1.0]`.
    ///
    /// Applied to the active output and propagated to every cached
    /// resource, so resumed or prefetched tracks play at a consistent
    /// level.
    #[instrument(skip(self))]
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        let clamped = volume.clamp(0.0, 1.0);
        self.inner.state.lock().transport.volume = clamped;

        // Cache first: an entry admitted mid-change still gets the latest
        // value at publish time.
        self.inner.cache.set_volume(clamped);
        if let Err(e) = self.inner.output.set_volume(clamped).await {
            warn!(error = %e, "failed to apply volume to output");
        }

        self.emit(PlaybackEvent::VolumeChanged { volume: clamped });
        Ok(())
    }

    /// Set the repeat behavior for end-of-track.
    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        self.inner.state.lock().transport.repeat_mode = mode;
        self.emit(PlaybackEvent::RepeatModeChanged {
            repeat_one: mode == RepeatMode::RepeatOne,
        });
    }

    /// Navigate to the next track, wrapping at the playlist end, with
    /// auto-play once the target is ready.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::EmptyPlaylist`] when the playlist is empty.
    #[instrument(skip(self))]
    pub async fn next(&self) -> Result<()> {
        let target = self.navigation_target(NavDirection::Forward)?;
        self.select_inner(target, true).await
    }

    /// Navigate to the previous track, or restart the current one.
    ///
    /// A press within the restart threshold of the track start navigates
    /// back (wrapping at index zero); a later press is reinterpreted as
    /// `seek(0)` on the current track. This asymmetry is user-visible
    /// product behavior.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::EmptyPlaylist`] when navigating with an
    /// empty playlist.
    #[instrument(skip(self))]
    pub async fn previous(&self) -> Result<()> {
        let restart = {
            let st = self.inner.state.lock();
            st.transport.current_track_id.is_some()
                && st.transport.position >= self.inner.config.previous_restart_threshold
        };

        if restart {
            return self.seek(Duration::ZERO).await;
        }

        let target = self.navigation_target(NavDirection::Backward)?;
        self.select_inner(target, true).await
    }

    // ------------------------------------------------------------------
    // Platform callbacks
    // ------------------------------------------------------------------

    /// Notification from the platform output that the current resource
    /// played to its end.
    #[instrument(skip(self))]
    pub async fn on_track_ended(&self) {
        enum EndAction {
            Replay {
                payload: Arc<dyn AudioResource>,
                track_id: TrackId,
            },
            Advance {
                track_id: Option<TrackId>,
            },
            Ignore,
        }

        let action = {
            let mut st = self.inner.state.lock();
            if st.transport.phase != PlaybackPhase::Playing {
                EndAction::Ignore
            } else {
                st.transport.phase = PlaybackPhase::Ended;
                let track_id = st.transport.current_track_id.clone();
                match st.transport.repeat_mode {
                    RepeatMode::RepeatOne => {
                        let payload = st.handle.as_ref().and_then(ResourceHandle::payload);
                        st.transport.position = Duration::ZERO;
                        match (payload, track_id) {
                            (Some(payload), Some(track_id)) => {
                                EndAction::Replay { payload, track_id }
                            }
                            (_, track_id) => EndAction::Advance { track_id },
                        }
                    }
                    RepeatMode::Off => EndAction::Advance { track_id },
                }
            }
        };

        match action {
            EndAction::Ignore => {}
            EndAction::Replay { payload, track_id } => {
                self.emit(PlaybackEvent::Completed {
                    track_id: track_id.to_string(),
                });
                // Direct restart of the same resource; no cache traffic.
                if let Err(e) = self
                    .start_output(payload, Duration::ZERO, track_id.clone())
                    .await
                {
                    warn!(track = %track_id, error = %e, "repeat-one restart failed");
                }
            }
            EndAction::Advance { track_id } => {
                if let Some(track_id) = &track_id {
                    self.emit(PlaybackEvent::Completed {
                        track_id: track_id.to_string(),
                    });
                }
                match self.navigation_target(NavDirection::Forward) {
                    Ok(target) => {
                        if let Err(e) = self.select_inner(target, true).await {
                            warn!(error = %e, "auto-advance failed");
                        }
                    }
                    Err(e) => {
                        // Nowhere to go; resolve to a well-defined state.
                        debug!(error = %e, "cannot auto-advance; going idle");
                        let released = {
                            let mut st = self.inner.state.lock();
                            st.transport.phase = PlaybackPhase::Idle;
                            st.transport.current_track_id = None;
                            st.handle = None;
                            st.pinned.take()
                        };
                        if let Some(prev) = released {
                            self.inner.cache.release(&prev);
                        }
                    }
                }
            }
        }
    }

    /// Position progress reported by the platform output while playing.
    pub fn on_position(&self, position: Duration) {
        let update = {
            let mut st = self.inner.state.lock();
            if st.transport.phase != PlaybackPhase::Playing {
                None
            } else {
                let clamped = position.min(st.transport.duration);
                st.transport.position = clamped;
                st.transport
                    .current_track_id
                    .clone()
                    .map(|id| (id, clamped, st.transport.duration))
            }
        };

        if let Some((track_id, position, duration)) = update {
            self.emit(PlaybackEvent::PositionChanged {
                track_id: track_id.to_string(),
                position_ms: as_ms(position),
                duration_ms: as_ms(duration),
            });
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Snapshot of the published transport state.
    pub fn snapshot(&self) -> TransportState {
        self.inner.state.lock().transport.clone()
    }

    /// Subscribe to state-transition notifications.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.inner.events.subscribe()
    }

    /// The shared event bus.
    pub fn event_bus(&self) -> EventBus {
        self.inner.events.clone()
    }

    /// Number of spawned load completions still in flight.
    pub fn active_loads(&self) -> usize {
        self.inner.active_loads.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn select_inner(&self, track_id: TrackId, auto_play: bool) -> Result<()> {
        let (generation, released) = {
            let mut st = self.inner.state.lock();
            st.generation += 1;
            st.handle = None;
            st.transport.current_track_id = Some(track_id.clone());
            st.transport.phase = PlaybackPhase::Loading;
            st.transport.position = Duration::ZERO;
            st.transport.duration = Duration::ZERO;
            st.transport.pending_auto_play = auto_play;
            (st.generation, st.pinned.take())
        };

        self.emit(PlaybackEvent::Loading {
            track_id: track_id.to_string(),
        });

        // Halt whatever is audible before switching tracks.
        if let Err(e) = self.inner.output.stop().await {
            warn!(error = %e, "failed to stop output during track switch");
        }

        // Unpin the superseded track; its resource stays cached for reuse
        // (e.g., the user navigates back).
        if let Some(prev) = released {
            self.inner.cache.release(&prev);
        }

        self.inner.active_loads.fetch_add(1, Ordering::SeqCst);
        let controller = self.clone();
        tokio::spawn(async move {
            let handle = controller.inner.cache.acquire(&track_id).await;
            controller.finish_load(track_id, generation, handle).await;
            controller.inner.active_loads.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(())
    }

    /// Apply a settled load to the state machine, unless superseded.
    async fn finish_load(&self, track_id: TrackId, generation: u64, handle: ResourceHandle) {
        let ready = {
            let mut st = self.inner.state.lock();
            if st.generation != generation {
                // A newer select owns the transport now; undo our pin and
                // leave the late result cached for possible reuse.
                drop(st);
                debug!(track = %track_id, "load superseded; unpinning");
                self.inner.cache.release(&track_id);
                return;
            }

            match handle.state() {
                HandleState::Ready { duration, .. } => {
                    let duration = *duration;
                    st.pinned = Some(track_id.clone());
                    st.transport.duration = duration;
                    st.transport.phase = PlaybackPhase::Ready;
                    let auto_play = st.transport.pending_auto_play;
                    st.transport.pending_auto_play = false;
                    st.handle = Some(handle.clone());
                    Some((duration, auto_play))
                }
                HandleState::Failed { message } => {
                    let message = message.clone();
                    st.transport.phase = PlaybackPhase::Idle;
                    st.transport.current_track_id = None;
                    st.transport.pending_auto_play = false;
                    st.handle = None;
                    drop(st);
                    // Undo the pin taken by acquire; the failed entry stays
                    // resident until evicted.
                    self.inner.cache.release(&track_id);
                    self.emit(PlaybackEvent::Error {
                        track_id: Some(track_id.to_string()),
                        message,
                        recoverable: true,
                    });
                    return;
                }
                HandleState::Loading => {
                    drop(st);
                    warn!(track = %track_id, "acquire returned an unsettled handle");
                    self.inner.cache.release(&track_id);
                    return;
                }
            }
        };

        let Some((duration, auto_play)) = ready else {
            return;
        };

        self.emit(PlaybackEvent::Ready {
            track_id: track_id.to_string(),
            duration_ms: as_ms(duration),
        });

        // Warm playlist neighbors now that the foreground track is ready.
        if self.inner.config.prefetch_enabled {
            let playlist = self.inner.state.lock().playlist.clone();
            self.inner.prefetcher.on_selection_changed(&track_id, &playlist);
        }

        if auto_play {
            if let Err(e) = self.play().await {
                warn!(track = %track_id, error = %e, "deferred auto-play failed");
            }
        }
    }

    /// Start the output and transition to `Playing`, or report the failure
    /// and remain `Paused`.
    async fn start_output(
        &self,
        payload: Arc<dyn AudioResource>,
        position: Duration,
        track_id: TrackId,
    ) -> Result<()> {
        match self.inner.output.start(payload, position).await {
            Ok(()) => {
                self.inner.state.lock().transport.phase = PlaybackPhase::Playing;
                self.emit(PlaybackEvent::Started {
                    track_id: track_id.to_string(),
                    position_ms: as_ms(position),
                });
                Ok(())
            }
            Err(e) => {
                self.inner.state.lock().transport.phase = PlaybackPhase::Paused;
                self.emit(PlaybackEvent::Error {
                    track_id: Some(track_id.to_string()),
                    message: e.to_string(),
                    recoverable: false,
                });
                Err(e)
            }
        }
    }

    /// Compute the wraparound navigation target.
    fn navigation_target(&self, direction: NavDirection) -> Result<TrackId> {
        let st = self.inner.state.lock();
        if st.playlist.is_empty() {
            return Err(PlaybackError::EmptyPlaylist);
        }

        let len = st.playlist.len();
        let current = st
            .transport
            .current_track_id
            .as_ref()
            .and_then(|id| st.playlist.iter().position(|track| track == id));

        let index = match (direction, current) {
            (NavDirection::Forward, Some(i)) => (i + 1) % len,
            (NavDirection::Backward, Some(i)) => {
                if i == 0 {
                    len - 1
                } else {
                    i - 1
                }
            }
            (NavDirection::Forward, None) => 0,
            (NavDirection::Backward, None) => len - 1,
        };

        Ok(st.playlist[index].clone())
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine; emission is fire-and-forget.
        let _ = self.inner.events.emit(CoreEvent::Playback(event));
    }
}

fn as_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_helpers() {
        assert!(!PlaybackPhase::Idle.has_track());
        assert!(PlaybackPhase::Loading.has_track());
        assert!(PlaybackPhase::Playing.has_track());
        assert!(PlaybackPhase::Ended.has_track());
    }

    #[test]
    fn repeat_mode_default_is_off() {
        assert_eq!(RepeatMode::default(), RepeatMode::Off);
    }
}
