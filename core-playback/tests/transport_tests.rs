//! Integration tests for the transport controller: the full state machine,
//! navigation semantics, repeat modes, rapid-skip correctness, and event
//! emission.

mod common;

use common::{default_harness, harness, track_ids, wait_idle, OutputCall};
use core_playback::{
    CacheConfig, PlaybackError, PlaybackPhase, PlayerConfig, RepeatMode, TrackId,
};
use core_runtime::events::{CoreEvent, PlaybackEvent};
use std::time::Duration;

fn playback_events(rx: &mut core_runtime::events::Receiver<CoreEvent>) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::Playback(event) = event {
            events.push(event);
        }
    }
    events
}

#[tokio::test]
async fn select_loads_and_becomes_ready() {
    let h = default_harness();
    let tracks = track_ids(3);
    h.transport.set_playlist(tracks.clone());

    h.transport.select(tracks[0].clone()).await.expect("select");
    // The load completes in the background; the transport is loading until
    // it settles.
    assert_eq!(h.transport.snapshot().phase, PlaybackPhase::Loading);
    assert_eq!(
        h.transport.snapshot().current_track_id,
        Some(tracks[0].clone())
    );

    wait_idle(&h).await;

    let state = h.transport.snapshot();
    assert_eq!(state.phase, PlaybackPhase::Ready);
    assert_eq!(state.duration, Duration::from_secs(180));
    assert_eq!(state.position, Duration::ZERO);
    assert!(!state.pending_auto_play);
    assert_eq!(h.cache.pin_count(&tracks[0]), 1);
}

#[tokio::test]
async fn ready_track_warms_neighbors() {
    let h = default_harness();
    let tracks = track_ids(5);
    h.transport.set_playlist(tracks.clone());

    h.transport.select(tracks[2].clone()).await.expect("select");
    wait_idle(&h).await;

    assert!(h.cache.peek(&tracks[1]).is_some());
    assert!(h.cache.peek(&tracks[3]).is_some());
    assert!(h.cache.peek(&tracks[0]).is_none());
    assert!(h.cache.peek(&tracks[4]).is_none());
    // Neighbors are warm, not pinned.
    assert_eq!(h.cache.pin_count(&tracks[1]), 0);
    assert_eq!(h.cache.pin_count(&tracks[3]), 0);
}

#[tokio::test]
async fn play_pause_resume_retains_position() {
    let h = default_harness();
    let tracks = track_ids(1);
    h.transport.set_playlist(tracks.clone());
    h.transport.select(tracks[0].clone()).await.expect("select");
    wait_idle(&h).await;

    h.transport.play().await.expect("play");
    assert_eq!(h.transport.snapshot().phase, PlaybackPhase::Playing);
    assert_eq!(h.output.last_start(), Some(Duration::ZERO));

    h.transport.on_position(Duration::from_secs(42));
    h.transport.pause().await.expect("pause");
    let paused = h.transport.snapshot();
    assert_eq!(paused.phase, PlaybackPhase::Paused);
    assert_eq!(paused.position, Duration::from_secs(42));

    h.transport.play().await.expect("resume");
    assert_eq!(h.transport.snapshot().phase, PlaybackPhase::Playing);
    assert_eq!(h.output.last_start(), Some(Duration::from_secs(42)));
}

#[tokio::test]
async fn playback_failure_reports_and_stays_paused() {
    let h = default_harness();
    let tracks = track_ids(1);
    h.transport.set_playlist(tracks.clone());
    h.transport.select(tracks[0].clone()).await.expect("select");
    wait_idle(&h).await;

    let mut rx = h.transport.subscribe();
    h.output.set_fail_start(true);

    let result = h.transport.play().await;
    assert!(matches!(result, Err(PlaybackError::PlaybackFailed(_))));
    assert_eq!(h.transport.snapshot().phase, PlaybackPhase::Paused);

    let events = playback_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, PlaybackEvent::Error { .. })));

    // No automatic retry; an explicit play can succeed later.
    h.output.set_fail_start(false);
    h.transport.play().await.expect("retry");
    assert_eq!(h.transport.snapshot().phase, PlaybackPhase::Playing);
}

#[tokio::test]
async fn failed_load_returns_to_idle() {
    let h = default_harness();
    let tracks = track_ids(2);
    h.transport.set_playlist(tracks.clone());
    h.source.fail_track(&tracks[1]);

    let mut rx = h.transport.subscribe();
    h.transport.select(tracks[1].clone()).await.expect("select");
    wait_idle(&h).await;

    let state = h.transport.snapshot();
    assert_eq!(state.phase, PlaybackPhase::Idle);
    assert_eq!(state.current_track_id, None);
    assert_eq!(h.cache.pin_count(&tracks[1]), 0);

    let events = playback_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, PlaybackEvent::Error { .. })));
}

#[tokio::test]
async fn next_and_previous_wrap_around() {
    let h = default_harness();
    let tracks = track_ids(3);
    h.transport.set_playlist(tracks.clone());

    h.transport.select(tracks[2].clone()).await.expect("select");
    wait_idle(&h).await;

    // Next at the last index wraps to 0.
    h.transport.next().await.expect("next");
    assert_eq!(
        h.transport.snapshot().current_track_id,
        Some(tracks[0].clone())
    );
    wait_idle(&h).await;

    // Previous at index 0 (position below the threshold) wraps to the last
    // index.
    h.transport.previous().await.expect("previous");
    assert_eq!(
        h.transport.snapshot().current_track_id,
        Some(tracks[2].clone())
    );
    wait_idle(&h).await;

    // Navigation set the auto-play flag; the target is playing once ready.
    assert_eq!(h.transport.snapshot().phase, PlaybackPhase::Playing);
}

#[tokio::test]
async fn single_track_playlist_wraps_to_itself() {
    let h = default_harness();
    let tracks = track_ids(1);
    h.transport.set_playlist(tracks.clone());

    h.transport.select(tracks[0].clone()).await.expect("select");
    wait_idle(&h).await;

    h.transport.next().await.expect("next");
    wait_idle(&h).await;
    assert_eq!(
        h.transport.snapshot().current_track_id,
        Some(tracks[0].clone())
    );
    assert_eq!(h.cache.pin_count(&tracks[0]), 1);

    h.transport.previous().await.expect("previous");
    wait_idle(&h).await;
    assert_eq!(
        h.transport.snapshot().current_track_id,
        Some(tracks[0].clone())
    );
    assert_eq!(h.cache.pin_count(&tracks[0]), 1);
}

#[tokio::test]
async fn previous_restarts_after_threshold() {
    let h = default_harness();
    let tracks = track_ids(2);
    h.transport.set_playlist(tracks.clone());

    h.transport.select(tracks[1].clone()).await.expect("select");
    wait_idle(&h).await;
    h.transport.play().await.expect("play");

    // Late press: restart the current track instead of navigating.
    h.transport.on_position(Duration::from_secs(10));
    h.transport.previous().await.expect("previous");

    let state = h.transport.snapshot();
    assert_eq!(state.current_track_id, Some(tracks[1].clone()));
    assert_eq!(state.position, Duration::ZERO);
    assert_eq!(state.phase, PlaybackPhase::Playing);
    assert!(h.output.calls().contains(&OutputCall::Seek(Duration::ZERO)));

    // Early press: navigate to the prior track.
    h.transport.on_position(Duration::from_secs(2));
    h.transport.previous().await.expect("previous");
    assert_eq!(
        h.transport.snapshot().current_track_id,
        Some(tracks[0].clone())
    );
    wait_idle(&h).await;
}

#[tokio::test]
async fn repeat_one_replays_without_cache_traffic() {
    let h = default_harness();
    let tracks = track_ids(2);
    h.transport.set_playlist(tracks.clone());

    h.transport.select(tracks[0].clone()).await.expect("select");
    wait_idle(&h).await;
    h.transport.play().await.expect("play");
    h.transport.set_repeat_mode(RepeatMode::RepeatOne);

    let fetches_before = h.source.fetch_count(&tracks[0]);
    h.transport.on_position(Duration::from_secs(180));
    h.transport.on_track_ended().await;

    let state = h.transport.snapshot();
    assert_eq!(state.phase, PlaybackPhase::Playing);
    assert_eq!(state.position, Duration::ZERO);
    assert_eq!(state.current_track_id, Some(tracks[0].clone()));
    // Same resource, no new acquire.
    assert_eq!(h.source.fetch_count(&tracks[0]), fetches_before);
    assert_eq!(h.output.last_start(), Some(Duration::ZERO));
}

#[tokio::test]
async fn ended_with_repeat_off_auto_advances() {
    let h = default_harness();
    let tracks = track_ids(3);
    h.transport.set_playlist(tracks.clone());

    h.transport.select(tracks[2].clone()).await.expect("select");
    wait_idle(&h).await;
    h.transport.play().await.expect("play");

    let mut rx = h.transport.subscribe();
    h.transport.on_track_ended().await;
    wait_idle(&h).await;

    // Wrapped to the first track and auto-played.
    let state = h.transport.snapshot();
    assert_eq!(state.current_track_id, Some(tracks[0].clone()));
    assert_eq!(state.phase, PlaybackPhase::Playing);
    assert!(!state.pending_auto_play);

    let events = playback_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, PlaybackEvent::Completed { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, PlaybackEvent::Started { .. })));
}

#[tokio::test]
async fn rapid_skip_leaves_one_pin() {
    let h = default_harness();
    let tracks = track_ids(10);
    h.transport.set_playlist(tracks.clone());
    for track in &tracks {
        h.source.hold(track);
    }

    h.transport.select(tracks[0].clone()).await.expect("select");
    for _ in 0..50 {
        h.transport.next().await.expect("next");
    }

    // Fifty skips from t0 land on (0 + 50) % 10.
    assert_eq!(
        h.transport.snapshot().current_track_id,
        Some(tracks[0].clone())
    );

    h.source.release_all();
    wait_idle(&h).await;

    // Exactly one pinned handle (the final target); every superseded load
    // released its pin even though it never reached Ready in the
    // foreground.
    assert_eq!(h.cache.pin_count(&tracks[0]), 1);
    for track in &tracks[1..] {
        assert_eq!(h.cache.pin_count(track), 0, "leaked pin on {}", track);
    }
    assert_eq!(h.cache.stats().pinned, 1);
    assert_eq!(h.transport.active_loads(), 0);

    // The last navigation carried auto-play.
    assert_eq!(h.transport.snapshot().phase, PlaybackPhase::Playing);
}

#[tokio::test]
async fn volume_applies_to_output_cache_and_later_warms() {
    let h = default_harness();
    let tracks = track_ids(2);
    h.transport.set_playlist(tracks.clone());

    h.transport.set_volume(0.3).await.expect("set volume");
    assert_eq!(h.transport.snapshot().volume, 0.3);
    assert!(h.output.calls().contains(&OutputCall::SetVolume(0.3)));

    // A track warmed after the change plays at 0.3, not a default.
    h.transport.select(tracks[0].clone()).await.expect("select");
    wait_idle(&h).await;
    assert_eq!(h.decoder.volume_of(&tracks[0]), Some(0.3));
    assert_eq!(h.decoder.volume_of(&tracks[1]), Some(0.3));
}

#[tokio::test]
async fn volume_and_seek_are_clamped() {
    let h = default_harness();
    let tracks = track_ids(1);
    h.transport.set_playlist(tracks.clone());
    h.transport.select(tracks[0].clone()).await.expect("select");
    wait_idle(&h).await;

    h.transport.set_volume(2.5).await.expect("set volume");
    assert_eq!(h.transport.snapshot().volume, 1.0);

    h.transport
        .seek(Duration::from_secs(999))
        .await
        .expect("seek");
    assert_eq!(h.transport.snapshot().position, Duration::from_secs(180));
    // Not playing: the output is not repositioned.
    assert!(!h
        .output
        .calls()
        .iter()
        .any(|c| matches!(c, OutputCall::Seek(_))));
}

#[tokio::test]
async fn seek_without_track_errors() {
    let h = default_harness();
    let result = h.transport.seek(Duration::from_secs(1)).await;
    assert!(matches!(result, Err(PlaybackError::NoTrackLoaded)));
}

#[tokio::test]
async fn navigation_on_empty_playlist_errors() {
    let h = default_harness();
    assert!(matches!(
        h.transport.next().await,
        Err(PlaybackError::EmptyPlaylist)
    ));
    assert!(matches!(
        h.transport.previous().await,
        Err(PlaybackError::EmptyPlaylist)
    ));
}

#[tokio::test]
async fn play_during_loading_defers_start() {
    let h = default_harness();
    let tracks = track_ids(1);
    h.transport.set_playlist(tracks.clone());
    h.source.hold(&tracks[0]);

    h.transport.select(tracks[0].clone()).await.expect("select");
    h.transport.play().await.expect("play while loading");
    assert!(h.transport.snapshot().pending_auto_play);

    h.source.release(&tracks[0]);
    wait_idle(&h).await;

    let state = h.transport.snapshot();
    assert_eq!(state.phase, PlaybackPhase::Playing);
    assert!(!state.pending_auto_play);
}

#[tokio::test]
async fn stop_resets_position_and_keeps_resource() {
    let h = default_harness();
    let tracks = track_ids(1);
    h.transport.set_playlist(tracks.clone());
    h.transport.select(tracks[0].clone()).await.expect("select");
    wait_idle(&h).await;

    h.transport.play().await.expect("play");
    h.transport.on_position(Duration::from_secs(30));
    h.transport.stop().await.expect("stop");

    let state = h.transport.snapshot();
    assert_eq!(state.phase, PlaybackPhase::Ready);
    assert_eq!(state.position, Duration::ZERO);
    assert_eq!(state.current_track_id, Some(tracks[0].clone()));
    // The resource stays pinned and loaded; play restarts from zero with
    // no new fetch.
    assert_eq!(h.cache.pin_count(&tracks[0]), 1);
    let fetches = h.source.fetch_count(&tracks[0]);
    h.transport.play().await.expect("replay");
    assert_eq!(h.source.fetch_count(&tracks[0]), fetches);
}

#[tokio::test]
async fn transitions_emit_events_once_each() {
    let h = default_harness();
    let tracks = track_ids(2);
    h.transport.set_playlist(tracks.clone());

    let mut rx = h.transport.subscribe();
    h.transport.select(tracks[0].clone()).await.expect("select");
    wait_idle(&h).await;
    h.transport.play().await.expect("play");
    h.transport.pause().await.expect("pause");

    let events = playback_events(&mut rx);
    let loading = events
        .iter()
        .filter(|e| matches!(e, PlaybackEvent::Loading { .. }))
        .count();
    let ready = events
        .iter()
        .filter(|e| matches!(e, PlaybackEvent::Ready { .. }))
        .count();
    let started = events
        .iter()
        .filter(|e| matches!(e, PlaybackEvent::Started { .. }))
        .count();
    let paused = events
        .iter()
        .filter(|e| matches!(e, PlaybackEvent::Paused { .. }))
        .count();

    assert_eq!(loading, 1);
    assert_eq!(ready, 1);
    assert_eq!(started, 1);
    assert_eq!(paused, 1);
}

#[tokio::test]
async fn startup_config_is_applied() {
    let h = harness(
        PlayerConfig::default()
            .with_initial_volume(0.5)
            .with_repeat_mode(RepeatMode::RepeatOne),
        CacheConfig::default(),
    );

    let state = h.transport.snapshot();
    assert_eq!(state.volume, 0.5);
    assert_eq!(state.repeat_mode, RepeatMode::RepeatOne);

    // Startup volume reaches resources loaded later.
    let track = TrackId::new("t0");
    h.transport.set_playlist(vec![track.clone()]);
    h.transport.select(track.clone()).await.expect("select");
    wait_idle(&h).await;
    assert_eq!(h.decoder.volume_of(&track), Some(0.5));
}

#[tokio::test]
async fn superseded_slow_load_stays_cached_for_reuse() {
    let h = default_harness();
    let tracks = track_ids(2);
    h.transport.set_playlist(tracks.clone());
    h.source.hold(&tracks[0]);

    // Start loading t0, then move on before it settles.
    h.transport.select(tracks[0].clone()).await.expect("select");
    h.transport.select(tracks[1].clone()).await.expect("select");
    wait_current_settled(&h).await;

    // The slow load completes and populates the cache anyway.
    h.source.release(&tracks[0]);
    wait_idle(&h).await;

    assert_eq!(
        h.transport.snapshot().current_track_id,
        Some(tracks[1].clone())
    );
    assert_eq!(h.cache.pin_count(&tracks[0]), 0);
    let cached = h.cache.peek(&tracks[0]).expect("slow load cached");
    assert!(cached.is_ready());
    // Navigating back is now a cache hit.
    h.transport.previous().await.expect("previous");
    wait_idle(&h).await;
    assert_eq!(h.source.fetch_count(&tracks[0]), 1);
}

/// Wait for the foreground load of the current track only; a held fetch
/// for a superseded track may still be in flight.
async fn wait_current_settled(h: &common::Harness) {
    while h.transport.snapshot().phase == PlaybackPhase::Loading {
        tokio::task::yield_now().await;
    }
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
