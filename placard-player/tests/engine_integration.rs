//! Integration tests for the playback engine
//!
//! Runs a real engine loop against an in-memory store and a scripted
//! render surface, with item durations in the hundreds of milliseconds so
//! timer-driven advancement is observable without slow tests.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};

use placard_common::blob::{BlobStore, FsBlobStore};
use placard_common::bus::{Command, CommandBus};
use placard_common::catalog::Catalog;
use placard_common::model::{DisplaySettings, MediaItem, MediaType, Playlist, PlaylistItem, Power};
use placard_common::registry::Registry;
use placard_common::store::{ConsumerId, MemoryStateStore};
use placard_player::identity::Identity;
use placard_player::playback::surface::{
    IdleReason, MediaSignal, MediaSignalKind, PresentRequest, RenderSurface,
};
use placard_player::playback::{EngineConfig, InstanceState, PlayerEngine};

#[derive(Debug)]
enum SurfaceCall {
    Present(PresentRequest),
    Seek(f64),
    SetPaused(bool),
    ApplyDisplay(DisplaySettings),
    Clear(IdleReason),
}

/// Surface that records every call for the test to assert on
struct ScriptedSurface {
    tx: mpsc::UnboundedSender<SurfaceCall>,
}

impl RenderSurface for ScriptedSurface {
    fn present(&self, request: PresentRequest) {
        let _ = self.tx.send(SurfaceCall::Present(request));
    }
    fn seek(&self, secs: f64) {
        let _ = self.tx.send(SurfaceCall::Seek(secs));
    }
    fn set_paused(&self, paused: bool) {
        let _ = self.tx.send(SurfaceCall::SetPaused(paused));
    }
    fn apply_display(&self, settings: &DisplaySettings) {
        let _ = self.tx.send(SurfaceCall::ApplyDisplay(settings.clone()));
    }
    fn clear(&self, reason: IdleReason) {
        let _ = self.tx.send(SurfaceCall::Clear(reason));
    }
}

struct Harness {
    admin: Catalog,
    bus: CommandBus,
    bus_origin: ConsumerId,
    shared: Arc<InstanceState>,
    surface_calls: mpsc::UnboundedReceiver<SurfaceCall>,
    signal_tx: mpsc::Sender<MediaSignal>,
    shutdown: watch::Sender<bool>,
    // Keep the temp dirs alive for the duration of the test
    _dirs: (TempDir, TempDir),
    blobs: Arc<dyn BlobStore>,
}

async fn start_engine() -> Harness {
    let store = Arc::new(MemoryStateStore::new());
    let admin = Catalog::new(Arc::clone(&store) as _, ConsumerId::new());
    let bus = CommandBus::new();
    let shared = Arc::new(InstanceState::new());

    let blob_dir = TempDir::new().unwrap();
    let identity_dir = TempDir::new().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(blob_dir.path()));
    let identity = Identity::load_or_create(
        &identity_dir.path().join("device.json"),
        Some("device_engine_test"),
        Some("Test rig"),
    )
    .unwrap();

    let (surface_tx, surface_calls) = mpsc::unbounded_channel();
    let (nudge_tx, _nudge_rx) = mpsc::channel(8);
    let (shutdown, shutdown_rx) = watch::channel(false);

    let engine_catalog = Catalog::new(store as _, ConsumerId::new());
    let engine = PlayerEngine::new(
        engine_catalog.clone(),
        Registry::new(engine_catalog),
        Arc::clone(&blobs),
        bus.clone(),
        Arc::new(ScriptedSurface { tx: surface_tx }),
        Arc::clone(&shared),
        identity,
        nudge_tx,
        shutdown_rx,
    )
    .with_config(EngineConfig {
        tick: Duration::from_millis(200),
        resolve_retry: Duration::from_millis(50),
        media_error_delay: Duration::from_millis(50),
    });
    let signal_tx = engine.signal_sender();
    tokio::spawn(engine.run());

    Harness {
        admin,
        bus_origin: ConsumerId::new(),
        bus,
        shared,
        surface_calls,
        signal_tx,
        shutdown,
        _dirs: (blob_dir, identity_dir),
        blobs,
    }
}

fn image(id: &str, duration: f64) -> MediaItem {
    MediaItem {
        id: id.to_string(),
        kind: MediaType::Image,
        name: format!("Item {id}"),
        src: format!("https://example.com/{id}.png"),
        duration: Some(duration),
        mute: None,
        volume: None,
        looping: None,
        slides: None,
    }
}

fn playlist(id: &str, media_ids: &[&str]) -> Playlist {
    Playlist {
        id: id.to_string(),
        name: id.to_string(),
        items: media_ids
            .iter()
            .enumerate()
            .map(|(i, media_id)| PlaylistItem {
                id: format!("{id}_item_{i}"),
                media_id: media_id.to_string(),
                duration: None,
                start_sec: None,
                end_sec: None,
            })
            .collect(),
        schedule: None,
    }
}

/// Poll until the published now-playing snapshot has the given media id.
async fn wait_for_now_playing(admin: &Catalog, media_id: &str) {
    let deadline = Duration::from_secs(3);
    let admin = admin.clone();
    let media_id = media_id.to_string();
    let wanted = media_id.clone();
    timeout(deadline, async move {
        loop {
            if let Ok(Some(snapshot)) = admin.now_playing().await {
                if snapshot.id == wanted {
                    return snapshot;
                }
            }
            sleep(Duration::from_millis(15)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never started playing '{media_id}'"));
}

/// Pull surface calls until the next Present, failing after a timeout.
async fn next_present(calls: &mut mpsc::UnboundedReceiver<SurfaceCall>) -> PresentRequest {
    timeout(Duration::from_secs(3), async {
        loop {
            match calls.recv().await {
                Some(SurfaceCall::Present(request)) => return request,
                Some(_) => continue,
                None => panic!("surface channel closed"),
            }
        }
    })
    .await
    .expect("no present call arrived")
}

#[tokio::test]
async fn plays_scheduled_playlist_and_advances_on_timers() {
    let harness = start_engine().await;
    harness
        .admin
        .save_media(&[image("m1", 0.2), image("m2", 0.2)])
        .await
        .unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m1", "m2"])])
        .await
        .unwrap();

    // Walks the playlist in order, wrapping back to the start
    wait_for_now_playing(&harness.admin, "m1").await;
    wait_for_now_playing(&harness.admin, "m2").await;
    wait_for_now_playing(&harness.admin, "m1").await;

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn falls_back_to_all_media_when_no_playlist_qualifies() {
    let harness = start_engine().await;
    // Media exists but no playlists at all
    harness.admin.save_media(&[image("m7", 0.3)]).await.unwrap();

    wait_for_now_playing(&harness.admin, "m7").await;
    let current = harness.shared.current().await.unwrap();
    // Synthetic playlist has no real identity
    assert_eq!(current.playlist_id, None);

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn dangling_media_references_are_skipped() {
    let harness = start_engine().await;
    harness.admin.save_media(&[image("m_real", 0.3)]).await.unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m_gone", "m_real"])])
        .await
        .unwrap();

    // The first slot dangles; playback lands on the second
    wait_for_now_playing(&harness.admin, "m_real").await;
    assert_eq!(harness.shared.current().await.unwrap().index, 1);

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn pause_freezes_and_play_resumes_advancement() {
    let mut harness = start_engine().await;
    harness.admin.save_media(&[image("m1", 0.25)]).await.unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m1"])])
        .await
        .unwrap();

    let first = next_present(&mut harness.surface_calls).await;
    assert_eq!(first.media.id, "m1");

    harness
        .bus
        .send(harness.bus_origin, Command::Pause { target_id: None });
    // Give the pause time to land before the 250 ms advance would fire
    sleep(Duration::from_millis(100)).await;
    let paused_at = harness.admin.now_playing().await.unwrap().unwrap().at;

    // Well past the item duration: a single-item playlist would have
    // wrapped and republished by now if the timer were still armed
    sleep(Duration::from_millis(600)).await;
    assert_eq!(
        harness.admin.now_playing().await.unwrap().unwrap().at,
        paused_at
    );

    harness
        .bus
        .send(harness.bus_origin, Command::Play { target_id: None });
    timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(Some(snapshot)) = harness.admin.now_playing().await {
                if snapshot.at > paused_at {
                    return;
                }
            }
            sleep(Duration::from_millis(15)).await;
        }
    })
    .await
    .expect("playback never resumed");

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn next_and_prev_commands_move_the_index() {
    let harness = start_engine().await;
    // Long durations so only commands advance
    harness
        .admin
        .save_media(&[image("m1", 30.0), image("m2", 30.0), image("m3", 30.0)])
        .await
        .unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m1", "m2", "m3"])])
        .await
        .unwrap();

    wait_for_now_playing(&harness.admin, "m1").await;

    harness
        .bus
        .send(harness.bus_origin, Command::Next { target_id: None });
    wait_for_now_playing(&harness.admin, "m2").await;

    // Prev wraps backwards from index 1 to 0
    harness
        .bus
        .send(harness.bus_origin, Command::Prev { target_id: None });
    wait_for_now_playing(&harness.admin, "m1").await;

    // And wraps from 0 to the last item
    harness
        .bus
        .send(harness.bus_origin, Command::Prev { target_id: None });
    wait_for_now_playing(&harness.admin, "m3").await;

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn commands_for_another_device_are_ignored() {
    let harness = start_engine().await;
    harness
        .admin
        .save_media(&[image("m1", 30.0), image("m2", 30.0)])
        .await
        .unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m1", "m2"])])
        .await
        .unwrap();

    wait_for_now_playing(&harness.admin, "m1").await;

    harness.bus.send(
        harness.bus_origin,
        Command::Next {
            target_id: Some("device_someone_else".to_string()),
        },
    );
    sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.admin.now_playing().await.unwrap().unwrap().id, "m1");

    // Targeting this device does work
    harness.bus.send(
        harness.bus_origin,
        Command::Next {
            target_id: Some("device_engine_test".to_string()),
        },
    );
    wait_for_now_playing(&harness.admin, "m2").await;

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn quick_play_override_seeds_the_pinned_index() {
    let harness = start_engine().await;
    harness
        .admin
        .save_media(&[image("a1", 30.0), image("b1", 30.0), image("b2", 0.25)])
        .await
        .unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["a1"]), playlist("pl_b", &["b1", "b2"])])
        .await
        .unwrap();

    // Schedule-free resolution picks the first playlist
    wait_for_now_playing(&harness.admin, "a1").await;

    // Override pins playlist B at index 1
    harness.admin.set_current_play("pl_b", 1).await.unwrap();
    wait_for_now_playing(&harness.admin, "b2").await;
    assert_eq!(harness.shared.current().await.unwrap().index, 1);

    // Seeding happens once: the engine then advances on its own instead
    // of being snapped back to index 1 every poll
    wait_for_now_playing(&harness.admin, "b1").await;

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn stale_override_falls_back_to_schedule_resolution() {
    let harness = start_engine().await;
    harness.admin.save_media(&[image("m1", 30.0)]).await.unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m1"])])
        .await
        .unwrap();
    // Override references a playlist that was deleted
    harness.admin.set_current_play("pl_deleted", 0).await.unwrap();

    wait_for_now_playing(&harness.admin, "m1").await;

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn trimmed_looping_video_restarts_at_the_window_start() {
    let mut harness = start_engine().await;
    let video = MediaItem {
        id: "v1".to_string(),
        kind: MediaType::Video,
        name: "Loop clip".to_string(),
        src: "https://example.com/v1.mp4".to_string(),
        duration: None,
        mute: None,
        volume: Some(0.5),
        looping: Some(true),
        slides: None,
    };
    harness.admin.save_media(&[video]).await.unwrap();

    let mut trimmed = playlist("pl_v", &["v1"]);
    trimmed.items[0].start_sec = Some(5.0);
    trimmed.items[0].end_sec = Some(10.0);
    harness.admin.save_playlists(&[trimmed]).await.unwrap();

    let present = next_present(&mut harness.surface_calls).await;
    assert_eq!(present.media.id, "v1");
    assert_eq!(present.start_at, Some(5.0));
    let generation = present.generation;

    // Every time the position reaches the end of the window, the engine
    // seeks back to the start instead of advancing
    for _ in 0..3 {
        harness
            .signal_tx
            .send(MediaSignal {
                generation,
                kind: MediaSignalKind::Position(10.2),
            })
            .await
            .unwrap();
        let call = timeout(Duration::from_secs(2), harness.surface_calls.recv())
            .await
            .expect("no surface call")
            .unwrap();
        match call {
            SurfaceCall::Seek(secs) => assert_eq!(secs, 5.0),
            other => panic!("expected seek, got {other:?}"),
        }
    }
    // Still the same item on screen
    assert_eq!(harness.admin.now_playing().await.unwrap().unwrap().id, "v1");

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn video_without_duration_advances_on_ended_signal() {
    let mut harness = start_engine().await;
    let video = MediaItem {
        id: "v1".to_string(),
        kind: MediaType::Video,
        name: "Full length".to_string(),
        src: "https://example.com/v1.mp4".to_string(),
        duration: None,
        mute: None,
        volume: None,
        looping: None,
        slides: None,
    };
    harness
        .admin
        .save_media(&[video, image("m2", 30.0)])
        .await
        .unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["v1", "m2"])])
        .await
        .unwrap();

    let present = next_present(&mut harness.surface_calls).await;
    assert_eq!(present.media.id, "v1");

    // A stale Ended from a previous generation is discarded
    harness
        .signal_tx
        .send(MediaSignal {
            generation: present.generation.wrapping_sub(1),
            kind: MediaSignalKind::Ended,
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.admin.now_playing().await.unwrap().unwrap().id, "v1");

    harness
        .signal_tx
        .send(MediaSignal {
            generation: present.generation,
            kind: MediaSignalKind::Ended,
        })
        .await
        .unwrap();
    wait_for_now_playing(&harness.admin, "m2").await;

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn failed_local_blob_resolution_skips_to_the_next_item() {
    let harness = start_engine().await;
    let mut broken = image("m_broken", 30.0);
    // local: locator with nothing behind it in the blob cache
    broken.src = "local:m_broken".to_string();
    harness
        .admin
        .save_media(&[broken, image("m_ok", 30.0)])
        .await
        .unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m_broken", "m_ok"])])
        .await
        .unwrap();

    // Resolution fails, engine waits the retry delay, then moves on
    wait_for_now_playing(&harness.admin, "m_ok").await;

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn local_blob_sources_are_materialized() {
    let mut harness = start_engine().await;
    harness.blobs.put("m_local", b"png bytes").await.unwrap();
    let mut local = image("m_local", 30.0);
    local.src = "local:m_local".to_string();
    harness.admin.save_media(&[local]).await.unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m_local"])])
        .await
        .unwrap();

    let present = next_present(&mut harness.surface_calls).await;
    match present.source {
        placard_player::playback::source::PreparedSource::Handle(handle) => {
            assert_eq!(handle.media_id, "m_local");
            assert_eq!(handle.bytes, b"png bytes");
        }
        other => panic!("expected materialized handle, got {other:?}"),
    }

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn presentation_steps_through_slides_then_advances() {
    let harness = start_engine().await;
    let deck = MediaItem {
        id: "p1".to_string(),
        kind: MediaType::Presentation,
        name: "Deck".to_string(),
        src: "https://example.com/deck".to_string(),
        duration: Some(0.3),
        mute: None,
        volume: None,
        looping: None,
        slides: Some(3),
    };
    harness
        .admin
        .save_media(&[deck, image("m2", 30.0)])
        .await
        .unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["p1", "m2"])])
        .await
        .unwrap();

    // Each slide republishes the snapshot with its counter in the name
    let deadline = Duration::from_secs(3);
    let mut seen = Vec::new();
    timeout(deadline, async {
        loop {
            if let Ok(Some(snapshot)) = harness.admin.now_playing().await {
                if !seen.contains(&snapshot.name) {
                    seen.push(snapshot.name.clone());
                }
                if snapshot.id == "m2" {
                    return;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("presentation never finished");

    assert!(seen.contains(&"Deck - Slide 1/3".to_string()), "saw {seen:?}");
    assert!(seen.contains(&"Deck - Slide 2/3".to_string()), "saw {seen:?}");

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn display_settings_changes_reach_the_surface() {
    let mut harness = start_engine().await;
    harness.admin.save_media(&[image("m1", 30.0)]).await.unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m1"])])
        .await
        .unwrap();
    wait_for_now_playing(&harness.admin, "m1").await;

    let settings = DisplaySettings {
        power: Power::Off,
        ..DisplaySettings::default()
    };
    harness.admin.save_display_settings(&settings).await.unwrap();

    timeout(Duration::from_secs(3), async {
        loop {
            match harness.surface_calls.recv().await {
                Some(SurfaceCall::ApplyDisplay(applied)) if applied.power == Power::Off => return,
                Some(_) => continue,
                None => panic!("surface channel closed"),
            }
        }
    })
    .await
    .expect("display settings never applied");

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn power_off_blanks_the_output_but_playback_keeps_walking() {
    let mut harness = start_engine().await;
    // Long durations so only commands advance
    harness
        .admin
        .save_media(&[image("m1", 30.0), image("m2", 30.0)])
        .await
        .unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m1", "m2"])])
        .await
        .unwrap();

    let first = next_present(&mut harness.surface_calls).await;
    assert_eq!(first.media.id, "m1");

    let off = DisplaySettings {
        power: Power::Off,
        ..DisplaySettings::default()
    };
    harness.admin.save_display_settings(&off).await.unwrap();

    // The surface goes dark when power turns off
    timeout(Duration::from_secs(3), async {
        loop {
            match harness.surface_calls.recv().await {
                Some(SurfaceCall::Clear(IdleReason::PowerOff)) => return,
                Some(_) => continue,
                None => panic!("surface channel closed"),
            }
        }
    })
    .await
    .expect("surface never cleared for power off");

    // The machine still takes commands while the output is dark
    harness
        .bus
        .send(harness.bus_origin, Command::Next { target_id: None });
    wait_for_now_playing(&harness.admin, "m2").await;
    let dark = next_present(&mut harness.surface_calls).await;
    assert_eq!(dark.media.id, "m2");

    // Power restored: the current item is handed to the surface again
    harness
        .admin
        .save_display_settings(&DisplaySettings::default())
        .await
        .unwrap();
    let restored = next_present(&mut harness.surface_calls).await;
    assert_eq!(restored.media.id, "m2");

    let _ = harness.shutdown.send(true);
}

#[tokio::test]
async fn emptied_catalog_blanks_the_display() {
    let harness = start_engine().await;
    harness.admin.save_media(&[image("m1", 30.0)]).await.unwrap();
    harness
        .admin
        .save_playlists(&[playlist("pl_a", &["m1"])])
        .await
        .unwrap();
    wait_for_now_playing(&harness.admin, "m1").await;

    // Everything removed: the engine idles and clears its snapshot
    harness.admin.save_playlists(&[]).await.unwrap();
    harness.admin.save_media(&[]).await.unwrap();

    timeout(Duration::from_secs(3), async {
        loop {
            if harness.admin.now_playing().await.unwrap().is_none() {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("snapshot never cleared");

    let _ = harness.shutdown.send(true);
}
