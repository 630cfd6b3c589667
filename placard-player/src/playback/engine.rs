//! Per-instance playback engine
//!
//! One `select!` loop drives everything a player does: re-resolving the
//! active playlist on a poll tick or store change, walking the playlist
//! on advance timers and media signals, and acting on remote commands.
//! All triggers funnel into this loop, so state transitions never race
//! each other; anything asynchronous (content resolution) re-enters the
//! loop tagged with a generation number and is discarded when stale.

use crate::identity::Identity;
use crate::playback::source::{spawn_resolve, PreparedSource, ResolvedSource, SourceCache};
use crate::playback::state::{CurrentItem, EngineState, InstanceState, PlayerEvent};
use crate::playback::surface::{IdleReason, MediaSignal, MediaSignalKind, PresentRequest, RenderSurface};
use crate::playback::timing::{advance_rule, AdvanceRule};
use placard_common::blob::BlobStore;
use placard_common::bus::{Command, CommandBus};
use placard_common::catalog::Catalog;
use placard_common::model::{CurrentPlay, DisplaySettings, MediaItem, NowPlaying, PlaylistItem, Power};
use placard_common::registry::Registry;
use placard_common::schedule::{resolve_active_playlist, ActiveOrigin, ActivePlaylist};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Engine timing knobs, shortened in tests
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Poll interval for store re-reads and schedule re-resolution
    pub tick: Duration,
    /// Wait before skipping an item whose locator failed to resolve
    pub resolve_retry: Duration,
    /// Wait before skipping an item the surface failed to play
    pub media_error_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            resolve_retry: Duration::from_secs(1),
            media_error_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeadlineAction {
    AdvanceItem,
    NextSlide,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    at: Instant,
    action: DeadlineAction,
}

/// The playback state machine for one player instance
pub struct PlayerEngine {
    catalog: Catalog,
    registry: Registry,
    blobs: Arc<dyn BlobStore>,
    bus: CommandBus,
    surface: Arc<dyn RenderSurface>,
    shared: Arc<InstanceState>,
    identity: Identity,
    beat_nudge: mpsc::Sender<()>,
    config: EngineConfig,

    // Channels back into the loop. The engine keeps a sender for each so
    // the receiving side can never observe a closed channel.
    signal_tx: mpsc::Sender<MediaSignal>,
    signals: Option<mpsc::Receiver<MediaSignal>>,
    resolve_tx: mpsc::Sender<ResolvedSource>,
    resolve_rx: Option<mpsc::Receiver<ResolvedSource>>,
    shutdown: Option<watch::Receiver<bool>>,

    // Loop state, only touched from inside run()
    state: EngineState,
    active: Option<ActivePlaylist>,
    index: usize,
    current: Option<(PlaylistItem, MediaItem)>,
    rule: Option<AdvanceRule>,
    paused: bool,
    generation: u64,
    deadline: Option<Pending>,
    slide: u32,
    adopted_override: Option<CurrentPlay>,
    cache: SourceCache,
    display: Option<DisplaySettings>,
}

impl PlayerEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Catalog,
        registry: Registry,
        blobs: Arc<dyn BlobStore>,
        bus: CommandBus,
        surface: Arc<dyn RenderSurface>,
        shared: Arc<InstanceState>,
        identity: Identity,
        beat_nudge: mpsc::Sender<()>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(32);
        let (resolve_tx, resolve_rx) = mpsc::channel(8);
        Self {
            catalog,
            registry,
            blobs,
            bus,
            surface,
            shared,
            identity,
            beat_nudge,
            config: EngineConfig::default(),
            signal_tx,
            signals: Some(signal_rx),
            resolve_tx,
            resolve_rx: Some(resolve_rx),
            shutdown: Some(shutdown),
            state: EngineState::NoMedia,
            active: None,
            index: 0,
            current: None,
            rule: None,
            paused: false,
            generation: 0,
            deadline: None,
            slide: 0,
            adopted_override: None,
            cache: SourceCache::new(),
            display: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sender for the render surface to report media signals on.
    pub fn signal_sender(&self) -> mpsc::Sender<MediaSignal> {
        self.signal_tx.clone()
    }

    /// Run the engine until shutdown. Consumes the engine; spawn it.
    pub async fn run(mut self) {
        let Some(mut signals) = self.signals.take() else {
            return;
        };
        let Some(mut resolve_rx) = self.resolve_rx.take() else {
            return;
        };
        let Some(mut shutdown) = self.shutdown.take() else {
            return;
        };

        let mut changes = self.catalog.watch();
        let mut commands = self.bus.subscribe(self.catalog.consumer_id());
        let mut tick = interval(self.config.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Playback engine started for device {}", self.identity.device_id());

        loop {
            let next_deadline = self.deadline.map(|p| p.at);
            tokio::select! {
                _ = tick.tick() => {
                    self.refresh().await;
                }
                Some(notice) = changes.recv() => {
                    debug!("Store change on '{}', refreshing", notice.key);
                    self.refresh().await;
                }
                Some(command) = commands.recv() => {
                    self.handle_command(command).await;
                }
                Some(resolved) = resolve_rx.recv() => {
                    self.on_source_resolved(resolved).await;
                }
                Some(signal) = signals.recv() => {
                    self.on_media_signal(signal).await;
                }
                _ = async { sleep_until(next_deadline.unwrap_or_else(Instant::now)).await },
                        if next_deadline.is_some() => {
                    self.on_deadline().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.teardown();
    }

    /// Re-read shared state and reconcile what should be playing.
    async fn refresh(&mut self) {
        let playlists = match self.catalog.playlists().await {
            Ok(playlists) => playlists,
            Err(e) => {
                warn!("Failed to read playlists, keeping current playback: {}", e);
                return;
            }
        };
        let media = match self.catalog.media().await {
            Ok(media) => media,
            Err(e) => {
                warn!("Failed to read media, keeping current playback: {}", e);
                return;
            }
        };
        let observed = self.catalog.current_play().await.unwrap_or_default();

        self.apply_display_settings().await;

        let active = resolve_active_playlist(
            &playlists,
            &media,
            observed.as_ref(),
            &placard_common::time::local_now(),
        );
        self.reconcile(active, observed, &media).await;
    }

    async fn apply_display_settings(&mut self) {
        let settings = match self.catalog.display_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to read display settings: {}", e);
                return;
            }
        };
        if self.display.as_ref() == Some(&settings) {
            return;
        }
        let was_off = self.display.as_ref().is_some_and(|d| d.power == Power::Off);
        self.surface.apply_display(&settings);
        if settings.power == Power::Off {
            // Output goes dark but the machine keeps walking the playlist
            self.surface.clear(IdleReason::PowerOff);
        } else if was_off {
            // Output restored: hand the surface the current item again
            if let Some((_, media)) = self.current.clone() {
                self.generation += 1;
                self.set_state(EngineState::LoadingSource).await;
                spawn_resolve(
                    Arc::clone(&self.blobs),
                    media,
                    self.generation,
                    self.resolve_tx.clone(),
                );
            }
        }
        self.display = Some(settings);
    }

    /// Decide whether the freshly resolved selection requires a reload.
    async fn reconcile(
        &mut self,
        active: Option<ActivePlaylist>,
        observed: Option<CurrentPlay>,
        media: &[MediaItem],
    ) {
        let Some(active) = active else {
            self.active = None;
            self.adopted_override = observed;
            self.go_idle().await;
            return;
        };

        if observed.is_none() {
            self.adopted_override = None;
        }

        let identity_changed = {
            let old = self.active.as_ref().and_then(|a| a.identity());
            active.identity() != old
        };

        // A manual override seeds the index once per distinct value; after
        // that the player advances on its own and is not snapped back.
        if active.origin == ActiveOrigin::Override && observed != self.adopted_override {
            self.adopted_override = observed;
            let seed = active.seed_index;
            self.load(active, seed, media).await;
            return;
        }

        if identity_changed {
            let seed = active.seed_index;
            self.load(active, seed, media).await;
            return;
        }

        let count = active.playlist.items.len();
        if self.index >= count {
            // Item list shrank under us
            self.load(active, 0, media).await;
            return;
        }

        // In-place playlist edit: the slot we're on now holds a different item
        let slot_changed = self
            .current
            .as_ref()
            .is_some_and(|(item, _)| item.id != active.playlist.items[self.index].id);
        if slot_changed {
            let index = self.index;
            self.load(active, index, media).await;
            return;
        }

        if self.current.is_none() && self.state == EngineState::NoMedia {
            // Nothing on screen but something is resolvable now
            let seed = active.seed_index;
            self.load(active, seed, media).await;
            return;
        }

        self.active = Some(active);
    }

    /// Enter `LoadingSource` for the first playable item at or after
    /// `start_index`, skipping slots whose media no longer exists.
    async fn load(&mut self, active: ActivePlaylist, start_index: usize, media: &[MediaItem]) {
        self.cancel_deadline();
        self.generation += 1;
        self.slide = 0;

        let count = active.playlist.items.len();
        if count == 0 {
            self.active = Some(active);
            self.go_idle().await;
            return;
        }

        let found = (0..count).find_map(|step| {
            let idx = (start_index + step) % count;
            let item = &active.playlist.items[idx];
            media
                .iter()
                .find(|m| m.id == item.media_id)
                .map(|m| (idx, item.clone(), m.clone()))
        });
        self.active = Some(active);
        let Some((index, item, media_item)) = found else {
            debug!("No playable item in active playlist, going idle");
            self.go_idle().await;
            return;
        };

        self.index = index;
        self.current = Some((item, media_item.clone()));
        self.rule = None;
        self.set_state(EngineState::LoadingSource).await;
        spawn_resolve(
            Arc::clone(&self.blobs),
            media_item,
            self.generation,
            self.resolve_tx.clone(),
        );
    }

    async fn on_source_resolved(&mut self, resolved: ResolvedSource) {
        if resolved.generation != self.generation {
            debug!("Discarding stale source resolution");
            return;
        }
        match resolved.outcome {
            Ok(source) => self.present(source).await,
            Err(msg) => {
                warn!("Source resolution failed, skipping item: {}", msg);
                self.schedule(self.config.resolve_retry, DeadlineAction::AdvanceItem);
            }
        }
    }

    /// Put the resolved item on the surface and arm its advance rule.
    async fn present(&mut self, source: PreparedSource) {
        let Some((item, media)) = self.current.clone() else {
            return;
        };

        self.cache.adopt(&source);
        let rule = advance_rule(&item, &media);
        let start_at = match &rule {
            AdvanceRule::TrimWatch(window) => Some(window.start_sec),
            _ => None,
        };
        self.surface.present(PresentRequest {
            generation: self.generation,
            media: media.clone(),
            source,
            start_at,
            paused: self.paused,
        });

        self.cancel_deadline();
        if !self.paused {
            match &rule {
                AdvanceRule::After(duration) => {
                    self.schedule(*duration, DeadlineAction::AdvanceItem)
                }
                AdvanceRule::Slides { per_slide, .. } => {
                    self.schedule(*per_slide, DeadlineAction::NextSlide)
                }
                // Ended signals or trim positions drive these
                AdvanceRule::AwaitEnded
                | AdvanceRule::TrimWatch(_)
                | AdvanceRule::LoopForever => {}
            }
        }
        self.rule = Some(rule);
        self.set_state(if self.paused {
            EngineState::Paused
        } else {
            EngineState::Playing
        })
        .await;
        self.publish_snapshot().await;
    }

    async fn on_media_signal(&mut self, signal: MediaSignal) {
        if signal.generation != self.generation {
            debug!("Discarding stale media signal");
            return;
        }
        if let MediaSignalKind::Failed(msg) = &signal.kind {
            warn!("Surface failed to play current item: {}", msg);
            self.schedule(self.config.media_error_delay, DeadlineAction::AdvanceItem);
            return;
        }
        if self.paused {
            return;
        }
        match signal.kind {
            MediaSignalKind::Ended => match self.rule {
                Some(AdvanceRule::AwaitEnded) => self.advance(1).await,
                // Looping and trimmed videos restart instead; timed items
                // advance on their own clock.
                _ => {}
            },
            MediaSignalKind::Position(position) => {
                if let Some(AdvanceRule::TrimWatch(window)) = self.rule {
                    if position >= window.end_sec {
                        if window.looping {
                            self.surface.seek(window.start_sec);
                        } else {
                            self.advance(1).await;
                        }
                    }
                }
            }
            MediaSignalKind::Failed(_) => {}
        }
    }

    async fn on_deadline(&mut self) {
        let Some(pending) = self.deadline.take() else {
            return;
        };
        match pending.action {
            DeadlineAction::AdvanceItem => self.advance(1).await,
            DeadlineAction::NextSlide => {
                let Some(AdvanceRule::Slides { count, per_slide }) = self.rule else {
                    return;
                };
                if self.slide + 1 >= count {
                    self.advance(1).await;
                } else {
                    self.slide += 1;
                    self.schedule(per_slide, DeadlineAction::NextSlide);
                    self.publish_snapshot().await;
                }
            }
        }
    }

    /// Hop to the neighbouring playlist slot, wrapping at either end.
    async fn advance(&mut self, direction: i64) {
        let Some(active) = self.active.clone() else {
            return;
        };
        let count = active.playlist.items.len();
        if count == 0 {
            self.go_idle().await;
            return;
        }
        self.set_state(EngineState::Advancing).await;
        let next = (self.index as i64 + direction).rem_euclid(count as i64) as usize;
        let media = match self.catalog.media().await {
            Ok(media) => media,
            Err(e) => {
                warn!("Failed to read media while advancing: {}", e);
                Vec::new()
            }
        };
        self.load(active, next, &media).await;
    }

    async fn handle_command(&mut self, command: Command) {
        if !command.is_for(self.identity.device_id()) {
            return;
        }
        // Command receipt proves we're alive; beat immediately
        let _ = self.beat_nudge.try_send(());
        self.shared.broadcast_event(PlayerEvent::CommandReceived {
            command: command.clone(),
        });

        match command {
            Command::SetCurrentPlay {
                playlist_id, index, ..
            } => self.handle_set_current_play(playlist_id, index).await,
            Command::Play { .. } => self.resume().await,
            Command::Pause { .. } => self.pause().await,
            Command::Next { .. } => {
                self.paused = false;
                self.surface.set_paused(false);
                self.advance(1).await;
            }
            Command::Prev { .. } => {
                self.paused = false;
                self.surface.set_paused(false);
                self.advance(-1).await;
            }
            Command::Rename { name, .. } => {
                if let Err(e) = self.identity.rename(&name) {
                    warn!("Failed to persist device name: {}", e);
                }
                if let Err(e) = self.registry.rename(self.identity.device_id(), &name).await {
                    warn!("Failed to update registry name: {}", e);
                }
                info!("Device renamed to '{}'", name);
            }
        }
    }

    /// Jump to a pinned playlist position, validating against the store
    /// rather than trusting the command payload.
    async fn handle_set_current_play(&mut self, playlist_id: String, index: usize) {
        let playlists = match self.catalog.playlists().await {
            Ok(playlists) => playlists,
            Err(e) => {
                warn!("Failed to read playlists for setCurrentPlay: {}", e);
                return;
            }
        };
        let media = self.catalog.media().await.unwrap_or_default();

        let Some(playlist) = playlists.into_iter().find(|p| p.id == playlist_id) else {
            debug!("setCurrentPlay for unknown playlist '{}', ignoring", playlist_id);
            return;
        };
        if playlist.items.len() <= index {
            debug!("setCurrentPlay index {} out of range, ignoring", index);
            return;
        }

        self.paused = false;
        self.surface.set_paused(false);
        self.adopted_override = Some(CurrentPlay {
            playlist_id: playlist.id.clone(),
            index,
        });
        let active = ActivePlaylist {
            playlist,
            origin: ActiveOrigin::Override,
            seed_index: index,
        };
        self.load(active, index, &media).await;
    }

    async fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.cancel_deadline();
        self.surface.set_paused(true);
        if self.state == EngineState::Playing {
            self.set_state(EngineState::Paused).await;
        }
    }

    async fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.surface.set_paused(false);
        if self.state == EngineState::Paused {
            self.set_state(EngineState::Playing).await;
            // Elapsed display time before the pause is not credited: the
            // item gets its full duration again.
            match self.rule {
                Some(AdvanceRule::After(duration)) => {
                    self.schedule(duration, DeadlineAction::AdvanceItem)
                }
                Some(AdvanceRule::Slides { per_slide, .. }) => {
                    self.schedule(per_slide, DeadlineAction::NextSlide)
                }
                _ => {}
            }
        }
    }

    /// Blank the display. Publishes the cleared snapshot only on the
    /// transition, not every idle tick.
    async fn go_idle(&mut self) {
        self.cancel_deadline();
        self.cache.clear();
        self.current = None;
        self.rule = None;
        if self.state != EngineState::NoMedia {
            self.generation += 1;
            self.surface.clear(IdleReason::NoContent);
            self.set_state(EngineState::NoMedia).await;
            if let Err(e) = self.catalog.publish_now_playing(None).await {
                warn!("Failed to publish cleared snapshot: {}", e);
            }
            self.shared.set_current(None).await;
        }
    }

    /// Publish what just went on screen, synchronously with the
    /// transition: store first (the durable backstop), then the local
    /// observers.
    async fn publish_snapshot(&mut self) {
        let Some((_, media)) = &self.current else {
            return;
        };
        let slide = match self.rule {
            Some(AdvanceRule::Slides { count, .. }) => Some((self.slide + 1, count)),
            _ => None,
        };
        let snapshot = snapshot_for(media, slide);
        if let Err(e) = self.catalog.publish_now_playing(Some(&snapshot)).await {
            warn!("Failed to publish now-playing snapshot: {}", e);
        }
        self.shared
            .set_current(Some(CurrentItem {
                playlist_id: self
                    .active
                    .as_ref()
                    .and_then(|a| a.identity())
                    .map(str::to_string),
                index: self.index,
                snapshot,
            }))
            .await;
    }

    async fn set_state(&mut self, state: EngineState) {
        self.state = state;
        self.shared.set_engine_state(state).await;
    }

    fn schedule(&mut self, delay: Duration, action: DeadlineAction) {
        self.deadline = Some(Pending {
            at: Instant::now() + delay,
            action,
        });
    }

    fn cancel_deadline(&mut self) {
        self.deadline = None;
    }

    fn teardown(&mut self) {
        info!("Playback engine shutting down");
        self.cancel_deadline();
        self.cache.clear();
        // The last snapshot stays in the store so dashboards show what
        // this device was playing when it went away.
        self.surface.clear(IdleReason::NoContent);
    }
}

/// Build the published snapshot for a media item, with the slide counter
/// folded into the name for presentations.
fn snapshot_for(media: &MediaItem, slide: Option<(u32, u32)>) -> NowPlaying {
    let name = match slide {
        Some((current, total)) => format!("{} - Slide {}/{}", media.name, current, total),
        None => media.name.clone(),
    };
    NowPlaying {
        id: media.id.clone(),
        name,
        kind: media.kind,
        src: media.src.clone(),
        at: placard_common::time::now_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placard_common::model::MediaType;

    fn media(kind: MediaType) -> MediaItem {
        MediaItem {
            id: "m1".to_string(),
            kind,
            name: "Quarterly Review".to_string(),
            src: "https://example.com/deck".to_string(),
            duration: None,
            mute: None,
            volume: None,
            looping: None,
            slides: None,
        }
    }

    #[test]
    fn snapshot_carries_media_fields() {
        let snapshot = snapshot_for(&media(MediaType::Image), None);
        assert_eq!(snapshot.id, "m1");
        assert_eq!(snapshot.name, "Quarterly Review");
        assert_eq!(snapshot.kind, MediaType::Image);
        assert!(snapshot.at > 0);
    }

    #[test]
    fn snapshot_names_the_current_slide() {
        let snapshot = snapshot_for(&media(MediaType::Presentation), Some((2, 5)));
        assert_eq!(snapshot.name, "Quarterly Review - Slide 2/5");
    }
}
