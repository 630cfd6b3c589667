//! Shared playback state
//!
//! Thread-safe view of what this instance is doing, read by the control
//! API while the engine loop mutates it. Also carries the event
//! broadcaster feeding the SSE endpoint.

use placard_common::bus::Command;
use placard_common::model::NowPlaying;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

/// Playback engine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineState {
    /// Nothing resolvable to show; surface is blank
    NoMedia,
    /// Resolving the current item's content locator
    LoadingSource,
    Playing,
    Paused,
    /// Transient hop between items
    Advancing,
}

/// Where the current item came from, for the state endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentItem {
    /// Real playlist id, or `None` for the synthetic all-media fallback
    pub playlist_id: Option<String>,
    pub index: usize,
    pub snapshot: NowPlaying,
}

/// Events mirrored out to SSE observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PlayerEvent {
    StateChanged { state: EngineState },
    NowPlayingChanged { snapshot: Option<NowPlaying> },
    CommandReceived { command: Command },
}

/// Shared state accessible by the engine, API handlers, and SSE stream
pub struct InstanceState {
    engine_state: RwLock<EngineState>,
    current: RwLock<Option<CurrentItem>>,
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl InstanceState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            engine_state: RwLock::new(EngineState::NoMedia),
            current: RwLock::new(None),
            event_tx,
        }
    }

    pub async fn engine_state(&self) -> EngineState {
        *self.engine_state.read().await
    }

    pub async fn set_engine_state(&self, state: EngineState) {
        let changed = {
            let mut guard = self.engine_state.write().await;
            let changed = *guard != state;
            *guard = state;
            changed
        };
        // Advancing flickers by for milliseconds; observers only care
        // about states something can rest in.
        if changed && state != EngineState::Advancing {
            self.broadcast_event(PlayerEvent::StateChanged { state });
        }
    }

    pub async fn current(&self) -> Option<CurrentItem> {
        self.current.read().await.clone()
    }

    pub async fn set_current(&self, current: Option<CurrentItem>) {
        let snapshot = current.as_ref().map(|c| c.snapshot.clone());
        *self.current.write().await = current;
        self.broadcast_event(PlayerEvent::NowPlayingChanged { snapshot });
    }

    /// Fan an event out to SSE listeners. No listeners is fine.
    pub fn broadcast_event(&self, event: PlayerEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for InstanceState {
    fn default() -> Self {
        Self::new()
    }
}
