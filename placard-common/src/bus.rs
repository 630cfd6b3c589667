//! Control command bus
//!
//! Best-effort, at-most-once fan-out of control commands between
//! components in the same process. Delivery is instantaneous or not at
//! all: a command sent while a receiver lags is dropped for that receiver,
//! and nothing is replayed to late subscribers. Durable intent (the manual
//! override, display settings) always goes through the state store as
//! well, so a missed command costs at most one poll interval of latency.
//!
//! Like change feeds, a subscriber never receives commands it sent itself.

use crate::model::CurrentPlay;
use crate::store::ConsumerId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

const BUS_CAPACITY: usize = 64;

/// A control command addressed to every player or to one device
///
/// `target_id` of `None` broadcasts to all players; otherwise only the
/// named device acts on the command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// Pin all players to a playlist position, clearing any pause
    SetCurrentPlay {
        playlist_id: String,
        index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>,
    },
    /// Resume playback
    Play {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>,
    },
    /// Hold the current item on screen
    Pause {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>,
    },
    /// Advance to the next item, wrapping at the end
    Next {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>,
    },
    /// Step back to the previous item, wrapping at the start
    Prev {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>,
    },
    /// Give a device a human-readable name
    Rename {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<String>,
    },
}

impl Command {
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Command::SetCurrentPlay { target_id, .. }
            | Command::Play { target_id }
            | Command::Pause { target_id }
            | Command::Next { target_id }
            | Command::Prev { target_id }
            | Command::Rename { target_id, .. } => target_id.as_deref(),
        }
    }

    /// Should the given device act on this command?
    pub fn is_for(&self, device_id: &str) -> bool {
        match self.target_id() {
            None => true,
            Some(target) => target == device_id,
        }
    }

    /// Convenience constructor for the common broadcast override
    pub fn set_current_play(play: &CurrentPlay) -> Self {
        Command::SetCurrentPlay {
            playlist_id: play.playlist_id.clone(),
            index: play.index,
            target_id: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: ConsumerId,
    command: Command,
}

/// In-process command fan-out
#[derive(Clone)]
pub struct CommandBus {
    tx: broadcast::Sender<Envelope>,
}

impl CommandBus {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Send a command to every other subscriber. Fire and forget: with no
    /// subscribers the command simply evaporates.
    pub fn send(&self, origin: ConsumerId, command: Command) {
        let _ = self.tx.send(Envelope { origin, command });
    }

    pub fn subscribe(&self, me: ConsumerId) -> BusFeed {
        BusFeed {
            rx: self.tx.subscribe(),
            me,
        }
    }
}

/// Receiving side of the command bus for one consumer
pub struct BusFeed {
    rx: broadcast::Receiver<Envelope>,
    me: ConsumerId,
}

impl BusFeed {
    /// Wait for the next command sent by someone else.
    ///
    /// Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Command> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.origin == self.me => continue,
                Ok(envelope) => return Some(envelope.command),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Command feed lagged, dropped {} commands", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
