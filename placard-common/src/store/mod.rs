//! Shared state store
//!
//! All coordination between placard services happens through a small
//! key-value store of JSON strings. Writers replace whole values; there is
//! no locking or transaction spanning multiple keys, so readers may observe
//! one key updated before another. Consumers tolerate that by re-reading
//! and converging on the next change notification or poll.
//!
//! Every write carries the [`ConsumerId`] of the writer. Change feeds skip
//! notifications for a consumer's own writes, so a service never reacts to
//! state it just published itself.

mod memory;
mod sqlite;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

use crate::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use uuid::Uuid;

/// Well-known store keys
pub mod keys {
    /// JSON array of `MediaItem`
    pub const MEDIA: &str = "placard:media";
    /// JSON array of `Playlist`
    pub const PLAYLISTS: &str = "placard:playlists";
    /// JSON object `DisplaySettings`
    pub const DISPLAY: &str = "placard:display";
    /// JSON object `CurrentPlay`, absent when no manual override is active
    pub const CURRENT_PLAY: &str = "placard:currentPlay";
    /// JSON object `NowPlaying` or `null`
    pub const NOW_PLAYING: &str = "placard:nowPlaying";
    /// JSON array of `Device`
    pub const DEVICES: &str = "placard:devices";
    /// Monotonic change token, bumped alongside override writes
    pub const REVISION: &str = "placard:revision";
}

/// Identity of one store consumer within a process
///
/// Each independently-acting component (playback engine, control API,
/// heartbeat service) holds its own id so self-notification filtering
/// works per component rather than per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(Uuid);

impl ConsumerId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Notification that some key changed
#[derive(Debug, Clone)]
pub struct ChangeNotice {
    pub key: String,
    pub origin: ConsumerId,
}

/// Receiver of change notifications for one consumer
///
/// Notifications originated by the owning consumer are filtered out.
/// A lagged receiver drops missed notifications and keeps going; the
/// consumer's periodic re-read covers whatever was missed.
pub struct ChangeFeed {
    rx: broadcast::Receiver<ChangeNotice>,
    me: ConsumerId,
}

impl ChangeFeed {
    pub(crate) fn new(rx: broadcast::Receiver<ChangeNotice>, me: ConsumerId) -> Self {
        Self { rx, me }
    }

    /// Wait for the next change made by someone else.
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        loop {
            match self.rx.recv().await {
                Ok(notice) if notice.origin == self.me => continue,
                Ok(notice) => return Some(notice),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Change feed lagged, skipped {} notifications", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Backend-agnostic interface to the shared state store
///
/// Values are opaque JSON strings; typed access lives in
/// [`crate::catalog::Catalog`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the current value of a key, `None` if unset.
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value of a key, notifying all other consumers.
    async fn write(&self, key: &str, value: &str, origin: ConsumerId) -> Result<()>;

    /// Remove a key, notifying all other consumers.
    async fn remove(&self, key: &str, origin: ConsumerId) -> Result<()>;

    /// Subscribe to change notifications, excluding `me`'s own writes.
    fn watch(&self, me: ConsumerId) -> ChangeFeed;
}
