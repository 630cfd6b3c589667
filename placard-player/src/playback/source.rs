//! Content resolution
//!
//! Turns a media item's locator into something a render surface can
//! present. Remote URLs pass straight through; inline `data:` payloads
//! and `local:` blobs are materialized into in-memory handles owned by
//! the engine's [`SourceCache`]. Resolution runs off the engine loop and
//! reports back tagged with a generation number, so a fetch that finishes
//! after the engine has already moved on is recognized as stale and
//! dropped instead of clobbering the new item.

use placard_common::blob::{parse_data_url, BlobStore, Locator};
use placard_common::model::MediaItem;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Locally materialized content, exclusively owned by one engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHandle {
    pub media_id: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// A renderable source for the surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedSource {
    /// Remote URL, fetched by the surface itself
    Url(String),
    /// Materialized bytes from a `data:` payload or the local blob cache
    Handle(SourceHandle),
}

/// Outcome of one resolution attempt
#[derive(Debug)]
pub struct ResolvedSource {
    pub generation: u64,
    pub outcome: Result<PreparedSource, String>,
}

/// Resolve a media item's locator, reporting on `tx`.
///
/// Spawned per item; the engine matches `generation` against its current
/// one and discards anything stale. Failures are strings rather than
/// errors because the only consumer logs them and skips on.
pub fn spawn_resolve(
    blobs: Arc<dyn BlobStore>,
    media: MediaItem,
    generation: u64,
    tx: mpsc::Sender<ResolvedSource>,
) {
    tokio::spawn(async move {
        let outcome = resolve(blobs.as_ref(), &media).await;
        // Engine gone during shutdown: nothing to report to
        let _ = tx.send(ResolvedSource { generation, outcome }).await;
    });
}

async fn resolve(blobs: &dyn BlobStore, media: &MediaItem) -> Result<PreparedSource, String> {
    match Locator::parse(&media.src).map_err(|e| e.to_string())? {
        Locator::Http(url) => Ok(PreparedSource::Url(url.to_string())),
        Locator::Data(url) => {
            let decoded = parse_data_url(url).map_err(|e| e.to_string())?;
            Ok(PreparedSource::Handle(SourceHandle {
                media_id: media.id.clone(),
                media_type: decoded.media_type,
                bytes: decoded.bytes,
            }))
        }
        Locator::Local(key) => match blobs.get(key).await.map_err(|e| e.to_string())? {
            Some(bytes) => Ok(PreparedSource::Handle(SourceHandle {
                media_id: media.id.clone(),
                media_type: String::new(),
                bytes,
            })),
            None => Err(format!("blob '{key}' not in local cache")),
        },
    }
}

/// Owner of the single live source handle
///
/// At most one item is on screen, so the cache holds at most one handle.
/// Adopting a new source releases the previous handle; clearing releases
/// the last one at teardown. Either way a handle is released exactly once.
#[derive(Debug, Default)]
pub struct SourceCache {
    slot: Option<SourceHandle>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of the new source's handle, releasing whatever was
    /// held before.
    pub fn adopt(&mut self, source: &PreparedSource) {
        let next = match source {
            PreparedSource::Url(_) => None,
            PreparedSource::Handle(handle) => Some(handle.clone()),
        };
        if let Some(old) = std::mem::replace(&mut self.slot, next) {
            debug!("Released source handle for media {}", old.media_id);
        }
    }

    /// Release the held handle, if any.
    pub fn clear(&mut self) {
        if let Some(old) = self.slot.take() {
            debug!("Released source handle for media {}", old.media_id);
        }
    }
}
