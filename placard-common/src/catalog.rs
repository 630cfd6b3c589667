//! Typed access to the shared state store
//!
//! The catalog wraps a [`StateStore`] with the JSON encoding and decoding
//! for each well-known key. Reads never fail on bad data: a corrupt or
//! missing value decodes to its default so one mangled write cannot take
//! every player down. Writes propagate real errors, since losing an
//! operator's edit silently would be worse.

use crate::blob::{BlobStore, Locator};
use crate::ids::uid;
use crate::model::{CurrentPlay, Device, DisplaySettings, MediaItem, NowPlaying, Playlist};
use crate::store::{keys, ChangeFeed, ConsumerId, StateStore};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Catalog of shared signage state, bound to one consumer identity
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn StateStore>,
    me: ConsumerId,
}

impl Catalog {
    pub fn new(store: Arc<dyn StateStore>, me: ConsumerId) -> Self {
        Self { store, me }
    }

    pub fn consumer_id(&self) -> ConsumerId {
        self.me
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    /// Change feed excluding this catalog's own writes.
    pub fn watch(&self) -> ChangeFeed {
        self.store.watch(self.me)
    }

    async fn read_or_default<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.store.read(key).await? {
            None => Ok(T::default()),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(value),
                Err(e) => {
                    warn!("Corrupt value under '{}', using default: {}", key, e);
                    Ok(T::default())
                }
            },
        }
    }

    async fn read_optional<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.store.read(key).await? {
            None => Ok(None),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(value),
                Err(e) => {
                    warn!("Corrupt value under '{}', ignoring: {}", key, e);
                    Ok(None)
                }
            },
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store.write(key, &raw, self.me).await
    }

    pub async fn media(&self) -> Result<Vec<MediaItem>> {
        self.read_or_default(keys::MEDIA).await
    }

    pub async fn save_media(&self, media: &[MediaItem]) -> Result<()> {
        self.write_json(keys::MEDIA, &media).await
    }

    /// Remove a media item from the library, releasing its local blob.
    ///
    /// Playlist slots referencing the removed item become dangling and are
    /// skipped by players. A failed blob delete leaves a stray cache file,
    /// which is tolerable; the catalog edit itself has already landed.
    pub async fn remove_media(&self, blobs: &dyn BlobStore, media_id: &str) -> Result<()> {
        let mut media = self.media().await?;
        let Some(pos) = media.iter().position(|m| m.id == media_id) else {
            return Err(crate::Error::NotFound(format!("media '{media_id}'")));
        };
        let removed = media.remove(pos);
        self.save_media(&media).await?;

        if let Ok(Locator::Local(key)) = Locator::parse(&removed.src) {
            if let Err(e) = blobs.delete(key).await {
                warn!("Failed to delete blob '{}' for removed media: {}", key, e);
            }
        }
        Ok(())
    }

    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        self.read_or_default(keys::PLAYLISTS).await
    }

    pub async fn save_playlists(&self, playlists: &[Playlist]) -> Result<()> {
        self.write_json(keys::PLAYLISTS, &playlists).await
    }

    pub async fn display_settings(&self) -> Result<DisplaySettings> {
        match self.read_optional::<DisplaySettings>(keys::DISPLAY).await? {
            Some(settings) => Ok(settings),
            None => Ok(DisplaySettings::default()),
        }
    }

    pub async fn save_display_settings(&self, settings: &DisplaySettings) -> Result<()> {
        self.write_json(keys::DISPLAY, settings).await
    }

    pub async fn current_play(&self) -> Result<Option<CurrentPlay>> {
        self.read_optional(keys::CURRENT_PLAY).await
    }

    /// Pin every player to a playlist position.
    ///
    /// Writes the override, then bumps the revision so pollers notice
    /// without comparing override payloads. The two writes are not atomic;
    /// a reader catching the gap converges on its next refresh.
    pub async fn set_current_play(&self, playlist_id: &str, index: usize) -> Result<()> {
        let play = CurrentPlay {
            playlist_id: playlist_id.to_string(),
            index,
        };
        self.write_json(keys::CURRENT_PLAY, &play).await?;
        self.bump_revision().await?;
        Ok(())
    }

    /// Drop the manual override, returning players to scheduled playback.
    pub async fn clear_current_play(&self) -> Result<()> {
        self.store.remove(keys::CURRENT_PLAY, self.me).await?;
        self.bump_revision().await?;
        Ok(())
    }

    pub async fn now_playing(&self) -> Result<Option<NowPlaying>> {
        match self.store.read(keys::NOW_PLAYING).await? {
            None => Ok(None),
            Some(raw) => match serde_json::from_str::<Option<NowPlaying>>(&raw) {
                Ok(value) => Ok(value),
                Err(e) => {
                    warn!("Corrupt value under '{}', ignoring: {}", keys::NOW_PLAYING, e);
                    Ok(None)
                }
            },
        }
    }

    /// Publish what is on screen right now. `None` publishes an explicit
    /// JSON null so observers can tell "nothing playing" from "never
    /// written".
    pub async fn publish_now_playing(&self, snapshot: Option<&NowPlaying>) -> Result<()> {
        self.write_json(keys::NOW_PLAYING, &snapshot).await
    }

    pub async fn devices(&self) -> Result<Vec<Device>> {
        self.read_or_default(keys::DEVICES).await
    }

    pub async fn save_devices(&self, devices: &[Device]) -> Result<()> {
        self.write_json(keys::DEVICES, &devices).await
    }

    /// Current change token, 0 when never bumped.
    pub async fn revision(&self) -> Result<u64> {
        match self.store.read(keys::REVISION).await? {
            None => Ok(0),
            Some(raw) => match raw.parse::<u64>() {
                Ok(value) => Ok(value),
                Err(_) => {
                    warn!("Corrupt revision '{}', treating as 0", raw);
                    Ok(0)
                }
            },
        }
    }

    /// Advance the change token.
    ///
    /// The next value is the wall clock in milliseconds, or previous + 1
    /// if the clock has not moved (or moved backwards). Strictly
    /// monotonic either way.
    pub async fn bump_revision(&self) -> Result<u64> {
        let prev = self.revision().await?;
        let next = (prev + 1).max(crate::time::now_millis());
        self.store
            .write(keys::REVISION, &next.to_string(), self.me)
            .await?;
        Ok(next)
    }

    /// Play one media item immediately on every player.
    ///
    /// Creates a throwaway single-item playlist named after the media and
    /// pins the override to it. The temp playlist stays in the catalog
    /// until an operator cleans it up, which keeps the override valid for
    /// as long as it is in force.
    pub async fn quick_play_media(&self, media_id: &str) -> Result<CurrentPlay> {
        let media = self.media().await?;
        let Some(item) = media.iter().find(|m| m.id == media_id) else {
            return Err(crate::Error::NotFound(format!("media '{media_id}'")));
        };

        let temp = Playlist {
            id: uid(&format!("temp_pl_{}", item.id)),
            name: format!("Quick Play: {}", item.name),
            items: vec![crate::model::PlaylistItem {
                id: uid("pli"),
                media_id: item.id.clone(),
                duration: None,
                start_sec: None,
                end_sec: None,
            }],
            schedule: None,
        };

        let mut playlists = self.playlists().await?;
        playlists.push(temp.clone());
        self.save_playlists(&playlists).await?;
        self.set_current_play(&temp.id, 0).await?;

        Ok(CurrentPlay {
            playlist_id: temp.id,
            index: 0,
        })
    }
}
