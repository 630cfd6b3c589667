//! Content model types shared by all placard services
//!
//! These structs define the JSON wire format stored in the shared state
//! store and exchanged over the control API. Field names serialize in
//! camelCase and optional fields are omitted when absent, so documents
//! written by any service (or by hand) stay interchangeable.

use serde::{Deserialize, Serialize};

/// Kind of content a media item refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Web,
    Presentation,
}

/// A single piece of displayable content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MediaType,
    pub name: String,
    /// Content locator: `http(s)://`, `data:`, or `local:<key>`
    pub src: String,
    /// Fallback display duration in seconds (images, web pages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
    /// Playback volume 0.0-1.0 for videos
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Loop a video until something else advances the playlist
    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub looping: Option<bool>,
    /// Slide count for presentations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slides: Option<u32>,
}

/// One slot in a playlist, referencing a media item with optional overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub id: String,
    pub media_id: String,
    /// Display duration override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Video trim start in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_sec: Option<f64>,
    /// Video trim end in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_sec: Option<f64>,
}

/// Weekly recurrence window for a playlist
///
/// Absent fields mean "always": no `days` matches every day, no `start`
/// means midnight, no `end` means end of day.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schedule {
    /// Days of week, 0 = Sunday through 6 = Saturday
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<u8>>,
    /// Window start, "HH:MM" 24h
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Window end, "HH:MM" 24h
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Ordered list of playlist items with an optional recurrence schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

impl Playlist {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    On,
    Off,
}

/// Physical display configuration applied by every player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub orientation: Orientation,
    /// Backlight brightness 0-100
    pub brightness: u8,
    pub power: Power,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            orientation: Orientation::Landscape,
            brightness: 100,
            power: Power::On,
        }
    }
}

/// Manual playback override: pins every player to one playlist position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPlay {
    pub playlist_id: String,
    pub index: usize,
}

/// What a player is showing right now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    /// Media item id
    pub id: String,
    /// Display name, with a slide suffix for presentations
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MediaType,
    pub src: String,
    /// When this snapshot was taken, Unix milliseconds
    pub at: u64,
}

/// A player known to the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub user_agent: String,
    /// Unix milliseconds of first registration
    pub created_at: u64,
    /// Deep link that adopts this device identity when opened
    pub url: String,
    /// Unix milliseconds of the most recent heartbeat
    pub last_seen: u64,
    #[serde(default)]
    pub now_playing: Option<NowPlaying>,
}
