//! Render surface seam
//!
//! The engine never draws anything itself; it hands presentation requests
//! to a [`RenderSurface`] and listens for media signals coming back. Real
//! deployments plug in a renderer behind this trait; the headless binary
//! ships with a logging surface so the coordination core can run and be
//! observed without any display attached.

use super::source::PreparedSource;
use placard_common::model::{DisplaySettings, MediaItem};
use tracing::info;

/// Everything a surface needs to put one item on screen
#[derive(Debug, Clone, PartialEq)]
pub struct PresentRequest {
    /// Engine generation; echo it back in every signal about this item
    pub generation: u64,
    pub media: MediaItem,
    pub source: PreparedSource,
    /// Seek here before starting (trim window start)
    pub start_at: Option<f64>,
    /// Present without starting playback
    pub paused: bool,
}

/// Why the surface should go blank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// Nothing resolvable to play
    NoContent,
    /// Display settings turned the output off
    PowerOff,
}

/// Feedback from the surface about the item it was given
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSignal {
    pub generation: u64,
    pub kind: MediaSignalKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaSignalKind {
    /// Playback reached its natural end (videos)
    Ended,
    /// Playback position in seconds, reported while a video plays
    Position(f64),
    /// The surface could not load or play the content
    Failed(String),
}

/// The rendering side of a player, driven by the engine
pub trait RenderSurface: Send + Sync {
    fn present(&self, request: PresentRequest);

    /// Jump a playing video to the given position.
    fn seek(&self, secs: f64);

    fn set_paused(&self, paused: bool);

    fn apply_display(&self, settings: &DisplaySettings);

    fn clear(&self, reason: IdleReason);
}

/// Surface that drops everything on the floor
///
/// Useful as a stand-in where even log output is unwanted.
pub struct NullSurface;

impl RenderSurface for NullSurface {
    fn present(&self, _request: PresentRequest) {}
    fn seek(&self, _secs: f64) {}
    fn set_paused(&self, _paused: bool) {}
    fn apply_display(&self, _settings: &DisplaySettings) {}
    fn clear(&self, _reason: IdleReason) {}
}

/// Surface that narrates what it would render
///
/// This is what the headless binary runs with. It never emits `Ended`
/// signals, so full-length videos hold until a duration override or a
/// remote command moves things along.
pub struct LogSurface;

impl RenderSurface for LogSurface {
    fn present(&self, request: PresentRequest) {
        let source = match &request.source {
            PreparedSource::Url(url) => url.clone(),
            PreparedSource::Handle(handle) => {
                format!("<{} bytes for {}>", handle.bytes.len(), handle.media_id)
            }
        };
        info!(
            "Present {:?} '{}' from {}{}{}",
            request.media.kind,
            request.media.name,
            source,
            request
                .start_at
                .map(|s| format!(" at {s}s"))
                .unwrap_or_default(),
            if request.paused { " (paused)" } else { "" },
        );
    }

    fn seek(&self, secs: f64) {
        info!("Seek to {}s", secs);
    }

    fn set_paused(&self, paused: bool) {
        info!("{}", if paused { "Pause" } else { "Resume" });
    }

    fn apply_display(&self, settings: &DisplaySettings) {
        info!(
            "Display: {:?}, brightness {}, power {:?}",
            settings.orientation, settings.brightness, settings.power
        );
    }

    fn clear(&self, reason: IdleReason) {
        info!("Blank screen ({:?})", reason);
    }
}
