//! Per-item advance policy
//!
//! Decides what ends the display of an item: a timer, the media's own
//! end-of-playback signal, or a trim-window watch. Pure functions over the
//! catalog types so every device applies the same policy.

use placard_common::model::{MediaItem, MediaType, PlaylistItem};
use std::time::Duration;

/// Default display time for images and web pages
pub const DEFAULT_DISPLAY_SECS: f64 = 8.0;
/// Default total time for a presentation across all its slides
pub const DEFAULT_PRESENTATION_SECS: f64 = 15.0;

/// A video trim window with a resolved start and end
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimWindow {
    pub start_sec: f64,
    pub end_sec: f64,
    pub looping: bool,
}

/// What advances playback past the current item
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceRule {
    /// Advance when the timer fires
    After(Duration),
    /// Step through `count` slides, `per_slide` apart, then advance
    Slides { count: u32, per_slide: Duration },
    /// Wait for the end-of-media signal from the render surface
    AwaitEnded,
    /// Watch playback position against the trim window
    TrimWatch(TrimWindow),
    /// No natural end: the surface loops the video until something
    /// external moves the playlist along
    LoopForever,
}

fn explicit_duration(item: &PlaylistItem, media: &MediaItem) -> Option<f64> {
    item.duration.or(media.duration).filter(|d| *d > 0.0)
}

fn seconds(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.0))
}

/// Resolve the advance rule for one playlist slot.
pub fn advance_rule(item: &PlaylistItem, media: &MediaItem) -> AdvanceRule {
    match media.kind {
        MediaType::Image | MediaType::Web => AdvanceRule::After(seconds(
            explicit_duration(item, media).unwrap_or(DEFAULT_DISPLAY_SECS),
        )),
        MediaType::Presentation => match media.slides {
            Some(count) if count > 0 => {
                let total = explicit_duration(item, media).unwrap_or(DEFAULT_PRESENTATION_SECS);
                AdvanceRule::Slides {
                    count,
                    per_slide: seconds(total / count as f64),
                }
            }
            // Slide count unknown: show the whole document like a web page
            _ => AdvanceRule::After(seconds(
                explicit_duration(item, media).unwrap_or(DEFAULT_DISPLAY_SECS),
            )),
        },
        MediaType::Video => {
            if let Some(window) = trim_window(item, media) {
                return AdvanceRule::TrimWatch(window);
            }
            if let Some(secs) = explicit_duration(item, media) {
                return AdvanceRule::After(seconds(secs));
            }
            if media.looping.unwrap_or(false) {
                return AdvanceRule::LoopForever;
            }
            AdvanceRule::AwaitEnded
        }
    }
}

/// The trim window, when one is set and sane. An end at or before the
/// start would never let the position reach the boundary, so it disables
/// the watch entirely.
pub fn trim_window(item: &PlaylistItem, media: &MediaItem) -> Option<TrimWindow> {
    let end = item.end_sec?;
    let start = item.start_sec.unwrap_or(0.0).max(0.0);
    if end <= start {
        return None;
    }
    Some(TrimWindow {
        start_sec: start,
        end_sec: end,
        looping: media.looping.unwrap_or(false),
    })
}
