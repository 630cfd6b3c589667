//! Schedule resolution
//!
//! Pure functions deciding which playlist a player should be running at a
//! given moment. Resolution order: a valid manual override first, then the
//! first playlist whose schedule matches the clock, then the first playlist
//! with any items, and finally a synthetic playlist rotating through the
//! whole media library. All inputs are passed in, so every device resolving
//! with the same state and clock reaches the same answer.

use crate::model::{CurrentPlay, MediaItem, Playlist, PlaylistItem, Schedule};
use chrono::{DateTime, Datelike, Local, Timelike};

/// Id of the synthetic all-media playlist
pub const ALL_MEDIA_PLAYLIST_ID: &str = "all-media";

const MINUTES_PER_DAY: u16 = 24 * 60;

/// How the active playlist was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveOrigin {
    /// Manual override pinned this playlist
    Override,
    /// First playlist whose schedule matched the clock
    Scheduled,
    /// No schedule matched; first playlist with items
    FirstNonEmpty,
    /// No usable playlist; synthesized from the whole media library
    AllMedia,
}

/// Outcome of schedule resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ActivePlaylist {
    pub playlist: Playlist,
    pub origin: ActiveOrigin,
    /// Index to start playback from (the override's pinned index, else 0)
    pub seed_index: usize,
}

impl ActivePlaylist {
    /// Stable identity for change detection. The synthetic all-media
    /// playlist has no identity of its own, so it never collides with a
    /// real playlist that happens to share its id.
    pub fn identity(&self) -> Option<&str> {
        match self.origin {
            ActiveOrigin::AllMedia => None,
            _ => Some(&self.playlist.id),
        }
    }
}

/// Parse "HH:MM" into minutes since midnight. "24:00" is accepted as end
/// of day. Anything unparseable yields `None` and the field is treated as
/// absent.
pub fn parse_hhmm(value: &str) -> Option<u16> {
    let (h, m) = value.split_once(':')?;
    let h: u16 = h.trim().parse().ok()?;
    let m: u16 = m.trim().parse().ok()?;
    if m >= 60 {
        return None;
    }
    let total = h * 60 + m;
    (total <= MINUTES_PER_DAY).then_some(total)
}

/// Is `now_minutes` inside the window, with both bounds inclusive?
///
/// A window whose start is after its end wraps past midnight, so
/// 22:00-06:00 covers late evening and early morning.
pub fn time_in_range(now_minutes: u16, start: Option<&str>, end: Option<&str>) -> bool {
    if start.is_none() && end.is_none() {
        return true;
    }
    let s = start.and_then(parse_hhmm).unwrap_or(0);
    let e = end.and_then(parse_hhmm).unwrap_or(MINUTES_PER_DAY);
    if s <= e {
        now_minutes >= s && now_minutes <= e
    } else {
        now_minutes >= s || now_minutes <= e
    }
}

/// Does the schedule match the given weekday (0 = Sunday) and time?
///
/// An absent schedule matches always, as does an absent or empty day list.
pub fn schedule_matches_at(schedule: Option<&Schedule>, weekday: u8, now_minutes: u16) -> bool {
    let Some(schedule) = schedule else {
        return true;
    };
    let day_ok = match &schedule.days {
        None => true,
        Some(days) if days.is_empty() => true,
        Some(days) => days.contains(&weekday),
    };
    day_ok && time_in_range(now_minutes, schedule.start.as_deref(), schedule.end.as_deref())
}

/// Build the synthetic playlist rotating through every media item, in
/// library order. `None` when the library is empty.
pub fn all_media_playlist(media: &[MediaItem]) -> Option<Playlist> {
    if media.is_empty() {
        return None;
    }
    let items = media
        .iter()
        .map(|m| PlaylistItem {
            id: format!("fallback_{}", m.id),
            media_id: m.id.clone(),
            duration: None,
            start_sec: None,
            end_sec: None,
        })
        .collect();
    Some(Playlist {
        id: ALL_MEDIA_PLAYLIST_ID.to_string(),
        name: "All media".to_string(),
        items,
        schedule: None,
    })
}

/// Resolve the active playlist at an explicit weekday and time of day.
///
/// An override only holds while it stays valid: the playlist must still
/// exist and still contain the pinned index. A stale override is ignored
/// rather than blanking the display.
pub fn resolve_at(
    playlists: &[Playlist],
    media: &[MediaItem],
    current_play: Option<&CurrentPlay>,
    weekday: u8,
    now_minutes: u16,
) -> Option<ActivePlaylist> {
    if let Some(manual) = current_play {
        if let Some(playlist) = playlists.iter().find(|p| p.id == manual.playlist_id) {
            if playlist.items.len() > manual.index {
                return Some(ActivePlaylist {
                    playlist: playlist.clone(),
                    origin: ActiveOrigin::Override,
                    seed_index: manual.index,
                });
            }
        }
    }

    if let Some(playlist) = playlists
        .iter()
        .find(|p| !p.is_empty() && schedule_matches_at(p.schedule.as_ref(), weekday, now_minutes))
    {
        return Some(ActivePlaylist {
            playlist: playlist.clone(),
            origin: ActiveOrigin::Scheduled,
            seed_index: 0,
        });
    }

    if let Some(playlist) = playlists.iter().find(|p| !p.is_empty()) {
        return Some(ActivePlaylist {
            playlist: playlist.clone(),
            origin: ActiveOrigin::FirstNonEmpty,
            seed_index: 0,
        });
    }

    all_media_playlist(media).map(|playlist| ActivePlaylist {
        playlist,
        origin: ActiveOrigin::AllMedia,
        seed_index: 0,
    })
}

/// Resolve the active playlist for a wall-clock instant.
pub fn resolve_active_playlist(
    playlists: &[Playlist],
    media: &[MediaItem],
    current_play: Option<&CurrentPlay>,
    now: &DateTime<Local>,
) -> Option<ActivePlaylist> {
    let weekday = now.weekday().num_days_from_sunday() as u8;
    let minutes = (now.hour() * 60 + now.minute()) as u16;
    resolve_at(playlists, media, current_play, weekday, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaType;

    fn media(id: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            kind: MediaType::Image,
            name: id.to_string(),
            src: format!("https://example.com/{id}.png"),
            duration: None,
            mute: None,
            volume: None,
            looping: None,
            slides: None,
        }
    }

    fn item(id: &str, media_id: &str) -> PlaylistItem {
        PlaylistItem {
            id: id.to_string(),
            media_id: media_id.to_string(),
            duration: None,
            start_sec: None,
            end_sec: None,
        }
    }

    fn playlist(id: &str, items: Vec<PlaylistItem>, schedule: Option<Schedule>) -> Playlist {
        Playlist {
            id: id.to_string(),
            name: id.to_string(),
            items,
            schedule,
        }
    }

    fn window(days: Option<Vec<u8>>, start: Option<&str>, end: Option<&str>) -> Schedule {
        Schedule {
            days,
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    #[test]
    fn parse_hhmm_accepts_valid_times() {
        assert_eq!(parse_hhmm("00:00"), Some(0));
        assert_eq!(parse_hhmm("09:30"), Some(570));
        assert_eq!(parse_hhmm("23:59"), Some(1439));
        assert_eq!(parse_hhmm("24:00"), Some(1440));
    }

    #[test]
    fn parse_hhmm_rejects_garbage() {
        assert_eq!(parse_hhmm("9h30"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("25:00"), None);
        assert_eq!(parse_hhmm(""), None);
    }

    #[test]
    fn time_range_is_inclusive_at_both_ends() {
        assert!(time_in_range(540, Some("09:00"), Some("17:00")));
        assert!(time_in_range(1020, Some("09:00"), Some("17:00")));
        assert!(!time_in_range(539, Some("09:00"), Some("17:00")));
        assert!(!time_in_range(1021, Some("09:00"), Some("17:00")));
    }

    #[test]
    fn time_range_wraps_past_midnight() {
        // 22:00-06:00 covers late evening and early morning
        assert!(time_in_range(23 * 60, Some("22:00"), Some("06:00")));
        assert!(time_in_range(5 * 60, Some("22:00"), Some("06:00")));
        assert!(!time_in_range(12 * 60, Some("22:00"), Some("06:00")));
    }

    #[test]
    fn open_ended_ranges_default_to_day_bounds() {
        assert!(time_in_range(0, None, None));
        assert!(time_in_range(100, None, Some("10:00")));
        assert!(!time_in_range(601, None, Some("10:00")));
        assert!(time_in_range(1439, Some("10:00"), None));
        assert!(!time_in_range(599, Some("10:00"), None));
    }

    #[test]
    fn unparseable_bound_is_treated_as_absent() {
        // Bad start falls back to midnight
        assert!(time_in_range(30, Some("garbage"), Some("10:00")));
    }

    #[test]
    fn schedule_day_matching() {
        let weekdays = window(Some(vec![1, 2, 3, 4, 5]), None, None);
        assert!(schedule_matches_at(Some(&weekdays), 3, 600));
        assert!(!schedule_matches_at(Some(&weekdays), 0, 600));

        let empty_days = window(Some(vec![]), None, None);
        assert!(schedule_matches_at(Some(&empty_days), 0, 600));

        assert!(schedule_matches_at(None, 6, 0));
    }

    #[test]
    fn valid_override_wins_over_schedule() {
        let playlists = vec![
            playlist("pl_sched", vec![item("a", "m1")], Some(window(None, None, None))),
            playlist("pl_manual", vec![item("b", "m1"), item("c", "m2")], None),
        ];
        let manual = CurrentPlay {
            playlist_id: "pl_manual".to_string(),
            index: 1,
        };

        let active = resolve_at(&playlists, &[], Some(&manual), 2, 600).unwrap();
        assert_eq!(active.origin, ActiveOrigin::Override);
        assert_eq!(active.playlist.id, "pl_manual");
        assert_eq!(active.seed_index, 1);
        assert_eq!(active.identity(), Some("pl_manual"));
    }

    #[test]
    fn stale_override_falls_through() {
        let playlists = vec![playlist("pl_a", vec![item("a", "m1")], None)];

        // Playlist no longer exists
        let gone = CurrentPlay {
            playlist_id: "pl_deleted".to_string(),
            index: 0,
        };
        let active = resolve_at(&playlists, &[], Some(&gone), 2, 600).unwrap();
        assert_eq!(active.playlist.id, "pl_a");
        assert_ne!(active.origin, ActiveOrigin::Override);

        // Index past the end after items were removed
        let out_of_range = CurrentPlay {
            playlist_id: "pl_a".to_string(),
            index: 5,
        };
        let active = resolve_at(&playlists, &[], Some(&out_of_range), 2, 600).unwrap();
        assert_eq!(active.origin, ActiveOrigin::Scheduled);
        assert_eq!(active.seed_index, 0);
    }

    #[test]
    fn first_matching_schedule_wins() {
        let playlists = vec![
            playlist(
                "pl_night",
                vec![item("a", "m1")],
                Some(window(None, Some("22:00"), Some("06:00"))),
            ),
            playlist(
                "pl_day",
                vec![item("b", "m2")],
                Some(window(None, Some("09:00"), Some("17:00"))),
            ),
        ];

        let noon = resolve_at(&playlists, &[], None, 2, 12 * 60).unwrap();
        assert_eq!(noon.playlist.id, "pl_day");
        assert_eq!(noon.origin, ActiveOrigin::Scheduled);

        let midnight = resolve_at(&playlists, &[], None, 2, 0).unwrap();
        assert_eq!(midnight.playlist.id, "pl_night");
    }

    #[test]
    fn empty_scheduled_playlist_is_skipped() {
        let playlists = vec![
            playlist("pl_empty", vec![], Some(window(None, None, None))),
            playlist("pl_full", vec![item("a", "m1")], None),
        ];

        let active = resolve_at(&playlists, &[], None, 2, 600).unwrap();
        assert_eq!(active.playlist.id, "pl_full");
    }

    #[test]
    fn falls_back_to_first_non_empty_when_nothing_matches() {
        let playlists = vec![
            playlist("pl_empty", vec![], None),
            playlist(
                "pl_weekend",
                vec![item("a", "m1")],
                Some(window(Some(vec![0, 6]), None, None)),
            ),
        ];

        // Wednesday: the weekend schedule does not match, but the playlist
        // still has items so it wins the first-non-empty fallback.
        let active = resolve_at(&playlists, &[], None, 3, 600).unwrap();
        assert_eq!(active.playlist.id, "pl_weekend");
        assert_eq!(active.origin, ActiveOrigin::FirstNonEmpty);
    }

    #[test]
    fn all_media_fallback_preserves_library_order() {
        let library = vec![media("m1"), media("m2"), media("m3")];
        let active = resolve_at(&[], &library, None, 2, 600).unwrap();

        assert_eq!(active.origin, ActiveOrigin::AllMedia);
        assert_eq!(active.identity(), None);
        assert_eq!(active.playlist.items.len(), 3);
        assert_eq!(active.playlist.items[0].id, "fallback_m1");
        assert_eq!(active.playlist.items[0].media_id, "m1");
        assert_eq!(active.playlist.items[2].media_id, "m3");
    }

    #[test]
    fn nothing_to_play_resolves_to_none() {
        assert_eq!(resolve_at(&[], &[], None, 2, 600), None);

        // Playlists exist but all are empty, and there is no media
        let playlists = vec![playlist("pl_empty", vec![], None)];
        assert_eq!(resolve_at(&playlists, &[], None, 2, 600), None);
    }

    #[test]
    fn wall_clock_entry_point_agrees_with_resolve_at() {
        use chrono::TimeZone;

        let playlists = vec![playlist(
            "pl_morning",
            vec![item("a", "m1")],
            Some(window(None, Some("08:00"), Some("12:00"))),
        )];

        // 2024-01-10 was a Wednesday; 10:30 falls inside the window
        let now = Local.with_ymd_and_hms(2024, 1, 10, 10, 30, 0).unwrap();
        let active = resolve_active_playlist(&playlists, &[], None, &now).unwrap();
        assert_eq!(active.playlist.id, "pl_morning");

        let late = Local.with_ymd_and_hms(2024, 1, 10, 13, 0, 0).unwrap();
        let active = resolve_active_playlist(&playlists, &[], None, &late);
        // Window over, playlist still first-non-empty
        assert_eq!(active.unwrap().origin, ActiveOrigin::FirstNonEmpty);
    }
}
