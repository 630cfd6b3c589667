//! Timestamp utilities

use chrono::{DateTime, Local, Utc};

/// Get current local wall-clock time
///
/// Schedules are evaluated against local time, matching what an operator
/// reads off the clock on the wall next to the display.
pub fn local_now() -> DateTime<Local> {
    Local::now()
}

/// Current Unix time in milliseconds
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
