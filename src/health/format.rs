//! Display formatting for health records.

use chrono::{DateTime, Duration, Utc};

/// Fixed, locale-independent instant pattern.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shown when a trigger has no further occurrence.
pub const UNDEFINED: &str = "undefined";

pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format(DATE_FORMAT).to_string()
}

/// Format an optional instant, rendering `None` as an empty string.
pub fn format_optional_instant(instant: Option<DateTime<Utc>>) -> String {
    instant.map(format_instant).unwrap_or_default()
}

/// Human-readable elapsed time: `"42 sec"`, `"3m 5s"`, `"1h 2m 3s"`, `"2d 4h 10m"`.
///
/// Sub-second remainders are truncated. Negative durations render as zero.
pub fn format_duration(duration: Duration) -> String {
    let mut seconds = duration.num_seconds().max(0);
    if seconds < 60 {
        return format!("{} sec", seconds);
    }

    let mut minutes = seconds / 60;
    seconds %= 60;
    if minutes < 60 {
        return format!("{}m {}s", minutes, seconds);
    }

    let mut hours = minutes / 60;
    minutes %= 60;
    if hours < 24 {
        return format!("{}h {}m {}s", hours, minutes, seconds);
    }

    let days = hours / 24;
    hours %= 24;
    format!("{}d {}h {}m", days, hours, minutes)
}
