//! Duration conversions and the clock/size strings shown in the UI.

use std::time::Duration;

/// Saturating Duration conversion used for whole-second song lengths.
pub trait DurationExt {
    /// Convert duration to seconds as u32, saturating at `u32::MAX`.
    ///
    /// `u32::MAX` seconds is roughly 136 years, far beyond any track.
    fn as_secs_u32(&self) -> u32;
}

impl DurationExt for Duration {
    fn as_secs_u32(&self) -> u32 {
        u32::try_from(self.as_secs()).unwrap_or(u32::MAX)
    }
}

/// `m:ss` clock used by the player bar and fullscreen scrubber.
#[must_use]
pub fn format_clock(position: Duration) -> String {
    let secs = position.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Song duration column: `m:ss`, or `--:--` when unknown.
#[must_use]
pub fn format_song_duration(seconds: Option<u32>) -> String {
    seconds.map_or_else(
        || "--:--".to_string(),
        |s| format!("{}:{:02}", s / 60, s % 60),
    )
}

/// Human readable byte count with 1024 steps and two decimals (`4.5 MB`).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    let mut whole = bytes;
    while whole >= 1024 && unit < UNITS.len() - 1 {
        whole /= 1024;
        unit += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    let scaled = bytes as f64 / 1024_f64.powi(i32::try_from(unit).unwrap_or(0));
    let rounded = format!("{scaled:.2}");
    // 1.50 -> 1.5, 2.00 -> 2
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');

    format!("{trimmed} {}", UNITS[unit])
}
