//! Timestamped lyric text: parsing, formatting and position lookup.
//!
//! The ingestion format is one line per caption, `[minutes:seconds] text`,
//! where the seconds component and any `.fraction` are optional.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Write;
use std::time::Duration;

/// A single synchronized caption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricLine {
    /// Whole seconds from track start
    #[serde(deserialize_with = "deserialize_seconds")]
    pub time: u32,
    #[serde(default)]
    pub text: String,
}

impl LyricLine {
    pub fn new(time: u32, text: impl Into<String>) -> Self {
        Self {
            time,
            text: text.into(),
        }
    }

    /// Offset of this line from the start of the track
    #[must_use]
    pub fn start_time(&self) -> Duration {
        Duration::from_secs(u64::from(self.time))
    }
}

/// A leading `[m:ss.xx]` tag as written in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub minutes: u32,
    pub seconds: u32,
    /// Sub-second digits. Parsed but not folded into [`Timestamp::whole_seconds`].
    pub fraction: Option<u32>,
}

impl Timestamp {
    #[must_use]
    pub const fn whole_seconds(&self) -> u32 {
        self.minutes.saturating_mul(60).saturating_add(self.seconds)
    }
}

/// Parse a lyric block into lines, keeping input order.
///
/// Blank lines are dropped. Lines without a recognizable tag are kept verbatim
/// at time 0. The output is not sorted; callers supply chronological input.
#[must_use]
pub fn parse_lyrics(input: &str) -> Vec<LyricLine> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match parse_timestamp_tag(line) {
            Some((timestamp, text)) => LyricLine::new(timestamp.whole_seconds(), text),
            None => LyricLine::new(0, line),
        })
        .collect()
}

/// Split a leading timestamp tag from the rest of the line.
///
/// Grammar: `[` digits `:`? digits? `.`? digits? `]`, then optional whitespace
/// before the text. Digit groups that overflow parse as 0.
#[must_use]
pub fn parse_timestamp_tag(line: &str) -> Option<(Timestamp, &str)> {
    let rest = line.trim_start().strip_prefix('[')?;

    let (minutes, rest) = take_digits(rest);
    let minutes = minutes?;
    let rest = rest.strip_prefix(':').unwrap_or(rest);

    let (seconds, rest) = take_digits(rest);
    let rest = rest.strip_prefix('.').unwrap_or(rest);

    let (fraction, rest) = take_digits(rest);
    let rest = rest.strip_prefix(']')?;

    let timestamp = Timestamp {
        minutes: parse_or_zero(minutes),
        seconds: seconds.map_or(0, parse_or_zero),
        fraction: fraction.and_then(|f| f.parse().ok()),
    };

    Some((timestamp, rest.trim_start()))
}

/// Render lines back into the ingestion format (`[m:ss] text`).
#[must_use]
pub fn format_lyrics(lines: &[LyricLine]) -> String {
    let mut output = String::new();

    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        let _ = write!(
            output,
            "[{}:{:02}] {}",
            line.time / 60,
            line.time % 60,
            line.text
        );
    }

    output
}

/// Index of the line being sung at `position`.
///
/// Greatest `i` with `lines[i].time <= position`; stops scanning at the first
/// line that starts later.
#[must_use]
pub fn current_lyric_index(lines: &[LyricLine], position: Duration) -> Option<usize> {
    let mut index = None;

    for (i, line) in lines.iter().enumerate() {
        if line.start_time() > position {
            break;
        }
        index = Some(i);
    }

    index
}

/// Lines around `current` for a scrolling lyric view.
///
/// With no current line the first `after + 1` lines are returned.
#[must_use]
pub fn visible_lines(
    lines: &[LyricLine],
    current: Option<usize>,
    before: usize,
    after: usize,
) -> &[LyricLine] {
    let Some(idx) = current else {
        return &lines[..lines.len().min(after + 1)];
    };

    let idx = idx.min(lines.len().saturating_sub(1));
    let start = idx.saturating_sub(before);
    let end = (idx + after + 1).min(lines.len());

    &lines[start..end]
}

fn take_digits(s: &str) -> (Option<&str>, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        (None, s)
    } else {
        (Some(&s[..end]), &s[end..])
    }
}

fn parse_or_zero(digits: &str) -> u32 {
    digits.parse().unwrap_or(0)
}

/// Accept any JSON number for a line time, flooring fractional seconds.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Ok(0);
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(secs.floor().min(f64::from(u32::MAX)) as u32)
}
