use crate::song::Song;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What happens when the current track ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    /// Wrap from the last queue entry back to the first
    All,
    /// Restart the current track
    One,
}

impl RepeatMode {
    /// Next mode in the toggle cycle `off -> all -> one -> off`
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::All => write!(f, "all"),
            Self::One => write!(f, "one"),
        }
    }
}

/// Snapshot of everything the player views render
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub current_song: Option<Song>,
    pub current_index: usize,
    pub queue_len: usize,
    pub is_playing: bool,
    /// Position reported by the media element
    pub current_time: Duration,
    /// Zero until the media element reports metadata
    pub duration: Duration,
    /// 0.0 ..= 1.0
    pub volume: f32,
    pub is_shuffle: bool,
    pub repeat_mode: RepeatMode,
    pub is_fullscreen: bool,
    pub current_lyric_index: Option<usize>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_song: None,
            current_index: 0,
            queue_len: 0,
            is_playing: false,
            current_time: Duration::ZERO,
            duration: Duration::ZERO,
            volume: 1.0,
            is_shuffle: false,
            repeat_mode: RepeatMode::Off,
            is_fullscreen: false,
            current_lyric_index: None,
        }
    }
}

impl PlaybackState {
    /// Fraction of the track played, 0.0 when the duration is unknown
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 0.0;
        }

        (self.current_time.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Text of the active lyric line, if any
    #[must_use]
    pub fn current_lyric(&self) -> Option<&str> {
        let song = self.current_song.as_ref()?;
        let index = self.current_lyric_index?;
        song.lyric_lines().get(index).map(|line| line.text.as_str())
    }

    #[must_use]
    pub const fn has_song(&self) -> bool {
        self.current_song.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::LyricLine;

    #[test]
    fn test_repeat_mode_cycle() {
        assert_eq!(RepeatMode::Off.next(), RepeatMode::All);
        assert_eq!(RepeatMode::All.next(), RepeatMode::One);
        assert_eq!(RepeatMode::One.next(), RepeatMode::Off);
    }

    #[test]
    fn test_playback_state_default() {
        let state = PlaybackState::default();
        assert!(!state.is_playing);
        assert!(!state.has_song());
        assert!((state.volume - 1.0).abs() < f32::EPSILON);
        assert_eq!(state.repeat_mode, RepeatMode::Off);
        assert_eq!(state.current_lyric_index, None);
    }

    #[test]
    fn test_progress() {
        let mut state = PlaybackState::default();
        assert!(state.progress().abs() < f32::EPSILON);

        state.duration = Duration::from_secs(200);
        state.current_time = Duration::from_secs(50);
        assert!((state.progress() - 0.25).abs() < 1e-6);

        state.current_time = Duration::from_secs(500);
        assert!((state.progress() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_current_lyric() {
        let song = Song::new("1", "t", "a", "u")
            .with_lyrics(vec![LyricLine::new(0, "one"), LyricLine::new(5, "two")]);
        let state = PlaybackState {
            current_song: Some(song),
            current_lyric_index: Some(1),
            ..PlaybackState::default()
        };
        assert_eq!(state.current_lyric(), Some("two"));
    }
}
