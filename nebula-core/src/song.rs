use crate::lyrics::LyricLine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// A catalog track as stored in the `songs` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    pub audio_url: String,
    /// Whole seconds, probed at upload time
    #[serde(default)]
    pub duration: Option<u32>,
    /// Bytes of the uploaded media file
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_lyrics")]
    pub lyrics: Option<Vec<LyricLine>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Song {
    /// Minimal song with just the fields playback needs
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        audio_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            cover_url: None,
            audio_url: audio_url.into(),
            duration: None,
            file_size: None,
            lyrics: None,
            created_at: None,
        }
    }

    #[must_use]
    pub fn with_lyrics(mut self, lyrics: Vec<LyricLine>) -> Self {
        self.lyrics = Some(lyrics);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_cover(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }

    /// Lyric lines, empty when the song has none
    #[must_use]
    pub fn lyric_lines(&self) -> &[LyricLine] {
        self.lyrics.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn has_lyrics(&self) -> bool {
        !self.lyric_lines().is_empty()
    }

    /// Catalog duration, if one was recorded
    #[must_use]
    pub fn known_duration(&self) -> Option<Duration> {
        self.duration.map(|secs| Duration::from_secs(u64::from(secs)))
    }

    /// Substring match on title or artist; `needle_lower` is already lowercased
    pub(crate) fn matches(&self, needle_lower: &str) -> bool {
        self.title.to_lowercase().contains(needle_lower)
            || self.artist.to_lowercase().contains(needle_lower)
    }
}

/// Write payload for inserting or updating a `songs` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongRecord {
    pub title: String,
    pub artist: String,
    pub audio_url: String,
    pub cover_url: Option<String>,
    pub duration: Option<u32>,
    pub file_size: u64,
    pub lyrics: Option<Vec<LyricLine>>,
}

/// A user's playlist row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// `favorites` row with its joined song
#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteRow {
    pub song_id: String,
    #[serde(default)]
    pub songs: Option<Song>,
}

/// `listening_history` row with its joined song
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRow {
    pub song_id: String,
    #[serde(default)]
    pub played_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub songs: Option<Song>,
}

/// Lyrics column is free-form JSON; anything but an array of lines means none.
fn deserialize_lyrics<'de, D>(deserializer: D) -> Result<Option<Vec<LyricLine>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if !value.is_array() {
        return Ok(None);
    }

    match serde_json::from_value(value) {
        Ok(lines) => Ok(Some(lines)),
        Err(e) => {
            tracing::warn!("Ignoring malformed lyrics column: {}", e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_row() {
        let json = r#"{
            "id": "a1",
            "title": "Notte",
            "artist": "Luna",
            "cover_url": null,
            "audio_url": "https://cdn/music/1-notte.mp3",
            "duration": 201,
            "file_size": 4194304,
            "lyrics": [{"time": 0, "text": "Intro"}, {"time": 15.7, "text": "Verse"}],
            "created_at": "2024-05-01T10:00:00.123456+00:00"
        }"#;

        let song: Song = serde_json::from_str(json).unwrap();
        assert_eq!(song.title, "Notte");
        assert_eq!(song.duration, Some(201));
        assert_eq!(song.lyric_lines()[1], LyricLine::new(15, "Verse"));
        assert!(song.created_at.is_some());
    }

    #[test]
    fn test_non_array_lyrics_become_none() {
        let json = r#"{"id": "a", "title": "t", "artist": "a", "audio_url": "u", "lyrics": "oops"}"#;
        let song: Song = serde_json::from_str(json).unwrap();
        assert!(song.lyrics.is_none());

        let json = r#"{"id": "a", "title": "t", "artist": "a", "audio_url": "u", "lyrics": {"time": 1}}"#;
        let song: Song = serde_json::from_str(json).unwrap();
        assert!(!song.has_lyrics());
    }

    #[test]
    fn test_missing_optional_columns() {
        let json = r#"{"id": "a", "title": "t", "artist": "a", "audio_url": "u"}"#;
        let song: Song = serde_json::from_str(json).unwrap();
        assert_eq!(song.known_duration(), None);
        assert!(song.lyric_lines().is_empty());
    }

    #[test]
    fn test_matches_title_or_artist() {
        let song = Song::new("1", "Blue Moon", "Frank", "u");
        assert!(song.matches("moon"));
        assert!(song.matches("fra"));
        assert!(!song.matches("jazz"));
    }

    #[test]
    fn test_record_serializes_nulls() {
        let record = SongRecord {
            title: "t".into(),
            artist: "a".into(),
            audio_url: "u".into(),
            cover_url: None,
            duration: None,
            file_size: 0,
            lyrics: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["cover_url"].is_null());
        assert!(value["lyrics"].is_null());
    }
}
