//! Admin song upload: media/cover storage and catalog row writes.

use crate::backend::{BlobStore, Filter, RecordStore, COVERS_BUCKET, MUSIC_BUCKET, SONGS_TABLE};
use crate::error::{CoreError, Result};
use crate::lyrics::{format_lyrics, parse_lyrics};
use crate::song::{Song, SongRecord};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

const LOG_TARGET: &str = "nebula::upload";

/// A local file picked for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Whole seconds, when the file could be probed
    pub duration: Option<u32>,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            content_type: None,
            duration: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub const fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        u64::try_from(self.bytes.len()).unwrap_or(u64::MAX)
    }
}

/// The admin edit form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SongDraft {
    pub title: String,
    pub artist: String,
    /// `[m:ss] text` lines
    pub lyrics_text: String,
    pub audio: Option<MediaFile>,
    pub cover: Option<MediaFile>,
}

impl SongDraft {
    /// Pre-fill the form from an existing song
    #[must_use]
    pub fn from_song(song: &Song) -> Self {
        Self {
            title: song.title.clone(),
            artist: song.artist.clone(),
            lyrics_text: format_lyrics(song.lyric_lines()),
            audio: None,
            cover: None,
        }
    }
}

/// What [`UploadFlow::save`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
}

/// Writes songs to storage and the catalog
#[derive(Clone)]
pub struct UploadFlow {
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
}

impl UploadFlow {
    pub fn new(store: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    /// Upload the draft's files and insert (or, with `editing`, update) its row.
    ///
    /// Input is validated before any network call. The draft is never
    /// modified; callers clear the form only on success.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing title, artist or (for a new
    /// song) audio file, or the first backend failure.
    pub async fn save(&self, draft: &SongDraft, editing: Option<&Song>) -> Result<SaveOutcome> {
        if draft.title.trim().is_empty() {
            return Err(CoreError::validation("title", "is required"));
        }
        if draft.artist.trim().is_empty() {
            return Err(CoreError::validation("artist", "is required"));
        }
        if editing.is_none() && draft.audio.is_none() {
            return Err(CoreError::validation(
                "audio",
                "a media file is required for new songs",
            ));
        }

        let mut audio_url = editing.map(|s| s.audio_url.clone()).unwrap_or_default();
        let mut cover_url = editing.and_then(|s| s.cover_url.clone());
        let mut duration = editing.and_then(|s| s.duration);

        if let Some(audio) = &draft.audio {
            audio_url = self.upload(MUSIC_BUCKET, audio).await?;
            duration = audio.duration;
        }

        if let Some(cover) = &draft.cover {
            cover_url = Some(self.upload(COVERS_BUCKET, cover).await?);
        }

        let lyrics = if draft.lyrics_text.trim().is_empty() {
            None
        } else {
            Some(parse_lyrics(&draft.lyrics_text))
        };

        let file_size = draft
            .audio
            .as_ref()
            .map(MediaFile::size)
            .or_else(|| editing.and_then(|s| s.file_size))
            .unwrap_or(0);

        let record = SongRecord {
            title: draft.title.trim().to_string(),
            artist: draft.artist.trim().to_string(),
            audio_url,
            cover_url: cover_url.filter(|url| !url.is_empty()),
            duration,
            file_size,
            lyrics,
        };
        let row = serde_json::to_value(&record)?;

        if let Some(song) = editing {
            self.store
                .update(SONGS_TABLE, &[Filter::eq("id", song.id.as_str())], row)
                .await?;
            info!(target: LOG_TARGET, "Updated song '{}' ({})", record.title, song.id);
            Ok(SaveOutcome::Updated)
        } else {
            self.store.insert(SONGS_TABLE, row).await?;
            info!(target: LOG_TARGET, "Added song '{}' by {}", record.title, record.artist);
            Ok(SaveOutcome::Created)
        }
    }

    /// Remove a song row
    ///
    /// # Errors
    ///
    /// Returns an error if the backend delete fails.
    pub async fn delete(&self, song: &Song) -> Result<()> {
        self.store
            .delete(SONGS_TABLE, &[Filter::eq("id", song.id.as_str())])
            .await?;
        info!(target: LOG_TARGET, "Deleted song '{}' ({})", song.title, song.id);
        Ok(())
    }

    /// Store `file` under `<unix-millis>-<name>` and return its public URL
    async fn upload(&self, bucket: &str, file: &MediaFile) -> Result<String> {
        let path = object_path(Utc::now().timestamp_millis(), &file.name);
        self.blobs
            .upload(
                bucket,
                &path,
                file.bytes.clone(),
                file.content_type.as_deref(),
            )
            .await?;
        Ok(self.blobs.public_url(bucket, &path))
    }
}

/// Storage key for an uploaded file
#[must_use]
pub fn object_path(unix_millis: i64, file_name: &str) -> String {
    format!("{unix_millis}-{file_name}")
}
