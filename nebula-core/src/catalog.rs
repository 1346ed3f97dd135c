//! Typed reads and writes over the catalog tables.

use crate::backend::{
    select_as, Filter, Query, RecordStore, FAVORITES_TABLE, HISTORY_TABLE, PLAYLISTS_TABLE,
    SONGS_TABLE,
};
use crate::error::Result;
use crate::song::{FavoriteRow, HistoryRow, Playlist, Song};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Songs shown on the Home screen
pub const HOME_SONG_LIMIT: usize = 20;

/// History rows fetched for the Library screen, before de-duplication
pub const HISTORY_LIMIT: usize = 50;

/// Totals shown on the Profile screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub songs_count: u64,
    /// Sum of `file_size` over all songs, in bytes
    pub total_size: u64,
}

#[derive(Debug, Deserialize)]
struct FileSizeRow {
    #[serde(default)]
    file_size: Option<u64>,
}

/// Catalog, favorites, playlists and listening history
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn RecordStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Newest songs first
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub async fn recent_songs(&self, limit: usize) -> Result<Vec<Song>> {
        let query = Query::table(SONGS_TABLE)
            .order_desc("created_at")
            .limit(limit);
        select_as(self.store.as_ref(), &query).await
    }

    /// Every song ordered by title, the source list for search
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub async fn songs_by_title(&self) -> Result<Vec<Song>> {
        let query = Query::table(SONGS_TABLE).order_asc("title");
        select_as(self.store.as_ref(), &query).await
    }

    /// Every song, newest first (admin list)
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub async fn all_songs(&self) -> Result<Vec<Song>> {
        let query = Query::table(SONGS_TABLE).order_desc("created_at");
        select_as(self.store.as_ref(), &query).await
    }

    /// The user's favorite songs, most recently added first.
    /// Favorites whose song no longer exists are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub async fn favorites(&self, user_id: &str) -> Result<Vec<Song>> {
        let query = Query::table(FAVORITES_TABLE)
            .select("song_id, songs(*)")
            .eq("user_id", user_id)
            .order_desc("created_at");
        let rows: Vec<FavoriteRow> = select_as(self.store.as_ref(), &query).await?;

        Ok(rows.into_iter().filter_map(|row| row.songs).collect())
    }

    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub async fn playlists(&self, user_id: &str) -> Result<Vec<Playlist>> {
        let query = Query::table(PLAYLISTS_TABLE)
            .eq("user_id", user_id)
            .order_desc("created_at");
        select_as(self.store.as_ref(), &query).await
    }

    /// Recently played songs, each song once at its most recent position
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub async fn history(&self, user_id: &str) -> Result<Vec<Song>> {
        let query = Query::table(HISTORY_TABLE)
            .select("song_id, songs(*), played_at")
            .eq("user_id", user_id)
            .order_desc("played_at")
            .limit(HISTORY_LIMIT);
        let rows: Vec<HistoryRow> = select_as(self.store.as_ref(), &query).await?;

        Ok(dedupe_history(rows))
    }

    /// Append a play to the user's history
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn record_play(&self, user_id: &str, song_id: &str) -> Result<()> {
        debug!("Recording play of {} for {}", song_id, user_id);
        self.store
            .insert(
                HISTORY_TABLE,
                json!({ "user_id": user_id, "song_id": song_id }),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn add_favorite(&self, user_id: &str, song_id: &str) -> Result<()> {
        self.store
            .insert(
                FAVORITES_TABLE,
                json!({ "user_id": user_id, "song_id": song_id }),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn remove_favorite(&self, user_id: &str, song_id: &str) -> Result<()> {
        self.store
            .delete(
                FAVORITES_TABLE,
                &[Filter::eq("user_id", user_id), Filter::eq("song_id", song_id)],
            )
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub async fn is_favorite(&self, user_id: &str, song_id: &str) -> Result<bool> {
        let query = Query::table(FAVORITES_TABLE)
            .select("song_id")
            .eq("user_id", user_id)
            .eq("song_id", song_id)
            .limit(1);
        let rows = self.store.select(&query).await?;
        Ok(!rows.is_empty())
    }

    /// Add the song to favorites if absent, remove it otherwise.
    /// Returns whether the song is a favorite afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if any backend call fails.
    pub async fn toggle_favorite(&self, user_id: &str, song_id: &str) -> Result<bool> {
        if self.is_favorite(user_id, song_id).await? {
            self.remove_favorite(user_id, song_id).await?;
            Ok(false)
        } else {
            self.add_favorite(user_id, song_id).await?;
            Ok(true)
        }
    }

    /// Song count and total stored size
    ///
    /// # Errors
    ///
    /// Returns an error if either backend query fails.
    pub async fn library_stats(&self) -> Result<LibraryStats> {
        let songs_count = self.store.count(SONGS_TABLE).await?;
        let sizes: Vec<FileSizeRow> = select_as(
            self.store.as_ref(),
            &Query::table(SONGS_TABLE).select("file_size"),
        )
        .await?;
        let total_size = sizes
            .iter()
            .map(|row| row.file_size.unwrap_or(0))
            .fold(0_u64, u64::saturating_add);

        Ok(LibraryStats {
            songs_count,
            total_size,
        })
    }
}

/// Case-insensitive substring match on title or artist.
/// A blank query returns every song.
#[must_use]
pub fn search_songs(songs: &[Song], query: &str) -> Vec<Song> {
    if query.trim().is_empty() {
        return songs.to_vec();
    }

    let needle = query.to_lowercase();
    songs
        .iter()
        .filter(|song| song.matches(&needle))
        .cloned()
        .collect()
}

/// Keep the first (most recent) row per song id, dropping rows whose song is gone
#[must_use]
pub fn dedupe_history(rows: Vec<HistoryRow>) -> Vec<Song> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter_map(|row| {
            let song = row.songs?;
            seen.insert(row.song_id).then_some(song)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use serde_json::Value;

    fn song_json(id: &str, title: &str, artist: &str, created_at: &str) -> Value {
        json!({
            "id": id,
            "title": title,
            "artist": artist,
            "audio_url": format!("https://cdn/{id}.mp3"),
            "file_size": 1024,
            "created_at": created_at,
        })
    }

    fn catalog_with_songs() -> (Catalog, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_rows(
            SONGS_TABLE,
            vec![
                song_json("1", "Zeta", "Alpha", "2024-01-01T00:00:00Z"),
                song_json("2", "Beta", "Gamma", "2024-03-01T00:00:00Z"),
                song_json("3", "Alba", "Delta", "2024-02-01T00:00:00Z"),
            ],
        ));
        (Catalog::new(store.clone()), store)
    }

    fn ids(songs: &[Song]) -> Vec<&str> {
        songs.iter().map(|s| s.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_recent_songs_newest_first_with_limit() {
        let (catalog, _) = catalog_with_songs();
        let songs = catalog.recent_songs(2).await.unwrap();
        assert_eq!(ids(&songs), vec!["2", "3"]);
    }

    #[tokio::test]
    async fn test_songs_by_title() {
        let (catalog, _) = catalog_with_songs();
        let songs = catalog.songs_by_title().await.unwrap();
        assert_eq!(ids(&songs), vec!["3", "2", "1"]);
    }

    #[tokio::test]
    async fn test_favorites_skip_missing_songs() {
        let store = Arc::new(MemoryStore::with_rows(
            FAVORITES_TABLE,
            vec![
                json!({"user_id": "u1", "song_id": "1", "created_at": "2024-01-01",
                       "songs": song_json("1", "Zeta", "Alpha", "2024-01-01T00:00:00Z")}),
                json!({"user_id": "u1", "song_id": "9", "created_at": "2024-01-02", "songs": null}),
                json!({"user_id": "u2", "song_id": "2", "created_at": "2024-01-03",
                       "songs": song_json("2", "Beta", "Gamma", "2024-03-01T00:00:00Z")}),
            ],
        ));
        let catalog = Catalog::new(store);

        let favorites = catalog.favorites("u1").await.unwrap();
        assert_eq!(ids(&favorites), vec!["1"]);
    }

    #[tokio::test]
    async fn test_toggle_favorite() {
        let store = Arc::new(MemoryStore::default());
        let catalog = Catalog::new(store.clone());

        assert!(!catalog.is_favorite("u1", "s1").await.unwrap());
        assert!(catalog.toggle_favorite("u1", "s1").await.unwrap());
        assert!(catalog.is_favorite("u1", "s1").await.unwrap());
        assert!(!catalog.toggle_favorite("u1", "s1").await.unwrap());
        assert!(store.rows(FAVORITES_TABLE).is_empty());
    }

    #[tokio::test]
    async fn test_history_dedupes_keeping_most_recent() {
        let a = song_json("a", "A", "X", "2024-01-01T00:00:00Z");
        let b = song_json("b", "B", "X", "2024-01-01T00:00:00Z");
        let store = Arc::new(MemoryStore::with_rows(
            HISTORY_TABLE,
            vec![
                json!({"user_id": "u1", "song_id": "a", "played_at": "2024-05-01T10:00:00Z", "songs": a.clone()}),
                json!({"user_id": "u1", "song_id": "b", "played_at": "2024-05-02T10:00:00Z", "songs": b}),
                json!({"user_id": "u1", "song_id": "a", "played_at": "2024-05-03T10:00:00Z", "songs": a}),
            ],
        ));
        let catalog = Catalog::new(store);

        let history = catalog.history("u1").await.unwrap();
        assert_eq!(ids(&history), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_record_play_inserts_row() {
        let store = Arc::new(MemoryStore::default());
        let catalog = Catalog::new(store.clone());

        catalog.record_play("u1", "s1").await.unwrap();

        let rows = store.rows(HISTORY_TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["song_id"], "s1");
    }

    #[tokio::test]
    async fn test_library_stats() {
        let (catalog, store) = catalog_with_songs();
        store
            .insert(
                SONGS_TABLE,
                json!({"id": "4", "title": "t", "artist": "a", "audio_url": "u", "file_size": null}),
            )
            .await
            .unwrap();

        let stats = catalog.library_stats().await.unwrap();
        assert_eq!(stats.songs_count, 4);
        assert_eq!(stats.total_size, 3 * 1024);
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let (catalog, store) = catalog_with_songs();
        store.fail("select");
        assert!(catalog.recent_songs(HOME_SONG_LIMIT).await.is_err());
    }

    #[test]
    fn test_search_songs() {
        let songs = vec![
            Song::new("1", "Blue Moon", "Frank", "u"),
            Song::new("2", "Red Sky", "Luna Blue", "u"),
            Song::new("3", "Green", "Grass", "u"),
        ];

        assert_eq!(ids(&search_songs(&songs, "BLUE")), vec!["1", "2"]);
        assert_eq!(ids(&search_songs(&songs, "grass")), vec!["3"]);
        assert_eq!(search_songs(&songs, "   ").len(), 3);
        assert!(search_songs(&songs, "jazz").is_empty());
    }
}
