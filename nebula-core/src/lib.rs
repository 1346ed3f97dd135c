pub mod admin;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod haptics;
pub mod locale;
pub mod lyrics;
pub mod media;
pub mod paths;
pub mod playback;
pub mod player;
pub mod session;
pub mod song;
pub mod time;
pub mod upload;

pub use admin::{AccessResult, AdminGate, AdminPanel};
pub use backend::{
    AuthService, AuthSession, AuthUser, BlobStore, Filter, Order, Query, RecordStore,
    COVERS_BUCKET, FAVORITES_TABLE, HISTORY_TABLE, MUSIC_BUCKET, PLAYLISTS_TABLE,
    PROFILES_TABLE, SONGS_TABLE,
};
pub use catalog::{search_songs, Catalog, LibraryStats, HOME_SONG_LIMIT};
pub use config::{
    build_config_template, AdminConfig, BackendConfig, LoggingConfig, NebulaConfig, PlayerConfig,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use error::{AuthFailure, CoreError, Result};
pub use engine::{PlaybackEngine, PlayerEvent};
pub use haptics::{Haptics, NoHaptics};
pub use locale::{Language, Preferences, Translations};
pub use lyrics::{current_lyric_index, format_lyrics, parse_lyrics, LyricLine};
pub use media::{MediaElement, MediaEvent, MediaEventKind, SessionToken};
pub use paths::{
    config_dir, log_path, preferences_path, session_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME,
    LOG_FILE_NAME, PREFERENCES_FILE_NAME, SESSION_FILE_NAME,
};
pub use playback::{PlaybackState, RepeatMode};
pub use player::{spawn_player, PlayerCommand, PlayerHandle};
pub use session::{validate_credentials, ListenTracker, Profile, SessionManager};
pub use song::{Playlist, Song, SongRecord};
pub use time::{format_bytes, format_clock, format_song_duration, DurationExt};
pub use upload::{MediaFile, SaveOutcome, SongDraft, UploadFlow};
