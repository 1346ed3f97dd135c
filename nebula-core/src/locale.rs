//! Display language, its translation table and the persisted preference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    It,
    En,
    Fr,
}

impl Language {
    pub const ALL: [Self; 3] = [Self::It, Self::En, Self::Fr];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::It => "it",
            Self::En => "en",
            Self::Fr => "fr",
        }
    }

    /// Name of the language in itself
    #[must_use]
    pub const fn native_name(self) -> &'static str {
        match self {
            Self::It => "Italiano",
            Self::En => "English",
            Self::Fr => "Français",
        }
    }

    #[must_use]
    pub fn translations(self) -> &'static Translations {
        match self {
            Self::It => &IT,
            Self::En => &EN,
            Self::Fr => &FR,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "it" => Ok(Self::It),
            "en" => Ok(Self::En),
            "fr" => Ok(Self::Fr),
            other => Err(format!("unknown language '{other}' (expected it, en or fr)")),
        }
    }
}

/// UI strings for one language
#[derive(Debug)]
pub struct Translations {
    pub home: &'static str,
    pub search: &'static str,
    pub library: &'static str,
    pub profile: &'static str,
    pub settings: &'static str,
    pub language: &'static str,
    pub songs: &'static str,
    pub space: &'static str,
    pub admin_panel: &'static str,
    pub good_morning: &'static str,
    pub good_afternoon: &'static str,
    pub good_evening: &'static str,
    pub what_to_listen: &'static str,
    pub no_songs: &'static str,
    pub all_songs: &'static str,
    pub favorites: &'static str,
    pub playlists: &'static str,
    pub history: &'static str,
    pub your_music: &'static str,
}

impl Translations {
    /// Greeting for a local hour of day (0-23)
    #[must_use]
    pub const fn greeting(&self, hour: u32) -> &'static str {
        if hour < 12 {
            self.good_morning
        } else if hour < 18 {
            self.good_afternoon
        } else {
            self.good_evening
        }
    }
}

static IT: Translations = Translations {
    home: "Home",
    search: "Cerca",
    library: "Libreria",
    profile: "Profilo",
    settings: "Impostazioni",
    language: "Lingua",
    songs: "Brani",
    space: "Spazio",
    admin_panel: "Pannello Admin",
    good_morning: "Buongiorno",
    good_afternoon: "Buon pomeriggio",
    good_evening: "Buonasera",
    what_to_listen: "Cosa vuoi ascoltare oggi?",
    no_songs: "Nessuna canzone disponibile",
    all_songs: "Tutte le canzoni",
    favorites: "Preferiti",
    playlists: "Playlist",
    history: "Cronologia",
    your_music: "La tua musica, ovunque",
};

static EN: Translations = Translations {
    home: "Home",
    search: "Search",
    library: "Library",
    profile: "Profile",
    settings: "Settings",
    language: "Language",
    songs: "Songs",
    space: "Space",
    admin_panel: "Admin Panel",
    good_morning: "Good morning",
    good_afternoon: "Good afternoon",
    good_evening: "Good evening",
    what_to_listen: "What do you want to listen to today?",
    no_songs: "No songs available",
    all_songs: "All songs",
    favorites: "Favorites",
    playlists: "Playlists",
    history: "History",
    your_music: "Your music, everywhere",
};

static FR: Translations = Translations {
    home: "Accueil",
    search: "Rechercher",
    library: "Bibliothèque",
    profile: "Profil",
    settings: "Paramètres",
    language: "Langue",
    songs: "Titres",
    space: "Espace",
    admin_panel: "Panneau Admin",
    good_morning: "Bonjour",
    good_afternoon: "Bon après-midi",
    good_evening: "Bonsoir",
    what_to_listen: "Qu'est-ce que tu veux écouter aujourd'hui?",
    no_songs: "Aucune chanson disponible",
    all_songs: "Toutes les chansons",
    favorites: "Favoris",
    playlists: "Playlists",
    history: "Historique",
    your_music: "Ta musique, partout",
};

/// Small UI preferences persisted between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub language: Language,
}

impl Preferences {
    /// Load preferences from the default file.
    /// Falls back to defaults if the file is missing or unreadable.
    #[must_use]
    pub fn load() -> Self {
        Self::load_from(&crate::paths::preferences_path())
    }

    #[must_use]
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(prefs) => {
                    info!("Loaded preferences from {:?}", path);
                    prefs
                }
                Err(e) => {
                    warn!("Failed to parse preferences: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read preferences file: {}", e);
                Self::default()
            }
        }
    }

    /// Save preferences to the default file
    pub fn save(&self) {
        self.save_to(&crate::paths::preferences_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create preferences directory: {}", e);
                return;
            }
        }

        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = fs::write(path, content) {
                    warn!("Failed to write preferences: {}", e);
                } else {
                    info!("Saved preferences to {:?}", path);
                }
            }
            Err(e) => {
                warn!("Failed to serialize preferences: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_language_is_italian() {
        assert_eq!(Language::default(), Language::It);
        assert_eq!(Preferences::default().language, Language::It);
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert_eq!(" fr ".parse::<Language>().unwrap(), Language::Fr);
        assert!("de".parse::<Language>().is_err());
    }

    #[test]
    fn test_greeting_boundaries() {
        let t = Language::En.translations();
        assert_eq!(t.greeting(0), "Good morning");
        assert_eq!(t.greeting(11), "Good morning");
        assert_eq!(t.greeting(12), "Good afternoon");
        assert_eq!(t.greeting(17), "Good afternoon");
        assert_eq!(t.greeting(18), "Good evening");
        assert_eq!(Language::It.translations().greeting(9), "Buongiorno");
    }

    #[test]
    fn test_preferences_persist() {
        let dir = std::env::temp_dir().join(format!("nebula-prefs-test-{}", std::process::id()));
        let path = dir.join(".preferences.json");
        let _ = fs::remove_dir_all(&dir);

        assert_eq!(Preferences::load_from(&path), Preferences::default());

        let prefs = Preferences {
            language: Language::Fr,
        };
        prefs.save_to(&path);
        assert_eq!(Preferences::load_from(&path).language, Language::Fr);

        fs::write(&path, "not json").unwrap();
        assert_eq!(Preferences::load_from(&path), Preferences::default());

        let _ = fs::remove_dir_all(&dir);
    }
}
