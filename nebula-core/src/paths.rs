//! Locations of the config, preference and log files.

use std::path::PathBuf;

/// Directory name under ~/.config/
pub const CONFIG_DIR_NAME: &str = "nebula";

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Language preference and other small UI state (prefixed with . for hidden)
pub const PREFERENCES_FILE_NAME: &str = ".preferences.json";

/// Signed-in session kept between runs (prefixed with . for hidden)
pub const SESSION_FILE_NAME: &str = ".session.json";

pub const LOG_FILE_NAME: &str = "nebula.log";

/// Get the configuration directory path (~/.config/nebula/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/nebula/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the preferences file path (`~/.config/nebula/.preferences.json`)
#[must_use]
pub fn preferences_path() -> PathBuf {
    config_dir().join(PREFERENCES_FILE_NAME)
}

/// Get the persisted session path (`~/.config/nebula/.session.json`)
#[must_use]
pub fn session_path() -> PathBuf {
    config_dir().join(SESSION_FILE_NAME)
}

/// Get the log file path (`~/.config/nebula/nebula.log`)
#[must_use]
pub fn log_path() -> PathBuf {
    config_dir().join(LOG_FILE_NAME)
}
