use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NebulaConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Managed backend project the client talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Public (anon) API key sent with every request
    pub anon_key: String,
}

/// Credentials and lockout policy for the hidden admin panel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub pin: String,
    #[serde(default)]
    pub passphrase: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_lockout_secs() -> u64 {
    60
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            pin: String::new(),
            passphrase: String::new(),
            max_attempts: default_max_attempts(),
            lockout_secs: default_lockout_secs(),
        }
    }
}

impl AdminConfig {
    #[must_use]
    pub const fn lockout(&self) -> Duration {
        Duration::from_secs(self.lockout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Initial volume, 0.0 ..= 1.0
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// Past this point "previous" restarts the track instead of going back
    #[serde(default = "default_restart_threshold")]
    pub restart_threshold_secs: u64,
    /// How often the audio output reports its position
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

const fn default_volume() -> f32 {
    1.0
}

const fn default_restart_threshold() -> u64 {
    3
}

const fn default_tick_interval() -> u64 {
    250
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            restart_threshold_secs: default_restart_threshold(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl PlayerConfig {
    #[must_use]
    pub const fn restart_threshold(&self) -> Duration {
        Duration::from_secs(self.restart_threshold_secs)
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to ~/.config/nebula/nebula.log
    #[serde(default)]
    pub enabled: bool,
}

impl NebulaConfig {
    /// Get the configuration directory path (~/.config/nebula/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/nebula/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from file or create template on first run
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or if required fields are missing.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Same as [`NebulaConfig::load_or_create`] for an explicit path
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing the template when the
    /// file is missing, or a parse/validation error otherwise.
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(config_path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        Self::parse(&content)
    }

    /// Parse and validate TOML config text
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a required field is empty.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;

        if config.backend.url.trim().is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "backend.url".to_string(),
            });
        }
        if config.backend.anon_key.trim().is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "backend.anon_key".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&config.player.default_volume) {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "player.default_volume must be between 0 and 1, got {}",
                    config.player.default_volume
                ),
            });
        }
        if config.admin.max_attempts == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "admin.max_attempts must be at least 1".to_string(),
            });
        }

        Ok(config)
    }
}

/// Returns the template config file contents
#[must_use]
pub const fn build_config_template() -> &'static str {
    CONFIG_TEMPLATE
}

const CONFIG_TEMPLATE: &str = r#"# Nebula Configuration
# ~/.config/nebula/config.toml

[backend]
# Required: project URL and public anon key of the backend project
url = ""
anon_key = ""

[admin]
# Either credential opens the admin panel. Leave both empty to disable it.
pin = ""
passphrase = ""
max_attempts = 5
lockout_secs = 60

[player]
default_volume = 1.0
# Pressing "previous" after this many seconds restarts the track
restart_threshold_secs = 3
tick_interval_ms = 250

[logging]
# Write logs to ~/.config/nebula/nebula.log in addition to the console
enabled = false
"#;
