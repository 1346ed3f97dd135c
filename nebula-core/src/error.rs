use std::path::PathBuf;
use thiserror::Error;

/// Reason a sign-in or sign-up was refused by the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidCredentials,
    EmailNotConfirmed,
    AlreadyRegistered,
    Other(String),
}

impl AuthFailure {
    /// Classify a raw auth service message
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        if message.contains("Invalid login credentials") {
            Self::InvalidCredentials
        } else if message.contains("Email not confirmed") {
            Self::EmailNotConfirmed
        } else if message.contains("User already registered") {
            Self::AlreadyRegistered
        } else {
            Self::Other(message.to_string())
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials => f.write_str("wrong email or password"),
            Self::EmailNotConfirmed => f.write_str("confirm your email before signing in"),
            Self::AlreadyRegistered => f.write_str("this email is already registered"),
            Self::Other(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - please fill in the backend section and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Missing required config field: {field}")]
    ConfigMissingField { field: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Input errors, raised before any network call
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    // Session errors
    #[error("Authentication failed: {0}")]
    AuthFailed(AuthFailure),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Display name can be changed again in {remaining_days} day(s)")]
    NameChangeCooldown { remaining_days: i64 },

    // Backend errors
    #[error("Backend {operation} failed: {reason}")]
    Backend { operation: String, reason: String },

    #[error("Record not found in {table}")]
    RecordNotFound { table: String },

    // Player errors
    #[error("Player task is no longer running")]
    PlayerStopped,

    // Network errors
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Network middleware failed: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Shorthand for a validation failure on a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a failed backend operation
    pub fn backend(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
