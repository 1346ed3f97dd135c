//! Signed-in user, their profile row, and listen-time accounting.

use crate::backend::{select_as, AuthService, AuthSession, Filter, Query, RecordStore, PROFILES_TABLE};
use crate::error::{AuthFailure, CoreError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const LOG_TARGET: &str = "nebula::session";

pub const MIN_PASSWORD_LEN: usize = 6;

/// Days between two display name changes
pub const NAME_CHANGE_COOLDOWN_DAYS: i64 = 15;

pub const MAX_DISPLAY_NAME_LEN: usize = 50;

/// Position jumps larger than this are treated as seeks, not listening
pub const MAX_LISTEN_STEP: Duration = Duration::from_secs(5);

/// Row of the `profiles` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub total_listen_seconds: u64,
    #[serde(default)]
    pub last_name_change: Option<DateTime<Utc>>,
}

impl Profile {
    /// Whole days left before the display name may change again, 0 if allowed now
    #[must_use]
    pub fn name_change_wait_days(&self, now: DateTime<Utc>) -> i64 {
        let Some(last) = self.last_name_change else {
            return 0;
        };

        let remaining = (last + TimeDelta::days(NAME_CHANGE_COOLDOWN_DAYS)) - now;
        let secs = remaining.num_seconds();
        if secs <= 0 {
            0
        } else {
            (secs + 86_399) / 86_400
        }
    }
}

/// Check sign-in/sign-up input before it reaches the auth service
///
/// # Errors
///
/// Returns [`CoreError::Validation`] naming the offending field.
pub fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if !looks_like_email(email) {
        return Err(CoreError::validation("email", "is not a valid address"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::validation(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Turn raw backend auth messages into the known failure kinds
fn classify_auth_error(err: CoreError) -> CoreError {
    match err {
        CoreError::Backend { reason, .. } => CoreError::AuthFailed(AuthFailure::from_message(&reason)),
        other => other,
    }
}

/// Session and profile provider
#[derive(Clone)]
pub struct SessionManager {
    auth: Arc<dyn AuthService>,
    store: Arc<dyn RecordStore>,
}

impl SessionManager {
    pub fn new(auth: Arc<dyn AuthService>, store: Arc<dyn RecordStore>) -> Self {
        Self { auth, store }
    }

    /// # Errors
    ///
    /// Returns a validation error without contacting the backend, or
    /// [`CoreError::AuthFailed`] if the credentials are refused.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        validate_credentials(email, password)?;

        let session = self
            .auth
            .sign_in(email, password)
            .await
            .map_err(classify_auth_error)?;
        info!(target: LOG_TARGET, "Signed in as {}", session.user.id);
        Ok(session)
    }

    /// Register a new account. `None` means the email must be confirmed first.
    ///
    /// # Errors
    ///
    /// Returns a validation error without contacting the backend, or
    /// [`CoreError::AuthFailed`] if the account already exists.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<AuthSession>> {
        validate_credentials(email, password)?;

        self.auth
            .sign_up(email, password)
            .await
            .map_err(classify_auth_error)
    }

    /// # Errors
    ///
    /// Returns an error if the auth service rejects the sign-out.
    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await?;
        info!(target: LOG_TARGET, "Signed out");
        Ok(())
    }

    pub async fn current_session(&self) -> Option<AuthSession> {
        self.auth.current_session().await
    }

    async fn require_session(&self) -> Result<AuthSession> {
        self.current_session().await.ok_or(CoreError::NotSignedIn)
    }

    /// The signed-in user's profile
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotSignedIn`], [`CoreError::RecordNotFound`] or a backend error.
    pub async fn profile(&self) -> Result<Profile> {
        let session = self.require_session().await?;
        let query = Query::table(PROFILES_TABLE)
            .eq("id", session.user.id.as_str())
            .limit(1);

        select_as::<Profile>(self.store.as_ref(), &query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::RecordNotFound {
                table: PROFILES_TABLE.to_string(),
            })
    }

    /// Change the display name, at most once every 15 days
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NameChangeCooldown`] while the cooldown runs, a
    /// validation error for an empty or overlong name, or a backend error.
    pub async fn rename(&self, new_name: &str, now: DateTime<Utc>) -> Result<Profile> {
        let name = new_name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("display_name", "is required"));
        }
        if name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(CoreError::validation(
                "display_name",
                format!("must be at most {MAX_DISPLAY_NAME_LEN} characters"),
            ));
        }

        let mut profile = self.profile().await?;
        let remaining_days = profile.name_change_wait_days(now);
        if remaining_days > 0 {
            return Err(CoreError::NameChangeCooldown { remaining_days });
        }

        self.store
            .update(
                PROFILES_TABLE,
                &[Filter::eq("id", profile.id.as_str())],
                json!({ "display_name": name, "last_name_change": now }),
            )
            .await?;

        info!(target: LOG_TARGET, "Display name changed to '{}'", name);
        profile.display_name = Some(name.to_string());
        profile.last_name_change = Some(now);
        Ok(profile)
    }

    /// Add listened seconds to the profile total
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotSignedIn`] or a backend error.
    pub async fn add_listen_time(&self, seconds: u64) -> Result<u64> {
        let profile = self.profile().await?;
        if seconds == 0 {
            return Ok(profile.total_listen_seconds);
        }

        let total = profile.total_listen_seconds.saturating_add(seconds);
        self.store
            .update(
                PROFILES_TABLE,
                &[Filter::eq("id", profile.id.as_str())],
                json!({ "total_listen_seconds": total }),
            )
            .await?;
        Ok(total)
    }
}

/// Read a session saved by [`save_session`]. Missing or corrupt files yield `None`.
#[must_use]
pub fn load_session(path: &Path) -> Option<AuthSession> {
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to parse saved session: {}", e);
                None
            }
        },
        Err(e) => {
            warn!(target: LOG_TARGET, "Failed to read saved session: {}", e);
            None
        }
    }
}

/// Persist `session`, or remove the file when signed out
pub fn save_session(path: &Path, session: Option<&AuthSession>) {
    let Some(session) = session else {
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                warn!(target: LOG_TARGET, "Failed to remove saved session: {}", e);
            }
        }
        return;
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!(target: LOG_TARGET, "Failed to create session directory: {}", e);
            return;
        }
    }

    match serde_json::to_string(session) {
        Ok(content) => {
            if let Err(e) = fs::write(path, content) {
                warn!(target: LOG_TARGET, "Failed to write session: {}", e);
            }
        }
        Err(e) => warn!(target: LOG_TARGET, "Failed to serialize session: {}", e),
    }
}

/// Accumulates time actually listened from successive position reports
#[derive(Debug, Clone, Default)]
pub struct ListenTracker {
    last_position: Option<Duration>,
    accumulated: Duration,
}

impl ListenTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a position report. Only small forward steps while playing count.
    pub fn observe(&mut self, position: Duration, is_playing: bool) {
        if let Some(last) = self.last_position {
            if is_playing && position > last {
                let step = position - last;
                if step <= MAX_LISTEN_STEP {
                    self.accumulated += step;
                }
            }
        }
        self.last_position = Some(position);
    }

    /// Forget the last position, e.g. when the track changes
    pub fn reset_position(&mut self) {
        self.last_position = None;
    }

    /// Take the whole seconds accumulated so far, keeping the remainder
    pub fn take_whole_seconds(&mut self) -> u64 {
        let secs = self.accumulated.as_secs();
        self.accumulated -= Duration::from_secs(secs);
        secs
    }
}
