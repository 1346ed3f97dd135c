//! The hidden admin dialog: a static credential gate with attempt lockout,
//! and the song list / edit form behind it.

use crate::catalog::Catalog;
use crate::config::AdminConfig;
use crate::error::{CoreError, Result};
use crate::haptics::{Haptics, NoHaptics, ADMIN_GRANTED_PATTERN};
use crate::song::Song;
use crate::upload::{SaveOutcome, SongDraft, UploadFlow};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const LOG_TARGET: &str = "nebula::admin";

/// Outcome of one credential attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    Granted,
    /// Wrong credential; `attempts` failures so far out of `max_attempts`
    Denied { attempts: u32, max_attempts: u32 },
    /// Rejected without checking until the lockout expires
    LockedOut { retry_after: Duration },
}

/// PIN/passphrase check with a lockout after repeated failures.
///
/// This keeps casual users out of the upload tools. It is not a security
/// boundary: the credentials ship with the client config.
#[derive(Debug, Clone)]
pub struct AdminGate {
    pin: String,
    passphrase: String,
    max_attempts: u32,
    lockout: Duration,
    failed_attempts: u32,
    locked_until: Option<Instant>,
}

impl AdminGate {
    #[must_use]
    pub fn new(config: &AdminConfig) -> Self {
        Self {
            pin: config.pin.clone(),
            passphrase: config.passphrase.clone(),
            max_attempts: config.max_attempts.max(1),
            lockout: config.lockout(),
            failed_attempts: 0,
            locked_until: None,
        }
    }

    /// Whether any credential is configured at all
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.pin.is_empty() || !self.passphrase.is_empty()
    }

    #[must_use]
    pub const fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Time left on the lockout at `now`, if any
    #[must_use]
    pub fn locked_for(&self, now: Instant) -> Option<Duration> {
        self.locked_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }

    pub fn attempt(&mut self, input: &str) -> AccessResult {
        self.attempt_at(input, Instant::now())
    }

    /// Check `input` as if at time `now`
    pub fn attempt_at(&mut self, input: &str, now: Instant) -> AccessResult {
        if let Some(until) = self.locked_until {
            if now < until {
                return AccessResult::LockedOut {
                    retry_after: until - now,
                };
            }
            self.locked_until = None;
            self.failed_attempts = 0;
        }

        if self.matches(input) {
            self.failed_attempts = 0;
            return AccessResult::Granted;
        }

        self.failed_attempts += 1;
        if self.failed_attempts >= self.max_attempts {
            warn!(
                target: LOG_TARGET,
                "Too many failed admin attempts, locked for {}s",
                self.lockout.as_secs()
            );
            self.locked_until = Some(now + self.lockout);
            AccessResult::LockedOut {
                retry_after: self.lockout,
            }
        } else {
            AccessResult::Denied {
                attempts: self.failed_attempts,
                max_attempts: self.max_attempts,
            }
        }
    }

    fn matches(&self, input: &str) -> bool {
        (!self.pin.is_empty() && input == self.pin)
            || (!self.passphrase.is_empty() && input == self.passphrase)
    }
}

/// State of the admin dialog
pub struct AdminPanel {
    gate: AdminGate,
    catalog: Catalog,
    flow: UploadFlow,
    haptics: Arc<dyn Haptics>,
    authenticated: bool,
    /// Credential being typed
    pub input: String,
    songs: Vec<Song>,
    form_open: bool,
    /// Edit form contents
    pub draft: SongDraft,
    editing: Option<Song>,
}

impl AdminPanel {
    pub fn new(config: &AdminConfig, catalog: Catalog, flow: UploadFlow) -> Self {
        Self {
            gate: AdminGate::new(config),
            catalog,
            flow,
            haptics: Arc::new(NoHaptics),
            authenticated: false,
            input: String::new(),
            songs: Vec::new(),
            form_open: false,
            draft: SongDraft::default(),
            editing: None,
        }
    }

    #[must_use]
    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    #[must_use]
    pub const fn gate(&self) -> &AdminGate {
        &self.gate
    }

    #[must_use]
    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    #[must_use]
    pub const fn is_form_open(&self) -> bool {
        self.form_open
    }

    #[must_use]
    pub const fn editing(&self) -> Option<&Song> {
        self.editing.as_ref()
    }

    pub fn submit(&mut self) -> AccessResult {
        self.submit_at(Instant::now())
    }

    /// Check the typed credential. The input is cleared after every checked
    /// attempt and kept while locked out. Call [`AdminPanel::refresh`] after
    /// a grant to load the song list.
    pub fn submit_at(&mut self, now: Instant) -> AccessResult {
        let was_locked = self.gate.locked_for(now).is_some();
        let result = self.gate.attempt_at(&self.input, now);

        if !was_locked {
            self.input.clear();
        }
        if result == AccessResult::Granted {
            info!(target: LOG_TARGET, "Admin access granted");
            self.authenticated = true;
            self.haptics.vibrate(&ADMIN_GRANTED_PATTERN);
        }

        result
    }

    /// Open an empty form for a new song
    pub fn start_new(&mut self) {
        self.reset_form();
        self.form_open = true;
    }

    /// Open the form pre-filled from `song`
    pub fn start_edit(&mut self, song: &Song) {
        self.draft = SongDraft::from_song(song);
        self.editing = Some(song.clone());
        self.form_open = true;
    }

    pub fn reset_form(&mut self) {
        self.editing = None;
        self.form_open = false;
        self.draft = SongDraft::default();
    }

    /// Leave the dialog, dropping authentication
    pub fn close(&mut self) {
        self.authenticated = false;
        self.input.clear();
        self.reset_form();
    }

    /// Reload the song list
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog query fails; the old list is kept.
    pub async fn refresh(&mut self) -> Result<()> {
        self.songs = self.catalog.all_songs().await?;
        Ok(())
    }

    /// Save the form. On success the form is reset and the list reloaded;
    /// on failure the form is left as it was.
    ///
    /// # Errors
    ///
    /// Returns a validation or backend error from the upload flow.
    pub async fn save(&mut self) -> Result<SaveOutcome> {
        self.require_auth()?;

        let outcome = self.flow.save(&self.draft, self.editing.as_ref()).await?;
        self.reset_form();
        if let Err(e) = self.refresh().await {
            warn!(target: LOG_TARGET, "Saved, but reloading songs failed: {}", e);
        }
        Ok(outcome)
    }

    /// Delete a song and reload the list
    ///
    /// # Errors
    ///
    /// Returns a backend error if the delete fails.
    pub async fn delete(&mut self, song: &Song) -> Result<()> {
        self.require_auth()?;

        self.flow.delete(song).await?;
        if let Err(e) = self.refresh().await {
            warn!(target: LOG_TARGET, "Deleted, but reloading songs failed: {}", e);
        }
        Ok(())
    }

    fn require_auth(&self) -> Result<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(CoreError::validation("admin", "not authenticated"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBlobs, MemoryStore};
    use crate::backend::{RecordStore, SONGS_TABLE};
    use crate::haptics::testing::RecordingHaptics;
    use crate::upload::MediaFile;

    fn config() -> AdminConfig {
        AdminConfig {
            pin: "1234".into(),
            passphrase: "open sesame".into(),
            ..AdminConfig::default()
        }
    }

    fn panel() -> (AdminPanel, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let blobs = Arc::new(MemoryBlobs::default());
        let panel = AdminPanel::new(
            &config(),
            Catalog::new(store.clone()),
            UploadFlow::new(store.clone(), blobs),
        );
        (panel, store)
    }

    #[test]
    fn test_gate_accepts_pin_or_passphrase() {
        let mut gate = AdminGate::new(&config());
        assert_eq!(gate.attempt("1234"), AccessResult::Granted);
        assert_eq!(gate.attempt("open sesame"), AccessResult::Granted);
        assert_eq!(
            gate.attempt("nope"),
            AccessResult::Denied {
                attempts: 1,
                max_attempts: 5
            }
        );
    }

    #[test]
    fn test_gate_without_credentials_never_grants() {
        let mut gate = AdminGate::new(&AdminConfig::default());
        assert!(!gate.is_enabled());
        assert!(matches!(gate.attempt(""), AccessResult::Denied { .. }));
    }

    #[test]
    fn test_gate_lockout_after_five_failures() {
        let mut gate = AdminGate::new(&config());
        let start = Instant::now();

        for i in 1..5 {
            assert_eq!(
                gate.attempt_at("wrong", start),
                AccessResult::Denied {
                    attempts: i,
                    max_attempts: 5
                }
            );
        }
        assert_eq!(
            gate.attempt_at("wrong", start),
            AccessResult::LockedOut {
                retry_after: Duration::from_secs(60)
            }
        );

        // Correct PIN is rejected without checking while locked
        let later = start + Duration::from_secs(30);
        assert_eq!(
            gate.attempt_at("1234", later),
            AccessResult::LockedOut {
                retry_after: Duration::from_secs(30)
            }
        );
        assert_eq!(gate.failed_attempts(), 5);
        assert_eq!(gate.locked_for(later), Some(Duration::from_secs(30)));

        // After the lockout the counter starts over
        let after = start + Duration::from_secs(60);
        assert_eq!(
            gate.attempt_at("wrong", after),
            AccessResult::Denied {
                attempts: 1,
                max_attempts: 5
            }
        );
        assert_eq!(gate.attempt_at("1234", after), AccessResult::Granted);
        assert_eq!(gate.locked_for(after), None);
    }

    #[test]
    fn test_panel_input_handling() {
        let haptics = RecordingHaptics::default();
        let (panel, _) = panel();
        let mut panel = panel.with_haptics(Arc::new(haptics.clone()));
        let start = Instant::now();

        panel.input = "bad".into();
        assert!(matches!(panel.submit_at(start), AccessResult::Denied { .. }));
        assert!(panel.input.is_empty());
        assert!(!panel.is_authenticated());

        panel.input = "1234".into();
        assert_eq!(panel.submit_at(start), AccessResult::Granted);
        assert!(panel.input.is_empty());
        assert!(panel.is_authenticated());
        assert_eq!(haptics.taken(), vec![vec![50, 50, 50]]);

        panel.close();
        assert!(!panel.is_authenticated());
    }

    #[test]
    fn test_panel_keeps_input_while_locked() {
        let (mut panel, _) = panel();
        let start = Instant::now();
        for _ in 0..5 {
            panel.input = "bad".into();
            panel.submit_at(start);
        }
        assert!(panel.input.is_empty());

        panel.input = "1234".into();
        assert!(matches!(
            panel.submit_at(start + Duration::from_secs(1)),
            AccessResult::LockedOut { .. }
        ));
        assert_eq!(panel.input, "1234");
    }

    #[tokio::test]
    async fn test_save_requires_authentication() {
        let (mut panel, store) = panel();
        panel.start_new();
        panel.draft.title = "t".into();
        panel.draft.artist = "a".into();
        panel.draft.audio = Some(MediaFile::new("a.mp3", vec![0; 4]));

        assert!(panel.save().await.is_err());
        assert!(store.rows(SONGS_TABLE).is_empty());
    }

    #[tokio::test]
    async fn test_save_resets_form_and_refreshes() {
        let (mut panel, store) = panel();
        panel.input = "1234".into();
        panel.submit();
        panel.refresh().await.unwrap();
        assert!(panel.songs().is_empty());

        panel.start_new();
        assert!(panel.is_form_open());
        panel.draft.title = "Nuova".into();
        panel.draft.artist = "Luna".into();
        panel.draft.audio = Some(MediaFile::new("nuova.mp3", vec![0; 16]));

        let outcome = panel.save().await.unwrap();
        assert_eq!(outcome, SaveOutcome::Created);
        assert!(!panel.is_form_open());
        assert_eq!(panel.draft, SongDraft::default());
        assert_eq!(store.rows(SONGS_TABLE).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_form() {
        let (mut panel, store) = panel();
        panel.input = "1234".into();
        panel.submit();
        store.fail("insert");

        panel.start_new();
        panel.draft.title = "Nuova".into();
        panel.draft.artist = "Luna".into();
        panel.draft.audio = Some(MediaFile::new("nuova.mp3", vec![0; 16]));
        let before = panel.draft.clone();

        assert!(panel.save().await.is_err());
        assert!(panel.is_form_open());
        assert_eq!(panel.draft, before);
    }

    #[tokio::test]
    async fn test_edit_and_delete() {
        let (mut panel, store) = panel();
        let song = Song::new("s1", "Vecchia", "Luna", "https://cdn/s1.mp3");
        store
            .insert(SONGS_TABLE, serde_json::to_value(&song).unwrap())
            .await
            .unwrap();

        panel.input = "open sesame".into();
        panel.submit();
        panel.refresh().await.unwrap();
        assert_eq!(panel.songs().len(), 1);

        panel.start_edit(&song);
        assert_eq!(panel.editing().map(|s| s.id.as_str()), Some("s1"));
        assert_eq!(panel.draft.title, "Vecchia");
        panel.draft.title = "Rinnovata".into();
        assert_eq!(panel.save().await.unwrap(), SaveOutcome::Updated);
        assert_eq!(panel.songs()[0].title, "Rinnovata");

        let current = panel.songs()[0].clone();
        panel.delete(&current).await.unwrap();
        assert!(panel.songs().is_empty());
    }
}
