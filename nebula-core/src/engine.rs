//! The playback engine: one media element, a play queue, shuffle/repeat modes
//! and the lyric line derived from the playback position.
//!
//! The engine is a plain single-writer state machine. It is driven by user
//! commands (the `pub fn`s below) and by [`MediaEvent`]s coming back from the
//! media element, and it announces every observable change as a
//! [`PlayerEvent`] on a broadcast channel.

use crate::config::PlayerConfig;
use crate::haptics::{Haptics, NoHaptics, NAVIGATION_PULSE_MS, TRANSPORT_PULSE_MS};
use crate::lyrics::current_lyric_index;
use crate::media::{MediaElement, MediaEvent, MediaEventKind, SessionToken};
use crate::playback::{PlaybackState, RepeatMode};
use crate::song::Song;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "nebula::engine";

/// Events emitted by the playback engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// A new track was loaded and a play request issued
    TrackChanged { song: Song, index: usize },
    /// The media element confirmed playback is running
    PlaybackResumed { position: Duration },
    PlaybackPaused { position: Duration },
    /// Reached the end of the queue with nothing left to play
    PlaybackStopped,
    /// Regular position report
    PositionChanged { position: Duration },
    /// Position was moved explicitly (seek or restart)
    Seeked { position: Duration },
    DurationLoaded { duration: Duration },
    LyricLineChanged { index: Option<usize> },
    QueueChanged { len: usize },
    ShuffleChanged { enabled: bool },
    RepeatModeChanged { mode: RepeatMode },
    VolumeChanged { volume: f32 },
    FullscreenChanged { fullscreen: bool },
    /// A play request was rejected by the media element
    PlaybackFailed { reason: String },
}

/// Owns the media element and all playback state
pub struct PlaybackEngine<M: MediaElement> {
    media: M,
    queue: Vec<Song>,
    state: PlaybackState,
    session: SessionToken,
    restart_threshold: Duration,
    rng: StdRng,
    haptics: Arc<dyn Haptics>,
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl<M: MediaElement> PlaybackEngine<M> {
    /// Create an engine around `media` with the configured initial volume
    #[must_use]
    pub fn new(mut media: M, config: &PlayerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let volume = config.default_volume.clamp(0.0, 1.0);
        media.set_volume(volume);

        Self {
            media,
            queue: Vec::new(),
            state: PlaybackState {
                volume,
                ..PlaybackState::default()
            },
            session: SessionToken::default(),
            restart_threshold: config.restart_threshold(),
            rng: StdRng::from_entropy(),
            haptics: Arc::new(NoHaptics),
            event_tx,
        }
    }

    /// Use a specific RNG for shuffling (seeded in tests)
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    #[must_use]
    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }

    /// Sender side, for handing out new subscriptions after the engine moves
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<PlayerEvent> {
        self.event_tx.clone()
    }

    #[must_use]
    pub const fn state(&self) -> &PlaybackState {
        &self.state
    }

    #[must_use]
    pub fn queue(&self) -> &[Song] {
        &self.queue
    }

    /// Token of the most recent load
    #[must_use]
    pub const fn session(&self) -> SessionToken {
        self.session
    }

    /// Replace the queue with a single song and start it
    pub fn play_song(&mut self, song: Song) {
        self.haptics.pulse(TRANSPORT_PULSE_MS);
        self.replace_queue(vec![song], 0);
    }

    /// Replace the queue with `songs` and start the entry at `start_index`.
    ///
    /// With shuffle on, the songs are permuted first and `start_index` refers
    /// to the shuffled order.
    pub fn play_queue(&mut self, mut songs: Vec<Song>, start_index: usize) {
        if songs.is_empty() {
            return;
        }
        if start_index >= songs.len() {
            warn!(
                target: LOG_TARGET,
                "Ignoring play request: start index {} outside queue of {}",
                start_index,
                songs.len()
            );
            return;
        }

        if self.state.is_shuffle {
            songs.shuffle(&mut self.rng);
        }

        self.replace_queue(songs, start_index);
    }

    /// Pause when playing, otherwise ask the media element to resume
    pub fn toggle_play(&mut self) {
        if self.state.current_song.is_none() {
            return;
        }

        if self.state.is_playing {
            self.media.pause();
            self.state.is_playing = false;
            let _ = self.event_tx.send(PlayerEvent::PlaybackPaused {
                position: self.state.current_time,
            });
        } else {
            // Resume is confirmed by PlayResolved
            self.media.play(self.session);
        }

        self.haptics.pulse(TRANSPORT_PULSE_MS);
    }

    /// Advance to the next queue entry
    pub fn next_song(&mut self) {
        self.advance(true);
    }

    /// Restart the current track, or step back one entry near its start
    pub fn previous_song(&mut self) {
        if self.state.current_time > self.restart_threshold {
            self.restart_current();
            return;
        }

        if self.queue.is_empty() || self.state.current_index == 0 {
            return;
        }

        self.state.current_index -= 1;
        self.start_current();
        self.haptics.pulse(TRANSPORT_PULSE_MS);
    }

    /// Move the playback position without changing play/pause
    pub fn seek_to(&mut self, position: Duration) {
        let position = if self.state.duration.is_zero() {
            position
        } else {
            position.min(self.state.duration)
        };

        self.media.seek(position);
        self.state.current_time = position;
        self.refresh_lyric_index();
        let _ = self.event_tx.send(PlayerEvent::Seeked { position });
    }

    /// Set output volume, clamped to 0.0 ..= 1.0
    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            warn!(target: LOG_TARGET, "Ignoring NaN volume");
            return;
        }

        let volume = volume.clamp(0.0, 1.0);
        self.media.set_volume(volume);
        self.state.volume = volume;
        let _ = self.event_tx.send(PlayerEvent::VolumeChanged { volume });
    }

    /// Flip shuffle. Only affects the next `play_queue`.
    pub fn toggle_shuffle(&mut self) {
        self.state.is_shuffle = !self.state.is_shuffle;
        let _ = self.event_tx.send(PlayerEvent::ShuffleChanged {
            enabled: self.state.is_shuffle,
        });
        self.haptics.pulse(TRANSPORT_PULSE_MS);
    }

    /// Cycle repeat `off -> all -> one -> off`
    pub fn toggle_repeat(&mut self) {
        self.state.repeat_mode = self.state.repeat_mode.next();
        let _ = self.event_tx.send(PlayerEvent::RepeatModeChanged {
            mode: self.state.repeat_mode,
        });
        self.haptics.pulse(TRANSPORT_PULSE_MS);
    }

    /// Append to the queue without touching playback
    pub fn add_to_queue(&mut self, song: Song) {
        debug!(target: LOG_TARGET, "Queued '{}'", song.title);
        self.queue.push(song);
        self.state.queue_len = self.queue.len();
        let _ = self.event_tx.send(PlayerEvent::QueueChanged {
            len: self.queue.len(),
        });
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        if self.state.is_fullscreen == fullscreen {
            return;
        }

        self.state.is_fullscreen = fullscreen;
        let _ = self
            .event_tx
            .send(PlayerEvent::FullscreenChanged { fullscreen });
        self.haptics.pulse(NAVIGATION_PULSE_MS);
    }

    /// Apply an event reported by the media element.
    ///
    /// Returns `false` when the event belongs to a replaced source and was dropped.
    pub fn handle_media_event(&mut self, event: MediaEvent) -> bool {
        if event.session != self.session {
            debug!(
                target: LOG_TARGET,
                "Dropping stale media event from session {} (current {}): {:?}",
                event.session,
                self.session,
                event.kind
            );
            return false;
        }

        match event.kind {
            MediaEventKind::TimeUpdate(position) => {
                self.state.current_time = position;
                self.refresh_lyric_index();
                let _ = self.event_tx.send(PlayerEvent::PositionChanged { position });
            }
            MediaEventKind::LoadedMetadata { duration } => {
                self.state.duration = duration;
                let _ = self.event_tx.send(PlayerEvent::DurationLoaded { duration });
            }
            MediaEventKind::Ended => self.on_track_ended(),
            MediaEventKind::PlayResolved => {
                self.state.is_playing = true;
                let _ = self.event_tx.send(PlayerEvent::PlaybackResumed {
                    position: self.state.current_time,
                });
            }
            MediaEventKind::PlayRejected { reason } => {
                warn!(
                    target: LOG_TARGET,
                    "Playback failed for session {}: {}", self.session, reason
                );
                self.state.is_playing = false;
                let _ = self.event_tx.send(PlayerEvent::PlaybackFailed { reason });
            }
        }

        true
    }

    fn on_track_ended(&mut self) {
        if self.state.repeat_mode == RepeatMode::One {
            debug!(target: LOG_TARGET, "Repeating current track");
            self.media.seek(Duration::ZERO);
            self.state.current_time = Duration::ZERO;
            self.refresh_lyric_index();
            self.media.play(self.session);
        } else {
            self.advance(false);
        }
    }

    fn advance(&mut self, user_initiated: bool) {
        if self.queue.is_empty() {
            return;
        }

        let mut next_index = self.state.current_index + 1;
        if next_index >= self.queue.len() {
            if self.state.repeat_mode == RepeatMode::All {
                next_index = 0;
            } else {
                info!(target: LOG_TARGET, "End of queue reached");
                self.media.pause();
                self.state.is_playing = false;
                let _ = self.event_tx.send(PlayerEvent::PlaybackStopped);
                return;
            }
        }

        self.state.current_index = next_index;
        self.start_current();

        if user_initiated {
            self.haptics.pulse(TRANSPORT_PULSE_MS);
        }
    }

    fn replace_queue(&mut self, songs: Vec<Song>, index: usize) {
        self.queue = songs;
        self.state.current_index = index;
        self.state.queue_len = self.queue.len();
        let _ = self.event_tx.send(PlayerEvent::QueueChanged {
            len: self.queue.len(),
        });
        self.start_current();
    }

    /// Load the queue entry at `current_index` under a fresh session and play it
    fn start_current(&mut self) {
        let Some(song) = self.queue.get(self.state.current_index).cloned() else {
            return;
        };

        self.session = self.session.next();
        info!(
            target: LOG_TARGET,
            "Loading '{}' by {} (session {})", song.title, song.artist, self.session
        );

        self.state.is_playing = false;
        self.state.current_time = Duration::ZERO;
        self.state.duration = song.known_duration().unwrap_or_default();
        self.state.current_song = Some(song.clone());
        self.refresh_lyric_index();

        self.media.load(&song.audio_url, self.session);
        self.media.play(self.session);

        let _ = self.event_tx.send(PlayerEvent::TrackChanged {
            song,
            index: self.state.current_index,
        });
    }

    fn restart_current(&mut self) {
        self.media.seek(Duration::ZERO);
        self.state.current_time = Duration::ZERO;
        self.refresh_lyric_index();
        let _ = self.event_tx.send(PlayerEvent::Seeked {
            position: Duration::ZERO,
        });
    }

    fn refresh_lyric_index(&mut self) {
        let index = self
            .state
            .current_song
            .as_ref()
            .and_then(|song| current_lyric_index(song.lyric_lines(), self.state.current_time));

        if index != self.state.current_lyric_index {
            self.state.current_lyric_index = index;
            let _ = self.event_tx.send(PlayerEvent::LyricLineChanged { index });
        }
    }
}
