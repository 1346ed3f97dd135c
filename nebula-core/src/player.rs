//! Background task that owns the [`PlaybackEngine`] and serializes every
//! command and media event through it.

use crate::engine::{PlaybackEngine, PlayerEvent};
use crate::error::{CoreError, Result};
use crate::media::{MediaElement, MediaEvent};
use crate::playback::PlaybackState;
use crate::song::Song;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "nebula::player";

/// Transport commands accepted by the player task
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    PlaySong(Song),
    PlayQueue { songs: Vec<Song>, start_index: usize },
    TogglePlay,
    Next,
    Previous,
    Seek(Duration),
    SetVolume(f32),
    ToggleShuffle,
    ToggleRepeat,
    AddToQueue(Song),
    SetFullscreen(bool),
}

/// Cloneable front end to a running player task
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<PlayerCommand>,
    state_rx: watch::Receiver<PlaybackState>,
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl PlayerHandle {
    /// Queue a command for the player task
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn send(&self, command: PlayerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| CoreError::PlayerStopped)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn play_song(&self, song: Song) -> Result<()> {
        self.send(PlayerCommand::PlaySong(song))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn play_queue(&self, songs: Vec<Song>, start_index: usize) -> Result<()> {
        self.send(PlayerCommand::PlayQueue { songs, start_index })
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn toggle_play(&self) -> Result<()> {
        self.send(PlayerCommand::TogglePlay)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn next_song(&self) -> Result<()> {
        self.send(PlayerCommand::Next)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn previous_song(&self) -> Result<()> {
        self.send(PlayerCommand::Previous)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn seek_to(&self, position: Duration) -> Result<()> {
        self.send(PlayerCommand::Seek(position))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(PlayerCommand::SetVolume(volume))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn toggle_shuffle(&self) -> Result<()> {
        self.send(PlayerCommand::ToggleShuffle)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn toggle_repeat(&self) -> Result<()> {
        self.send(PlayerCommand::ToggleRepeat)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn add_to_queue(&self, song: Song) -> Result<()> {
        self.send(PlayerCommand::AddToQueue(song))
    }

    /// # Errors
    ///
    /// Returns [`CoreError::PlayerStopped`] if the task has exited.
    pub fn set_fullscreen(&self, fullscreen: bool) -> Result<()> {
        self.send(PlayerCommand::SetFullscreen(fullscreen))
    }

    /// Latest published state
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified whenever the state changes
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<PlaybackState> {
        self.state_rx.clone()
    }

    /// Subscribe to fine-grained engine events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }
}

/// Move `engine` into a background task and return a handle to drive it.
///
/// The task stops when `cancel_token` fires or when every handle is dropped.
pub fn spawn_player<M>(
    engine: PlaybackEngine<M>,
    media_events: mpsc::UnboundedReceiver<MediaEvent>,
    cancel_token: CancellationToken,
) -> (PlayerHandle, JoinHandle<()>)
where
    M: MediaElement + 'static,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(engine.state().clone());
    let event_tx = engine.event_sender();

    let task = tokio::spawn(run(engine, command_rx, media_events, state_tx, cancel_token));

    let handle = PlayerHandle {
        commands: command_tx,
        state_rx,
        event_tx,
    };

    (handle, task)
}

async fn run<M: MediaElement>(
    mut engine: PlaybackEngine<M>,
    mut commands: mpsc::UnboundedReceiver<PlayerCommand>,
    mut media_events: mpsc::UnboundedReceiver<MediaEvent>,
    state_tx: watch::Sender<PlaybackState>,
    cancel_token: CancellationToken,
) {
    info!(target: LOG_TARGET, "Player task started");
    let mut media_open = true;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!(target: LOG_TARGET, "Player task shutting down");
                break;
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    info!(target: LOG_TARGET, "All player handles dropped, stopping");
                    break;
                };
                debug!(target: LOG_TARGET, "Command: {:?}", command);
                apply(&mut engine, command);
            }
            event = media_events.recv(), if media_open => {
                match event {
                    Some(event) => {
                        engine.handle_media_event(event);
                    }
                    None => {
                        warn!(target: LOG_TARGET, "Media event channel closed; audio output is gone");
                        media_open = false;
                    }
                }
            }
        }

        let snapshot = engine.state();
        state_tx.send_if_modified(|current| {
            if *current == *snapshot {
                false
            } else {
                current.clone_from(snapshot);
                true
            }
        });
    }
}

fn apply<M: MediaElement>(engine: &mut PlaybackEngine<M>, command: PlayerCommand) {
    match command {
        PlayerCommand::PlaySong(song) => engine.play_song(song),
        PlayerCommand::PlayQueue { songs, start_index } => engine.play_queue(songs, start_index),
        PlayerCommand::TogglePlay => engine.toggle_play(),
        PlayerCommand::Next => engine.next_song(),
        PlayerCommand::Previous => engine.previous_song(),
        PlayerCommand::Seek(position) => engine.seek_to(position),
        PlayerCommand::SetVolume(volume) => engine.set_volume(volume),
        PlayerCommand::ToggleShuffle => engine.toggle_shuffle(),
        PlayerCommand::ToggleRepeat => engine.toggle_repeat(),
        PlayerCommand::AddToQueue(song) => engine.add_to_queue(song),
        PlayerCommand::SetFullscreen(fullscreen) => engine.set_fullscreen(fullscreen),
    }
}
