mod commands;
mod media;
mod routes;
mod shell;
mod views;

use crate::media::RodioMedia;
use crate::shell::Shell;
use nebula_backend::SupabaseClient;
use nebula_core::session::load_session;
use nebula_core::{
    spawn_player, AdminPanel, Catalog, CoreError, Haptics, ListenTracker, NebulaConfig,
    NoHaptics, PlaybackEngine, PlayerEvent, PlayerHandle, Preferences, SessionManager,
    UploadFlow,
};
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const APP_NAME: &str = "Nebula";

/// How often accumulated listening time is written to the profile
const LISTEN_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

#[allow(clippy::too_many_lines)]
fn main() {
    // Check config for logging.enabled before full config load
    let file_logging_enabled = check_file_logging_enabled();
    init_tracing(file_logging_enabled);

    let config = match NebulaConfig::load_or_create() {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            println!(
                "{APP_NAME}: a configuration file has been created at {}.\n\
                Fill in backend.url and backend.anon_key, then start again.",
                path.display()
            );
            std::process::exit(0);
        }
        Err(CoreError::ConfigParseError(parse_error)) => {
            eprintln!(
                "{APP_NAME}: {} has a syntax error and cannot be loaded:\n{parse_error}",
                NebulaConfig::config_path().display()
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("{e}");
            eprintln!("{APP_NAME}: {e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let backend = match SupabaseClient::new(&config.backend) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create backend client: {}", e);
            std::process::exit(1);
        }
    };

    let session_path = nebula_core::session_path();
    if let Some(session) = load_session(&session_path) {
        runtime.block_on(backend.restore_session(session));
    }

    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    let http = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("Nebula/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            error!("Failed to create download client: {}", e);
            std::process::exit(1);
        }
    };

    let (media_tx, media_rx) = mpsc::unbounded_channel();
    let media = match RodioMedia::spawn(
        runtime.handle().clone(),
        http,
        media_tx,
        config.player.tick_interval(),
    ) {
        Ok(media) => media,
        Err(e) => {
            error!("Failed to start audio thread: {}", e);
            std::process::exit(1);
        }
    };

    let haptics: Arc<dyn Haptics> = Arc::new(NoHaptics);
    let catalog = Catalog::new(backend.clone());
    let sessions = SessionManager::new(backend.clone(), backend.clone());
    let admin = AdminPanel::new(
        &config.admin,
        catalog.clone(),
        UploadFlow::new(backend.clone(), backend.clone()),
    )
    .with_haptics(haptics.clone());

    let engine = PlaybackEngine::new(media, &config.player).with_haptics(haptics.clone());

    runtime.block_on(async {
        let (player, player_task) = spawn_player(engine, media_rx, cancel_token.clone());

        tokio::spawn(log_player_events(player.clone()));
        tokio::spawn(record_history(
            player.clone(),
            catalog.clone(),
            sessions.clone(),
        ));
        tokio::spawn(track_listening(
            player.clone(),
            sessions.clone(),
            cancel_token.clone(),
        ));

        let shell = Shell::new(
            player,
            catalog,
            sessions,
            admin,
            haptics,
            Preferences::load(),
            session_path,
        );
        info!("{APP_NAME} ready");
        shell.run(cancel_token.clone()).await;

        cancel_token.cancel();
        let _ = player_task.await;
    });

    // stdin reads block a runtime thread; don't wait on them forever
    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("{APP_NAME} stopped");
}

/// Log player events to the console
async fn log_player_events(player: PlayerHandle) {
    let mut rx = player.subscribe();

    loop {
        match rx.recv().await {
            Ok(event) => match &event {
                PlayerEvent::TrackChanged { song, index } => {
                    info!("Now playing: {} - {} (#{})", song.artist, song.title, index + 1);
                }
                PlayerEvent::PlaybackResumed { position } => {
                    info!("Playback resumed at {:?}", position);
                }
                PlayerEvent::PlaybackPaused { position } => {
                    info!("Playback paused at {:?}", position);
                }
                PlayerEvent::PlaybackStopped => info!("Reached the end of the queue"),
                PlayerEvent::PlaybackFailed { reason } => {
                    warn!("Playback failed: {}", reason);
                }
                PlayerEvent::Seeked { position } => info!("Seek to {:?}", position),
                PlayerEvent::RepeatModeChanged { mode } => info!("Repeat: {}", mode),
                PlayerEvent::ShuffleChanged { enabled } => info!("Shuffle: {}", enabled),
                PlayerEvent::PositionChanged { .. }
                | PlayerEvent::LyricLineChanged { .. }
                | PlayerEvent::DurationLoaded { .. }
                | PlayerEvent::QueueChanged { .. }
                | PlayerEvent::VolumeChanged { .. }
                | PlayerEvent::FullscreenChanged { .. } => {}
            },
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                info!("Player event channel closed");
                break;
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                info!("Missed {} player events", n);
            }
        }
    }
}

/// Add every started track to the signed-in user's listening history
async fn record_history(player: PlayerHandle, catalog: Catalog, sessions: SessionManager) {
    let mut rx = player.subscribe();

    loop {
        match rx.recv().await {
            Ok(PlayerEvent::TrackChanged { song, .. }) => {
                let Some(session) = sessions.current_session().await else {
                    continue;
                };
                if let Err(e) = catalog.record_play(&session.user.id, &song.id).await {
                    warn!("Failed to record listening history: {}", e);
                }
            }
            Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Accumulate listened time from state snapshots and flush it periodically
async fn track_listening(
    player: PlayerHandle,
    sessions: SessionManager,
    cancel_token: CancellationToken,
) {
    let mut state_rx = player.watch();
    let mut tracker = ListenTracker::new();
    let mut current_song: Option<String> = None;
    let mut flush = tokio::time::interval(LISTEN_FLUSH_INTERVAL);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                let song_id = state.current_song.as_ref().map(|s| s.id.clone());
                if song_id != current_song {
                    tracker.reset_position();
                    current_song = song_id;
                }
                tracker.observe(state.current_time, state.is_playing);
            }
            _ = flush.tick() => flush_listen_time(&mut tracker, &sessions).await,
        }
    }

    flush_listen_time(&mut tracker, &sessions).await;
}

async fn flush_listen_time(tracker: &mut ListenTracker, sessions: &SessionManager) {
    let seconds = tracker.take_whole_seconds();
    if seconds == 0 || sessions.current_session().await.is_none() {
        return;
    }
    if let Err(e) = sessions.add_listen_time(seconds).await {
        warn!("Failed to update listening time: {}", e);
    }
}

/// Check if file logging is enabled by reading the config file.
/// This is done before full config loading to set up tracing first.
/// Returns `false` if config doesn't exist or can't be parsed.
fn check_file_logging_enabled() -> bool {
    // Minimal structs to parse just the logging.enabled field
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let config_path = NebulaConfig::config_path();
    let Ok(content) = std::fs::read_to_string(&config_path) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest_retry=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path = nebula_core::log_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
