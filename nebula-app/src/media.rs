//! Rodio-backed media element.
//!
//! The rodio output stream is not `Send`, so it lives on a dedicated audio
//! thread. [`RodioMedia`] is the `Send` front end the engine owns; it only
//! forwards commands. Sources are downloaded on the tokio runtime and handed
//! back to the audio thread tagged with the session they were loaded for.

use nebula_core::time::DurationExt;
use nebula_core::{MediaElement, MediaEvent, MediaEventKind, SessionToken};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use std::io::Cursor;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

const LOG_TARGET: &str = "nebula::audio";

enum AudioCommand {
    Load { url: String, session: SessionToken },
    Downloaded {
        session: SessionToken,
        result: Result<Vec<u8>, String>,
    },
    Play { session: SessionToken },
    Pause,
    Seek(Duration),
    SetVolume(f32),
    Shutdown,
}

/// Handle to the audio thread
pub struct RodioMedia {
    commands: mpsc::Sender<AudioCommand>,
}

impl RodioMedia {
    /// Start the audio thread. Events are reported on `events` every `tick`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(
        runtime: Handle,
        http: reqwest::Client,
        events: UnboundedSender<MediaEvent>,
        tick: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let loopback = tx.clone();

        thread::Builder::new()
            .name("nebula-audio".to_string())
            .spawn(move || {
                let stream = match open_output() {
                    Ok(stream) => Some(stream),
                    Err(e) => {
                        error!(target: LOG_TARGET, "No audio output available: {}", e);
                        None
                    }
                };
                AudioThread::new(RodioOutput { stream }, events, loopback, runtime, http)
                    .run(&rx, tick);
            })?;

        Ok(Self { commands: tx })
    }

    fn send(&self, command: AudioCommand) {
        if self.commands.send(command).is_err() {
            warn!(target: LOG_TARGET, "Audio thread has exited");
        }
    }
}

impl MediaElement for RodioMedia {
    fn load(&mut self, source: &str, session: SessionToken) {
        self.send(AudioCommand::Load {
            url: source.to_string(),
            session,
        });
    }

    fn play(&mut self, session: SessionToken) {
        self.send(AudioCommand::Play { session });
    }

    fn pause(&mut self) {
        self.send(AudioCommand::Pause);
    }

    fn seek(&mut self, position: Duration) {
        self.send(AudioCommand::Seek(position));
    }

    fn set_volume(&mut self, volume: f32) {
        self.send(AudioCommand::SetVolume(volume));
    }
}

impl Drop for RodioMedia {
    fn drop(&mut self) {
        let _ = self.commands.send(AudioCommand::Shutdown);
    }
}

fn open_output() -> Result<OutputStream, String> {
    OutputStreamBuilder::from_default_device()
        .map_err(|e| e.to_string())?
        .open_stream_or_fallback()
        .map_err(|e| e.to_string())
}

/// Whole-second length of an audio file, if the decoder can tell
#[must_use]
pub fn probe_duration(bytes: Vec<u8>) -> Option<u32> {
    Decoder::new(Cursor::new(bytes))
        .ok()?
        .total_duration()
        .map(|d| d.as_secs_u32())
}

/// Something that turns decoded bytes into a playing track
trait AudioOutput {
    type Track: Track;

    /// Start a paused track over `data` at `position`, with its total duration
    /// when the decoder knows it
    fn start(
        &self,
        data: Arc<[u8]>,
        position: Duration,
        volume: f32,
    ) -> Result<(Self::Track, Option<Duration>), String>;
}

trait Track {
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn set_volume(&self, volume: f32);
    fn position(&self) -> Duration;
    /// Nothing left to play
    fn is_finished(&self) -> bool;
}

struct RodioOutput {
    stream: Option<OutputStream>,
}

impl AudioOutput for RodioOutput {
    type Track = RodioTrack;

    fn start(
        &self,
        data: Arc<[u8]>,
        position: Duration,
        volume: f32,
    ) -> Result<(RodioTrack, Option<Duration>), String> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| "no audio output device".to_string())?;

        let mut decoder = Decoder::new(Cursor::new(data)).map_err(|e| e.to_string())?;
        let duration = decoder.total_duration();
        if !position.is_zero() {
            if let Err(e) = decoder.try_seek(position) {
                warn!(target: LOG_TARGET, "Seek to {:?} failed: {}", position, e);
            }
        }

        let sink = Sink::connect_new(stream.mixer());
        sink.set_volume(volume);
        sink.pause();
        sink.append(decoder);

        Ok((
            RodioTrack {
                sink,
                seek_base: position,
            },
            duration,
        ))
    }
}

struct RodioTrack {
    sink: Sink,
    /// Position the sink started from; rodio counts from zero after a rebuild
    seek_base: Duration,
}

impl Track for RodioTrack {
    fn play(&self) {
        self.sink.play();
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn stop(&self) {
        self.sink.stop();
    }

    fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume);
    }

    fn position(&self) -> Duration {
        self.seek_base + self.sink.get_pos()
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}

struct LoadedSource<T> {
    data: Arc<[u8]>,
    track: T,
    ended: bool,
}

enum SourceState<T> {
    Empty,
    Loading,
    Failed(String),
    Ready(LoadedSource<T>),
}

struct AudioThread<O: AudioOutput> {
    output: O,
    events: UnboundedSender<MediaEvent>,
    loopback: mpsc::Sender<AudioCommand>,
    runtime: Handle,
    http: reqwest::Client,
    volume: f32,
    session: SessionToken,
    source: SourceState<O::Track>,
    play_requested: bool,
    /// Seek received while the source was still downloading
    pending_seek: Option<Duration>,
}

impl<O: AudioOutput> AudioThread<O> {
    fn new(
        output: O,
        events: UnboundedSender<MediaEvent>,
        loopback: mpsc::Sender<AudioCommand>,
        runtime: Handle,
        http: reqwest::Client,
    ) -> Self {
        Self {
            output,
            events,
            loopback,
            runtime,
            http,
            volume: 1.0,
            session: SessionToken::default(),
            source: SourceState::Empty,
            play_requested: false,
            pending_seek: None,
        }
    }

    fn run(mut self, rx: &mpsc::Receiver<AudioCommand>, tick: Duration) {
        let mut last_tick = Instant::now();

        loop {
            match rx.recv_timeout(tick) {
                Ok(AudioCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
            }

            if last_tick.elapsed() >= tick {
                last_tick = Instant::now();
                self.tick();
            }
        }

        info!(target: LOG_TARGET, "Audio thread stopped");
    }

    fn emit(&self, kind: MediaEventKind) {
        let _ = self.events.send(MediaEvent::new(self.session, kind));
    }

    fn handle(&mut self, command: AudioCommand) {
        match command {
            AudioCommand::Load { url, session } => self.load(url, session),
            AudioCommand::Downloaded { session, result } => self.downloaded(session, result),
            AudioCommand::Play { session } => self.play(session),
            AudioCommand::Pause => {
                self.play_requested = false;
                if let SourceState::Ready(source) = &self.source {
                    source.track.pause();
                }
            }
            AudioCommand::Seek(position) => self.seek(position),
            AudioCommand::SetVolume(volume) => {
                self.volume = volume;
                if let SourceState::Ready(source) = &self.source {
                    source.track.set_volume(volume);
                }
            }
            AudioCommand::Shutdown => {}
        }
    }

    fn load(&mut self, url: String, session: SessionToken) {
        self.begin_load(session);

        debug!(target: LOG_TARGET, "Loading {} for session {}", url, session);
        let http = self.http.clone();
        let loopback = self.loopback.clone();
        self.runtime.spawn(async move {
            let result = download(&http, &url).await.map_err(|e| e.to_string());
            let _ = loopback.send(AudioCommand::Downloaded { session, result });
        });
    }

    /// Tear down the current source and wait for `session`'s download
    fn begin_load(&mut self, session: SessionToken) {
        if let SourceState::Ready(source) = &self.source {
            source.track.stop();
        }
        self.session = session;
        self.source = SourceState::Loading;
        self.play_requested = false;
        self.pending_seek = None;
    }

    fn downloaded(&mut self, session: SessionToken, result: Result<Vec<u8>, String>) {
        if session != self.session {
            debug!(target: LOG_TARGET, "Dropping download for replaced session {}", session);
            return;
        }

        let position = self.pending_seek.take().unwrap_or(Duration::ZERO);
        let loaded = result.and_then(|bytes| {
            let data: Arc<[u8]> = bytes.into();
            self.output
                .start(Arc::clone(&data), position, self.volume)
                .map(|(track, duration)| (data, track, duration))
        });
        match loaded {
            Ok((data, track, duration)) => {
                if let Some(duration) = duration {
                    self.emit(MediaEventKind::LoadedMetadata { duration });
                }
                if self.play_requested {
                    track.play();
                    self.emit(MediaEventKind::PlayResolved);
                }
                self.source = SourceState::Ready(LoadedSource {
                    data,
                    track,
                    ended: false,
                });
            }
            Err(reason) => {
                warn!(target: LOG_TARGET, "Failed to load source: {}", reason);
                if self.play_requested {
                    self.play_requested = false;
                    self.emit(MediaEventKind::PlayRejected {
                        reason: reason.clone(),
                    });
                }
                self.source = SourceState::Failed(reason);
            }
        }
    }

    /// Replace the current track with a fresh one over the same data at
    /// `position`, playing if playback was requested
    fn restart(&mut self, data: Arc<[u8]>, position: Duration) {
        if let SourceState::Ready(current) = &self.source {
            current.track.stop();
        }

        match self.output.start(Arc::clone(&data), position, self.volume) {
            Ok((track, _)) => {
                if self.play_requested {
                    track.play();
                }
                self.source = SourceState::Ready(LoadedSource {
                    data,
                    track,
                    ended: false,
                });
            }
            Err(reason) => {
                warn!(target: LOG_TARGET, "Failed to restart source at {:?}: {}", position, reason);
                self.source = SourceState::Failed(reason);
            }
        }
    }

    fn play(&mut self, session: SessionToken) {
        if session != self.session {
            debug!(target: LOG_TARGET, "Ignoring play for replaced session {}", session);
            return;
        }

        // Playing a finished source starts it over
        let finished = match &self.source {
            SourceState::Ready(source) if source.ended || source.track.is_finished() => {
                Some(Arc::clone(&source.data))
            }
            _ => None,
        };
        if let Some(data) = finished {
            self.restart(data, Duration::ZERO);
        }

        match &self.source {
            SourceState::Ready(source) => {
                source.track.play();
                self.play_requested = true;
                self.emit(MediaEventKind::PlayResolved);
            }
            SourceState::Loading => self.play_requested = true,
            SourceState::Failed(reason) => {
                let reason = reason.clone();
                self.emit(MediaEventKind::PlayRejected { reason });
            }
            SourceState::Empty => self.emit(MediaEventKind::PlayRejected {
                reason: "no source loaded".to_string(),
            }),
        }
    }

    fn seek(&mut self, position: Duration) {
        let data = match &self.source {
            SourceState::Ready(current) => Arc::clone(&current.data),
            SourceState::Loading => {
                self.pending_seek = Some(position);
                return;
            }
            SourceState::Empty | SourceState::Failed(_) => return,
        };

        self.restart(data, position);
    }

    fn tick(&mut self) {
        if !self.play_requested {
            return;
        }
        let SourceState::Ready(source) = &mut self.source else {
            return;
        };

        let position = source.track.position();
        let finished = source.track.is_finished() && !source.ended;
        if finished {
            source.ended = true;
        }

        self.emit(MediaEventKind::TimeUpdate(position));
        if finished {
            self.play_requested = false;
            self.emit(MediaEventKind::Ended);
        }
    }
}

async fn download(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, reqwest::Error> {
    let response = http.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    type Log = Rc<RefCell<Vec<String>>>;

    #[derive(Default)]
    struct FakeOutput {
        log: Log,
    }

    impl AudioOutput for FakeOutput {
        type Track = FakeTrack;

        fn start(
            &self,
            _data: Arc<[u8]>,
            position: Duration,
            _volume: f32,
        ) -> Result<(FakeTrack, Option<Duration>), String> {
            self.log.borrow_mut().push(format!("start {position:?}"));
            Ok((
                FakeTrack {
                    log: Rc::clone(&self.log),
                    position,
                    finished: Cell::new(false),
                },
                Some(Duration::from_secs(180)),
            ))
        }
    }

    struct FakeTrack {
        log: Log,
        position: Duration,
        finished: Cell<bool>,
    }

    impl Track for FakeTrack {
        fn play(&self) {
            self.log.borrow_mut().push("play".to_string());
        }

        fn pause(&self) {
            self.log.borrow_mut().push("pause".to_string());
        }

        fn stop(&self) {
            self.log.borrow_mut().push("stop".to_string());
        }

        fn set_volume(&self, _volume: f32) {}

        fn position(&self) -> Duration {
            self.position
        }

        fn is_finished(&self) -> bool {
            self.finished.get()
        }
    }

    struct Harness {
        thread: AudioThread<FakeOutput>,
        events: UnboundedReceiver<MediaEvent>,
        log: Log,
        _runtime: tokio::runtime::Runtime,
    }

    impl Harness {
        fn new() -> Self {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let output = FakeOutput::default();
            let log = Rc::clone(&output.log);
            let (events_tx, events) = unbounded_channel();
            let (loopback, _) = mpsc::channel();
            let thread = AudioThread::new(
                output,
                events_tx,
                loopback,
                runtime.handle().clone(),
                reqwest::Client::new(),
            );
            Self {
                thread,
                events,
                log,
                _runtime: runtime,
            }
        }

        /// Load `session` and complete its download
        fn loaded(mut self, session: SessionToken) -> Self {
            self.thread.begin_load(session);
            self.thread.downloaded(session, Ok(vec![0_u8; 16]));
            self
        }

        fn take_log(&self) -> Vec<String> {
            self.log.borrow_mut().drain(..).collect()
        }

        fn take_events(&mut self) -> Vec<MediaEventKind> {
            let mut kinds = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                kinds.push(event.kind);
            }
            kinds
        }

        fn finish_track(&self) -> bool {
            if let SourceState::Ready(source) = &self.thread.source {
                source.track.finished.set(true);
                true
            } else {
                false
            }
        }
    }

    #[test]
    fn test_probe_duration_rejects_garbage() {
        assert_eq!(probe_duration(b"definitely not audio".to_vec()), None);
    }

    #[test]
    fn test_play_after_end_restarts_from_zero() {
        let session = SessionToken(1);
        let mut h = Harness::new().loaded(session);
        h.thread.play(session);
        h.take_log();
        h.take_events();

        assert!(h.finish_track());
        h.thread.tick();
        assert_eq!(
            h.take_events(),
            vec![MediaEventKind::TimeUpdate(Duration::ZERO), MediaEventKind::Ended]
        );

        h.thread.play(session);
        assert_eq!(h.take_log(), vec!["stop", "start 0ns", "play"]);
        assert_eq!(h.take_events(), vec![MediaEventKind::PlayResolved]);

        // The fresh track can end again
        assert!(h.finish_track());
        h.thread.tick();
        assert_eq!(
            h.take_events(),
            vec![MediaEventKind::TimeUpdate(Duration::ZERO), MediaEventKind::Ended]
        );
    }

    #[test]
    fn test_resume_mid_track_keeps_position() {
        let session = SessionToken(1);
        let mut h = Harness::new().loaded(session);
        h.thread.seek(Duration::from_secs(30));
        h.take_log();

        h.thread.play(session);
        assert_eq!(h.take_log(), vec!["play"]);

        h.thread.handle(AudioCommand::Pause);
        h.thread.play(session);
        assert_eq!(h.take_log(), vec!["pause", "play"]);
        assert_eq!(
            h.take_events(),
            vec![
                MediaEventKind::LoadedMetadata {
                    duration: Duration::from_secs(180)
                },
                MediaEventKind::PlayResolved,
                MediaEventKind::PlayResolved,
            ]
        );
    }

    #[test]
    fn test_seek_while_loading_applies_after_download() {
        let session = SessionToken(1);
        let mut h = Harness::new();
        h.thread.begin_load(session);
        h.thread.play(session);
        h.thread.seek(Duration::from_secs(42));
        assert!(h.take_log().is_empty());

        h.thread.downloaded(session, Ok(vec![0_u8; 16]));
        assert_eq!(h.take_log(), vec!["start 42s", "play"]);

        h.thread.tick();
        let events = h.take_events();
        assert_eq!(
            events.last(),
            Some(&MediaEventKind::TimeUpdate(Duration::from_secs(42)))
        );
    }

    #[test]
    fn test_new_load_drops_pending_seek() {
        let mut h = Harness::new();
        h.thread.begin_load(SessionToken(1));
        h.thread.seek(Duration::from_secs(42));

        h.thread.begin_load(SessionToken(2));
        h.thread.downloaded(SessionToken(1), Ok(vec![0_u8; 16]));
        assert!(h.take_log().is_empty());

        h.thread.downloaded(SessionToken(2), Ok(vec![0_u8; 16]));
        assert_eq!(h.take_log(), vec!["start 0ns"]);
    }
}
