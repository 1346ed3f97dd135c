//! The contract between the playback engine and whatever actually makes sound.
//!
//! Every load is tagged with a [`SessionToken`]. Implementations echo that
//! token on the events they emit, and the engine drops any event whose token
//! is not the one it most recently loaded.

use std::fmt;
use std::time::Duration;

/// Monotonically increasing tag identifying one load of the media element
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionToken(pub u64);

impl SessionToken {
    /// The token after this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single-source audio/video output.
///
/// Commands are fire-and-forget: `play` in particular completes later with
/// [`MediaEventKind::PlayResolved`] or [`MediaEventKind::PlayRejected`].
pub trait MediaElement: Send {
    /// Replace the current source. The previous source is torn down first.
    fn load(&mut self, source: &str, session: SessionToken);

    /// Start or resume playback of the loaded source
    fn play(&mut self, session: SessionToken);

    fn pause(&mut self);

    fn seek(&mut self, position: Duration);

    /// Volume in 0.0 ..= 1.0
    fn set_volume(&mut self, volume: f32);
}

/// Something the media element observed
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEventKind {
    /// Periodic position report while the source is loaded
    TimeUpdate(Duration),
    LoadedMetadata { duration: Duration },
    /// The source played to its end
    Ended,
    PlayResolved,
    PlayRejected { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub session: SessionToken,
    pub kind: MediaEventKind,
}

impl MediaEvent {
    #[must_use]
    pub const fn new(session: SessionToken, kind: MediaEventKind) -> Self {
        Self { session, kind }
    }
}
