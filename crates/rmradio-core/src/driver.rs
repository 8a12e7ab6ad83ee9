//! The seam between the session and the one shared audio output.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    #[error("playback refused: {0}")]
    Refused(String),

    #[error("audio output timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// A single audio output bound for the life of the station.
///
/// `load` only repoints the source; nothing is heard until `play`.
#[async_trait]
pub trait PlaybackDriver: Send {
    async fn load(&mut self, url: &str) -> Result<()>;

    async fn play(&mut self) -> Result<()>;

    async fn pause(&mut self) -> Result<()>;

    /// `volume` is in `[0, 1]`.
    async fn set_volume(&mut self, volume: f32) -> Result<()>;

    async fn seek(&mut self, position_secs: f64) -> Result<()>;
}

/// Signals coming back from the audio output.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// The source handed to `load` is open; timeline reports after this
    /// belong to it.
    Loaded,
    /// The current source played to its natural end.
    Ended,
    /// The current source failed to load or decode.
    Errored { reason: String },
    Position(Option<f64>),
    Duration(Option<f64>),
}
