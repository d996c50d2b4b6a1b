//! Error types for camrelay

use std::io;
use std::ops::RangeInclusive;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors surfaced by the relay and its capture sources.
///
/// Consumer timeouts and end of stream are not errors: they are
/// reported as an empty fetch and as [`Health::Ended`](crate::Health).
#[derive(Debug, Error)]
pub enum RelayError {
    /// None of the candidate device indices opened
    #[error("no capture device opened (tried indices {tried:?})")]
    NoDevice { tried: RangeInclusive<u32> },

    /// `start` called while a session is still running
    #[error("relay is already running")]
    AlreadyRunning,

    /// Capture device failure (open, negotiation or read)
    #[error("capture device error: {0}")]
    Device(String),

    /// No frame arrived within a source's read timeout; the device is
    /// still open and the read can be retried
    #[error("no frame within {0:?}")]
    ReadTimeout(Duration),

    /// Wire frame could not be converted into a slot
    #[error("decode error: {0}")]
    Decode(String),

    /// Acquisition thread could not be spawned
    #[error("failed to spawn acquisition thread: {0}")]
    Spawn(#[source] io::Error),

    /// Configuration loading failed
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        RelayError::Device(e.to_string())
    }
}
