//! Background camera frame relay.
//!
//! A producer thread blocks on device reads and rotates three frame slots;
//! the consumer claims the newest complete frame whenever it likes.

pub mod capture;
#[cfg(feature = "display")]
pub mod display;
pub mod error;
#[cfg(feature = "v4l2")]
pub mod ffi;
pub mod pipeline;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{FrameFormat, FrameSlot, FrameSource, PixelFormat, WireFormat};
pub use error::{RelayError, Result};
pub use pipeline::{FrameView, Health, Relay, RelayStats};

/// Prefix for environment overrides, e.g. `CAMRELAY__RELAY__FETCH_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "CAMRELAY";

/// System configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Channel order of delivered frames
    pub format: PixelFormat,
    /// Device format to request; negotiated from what the device offers when unset
    pub wire: Option<WireFormat>,
    /// Driver-side mmap buffers
    pub buffer_count: u32,
    /// Longest a single device read blocks before shutdown is re-checked
    pub read_timeout_ms: u64,
}

impl CaptureConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Granularity of a blocking fetch
    pub poll_interval_ms: u64,
    /// Longest a blocking fetch waits for a new frame
    pub fetch_timeout_ms: u64,
    /// How long `stop` waits for the acquisition thread
    pub join_timeout_ms: u64,
    /// Raise the acquisition thread's scheduling priority where allowed
    pub elevate_priority: bool,
    /// Pin the acquisition thread to this core
    pub cpu_core: Option<usize>,
    /// A device silent for this long is treated as ended
    pub stall_timeout_ms: u64,
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            format: PixelFormat::Bgr24,
            wire: None,
            buffer_count: 4,
            read_timeout_ms: 100,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1,
            fetch_timeout_ms: 500,
            join_timeout_ms: 1000,
            elevate_priority: true,
            cpu_core: None,
            stall_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Defaults, overlaid by an optional TOML file, overlaid by
    /// `CAMRELAY__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}
