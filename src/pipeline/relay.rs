//! Session lifecycle and the consumer-facing frame accessor

use std::ops::{Deref, RangeInclusive};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use flume::{Receiver, RecvTimeoutError};
use tracing::{debug, info, instrument, warn};

use crate::capture::frame::{FrameFormat, FrameSlot};
use crate::capture::source::{boxed_opener, FrameSource, Opener};
use crate::error::{RelayError, Result};
use crate::pipeline::grab::{self, Scheduling, Shared};
use crate::pipeline::health::{Health, HealthCell};
use crate::pipeline::pool::Pool;
use crate::pipeline::stats::{Counters, RelayStats};
use crate::{CaptureConfig, Config};

/// Device indices probed by [`Relay::start`], lowest first
pub const DEVICE_CANDIDATES: RangeInclusive<u32> = 0..=4;

/// Triple-buffered relay between a blocking capture source and one consumer.
///
/// A background thread reads frames as fast as the device delivers them;
/// [`fetch`](Relay::fetch) hands out the most recent complete one. The
/// producer never waits on the consumer, so a slow consumer only misses
/// frames.
pub struct Relay {
    config: Config,
    opener: Opener,
    session: Option<Session>,
    idle: Health,
    counters: Arc<Counters>,
}

struct Session {
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
    exited: Receiver<()>,
    device_index: u32,
}

impl Relay {
    /// Relay over sources produced by `open(index, capture_config)`.
    pub fn new<S, F>(config: Config, open: F) -> Self
    where
        S: FrameSource,
        F: FnMut(u32, &CaptureConfig) -> Result<S> + Send + 'static,
    {
        Self {
            config,
            opener: boxed_opener(open),
            session: None,
            idle: Health::NotStarted,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Relay over the V4L2 devices `/dev/video0` to `/dev/video4`.
    #[cfg(feature = "v4l2")]
    pub fn v4l2(config: Config) -> Self {
        Self::new(config, crate::capture::V4l2Source::open)
    }

    /// Open the first working candidate device and launch acquisition.
    ///
    /// Fails with [`RelayError::NoDevice`] if no index opens, leaving health
    /// at [`Health::NotStarted`]. A session whose stream already ended is
    /// reaped first, so this also restarts.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        match self.session.as_ref().map(|s| s.shared.health.is_running()) {
            Some(true) => return Err(RelayError::AlreadyRunning),
            Some(false) => self.stop(),
            None => {}
        }

        let Some((device_index, source)) = self.open_first() else {
            self.idle = Health::NotStarted;
            warn!("No capture device opened on indices {:?}", DEVICE_CANDIDATES);
            return Err(RelayError::NoDevice {
                tried: DEVICE_CANDIDATES,
            });
        };

        let format = source.format();
        let shared = Arc::new(Shared {
            pool: Pool::new(format),
            health: HealthCell::new(Health::Running),
            run: AtomicBool::new(true),
            counters: Arc::clone(&self.counters),
            stall_timeout: self.config.relay.stall_timeout(),
        });

        let scheduling = Scheduling {
            elevate_priority: self.config.relay.elevate_priority,
            cpu_core: self.config.relay.cpu_core,
        };
        let (exit_tx, exit_rx) = flume::bounded(1);
        let handle = grab::spawn(Arc::clone(&shared), source, scheduling, exit_tx)
            .map_err(RelayError::Spawn)?;

        info!(
            "Relay started on device {}: {}x{} {:?}",
            device_index, format.width, format.height, format.pixel
        );
        self.session = Some(Session {
            shared,
            handle,
            exited: exit_rx,
            device_index,
        });
        Ok(())
    }

    fn open_first(&mut self) -> Option<(u32, Box<dyn FrameSource>)> {
        for index in DEVICE_CANDIDATES {
            match (self.opener)(index, &self.config.capture) {
                Ok(source) if source.is_opened() => return Some((index, source)),
                Ok(_) => debug!("Device {} opened but is not ready", index),
                Err(e) => debug!("Device {} unavailable: {}", index, e),
            }
        }
        None
    }

    /// Claim the most recent complete frame.
    ///
    /// Returns `None` when the relay is not running, or when no new frame
    /// has arrived since the last claim: immediately if `block` is false,
    /// otherwise after waiting up to the configured fetch timeout. The view
    /// borrows the relay, so it cannot outlive the next `fetch`.
    pub fn fetch(&mut self, block: bool) -> Option<FrameView<'_>> {
        let session = self.session.as_ref()?;
        let shared = &session.shared;
        if !shared.health.is_running() {
            return None;
        }

        let claimed = if block {
            shared.pool.claim_within(
                self.config.relay.fetch_timeout(),
                self.config.relay.poll_interval(),
                || shared.health.is_running(),
            )
        } else {
            shared.pool.try_claim()
        };
        let claimed = claimed?;

        self.counters.record_fetch();
        Some(FrameView {
            slot: shared.pool.slot(claimed),
        })
    }

    /// Stop acquisition and release the device. Idempotent.
    ///
    /// Sources bound each read by their read timeout, so the producer
    /// normally exits and releases the device well within the join timeout.
    /// A producer stuck in a read that never returns is detached and drops
    /// the device once that read comes back.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.shared.health.end();
        session.shared.run.store(false, Ordering::Release);
        session.shared.pool.wake();

        let timeout = self.config.relay.join_timeout();
        match session.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if session.handle.join().is_err() {
                    warn!("Acquisition thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Acquisition thread still blocked after {:?}, detaching",
                    timeout
                );
            }
        }

        self.idle = Health::Ended;
        info!("Relay stopped (device {})", session.device_index);
    }

    pub fn health(&self) -> Health {
        self.session
            .as_ref()
            .map_or(self.idle, |s| s.shared.health.get())
    }

    pub fn is_running(&self) -> bool {
        self.health() == Health::Running
    }

    /// Index of the device the current session opened
    pub fn device_index(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.device_index)
    }

    /// Layout of the frames the current session delivers
    pub fn frame_format(&self) -> Option<FrameFormat> {
        self.session.as_ref().map(|s| s.shared.pool.format())
    }

    pub fn stats(&self) -> RelayStats {
        self.counters.snapshot()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The consumer's locked frame.
///
/// The producer will not write this slot until a later fetch moves the
/// lock elsewhere.
pub struct FrameView<'a> {
    slot: MutexGuard<'a, FrameSlot>,
}

impl FrameView<'_> {
    pub fn data(&self) -> &[u8] {
        self.slot.data()
    }

    /// Start of the pixel buffer. Stays valid and unmodified until the
    /// next fetch on the same relay, even after this view is dropped.
    pub fn as_ptr(&self) -> *const u8 {
        self.slot.data().as_ptr()
    }

    pub fn format(&self) -> FrameFormat {
        self.slot.format()
    }

    /// Publish number within the session, starting at 1
    pub fn sequence(&self) -> u64 {
        self.slot.sequence()
    }

    pub fn captured_at(&self) -> Option<Instant> {
        self.slot.captured_at()
    }
}

impl Deref for FrameView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.slot.data()
    }
}

impl std::fmt::Debug for FrameView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameView")
            .field("sequence", &self.sequence())
            .field("format", &self.format())
            .finish()
    }
}
