//! Background acquisition loop

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::Sender;
use tracing::{debug, info, trace, warn};

use crate::capture::source::FrameSource;
use crate::error::RelayError;
use crate::pipeline::health::HealthCell;
use crate::pipeline::pool::Pool;
use crate::pipeline::stats::Counters;

pub(crate) const THREAD_NAME: &str = "camrelay-grab";

/// State one session shares between the relay and its producer thread
pub(crate) struct Shared {
    pub pool: Pool,
    pub health: HealthCell,
    pub run: AtomicBool,
    pub counters: Arc<Counters>,
    /// Consecutive read timeouts are retried until the device has been
    /// silent this long
    pub stall_timeout: Duration,
}

/// Scheduling hints applied by the producer thread to itself
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Scheduling {
    pub elevate_priority: bool,
    pub cpu_core: Option<usize>,
}

/// Spawn the producer. `exited` is dropped when the thread finishes,
/// including by panic, which is what `stop` waits on.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    mut source: Box<dyn FrameSource>,
    scheduling: Scheduling,
    exited: Sender<()>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || {
            apply_scheduling(scheduling);
            grab_loop(&shared, &mut *source);
            // Release the device before signalling exit
            drop(source);
            let _ = exited.send(());
        })
}

/// Read into the fill slot, publish, rotate; until stopped or the read fails.
fn grab_loop(shared: &Shared, source: &mut dyn FrameSource) {
    let mut fill = shared.pool.state().roles.fill;
    let mut sequence = 0u64;
    let mut last_frame = Instant::now();

    while shared.run.load(Ordering::Acquire) {
        // Blocks; the consumer never touches the fill slot
        let read = {
            let mut slot = shared.pool.slot(fill);
            let read = source.read(&mut slot);
            if read.is_ok() {
                sequence += 1;
                slot.stamp(sequence);
            }
            read
        };

        match read {
            Ok(()) => last_frame = Instant::now(),
            Err(RelayError::ReadTimeout(waited))
                if last_frame.elapsed() < shared.stall_timeout =>
            {
                trace!("No frame within {:?}, polling again", waited);
                continue;
            }
            Err(err) => {
                if shared.run.load(Ordering::Acquire) {
                    warn!("Capture stream ended after {} frames: {}", sequence, err);
                    shared.counters.record_read_failure();
                } else {
                    debug!("Read interrupted by shutdown: {}", err);
                }
                break;
            }
        }

        let published = shared.pool.publish();
        trace!("Frame {} published in {}", sequence, published.done);
        shared.counters.record_publish(published.dropped_unread);
        fill = published.next_fill;
    }

    if shared.health.end() {
        info!("Acquisition loop ended");
    }
    shared.pool.wake();
}

fn apply_scheduling(scheduling: Scheduling) {
    if scheduling.elevate_priority {
        raise_priority();
    }

    if let Some(core) = scheduling.cpu_core {
        let pinned = core_affinity::get_core_ids()
            .and_then(|ids| ids.into_iter().find(|id| id.id == core))
            .is_some_and(core_affinity::set_for_current);
        if pinned {
            debug!("Acquisition thread pinned to core {}", core);
        } else {
            warn!("Could not pin acquisition thread to core {}", core);
        }
    }
}

#[cfg(unix)]
fn raise_priority() {
    // Linux applies this to the calling thread only
    // SAFETY: setpriority has no memory-safety preconditions.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -20) };
    if rc == 0 {
        debug!("Acquisition thread priority raised");
    } else {
        debug!(
            "Keeping default priority for acquisition thread: {}",
            io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn raise_priority() {
    debug!("Priority elevation not supported on this platform");
}
