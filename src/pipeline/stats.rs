//! Relay counters

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

/// Snapshot of relay activity since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Frames completed by the producer
    pub frames_published: u64,
    /// Frames handed to the consumer
    pub frames_fetched: u64,
    /// Completed frames replaced before the consumer claimed them
    pub frames_dropped: u64,
    /// Sessions that ended because a device read failed
    pub read_failures: u64,
}

/// Producer and consumer bump different lines, so keep them apart.
#[derive(Default)]
pub(crate) struct Counters {
    published: CachePadded<AtomicU64>,
    dropped: CachePadded<AtomicU64>,
    read_failures: CachePadded<AtomicU64>,
    fetched: CachePadded<AtomicU64>,
}

impl Counters {
    pub fn record_publish(&self, dropped_unread: bool) {
        self.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("camrelay_frames_published").increment(1);
        if dropped_unread {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("camrelay_frames_dropped").increment(1);
        }
    }

    pub fn record_fetch(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("camrelay_frames_fetched").increment(1);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            frames_published: self.published.load(Ordering::Relaxed),
            frames_fetched: self.fetched.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
        }
    }
}
