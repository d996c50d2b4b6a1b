//! Three-slot frame pool shared by the producer and the consumer.
//!
//! The state mutex guards only the role assignment and the freshness
//! counter. Each slot sits behind its own mutex, but the roles guarantee
//! the producer (*fill*) and the consumer (*lock*) never want the same
//! one, so those locks are uncontended.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::capture::frame::{FrameFormat, FrameSlot};
use crate::pipeline::rotation::{Roles, SlotIdx, SLOT_COUNT};

/// Roles plus the count of completed frames nobody has claimed yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PoolState {
    pub roles: Roles,
    pub fresh: u32,
}

impl PoolState {
    fn claim(&mut self) -> Option<SlotIdx> {
        if self.fresh == 0 {
            return None;
        }
        self.fresh = 0;
        self.roles.claim()
    }
}

/// Outcome of a producer publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Published {
    pub done: SlotIdx,
    pub next_fill: SlotIdx,
    /// The previous completed frame was never claimed
    pub dropped_unread: bool,
}

pub(crate) struct Pool {
    format: FrameFormat,
    slots: [Mutex<FrameSlot>; SLOT_COUNT],
    state: Mutex<PoolState>,
    published: Condvar,
}

impl Pool {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            slots: [
                Mutex::new(FrameSlot::new(format)),
                Mutex::new(FrameSlot::new(format)),
                Mutex::new(FrameSlot::new(format)),
            ],
            state: Mutex::new(PoolState::default()),
            published: Condvar::new(),
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Lock a slot. Callers must hold the matching role.
    pub fn slot(&self, idx: SlotIdx) -> MutexGuard<'_, FrameSlot> {
        self.slots[idx.get()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PoolState {
        *self.lock_state()
    }

    /// Producer side: mark the fill slot complete and pick the next one.
    pub fn publish(&self) -> Published {
        let published = {
            let mut state = self.lock_state();
            let done = state.roles.fill;
            let dropped_unread = state.fresh > 0;
            state.fresh = state.fresh.saturating_add(1);
            let next_fill = state.roles.publish();
            Published {
                done,
                next_fill,
                dropped_unread,
            }
        };
        self.published.notify_all();
        published
    }

    /// Consumer side: claim the newest frame if one is fresh.
    pub fn try_claim(&self) -> Option<SlotIdx> {
        self.lock_state().claim()
    }

    /// Claim the newest frame, waiting up to `timeout` for one to appear.
    ///
    /// Waits in slices of `slice` so `live` is rechecked even if nobody
    /// signals; returns `None` as soon as `live` reports false.
    pub fn claim_within(
        &self,
        timeout: Duration,
        slice: Duration,
        live: impl Fn() -> bool,
    ) -> Option<SlotIdx> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();
        loop {
            if let Some(idx) = state.claim() {
                return Some(idx);
            }
            if !live() {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let wait = slice.min(deadline - now);
            state = match self.published.wait_timeout(state, wait) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Wake any waiting consumer, e.g. on shutdown.
    pub fn wake(&self) {
        self.published.notify_all();
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
