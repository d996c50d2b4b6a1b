//! Role bookkeeping for the three-slot pool.
//!
//! The producer writes the *fill* slot, the last completed frame sits in
//! *done*, and the consumer may hold *lock*. Rotation never hands the
//! producer a slot that is done or locked, so a frame the consumer holds
//! cannot be overwritten until the consumer releases it.

use std::fmt;

/// Number of buffers in the pool
pub const SLOT_COUNT: usize = 3;

/// Index of one of the three pool slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIdx(u8);

impl SlotIdx {
    pub const ALL: [SlotIdx; SLOT_COUNT] = [SlotIdx(0), SlotIdx(1), SlotIdx(2)];

    pub fn new(index: usize) -> Option<Self> {
        (index < SLOT_COUNT).then(|| SlotIdx(index as u8))
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}", self.0)
    }
}

/// Pick the producer's next slot: the lowest index that is neither the
/// frame just completed nor the consumer's locked slot.
pub fn next_fill(completed: SlotIdx, lock: Option<SlotIdx>) -> SlotIdx {
    for slot in SlotIdx::ALL {
        if slot != completed && Some(slot) != lock {
            return slot;
        }
    }
    unreachable!("two roles cannot exclude all three slots")
}

/// Current assignment of roles to slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles {
    pub fill: SlotIdx,
    pub done: Option<SlotIdx>,
    pub lock: Option<SlotIdx>,
}

impl Roles {
    /// Session start: producer fills slot 0, nothing completed or held.
    pub fn initial() -> Self {
        Self {
            fill: SlotIdx::ALL[0],
            done: None,
            lock: None,
        }
    }

    /// Promote *fill* to *done* and rotate. Returns the new fill slot.
    pub fn publish(&mut self) -> SlotIdx {
        let completed = self.fill;
        self.done = Some(completed);
        self.fill = next_fill(completed, self.lock);
        debug_assert!(self.is_consistent());
        self.fill
    }

    /// Hand the *done* slot to the consumer, releasing any previous lock.
    pub fn claim(&mut self) -> Option<SlotIdx> {
        self.lock = self.done;
        debug_assert!(self.is_consistent());
        self.lock
    }

    /// The producer never targets a slot the consumer holds.
    pub fn is_consistent(&self) -> bool {
        Some(self.fill) != self.lock && Some(self.fill) != self.done
    }
}

impl Default for Roles {
    fn default() -> Self {
        Self::initial()
    }
}
