use std::sync::atomic::{AtomicU8, Ordering};

/// Operational status of an acquisition session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// No device has been opened yet
    NotStarted,
    /// Device open and acquisition thread running
    Running,
    /// Stream ended, stopped, or torn down. Permanent for the session.
    Ended,
}

impl Health {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Health::NotStarted,
            1 => Health::Running,
            _ => Health::Ended,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Health::NotStarted => 0,
            Health::Running => 1,
            Health::Ended => 2,
        }
    }
}

/// Health flag shared between the relay and its acquisition thread
#[derive(Debug)]
pub(crate) struct HealthCell(AtomicU8);

impl HealthCell {
    pub fn new(health: Health) -> Self {
        Self(AtomicU8::new(health.as_u8()))
    }

    pub fn get(&self) -> Health {
        Health::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.get() == Health::Running
    }

    /// Move to [`Health::Ended`]. Returns true if this call ended a running session.
    pub fn end(&self) -> bool {
        self.0.swap(Health::Ended.as_u8(), Ordering::AcqRel) == Health::Running.as_u8()
    }
}
