//! Triple-buffered frame relay: rotation, pool, producer thread, accessor

pub(crate) mod grab;
pub mod health;
pub(crate) mod pool;
pub mod relay;
pub mod rotation;
pub mod stats;

pub use health::Health;
pub use relay::{FrameView, Relay, DEVICE_CANDIDATES};
pub use rotation::{next_fill, Roles, SlotIdx, SLOT_COUNT};
pub use stats::RelayStats;
