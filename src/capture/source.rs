//! Capture device contract used by the acquisition loop

use crate::capture::frame::{FrameFormat, FrameSlot};
use crate::error::Result;
use crate::CaptureConfig;

/// A blocking frame producer such as a V4L2 device.
///
/// Sources are opened by index through the relay's opener, moved onto the
/// acquisition thread and dropped there, which releases the device.
pub trait FrameSource: Send + 'static {
    /// Whether the device reports itself ready after opening
    fn is_opened(&self) -> bool;

    /// Layout every successful [`read`](FrameSource::read) writes
    fn format(&self) -> FrameFormat;

    /// Block until the next frame is written into `slot`.
    ///
    /// [`RelayError::ReadTimeout`](crate::RelayError::ReadTimeout) means no
    /// frame yet and the read is retried; any other error ends the stream.
    fn read(&mut self, slot: &mut FrameSlot) -> Result<()>;
}

/// Type-erased device opener: `(index, capture config) -> source`
pub type Opener =
    Box<dyn FnMut(u32, &CaptureConfig) -> Result<Box<dyn FrameSource>> + Send + 'static>;

/// Erase a concrete opener function into an [`Opener`].
pub fn boxed_opener<S, F>(mut open: F) -> Opener
where
    S: FrameSource,
    F: FnMut(u32, &CaptureConfig) -> Result<S> + Send + 'static,
{
    Box::new(move |index: u32, config: &CaptureConfig| {
        open(index, config).map(|s| Box::new(s) as Box<dyn FrameSource>)
    })
}
