//! Synthetic frame source.
//!
//! Paints a deterministic pattern into each slot so consumers can check
//! which frame they hold and whether it is intact. Reads can be paced,
//! gated one frame at a time through a channel, or made to fail after a
//! fixed number of frames to simulate end of stream. A gated source can
//! also time out like a V4L2 stream with a read timeout.

use std::time::Duration;

use flume::{Receiver, RecvTimeoutError};
use tracing::debug;

use crate::capture::frame::{FrameFormat, FrameSlot};
use crate::capture::source::FrameSource;
use crate::error::{RelayError, Result};
use crate::CaptureConfig;

const HEADER_LEN: usize = 8;

/// In-memory stand-in for a capture device
pub struct SyntheticSource {
    format: FrameFormat,
    interval: Option<Duration>,
    fail_after: Option<u64>,
    gate: Option<Receiver<()>>,
    read_timeout: Option<Duration>,
    frames: u64,
}

impl SyntheticSource {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            interval: None,
            fail_after: None,
            gate: None,
            read_timeout: None,
            frames: 0,
        }
    }

    /// Opener-compatible constructor that takes geometry from `config`.
    pub fn open(index: u32, config: &CaptureConfig) -> Result<Self> {
        let format = FrameFormat::new(config.width, config.height, config.format);
        debug!(index, ?format, "opening synthetic source");
        Ok(Self::new(format))
    }

    /// Sleep this long inside every read, like a camera's frame period
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Fail the read after `frames` successful ones
    pub fn fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Block each read until a token arrives; a closed channel ends the stream
    pub fn gated(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Give up on a gated read after `timeout` with [`RelayError::ReadTimeout`]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

impl FrameSource for SyntheticSource {
    fn is_opened(&self) -> bool {
        true
    }

    fn format(&self) -> FrameFormat {
        self.format
    }

    fn read(&mut self, slot: &mut FrameSlot) -> Result<()> {
        if let Some(gate) = &self.gate {
            let token = match self.read_timeout {
                Some(timeout) => gate.recv_timeout(timeout).map_err(|e| match e {
                    RecvTimeoutError::Timeout => RelayError::ReadTimeout(timeout),
                    RecvTimeoutError::Disconnected => gate_closed(),
                }),
                None => gate.recv().map_err(|_| gate_closed()),
            };
            token?;
        }
        if self.fail_after.is_some_and(|limit| self.frames >= limit) {
            return Err(RelayError::Device("synthetic end of stream".into()));
        }
        if let Some(interval) = self.interval {
            std::thread::sleep(interval);
        }

        self.frames += 1;
        paint(slot.data_mut(), self.frames);
        Ok(())
    }
}

fn gate_closed() -> RelayError {
    RelayError::Device("synthetic gate closed".into())
}

/// Fill byte used for the body of frame `n`
pub fn fill_byte(n: u64) -> u8 {
    (n % 251) as u8
}

/// Write frame number `n` as a little-endian header followed by a uniform body.
pub fn paint(data: &mut [u8], n: u64) {
    let header = n.to_le_bytes();
    let head = data.len().min(HEADER_LEN);
    data[..head].copy_from_slice(&header[..head]);
    data[head..].fill(fill_byte(n));
}

/// Frame number painted into `data`, if it is large enough to carry one
pub fn frame_number(data: &[u8]) -> Option<u64> {
    let header: [u8; HEADER_LEN] = data.get(..HEADER_LEN)?.try_into().ok()?;
    Some(u64::from_le_bytes(header))
}

/// True when the body matches the header, i.e. the frame was not torn.
pub fn is_intact(data: &[u8]) -> bool {
    match frame_number(data) {
        Some(n) => data[HEADER_LEN..].iter().all(|&b| b == fill_byte(n)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::PixelFormat;

    fn small_format() -> FrameFormat {
        FrameFormat::new(16, 8, PixelFormat::Bgr24)
    }

    #[test]
    fn painted_frames_carry_their_number() {
        let mut slot = FrameSlot::new(small_format());
        let mut source = SyntheticSource::new(small_format());
        source.read(&mut slot).unwrap();
        source.read(&mut slot).unwrap();
        assert_eq!(frame_number(slot.data()), Some(2));
        assert!(is_intact(slot.data()));
    }

    #[test]
    fn torn_frame_is_detected() {
        let mut data = vec![0u8; 64];
        paint(&mut data, 7);
        data[40] = fill_byte(6);
        assert!(!is_intact(&data));
    }

    #[test]
    fn fails_after_limit() {
        let mut slot = FrameSlot::new(small_format());
        let mut source = SyntheticSource::new(small_format()).fail_after(1);
        assert!(source.read(&mut slot).is_ok());
        assert!(matches!(source.read(&mut slot), Err(RelayError::Device(_))));
    }

    #[test]
    fn closed_gate_ends_stream() {
        let (tx, rx) = flume::bounded(1);
        let mut slot = FrameSlot::new(small_format());
        let mut source = SyntheticSource::new(small_format()).gated(rx);
        tx.send(()).unwrap();
        assert!(source.read(&mut slot).is_ok());
        drop(tx);
        assert!(source.read(&mut slot).is_err());
    }

    #[test]
    fn gated_read_times_out_without_ending() {
        let (tx, rx) = flume::bounded(1);
        let mut slot = FrameSlot::new(small_format());
        let mut source = SyntheticSource::new(small_format())
            .gated(rx)
            .with_read_timeout(Duration::from_millis(5));

        let err = source.read(&mut slot).unwrap_err();
        assert!(matches!(err, RelayError::ReadTimeout(_)));

        // Still usable afterwards
        tx.send(()).unwrap();
        source.read(&mut slot).unwrap();
        assert_eq!(frame_number(slot.data()), Some(1));
    }
}
