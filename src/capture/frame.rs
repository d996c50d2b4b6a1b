use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Channel order of the packed 3-byte pixels delivered in a frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        3
    }
}

/// Format a device sends, converted into the slot's [`PixelFormat`] on read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireFormat {
    Mjpeg,
    /// YUV 4:2:2 packed, two pixels per four bytes
    Yuyv,
    Rgb24,
    Bgr24,
}

impl WireFormat {
    /// Wire format that needs no conversion for `pixel`
    pub fn native(pixel: PixelFormat) -> Self {
        match pixel {
            PixelFormat::Rgb24 => WireFormat::Rgb24,
            PixelFormat::Bgr24 => WireFormat::Bgr24,
        }
    }

    /// Pick the wire format to request out of those a device offers.
    ///
    /// An explicit preference wins when offered. Otherwise the native
    /// layout, then MJPEG, then YUYV, then the swapped packed layout.
    pub fn negotiate(
        offered: &[WireFormat],
        preferred: Option<WireFormat>,
        output: PixelFormat,
    ) -> Option<WireFormat> {
        let native = WireFormat::native(output);
        preferred
            .into_iter()
            .chain([
                native,
                WireFormat::Mjpeg,
                WireFormat::Yuyv,
                WireFormat::Rgb24,
                WireFormat::Bgr24,
            ])
            .find(|candidate| offered.contains(candidate))
    }
}

/// Geometry and layout of a decoded frame, fixed when the device is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub pixel: PixelFormat,
}

impl FrameFormat {
    pub fn new(width: u32, height: u32, pixel: PixelFormat) -> Self {
        Self {
            width,
            height,
            pixel,
        }
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * self.pixel.channels()
    }

    /// Total byte size of one frame
    pub fn byte_len(&self) -> usize {
        self.stride() * self.height as usize
    }
}

/// One of the pool's fixed-capacity pixel buffers.
///
/// Allocated once per session; sources write into it in place and the
/// backing allocation never changes while the session runs.
#[derive(Debug)]
pub struct FrameSlot {
    data: Vec<u8>,
    format: FrameFormat,
    sequence: u64,
    captured_at: Option<Instant>,
}

impl FrameSlot {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            data: vec![0; format.byte_len()],
            format,
            sequence: 0,
            captured_at: None,
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixels. Length is fixed at [`FrameFormat::byte_len`].
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Publish number of the frame currently held, 0 if never written
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Option<Instant> {
        self.captured_at
    }

    pub(crate) fn stamp(&mut self, sequence: u64) {
        self.sequence = sequence;
        self.captured_at = Some(Instant::now());
    }
}
