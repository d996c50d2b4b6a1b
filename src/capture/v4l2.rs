//! V4L2 capture source with memory-mapped streaming

use std::io;
use std::time::Duration;

use tracing::{debug, info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::decoder::decode_into;
use crate::capture::frame::{FrameFormat, FrameSlot, WireFormat};
use crate::capture::source::FrameSource;
use crate::error::{RelayError, Result};
use crate::CaptureConfig;

/// `/dev/videoN` capture source
pub struct V4l2Source {
    index: u32,
    card: String,
    // Declared before the device so the stream is unmapped first
    stream: Option<MmapStream<'static>>,
    _device: Device,
    wire: WireFormat,
    format: FrameFormat,
    read_timeout: Duration,
}

impl V4l2Source {
    /// Open `/dev/video{index}`, negotiate a wire format and start streaming.
    #[instrument(skip(config))]
    pub fn open(index: u32, config: &CaptureConfig) -> Result<Self> {
        let device = Device::new(index as usize)?;

        let caps = device.query_caps()?;
        debug!("Device {}: {} ({})", index, caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(RelayError::Device(format!(
                "{} doesn't support video capture",
                caps.card
            )));
        }

        let offered: Vec<WireFormat> = device
            .enum_formats()?
            .iter()
            .filter_map(|desc| wire_format(desc.fourcc))
            .collect();
        let wire = WireFormat::negotiate(&offered, config.wire, config.format).ok_or_else(|| {
            RelayError::Device(format!("{} offers no format we can convert", caps.card))
        })?;

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc(wire);
        let fmt = device.set_format(&fmt)?;

        if fmt.fourcc != fourcc(wire) {
            return Err(RelayError::Device(format!(
                "{} refused {:?}, offered {}",
                caps.card, wire, fmt.fourcc
            )));
        }

        // Best effort: many UVC cameras ignore the request in low light
        if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
            debug!("Device {} kept its default frame rate: {}", index, e);
        }

        let mut stream =
            MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count)?;
        // Wake up regularly so a stalled device cannot pin the thread
        stream.set_timeout(config.read_timeout());

        // The driver may round the geometry
        let format = FrameFormat::new(fmt.width, fmt.height, config.format);
        info!(
            "Opened {} at index {}: {}x{} {:?} from {:?}",
            caps.card, index, format.width, format.height, format.pixel, wire
        );

        Ok(Self {
            index,
            card: caps.card,
            stream: Some(stream),
            _device: device,
            wire,
            format,
            read_timeout: config.read_timeout(),
        })
    }
}

impl FrameSource for V4l2Source {
    fn is_opened(&self) -> bool {
        self.stream.is_some()
    }

    fn format(&self) -> FrameFormat {
        self.format
    }

    fn read(&mut self, slot: &mut FrameSlot) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RelayError::Device("stream not started".into()))?;

        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(RelayError::ReadTimeout(self.read_timeout));
            }
            Err(e) => return Err(e.into()),
        };
        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used == 0 { buf } else { &buf[..used] };

        decode_into(data, self.wire, slot)
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            debug!("Released capture device {} ({})", self.index, self.card);
        }
    }
}

fn fourcc(format: WireFormat) -> FourCC {
    match format {
        WireFormat::Mjpeg => FourCC::new(b"MJPG"),
        WireFormat::Yuyv => FourCC::new(b"YUYV"),
        WireFormat::Rgb24 => FourCC::new(b"RGB3"),
        WireFormat::Bgr24 => FourCC::new(b"BGR3"),
    }
}

fn wire_format(fourcc: FourCC) -> Option<WireFormat> {
    match &fourcc.repr {
        b"MJPG" => Some(WireFormat::Mjpeg),
        b"YUYV" => Some(WireFormat::Yuyv),
        b"RGB3" => Some(WireFormat::Rgb24),
        b"BGR3" => Some(WireFormat::Bgr24),
        _ => None,
    }
}
