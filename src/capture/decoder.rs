use jpeg_decoder::{Decoder, PixelFormat as JpegPixelFormat};

use super::frame::{FrameSlot, PixelFormat, WireFormat};
use crate::error::{RelayError, Result};

/// Write one wire-format frame into `slot` in the slot's channel order.
pub fn decode_into(data: &[u8], wire: WireFormat, slot: &mut FrameSlot) -> Result<()> {
    match wire {
        WireFormat::Mjpeg => {
            let mut decoder = Decoder::new(data);
            let pixels = decoder
                .decode()
                .map_err(|e| RelayError::Decode(e.to_string()))?;
            let info = decoder
                .info()
                .ok_or_else(|| RelayError::Decode("missing JPEG header".into()))?;

            let expected = slot.format();
            if info.pixel_format != JpegPixelFormat::RGB24
                || u32::from(info.width) != expected.width
                || u32::from(info.height) != expected.height
            {
                return Err(RelayError::Decode(format!(
                    "JPEG is {}x{} {:?}, slot expects {}x{} RGB",
                    info.width, info.height, info.pixel_format, expected.width, expected.height
                )));
            }
            store_packed(&pixels, PixelFormat::Rgb24, slot)
        }
        WireFormat::Yuyv => yuyv_into(data, slot),
        WireFormat::Rgb24 => store_packed(data, PixelFormat::Rgb24, slot),
        WireFormat::Bgr24 => store_packed(data, PixelFormat::Bgr24, slot),
    }
}

/// Copy packed 3-channel pixels, swapping R and B if the orders differ.
fn store_packed(pixels: &[u8], order: PixelFormat, slot: &mut FrameSlot) -> Result<()> {
    let swap = order != slot.format().pixel;
    let dst = slot.data_mut();
    if pixels.len() < dst.len() {
        return Err(short_frame(pixels.len(), dst.len()));
    }
    // Anything past the frame is driver padding
    let len = dst.len();
    dst.copy_from_slice(&pixels[..len]);
    if swap {
        for px in dst.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
    }
    Ok(())
}

/// BT.601 full-range YUYV to packed RGB/BGR
fn yuyv_into(data: &[u8], slot: &mut FrameSlot) -> Result<()> {
    let format = slot.format();
    let pixels = format.width as usize * format.height as usize;
    if pixels % 2 != 0 {
        return Err(RelayError::Decode(format!(
            "YUYV needs an even pixel count, slot is {}x{}",
            format.width, format.height
        )));
    }
    let need = pixels * 2;
    if data.len() < need {
        return Err(short_frame(data.len(), need));
    }

    let bgr = format.pixel == PixelFormat::Bgr24;
    let dst = slot.data_mut();
    for (yuyv, out) in data[..need].chunks_exact(4).zip(dst.chunks_exact_mut(6)) {
        let u = f32::from(yuyv[1]) - 128.0;
        let v = f32::from(yuyv[3]) - 128.0;
        for (luma, px) in [yuyv[0], yuyv[2]].into_iter().zip(out.chunks_exact_mut(3)) {
            let y = f32::from(luma);
            let r = clamp_to_u8(y + 1.402 * v);
            let g = clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v);
            let b = clamp_to_u8(y + 1.772 * u);
            px.copy_from_slice(&if bgr { [b, g, r] } else { [r, g, b] });
        }
    }
    Ok(())
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn short_frame(got: usize, need: usize) -> RelayError {
    RelayError::Decode(format!("short frame: {} bytes, need {}", got, need))
}
