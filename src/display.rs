//! SDL2 preview window for relayed frames.

use color_eyre::{eyre::eyre, Result};
use sdl2::event::Event;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;

use tracing::info;

use crate::capture::{FrameFormat, PixelFormat};

/// SDL2 Window Display
/// Handles window creation, quit events, and frame upload.
pub struct Sdl2Display {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
    format: FrameFormat,
}

impl Sdl2Display {
    pub fn new(sdl_context: &sdl2::Sdl, format: FrameFormat) -> Result<Self> {
        let video_subsystem = sdl_context.video().map_err(|e| eyre!(e))?;

        let window = video_subsystem
            .window("Camera", format.width, format.height)
            .position(10, 10)
            .build()?;

        let canvas = window.into_canvas().present_vsync().build()?;
        let texture_creator = canvas.texture_creator();
        let event_pump = sdl_context.event_pump().map_err(|e| eyre!(e))?;

        Ok(Self {
            canvas,
            texture_creator,
            event_pump,
            format,
        })
    }

    /// Pump window events. Returns false once the window was closed.
    pub fn pump(&mut self) -> bool {
        for event in self.event_pump.poll_iter() {
            if let Event::Quit { .. } = event {
                info!("Quit event received");
                return false;
            }
        }
        true
    }

    pub fn render_frame(&mut self, pixels: &[u8]) -> Result<()> {
        let sdl_format = match self.format.pixel {
            PixelFormat::Bgr24 => PixelFormatEnum::BGR24,
            PixelFormat::Rgb24 => PixelFormatEnum::RGB24,
        };

        let mut texture = self
            .texture_creator
            .create_texture_streaming(sdl_format, self.format.width, self.format.height)
            .map_err(|e| eyre!(e))?;

        texture
            .update(None, pixels, self.format.stride())
            .map_err(|e| eyre!(e))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| eyre!(e))?;

        self.canvas.present();
        Ok(())
    }
}
