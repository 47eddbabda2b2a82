//! Host platform layer: window, input, frame presentation, pacing.
//!
//! The runtime owns one `Platform` object and polls it at the defined
//! suspension points; the joypad nibbles are copied onto the bus by value,
//! so nothing here is shared mutable state. `SdlPlatform` is the interactive
//! implementation, `HeadlessPlatform` the inert one used by tests and
//! display-less hosts.

use std::thread;
use std::time::{Duration, Instant};

use sdl2::event::Event;
use sdl2::keyboard::Scancode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, Texture, TextureCreator};
use sdl2::video::{Window, WindowContext};

use crate::memory_map::{SCREEN_HEIGHT, SCREEN_WIDTH};

pub trait Platform {
    /// Drains pending host events. Returns false when the user asked to
    /// quit.
    fn poll_events(&mut self) -> bool;
    /// Presents one 160x144 ARGB8888 frame.
    fn render_frame(&mut self, framebuffer: &[u32]);
    /// Paces to roughly one frame per 16 ms.
    fn vsync(&mut self);
    fn set_title(&mut self, title: &str);
    /// Active-low d-pad nibble: Right, Left, Up, Down in bits 0-3.
    fn dpad(&self) -> u8;
    /// Active-low button nibble: A, B, Select, Start in bits 0-3.
    fn buttons(&self) -> u8;
}

/// No-window platform: never quits, drops frames, reports all keys released.
pub struct HeadlessPlatform {
    pub dpad: u8,
    pub buttons: u8,
    quit: bool,
    frames_rendered: u32,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        HeadlessPlatform { dpad: 0xFF, buttons: 0xFF, quit: false, frames_rendered: 0 }
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    pub fn frames_rendered(&self) -> u32 {
        self.frames_rendered
    }
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HeadlessPlatform {
    fn poll_events(&mut self) -> bool {
        !self.quit
    }
    fn render_frame(&mut self, _framebuffer: &[u32]) {
        self.frames_rendered += 1;
    }
    fn vsync(&mut self) {}
    fn set_title(&mut self, _title: &str) {}
    fn dpad(&self) -> u8 {
        self.dpad
    }
    fn buttons(&self) -> u8 {
        self.buttons
    }
}

const FRAME_TIME: Duration = Duration::from_millis(16);

pub struct SdlPlatform {
    _sdl: sdl2::Sdl,
    canvas: Canvas<Window>,
    _texture_creator: TextureCreator<WindowContext>,
    /// Streaming frame texture, created once and updated in place each
    /// frame. Lives for the window's lifetime.
    texture: Texture,
    event_pump: sdl2::EventPump,
    pixel_bytes: Vec<u8>,
    last_frame: Instant,
    dpad: u8,
    buttons: u8,
}

impl SdlPlatform {
    pub fn new(scale: u32) -> Result<Self, String> {
        let scale = scale.clamp(1, 8);
        let sdl = sdl2::init()?;
        let video = sdl.video()?;

        let window = video
            .window(
                "matcha",
                SCREEN_WIDTH as u32 * scale,
                SCREEN_HEIGHT as u32 * scale,
            )
            .position_centered()
            .resizable()
            .build()
            .map_err(|e| e.to_string())?;

        let canvas = window
            .into_canvas()
            .accelerated()
            .present_vsync()
            .build()
            .map_err(|e| e.to_string())?;
        let texture_creator = canvas.texture_creator();
        let texture = texture_creator
            .create_texture_streaming(
                PixelFormatEnum::ARGB8888,
                SCREEN_WIDTH as u32,
                SCREEN_HEIGHT as u32,
            )
            .map_err(|e| e.to_string())?;
        let event_pump = sdl.event_pump()?;

        Ok(SdlPlatform {
            _sdl: sdl,
            canvas,
            _texture_creator: texture_creator,
            texture,
            event_pump,
            pixel_bytes: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT * 4],
            last_frame: Instant::now(),
            dpad: 0xFF,
            buttons: 0xFF,
        })
    }

    fn apply_key(&mut self, scancode: Scancode, pressed: bool) {
        // (is_dpad, bit mask) per the active-low joypad layout.
        let (is_dpad, mask) = match scancode {
            Scancode::Right | Scancode::D => (true, 0x01),
            Scancode::Left | Scancode::A => (true, 0x02),
            Scancode::Up | Scancode::W => (true, 0x04),
            Scancode::Down | Scancode::S => (true, 0x08),
            Scancode::Z | Scancode::J => (false, 0x01), // A
            Scancode::X | Scancode::K => (false, 0x02), // B
            Scancode::RShift | Scancode::Backspace => (false, 0x04), // Select
            Scancode::Return => (false, 0x08),          // Start
            _ => return,
        };
        let target = if is_dpad { &mut self.dpad } else { &mut self.buttons };
        if pressed {
            *target &= !mask;
        } else {
            *target |= mask;
        }
    }
}

impl Platform for SdlPlatform {
    fn poll_events(&mut self) -> bool {
        let events: Vec<Event> = self.event_pump.poll_iter().collect();
        for event in events {
            match event {
                Event::Quit { .. } => return false,
                Event::KeyDown { scancode: Some(Scancode::Escape), .. } => return false,
                Event::KeyDown { scancode: Some(code), .. } => self.apply_key(code, true),
                Event::KeyUp { scancode: Some(code), .. } => self.apply_key(code, false),
                _ => {}
            }
        }
        true
    }

    fn render_frame(&mut self, framebuffer: &[u32]) {
        if framebuffer.len() != SCREEN_WIDTH * SCREEN_HEIGHT {
            log::error!("Framebuffer has {} pixels, expected {}", framebuffer.len(), SCREEN_WIDTH * SCREEN_HEIGHT);
            return;
        }
        for (chunk, &pixel) in self.pixel_bytes.chunks_exact_mut(4).zip(framebuffer) {
            chunk.copy_from_slice(&pixel.to_ne_bytes());
        }

        if let Err(e) = self.texture.update(None, &self.pixel_bytes, SCREEN_WIDTH * 4) {
            log::error!("Failed to upload frame: {}", e);
            return;
        }

        self.canvas.clear();
        if let Err(e) = self.canvas.copy(&self.texture, None, None) {
            log::error!("Failed to present frame: {}", e);
        }
        self.canvas.present();
    }

    fn vsync(&mut self) {
        let elapsed = self.last_frame.elapsed();
        if elapsed < FRAME_TIME {
            thread::sleep(FRAME_TIME - elapsed);
        }
        self.last_frame = Instant::now();
    }

    fn set_title(&mut self, title: &str) {
        if let Err(e) = self.canvas.window_mut().set_title(title) {
            log::debug!("Failed to set window title: {}", e);
        }
    }

    fn dpad(&self) -> u8 {
        self.dpad
    }

    fn buttons(&self) -> u8 {
        self.buttons
    }
}
