//! Display surfaces for annotated frames.
//!
//! A surface accepts successive frames and offers a non-blocking key poll.
//! Windows are created on the first `show`, never earlier.

use anyhow::Result;

use crate::frame::Frame;

pub trait DisplaySurface {
    fn name(&self) -> &'static str;

    fn show(&mut self, frame: &Frame) -> Result<()>;

    /// Process pending window events without presenting a frame. The run loop
    /// calls this for frames the sampler skips so key polls stay current.
    fn refresh(&mut self) {}

    /// Most recent key press since the last poll, if any.
    fn poll_key(&mut self) -> Option<char>;

    /// Release the window. Safe to call more than once.
    fn close(&mut self);
}

/// Discards frames. Used for `--headless` runs and builds without a window backend.
#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    shown: u64,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_shown(&self) -> u64 {
        self.shown
    }
}

impl DisplaySurface for HeadlessDisplay {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn show(&mut self, _frame: &Frame) -> Result<()> {
        self.shown += 1;
        Ok(())
    }

    fn poll_key(&mut self) -> Option<char> {
        None
    }

    fn close(&mut self) {}
}

/// Build the surface selected by configuration.
pub fn open_display(enabled: bool, title: &str, quit_key: char) -> Box<dyn DisplaySurface> {
    if !enabled {
        return Box::new(HeadlessDisplay::new());
    }
    window_surface(title, quit_key)
}

#[cfg(feature = "display-minifb")]
fn window_surface(title: &str, quit_key: char) -> Box<dyn DisplaySurface> {
    Box::new(MinifbDisplay::new(title, quit_key))
}

#[cfg(not(feature = "display-minifb"))]
fn window_surface(title: &str, quit_key: char) -> Box<dyn DisplaySurface> {
    log::warn!(
        "built without display-minifb; running headless ({:?}, quit key {:?} unavailable)",
        title,
        quit_key
    );
    Box::new(HeadlessDisplay::new())
}

#[cfg(feature = "display-minifb")]
pub use window::MinifbDisplay;

#[cfg(feature = "display-minifb")]
mod window {
    use anyhow::{anyhow, Result};
    use minifb::{Key, KeyRepeat, Window, WindowOptions};

    use super::DisplaySurface;
    use crate::frame::Frame;

    const TARGET_FPS: usize = 30;

    /// Native window via minifb. Escape or closing the window counts as the quit key.
    pub struct MinifbDisplay {
        title: String,
        quit_key: char,
        window: Option<Window>,
        size: (usize, usize),
        buffer: Vec<u32>,
    }

    impl MinifbDisplay {
        pub fn new(title: &str, quit_key: char) -> Self {
            Self {
                title: title.to_string(),
                quit_key,
                window: None,
                size: (0, 0),
                buffer: Vec::new(),
            }
        }

        fn ensure_window(&mut self, width: usize, height: usize) -> Result<&mut Window> {
            if self.size != (width, height) {
                self.window = None;
            }
            if self.window.is_none() {
                let mut window =
                    Window::new(&self.title, width, height, WindowOptions::default())
                        .map_err(|err| anyhow!("open window {:?}: {}", self.title, err))?;
                window.set_target_fps(TARGET_FPS);
                log::debug!("MinifbDisplay: opened {}x{} window", width, height);
                self.window = Some(window);
                self.size = (width, height);
            }
            self.window
                .as_mut()
                .ok_or_else(|| anyhow!("window unavailable"))
        }

        fn key_char(&self, key: Key) -> Option<char> {
            match key {
                Key::Escape => Some(self.quit_key),
                Key::A => Some('a'),
                Key::B => Some('b'),
                Key::C => Some('c'),
                Key::D => Some('d'),
                Key::E => Some('e'),
                Key::F => Some('f'),
                Key::G => Some('g'),
                Key::H => Some('h'),
                Key::I => Some('i'),
                Key::J => Some('j'),
                Key::K => Some('k'),
                Key::L => Some('l'),
                Key::M => Some('m'),
                Key::N => Some('n'),
                Key::O => Some('o'),
                Key::P => Some('p'),
                Key::Q => Some('q'),
                Key::R => Some('r'),
                Key::S => Some('s'),
                Key::T => Some('t'),
                Key::U => Some('u'),
                Key::V => Some('v'),
                Key::W => Some('w'),
                Key::X => Some('x'),
                Key::Y => Some('y'),
                Key::Z => Some('z'),
                _ => None,
            }
        }
    }

    impl DisplaySurface for MinifbDisplay {
        fn name(&self) -> &'static str {
            "minifb"
        }

        fn show(&mut self, frame: &Frame) -> Result<()> {
            let (width, height) = (frame.width() as usize, frame.height() as usize);
            self.buffer.clear();
            self.buffer.extend(
                frame
                    .pixels()
                    .chunks_exact(3)
                    .map(|px| ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32),
            );
            let buffer = std::mem::take(&mut self.buffer);
            let window = self.ensure_window(width, height)?;
            let shown = window
                .update_with_buffer(&buffer, width, height)
                .map_err(|err| anyhow!("update window: {}", err));
            self.buffer = buffer;
            shown
        }

        fn refresh(&mut self) {
            // Only update() and update_with_buffer() drain the OS event queue.
            if let Some(window) = self.window.as_mut() {
                window.update();
            }
        }

        fn poll_key(&mut self) -> Option<char> {
            let window = self.window.as_ref()?;
            if !window.is_open() {
                return Some(self.quit_key);
            }
            let keys = window.get_keys_pressed(KeyRepeat::No);
            keys.into_iter().find_map(|key| self.key_char(key))
        }

        fn close(&mut self) {
            if self.window.take().is_some() {
                log::debug!("MinifbDisplay: window closed");
            }
        }
    }

    impl Drop for MinifbDisplay {
        fn drop(&mut self) {
            self.close();
        }
    }
}
