use anyhow::Result;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use super::encode::Framebuffer;

/// Keyboard commands of the local window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCommand {
    Quit,
    Reset,
    ToggleMode,
}

impl WindowCommand {
    pub fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::Q | Key::Escape => Some(Self::Quit),
            Key::R => Some(Self::Reset),
            Key::M => Some(Self::ToggleMode),
            _ => None,
        }
    }
}

/// minifb window showing rendered frames. Must stay on the thread that
/// created it.
pub struct PreviewWindow {
    window: Window,
}

impl PreviewWindow {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self { window })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    pub fn show(&mut self, frame: &Framebuffer) -> Result<()> {
        self.window
            .update_with_buffer(&frame.pixels, frame.width, frame.height)?;
        Ok(())
    }

    /// Pump window events without a new frame
    pub fn idle(&mut self) {
        self.window.update();
    }

    /// Commands for keys pressed since the last update
    pub fn commands(&self) -> Vec<WindowCommand> {
        self.window
            .get_keys_pressed(KeyRepeat::No)
            .into_iter()
            .filter_map(WindowCommand::from_key)
            .collect()
    }
}
