//! Mouse and keyboard input simulation.
//!
//! Coordinates are fractions of the primary screen (0.0 to 1.0). On Windows
//! `SendInput` is used with absolute coordinates; it simulates hardware-level
//! input, which the game accepts, and moves the real cursor.

use crate::automation::config::RelativePoint;
use crate::error::Result;

/// Keys the bot presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
}

/// Synthetic input at normalized screen coordinates.
pub trait InputDriver: Send {
    fn move_to(&mut self, point: RelativePoint) -> Result<()>;
    fn click(&mut self, point: RelativePoint) -> Result<()>;
    fn press_key(&mut self, key: Key) -> Result<()>;
}

/// Reads the current cursor position.
///
/// Kept apart from `InputDriver` so the foreground thread can record an
/// anchor while the worker owns the driver.
pub trait CursorProbe: Send + Sync {
    fn cursor_position(&self) -> Result<RelativePoint>;
}

/// Maps a fraction of the screen onto the 0-65535 range `MOUSEEVENTF_ABSOLUTE` expects.
pub fn to_absolute(point: RelativePoint) -> (i32, i32) {
    let scale = |v: f32| (v.clamp(0.0, 1.0) * 65535.0).round() as i32;
    (scale(point.x), scale(point.y))
}

#[cfg(windows)]
pub use self::windows_input::{SendInputDriver, SystemCursor};

#[cfg(windows)]
mod windows_input {
    use std::time::Duration;
    use tracing::trace;

    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYEVENTF_KEYUP,
        MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE,
        MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY, VK_ESCAPE,
    };
    use windows::Win32::UI::WindowsAndMessaging::GetCursorPos;

    use super::{to_absolute, CursorProbe, InputDriver, Key};
    use crate::automation::config::RelativePoint;
    use crate::capture::screen::screen_size;
    use crate::error::{BotError, Result};

    /// `SendInput`-based driver.
    #[derive(Debug, Default)]
    pub struct SendInputDriver;

    impl SendInputDriver {
        pub fn new() -> Self {
            Self
        }
    }

    fn send(inputs: &[INPUT]) -> Result<()> {
        let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            return Err(BotError::Input(format!(
                "SendInput accepted {} of {} events",
                sent,
                inputs.len()
            )));
        }
        Ok(())
    }

    fn mouse_input(point: RelativePoint, flags: MOUSE_EVENT_FLAGS) -> INPUT {
        let (dx, dy) = to_absolute(point);
        INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    dwFlags: flags | MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_MOVE,
                    ..Default::default()
                },
            },
        }
    }

    fn key_input(vk: VIRTUAL_KEY, up: bool) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: vk,
                    dwFlags: if up { KEYEVENTF_KEYUP } else { Default::default() },
                    ..Default::default()
                },
            },
        }
    }

    impl InputDriver for SendInputDriver {
        fn move_to(&mut self, point: RelativePoint) -> Result<()> {
            send(&[mouse_input(point, Default::default())])
        }

        fn click(&mut self, point: RelativePoint) -> Result<()> {
            trace!("Click at ({:.4}, {:.4})", point.x, point.y);
            self.move_to(point)?;
            std::thread::sleep(Duration::from_millis(30));
            send(&[mouse_input(point, MOUSEEVENTF_LEFTDOWN)])?;
            std::thread::sleep(Duration::from_millis(30));
            send(&[mouse_input(point, MOUSEEVENTF_LEFTUP)])
        }

        fn press_key(&mut self, key: Key) -> Result<()> {
            let vk = match key {
                Key::Escape => VK_ESCAPE,
            };
            trace!("Key press {:?}", key);
            send(&[key_input(vk, false)])?;
            std::thread::sleep(Duration::from_millis(30));
            send(&[key_input(vk, true)])
        }
    }

    /// Cursor position from `GetCursorPos`.
    #[derive(Debug, Default)]
    pub struct SystemCursor;

    impl CursorProbe for SystemCursor {
        fn cursor_position(&self) -> Result<RelativePoint> {
            let mut point = POINT::default();
            unsafe { GetCursorPos(&mut point) }
                .map_err(|e| BotError::Input(format!("GetCursorPos failed: {}", e)))?;
            let (width, height) = screen_size();
            if width == 0 || height == 0 {
                return Err(BotError::Input("Screen size unavailable".to_string()));
            }
            Ok(RelativePoint {
                x: point.x as f32 / width as f32,
                y: point.y as f32 / height as f32,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_absolute_corners() {
        assert_eq!(to_absolute(RelativePoint { x: 0.0, y: 0.0 }), (0, 0));
        assert_eq!(to_absolute(RelativePoint { x: 1.0, y: 1.0 }), (65535, 65535));
        assert_eq!(to_absolute(RelativePoint { x: 0.5, y: 0.25 }), (32768, 16384));
    }

    #[test]
    fn test_to_absolute_clamps() {
        assert_eq!(to_absolute(RelativePoint { x: -0.2, y: 1.7 }), (0, 65535));
    }
}
