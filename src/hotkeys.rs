//! Global hotkeys: F8 records the anchor and starts, F9 stops, F7 exits.

use tracing::{info, warn};

use crate::automation::Controller;

pub const HOTKEY_START: i32 = 1;
pub const HOTKEY_STOP: i32 = 2;
pub const HOTKEY_EXIT: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyCommand {
    /// Record the cursor as the item anchor, then start
    Start,
    Stop,
    Exit,
}

impl HotkeyCommand {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            HOTKEY_START => Some(Self::Start),
            HOTKEY_STOP => Some(Self::Stop),
            HOTKEY_EXIT => Some(Self::Exit),
            _ => None,
        }
    }
}

/// Applies a command. Returns `false` once the message loop should end.
pub fn dispatch(controller: &Controller, command: HotkeyCommand) -> bool {
    match command {
        HotkeyCommand::Start => {
            if let Err(e) = controller.record_anchor_position() {
                warn!("Could not record anchor: {}", e);
            }
            controller.start();
            true
        }
        HotkeyCommand::Stop => {
            controller.stop();
            true
        }
        HotkeyCommand::Exit => {
            info!("Exit hotkey pressed");
            controller.exit();
            false
        }
    }
}

#[cfg(windows)]
pub use self::windows_hotkeys::run_message_loop;

#[cfg(windows)]
mod windows_hotkeys {
    use tracing::{info, warn};

    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, MOD_NOREPEAT, VK_F7, VK_F8, VK_F9,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetMessageW, MSG, WM_HOTKEY};

    use super::{dispatch, HotkeyCommand, HOTKEY_EXIT, HOTKEY_START, HOTKEY_STOP};
    use crate::automation::Controller;
    use crate::error::{BotError, Result};

    /// Registers the hotkeys on the calling thread and pumps its message
    /// queue until the exit hotkey is pressed.
    pub fn run_message_loop(controller: &Controller) -> Result<()> {
        let bindings = [
            (HOTKEY_START, VK_F8, "F8"),
            (HOTKEY_STOP, VK_F9, "F9"),
            (HOTKEY_EXIT, VK_F7, "F7"),
        ];

        for (id, vk, name) in bindings {
            let registered =
                unsafe { RegisterHotKey(HWND::default(), id, MOD_NOREPEAT, vk.0 as u32) };
            if let Err(e) = registered {
                unregister_all();
                return Err(BotError::Input(format!(
                    "Failed to register {} hotkey: {}",
                    name, e
                )));
            }
        }

        info!("Hotkeys: F8 (record anchor + start), F9 (stop), F7 (exit)");

        let mut msg = MSG::default();
        unsafe {
            while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
                if msg.message != WM_HOTKEY {
                    continue;
                }
                match HotkeyCommand::from_id(msg.wParam.0 as i32) {
                    Some(command) => {
                        if !dispatch(controller, command) {
                            break;
                        }
                    }
                    None => warn!("Unknown hotkey id {}", msg.wParam.0),
                }
            }
        }

        unregister_all();
        Ok(())
    }

    fn unregister_all() {
        for id in [HOTKEY_START, HOTKEY_STOP, HOTKEY_EXIT] {
            unsafe {
                let _ = UnregisterHotKey(HWND::default(), id);
            }
        }
    }
}
