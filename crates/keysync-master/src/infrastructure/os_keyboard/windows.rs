//! `GetAsyncKeyState` / `GetKeyboardState` probe.

#![cfg(target_os = "windows")]

use keysync_core::KEY_COUNT;
use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, GetKeyboardState};

use super::KeyStateProbe;

#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsKeyStateProbe;

impl KeyStateProbe for WindowsKeyStateProbe {
    fn is_down(&self, vk: u8) -> bool {
        // SAFETY: GetAsyncKeyState accepts any virtual-key code.
        let state = unsafe { GetAsyncKeyState(i32::from(vk)) };
        // The most significant bit is set while the key is down.
        state < 0
    }

    fn toggles(&self) -> [u8; KEY_COUNT] {
        let mut state = [0u8; KEY_COUNT];
        // SAFETY: the buffer is exactly the 256 bytes the API writes.
        if unsafe { GetKeyboardState(&mut state) }.is_err() {
            return [0; KEY_COUNT];
        }
        for byte in state.iter_mut() {
            *byte &= 0x01;
        }
        state
    }
}
