//! Scriptable key state probe for tests.

use std::sync::{Arc, Mutex, PoisonError};

use keysync_core::KEY_COUNT;

use super::KeyStateProbe;

#[derive(Debug)]
struct Keyboard {
    down: [bool; KEY_COUNT],
    toggles: [u8; KEY_COUNT],
}

/// A [`KeyStateProbe`] whose answers the test sets directly. Clones share
/// state.
#[derive(Debug, Clone)]
pub struct MockKeyboard {
    inner: Arc<Mutex<Keyboard>>,
}

impl MockKeyboard {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Keyboard {
                down: [false; KEY_COUNT],
                toggles: [0; KEY_COUNT],
            })),
        }
    }

    pub fn press(&self, vk: u8) {
        self.lock().down[vk as usize] = true;
    }

    pub fn release(&self, vk: u8) {
        self.lock().down[vk as usize] = false;
    }

    pub fn set_toggle(&self, vk: u8, on: bool) {
        self.lock().toggles[vk as usize] = u8::from(on);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Keyboard> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockKeyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStateProbe for MockKeyboard {
    fn is_down(&self, vk: u8) -> bool {
        self.lock().down[vk as usize]
    }

    fn toggles(&self) -> [u8; KEY_COUNT] {
        self.lock().toggles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_keyboard_clones_share_state() {
        // Arrange
        let keyboard = MockKeyboard::new();
        let probe = keyboard.clone();

        // Act
        keyboard.press(0x41);
        keyboard.set_toggle(0x14, true);

        // Assert
        assert!(probe.is_down(0x41));
        assert_eq!(probe.toggles()[0x14], 1);

        keyboard.release(0x41);
        assert!(!probe.is_down(0x41));
    }
}
