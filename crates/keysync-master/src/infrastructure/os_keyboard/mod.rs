//! Queries of the operating system's own view of the keyboard.
//!
//! The engine reconciles its event-driven model against these answers on every
//! heartbeat, which repairs missed hook events (a key released while another
//! window held a modal loop, a hook timeout, and so on).

use keysync_core::KEY_COUNT;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// Physical key state as the OS sees it.
pub trait KeyStateProbe: Send {
    /// `true` if `vk` is currently held.
    fn is_down(&self, vk: u8) -> bool;

    /// Toggle bits (bit0) of every key, e.g. Caps Lock or Num Lock state.
    fn toggles(&self) -> [u8; KEY_COUNT];
}

/// Probe for platforms without a keyboard state API: nothing is ever down.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullKeyStateProbe;

impl KeyStateProbe for NullKeyStateProbe {
    fn is_down(&self, _vk: u8) -> bool {
        false
    }

    fn toggles(&self) -> [u8; KEY_COUNT] {
        [0; KEY_COUNT]
    }
}

/// The platform's probe.
pub fn platform_key_state_probe() -> Box<dyn KeyStateProbe> {
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::WindowsKeyStateProbe)
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(NullKeyStateProbe)
    }
}

impl<T: KeyStateProbe + ?Sized> KeyStateProbe for Box<T> {
    fn is_down(&self, vk: u8) -> bool {
        (**self).is_down(vk)
    }

    fn toggles(&self) -> [u8; KEY_COUNT] {
        (**self).toggles()
    }
}
