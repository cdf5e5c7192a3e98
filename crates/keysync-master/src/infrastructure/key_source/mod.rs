//! System-wide keyboard capture.
//!
//! On Windows this installs a low-level keyboard hook (`WH_KEYBOARD_LL`) on a
//! dedicated Win32 message-loop thread. Every physical or injected key
//! transition is posted to an unbounded Tokio channel and consumed by the
//! engine's control loop.
//!
//! # Windows-Specific Implementation
//!
//! The hook callback must return within the system's hook timeout or Windows
//! silently removes the hook. The callback therefore does nothing except
//! build a [`KeyEvent`] and push it onto the channel; it never blocks and
//! never suppresses the event.
//!
//! # Testability
//!
//! The [`KeyEventSource`] trait lets tests inject synthetic events through
//! [`mock::MockKeySource`] without any OS hook.

use tokio::sync::mpsc::UnboundedReceiver;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// One key transition as reported by the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Windows virtual-key code.
    pub vk_code: u8,
    pub is_down: bool,
    /// The event was synthesized by `SendInput` or similar.
    pub injected: bool,
    /// Milliseconds since system start, from the hook struct.
    pub time_ms: u32,
}

impl KeyEvent {
    pub fn down(vk_code: u8) -> Self {
        Self {
            vk_code,
            is_down: true,
            injected: false,
            time_ms: 0,
        }
    }

    pub fn up(vk_code: u8) -> Self {
        Self {
            is_down: false,
            ..Self::down(vk_code)
        }
    }
}

/// Error type for keyboard capture.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to install keyboard hook: {0}")]
    HookInstallFailed(String),
    #[error("keyboard capture is already running")]
    AlreadyStarted,
    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// Abstraction over the global key hook.
///
/// The production implementation is the Windows hook; tests use
/// [`mock::MockKeySource`].
pub trait KeyEventSource: Send {
    /// Installs the hook and returns the receiving end of its event channel.
    fn start(&mut self) -> Result<UnboundedReceiver<KeyEvent>, CaptureError>;

    /// Removes the hook. Calling this more than once is harmless.
    fn stop(&mut self);
}

/// A source that never produces events, for platforms without a hook.
#[derive(Debug, Default)]
pub struct UnsupportedKeySource;

impl KeyEventSource for UnsupportedKeySource {
    fn start(&mut self) -> Result<UnboundedReceiver<KeyEvent>, CaptureError> {
        Err(CaptureError::UnsupportedPlatform(std::env::consts::OS.to_string()))
    }

    fn stop(&mut self) {}
}

/// The platform's key source.
pub fn platform_key_source() -> Box<dyn KeyEventSource> {
    #[cfg(target_os = "windows")]
    {
        Box::new(windows::WindowsKeyHook::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(UnsupportedKeySource)
    }
}
