//! Top-level window enumeration and foreground queries.
//!
//! Enumeration must survive unresponsive applications: window text is read
//! without sending window messages, and hung windows are skipped outright.
//! Even so a full scan is comparatively slow, so the engine runs it on a
//! blocking worker with a timeout and only calls [`WindowEnumerator::foreground`]
//! on its fast probe tick.

use keysync_core::domain::window::ForegroundInfo;
use keysync_core::WindowInfo;
use thiserror::Error;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// Error type for window enumeration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnumError {
    #[error("window enumeration failed: {0}")]
    Os(String),
    #[error("window scan did not finish within {after_ms} ms")]
    TimedOut { after_ms: u64 },
    #[error("window enumeration is not supported on this platform")]
    Unsupported,
}

/// Source of window information.
pub trait WindowEnumerator: Send + Sync {
    /// Every top-level window, in z-order.
    fn enumerate(&self) -> Result<Vec<WindowInfo>, EnumError>;

    /// The current foreground window and its owning process, if any.
    fn foreground(&self) -> Option<ForegroundInfo>;
}

/// Enumerator for platforms without window APIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedEnumerator;

impl WindowEnumerator for UnsupportedEnumerator {
    fn enumerate(&self) -> Result<Vec<WindowInfo>, EnumError> {
        Err(EnumError::Unsupported)
    }

    fn foreground(&self) -> Option<ForegroundInfo> {
        None
    }
}

/// The platform's enumerator.
pub fn platform_enumerator() -> std::sync::Arc<dyn WindowEnumerator> {
    #[cfg(target_os = "windows")]
    {
        std::sync::Arc::new(windows::Win32WindowEnumerator::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::sync::Arc::new(UnsupportedEnumerator)
    }
}
