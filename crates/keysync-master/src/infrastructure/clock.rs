//! Millisecond clock shared by the engine and consumers.
//!
//! Consumers judge snapshot freshness against their own `GetTickCount64`, so
//! on Windows the published tick must be system uptime, not process time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Milliseconds since boot on Windows; since construction elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    #[cfg_attr(target_os = "windows", allow(dead_code))]
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[cfg(target_os = "windows")]
    fn now_ms(&self) -> i64 {
        // SAFETY: GetTickCount64 has no preconditions.
        let ticks = unsafe { windows::Win32::System::SystemInformation::GetTickCount64() };
        i64::try_from(ticks).unwrap_or(i64::MAX)
    }

    #[cfg(not(target_os = "windows"))]
    fn now_ms(&self) -> i64 {
        // Start at 1 so a published tick is never the "no heartbeat yet" zero.
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX) + 1
    }
}

/// A clock the test advances by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(100);
        let view = clock.clone();

        clock.advance(50);

        assert_eq!(view.now_ms(), 150);
    }

    #[test]
    fn test_system_clock_is_monotonic_and_nonzero() {
        let clock = SystemClock::new();
        let first = clock.now_ms();
        let second = clock.now_ms();

        assert!(first > 0);
        assert!(second >= first);
    }
}
