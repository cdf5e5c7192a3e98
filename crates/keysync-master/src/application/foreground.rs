//! Foreground ownership tracking.
//!
//! Two inputs feed the tracker:
//!
//! - the **fast probe** (~200 ms) only knows the foreground window and its
//!   process, and
//! - the **full scan** (~1 s) rebuilds the [`WindowSnapshot`] from every
//!   top-level window.
//!
//! Whenever either sees a target process in the foreground, its pid and the
//! time are remembered. For `grace_ms` after that last sighting the pid stays
//! the *effective* owner even if another window took focus, so a tooltip or a
//! brief alt-tab does not pause synchronization and wipe the followers' keys.

use keysync_core::domain::window::{ForegroundInfo, TargetMatcher};
use keysync_core::{WindowInfo, WindowSnapshot};

/// Who currently owns the keyboard, as far as admission is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ownership {
    /// The foreground window itself belongs to the target application.
    pub foreground_is_target: bool,
    /// Key-downs may be admitted.
    pub effective: bool,
    /// Pid published as the active owner. `0` when not effective.
    pub pid: u32,
}

/// Foreground state machine with a grace window.
#[derive(Debug)]
pub struct ForegroundTracker {
    matcher: TargetMatcher,
    grace_ms: i64,
    auto_pause: bool,
    snapshot: WindowSnapshot,
    master_pid: u32,
    last_pid: u32,
    last_seen_ms: i64,
    ownership: Ownership,
}

impl ForegroundTracker {
    /// With `auto_pause` off, ownership follows the scan alone: any running
    /// target process makes the engine effective.
    pub fn new(matcher: TargetMatcher, grace_ms: u64, auto_pause: bool) -> Self {
        Self {
            matcher,
            grace_ms: i64::try_from(grace_ms).unwrap_or(i64::MAX),
            auto_pause,
            snapshot: WindowSnapshot::empty(),
            master_pid: 0,
            last_pid: 0,
            last_seen_ms: 0,
            ownership: Ownership::default(),
        }
    }

    pub fn auto_pause_enabled(&self) -> bool {
        self.auto_pause
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn snapshot(&self) -> &WindowSnapshot {
        &self.snapshot
    }

    /// Whether the engine should be auto-paused right now.
    pub fn auto_paused(&self) -> bool {
        self.auto_pause && !self.ownership.effective
    }

    /// A target pid was seen recently enough to keep ownership.
    pub fn grace_active(&self, now_ms: i64) -> bool {
        self.last_pid != 0 && now_ms.saturating_sub(self.last_seen_ms) <= self.grace_ms
    }

    /// Fast path: only the foreground window is known.
    pub fn on_probe(&mut self, foreground: Option<&ForegroundInfo>, now_ms: i64) -> Ownership {
        if !self.auto_pause {
            return self.ownership;
        }
        let pid = self.foreground_target_pid(foreground);
        self.evaluate(pid, now_ms)
    }

    /// Slow path: a complete enumeration replaces the snapshot.
    pub fn on_scan(&mut self, windows: &[WindowInfo], foreground: Option<&ForegroundInfo>, now_ms: i64) -> Ownership {
        self.snapshot = self.matcher.build_snapshot(windows, foreground);
        self.master_pid = self
            .snapshot
            .master
            .and_then(|handle| windows.iter().find(|w| w.handle == handle))
            .map_or(0, |w| w.pid);

        if !self.auto_pause {
            let pid = if self.snapshot.foreground_pid != 0 {
                self.snapshot.foreground_pid
            } else {
                self.master_pid
            };
            self.ownership = Ownership {
                foreground_is_target: self.snapshot.foreground_is_target,
                effective: self.snapshot.process_count > 0,
                pid,
            };
            return self.ownership;
        }

        self.evaluate(self.snapshot.foreground_pid, now_ms)
    }

    /// Re-evaluates the grace window without new observations, e.g. after a
    /// failed scan. The previous snapshot stays in place.
    pub fn refresh(&mut self, now_ms: i64) -> Ownership {
        if !self.auto_pause {
            return self.ownership;
        }
        let pid = if self.ownership.foreground_is_target {
            self.last_pid
        } else {
            0
        };
        self.evaluate(pid, now_ms)
    }

    fn foreground_target_pid(&self, foreground: Option<&ForegroundInfo>) -> u32 {
        foreground
            .filter(|fg| fg.pid != 0 && self.matcher.is_target_process(&fg.process_name))
            .map_or(0, |fg| fg.pid)
    }

    fn evaluate(&mut self, foreground_pid: u32, now_ms: i64) -> Ownership {
        if foreground_pid != 0 {
            self.last_pid = foreground_pid;
            self.last_seen_ms = now_ms;
        }

        let grace = self.grace_active(now_ms);
        let pid = if foreground_pid != 0 {
            foreground_pid
        } else if grace {
            self.last_pid
        } else {
            0
        };
        self.ownership = Ownership {
            foreground_is_target: foreground_pid != 0,
            effective: foreground_pid != 0 || grace,
            pid,
        };
        self.ownership
    }
}

#[cfg(test)]
mod tests {
    use keysync_core::WindowHandle;

    use super::*;

    const GRACE_MS: u64 = 800;

    fn tracker(auto_pause: bool) -> ForegroundTracker {
        ForegroundTracker::new(TargetMatcher::new("dnf.exe", "DNF Taiwan"), GRACE_MS, auto_pause)
    }

    fn window(handle: isize, pid: u32, process: &str) -> WindowInfo {
        let title = if process == "dnf.exe" { "DNF Taiwan" } else { "Untitled" };
        WindowInfo {
            handle: WindowHandle(handle),
            pid,
            process_name: process.to_string(),
            title: title.to_string(),
            class_name: "DNF".to_string(),
            visible: true,
        }
    }

    fn focus(handle: isize, pid: u32, process: &str) -> ForegroundInfo {
        ForegroundInfo {
            handle: WindowHandle(handle),
            pid,
            process_name: process.to_string(),
        }
    }

    #[test]
    fn test_starts_without_ownership() {
        let tracker = tracker(true);

        assert!(tracker.auto_paused());
        assert_eq!(tracker.ownership(), Ownership::default());
    }

    #[test]
    fn test_probe_sighting_makes_owner_effective() {
        // Arrange
        let mut tracker = tracker(true);

        // Act
        let ownership = tracker.on_probe(Some(&focus(1, 42, "DNF.exe")), 1_000);

        // Assert
        assert!(ownership.foreground_is_target);
        assert!(ownership.effective);
        assert_eq!(ownership.pid, 42);
        assert!(!tracker.auto_paused());
    }

    #[test]
    fn test_grace_window_keeps_ownership_until_it_expires() {
        // Arrange
        let mut tracker = tracker(true);
        tracker.on_probe(Some(&focus(1, 42, "dnf.exe")), 1_000);
        let explorer = focus(9, 7, "explorer.exe");

        // Act
        let inside = tracker.on_probe(Some(&explorer), 1_000 + 800);
        let outside = tracker.on_probe(Some(&explorer), 1_000 + 801);

        // Assert
        assert!(!inside.foreground_is_target);
        assert!(inside.effective, "800 ms after the sighting is still inside the window");
        assert_eq!(inside.pid, 42);
        assert!(!outside.effective);
        assert_eq!(outside.pid, 0);
        assert!(tracker.auto_paused());
    }

    #[test]
    fn test_flapping_focus_never_drops_ownership() {
        let mut tracker = tracker(true);
        let game = focus(1, 42, "dnf.exe");
        let tooltip = focus(5, 9, "tooltip.exe");

        for step in 0..20i64 {
            let fg = if step % 2 == 0 { &game } else { &tooltip };
            let ownership = tracker.on_probe(Some(fg), step * 300);
            assert!(ownership.effective, "lost ownership at step {step}");
        }
    }

    #[test]
    fn test_scan_builds_snapshot_and_evaluates_ownership() {
        // Arrange
        let mut tracker = tracker(true);
        let windows = vec![window(1, 10, "dnf.exe"), window(2, 20, "dnf.exe"), window(3, 30, "notepad.exe")];

        // Act
        let ownership = tracker.on_scan(&windows, Some(&focus(2, 20, "dnf.exe")), 5_000);

        // Assert
        assert_eq!(ownership.pid, 20);
        assert!(ownership.effective);
        assert_eq!(tracker.snapshot().master, Some(WindowHandle(2)));
        assert_eq!(tracker.snapshot().slaves, vec![WindowHandle(1)]);
        assert_eq!(tracker.snapshot().process_count, 2);
    }

    #[test]
    fn test_refresh_expires_grace_without_new_observations() {
        let mut tracker = tracker(true);
        tracker.on_probe(Some(&focus(1, 42, "dnf.exe")), 0);
        tracker.on_probe(None, 100);

        let still = tracker.refresh(700);
        let expired = tracker.refresh(900);

        assert!(still.effective);
        assert!(!expired.effective);
    }

    #[test]
    fn test_refresh_keeps_a_target_foreground_effective() {
        let mut tracker = tracker(true);
        tracker.on_probe(Some(&focus(1, 42, "dnf.exe")), 0);

        let ownership = tracker.refresh(10_000);

        assert!(ownership.effective);
        assert_eq!(ownership.pid, 42);
    }

    #[test]
    fn test_disabled_auto_pause_follows_running_processes() {
        // Arrange
        let mut tracker = tracker(false);
        let windows = vec![window(1, 10, "dnf.exe")];

        // Act
        let probed = tracker.on_probe(Some(&focus(1, 10, "dnf.exe")), 0);
        let scanned = tracker.on_scan(&windows, Some(&focus(9, 7, "explorer.exe")), 0);
        let gone = tracker.on_scan(&[], None, 60_000);

        // Assert
        assert!(!probed.effective, "the probe does not drive ownership");
        assert!(scanned.effective);
        assert!(!scanned.foreground_is_target);
        assert_eq!(scanned.pid, 0, "no master without a target foreground");
        assert!(!gone.effective);
        assert!(!tracker.auto_paused());
    }
}
