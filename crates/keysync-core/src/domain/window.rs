//! Target-application window classification.
//!
//! The OS layer enumerates top-level windows into plain [`WindowInfo`]
//! records; [`TargetMatcher::build_snapshot`] turns them into a
//! [`WindowSnapshot`] naming the master window (the focused instance) and one
//! slave window per other instance. Snapshots are rebuilt from scratch on
//! every scan and never patched.
//!
//! # Scoring
//!
//! A target process may own several top-level windows (launcher, chat
//! overlay, the game surface). The best one per process wins:
//!
//! | Condition                                  | Score |
//! |--------------------------------------------|-------|
//! | window is visible                          | +10   |
//! | title contains the keyword                 | +20   |
//! | class name does not contain `CHAT`         | +5    |
//! | class name contains the target process name | +2    |
//!
//! Ties keep the first window in enumeration order.

use std::collections::HashSet;

/// Opaque native window handle. Zero is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    pub const NULL: Self = Self(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// A top-level window as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub pid: u32,
    /// Executable name of the owning process, e.g. `game.exe`. Empty if unknown.
    pub process_name: String,
    pub title: String,
    pub class_name: String,
    pub visible: bool,
}

/// The current foreground window's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundInfo {
    pub handle: WindowHandle,
    pub pid: u32,
    pub process_name: String,
}

/// Result of one full window scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowSnapshot {
    /// Best window of the focused target process, if the foreground is one.
    pub master: Option<WindowHandle>,
    /// Best window of every other target process.
    pub slaves: Vec<WindowHandle>,
    /// Pid of the foreground process when it is a target, else `0`.
    pub foreground_pid: u32,
    pub foreground_is_target: bool,
    /// Number of distinct target processes.
    pub process_count: usize,
}

impl WindowSnapshot {
    /// A snapshot with no windows, used before the first scan and after a
    /// failed one.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Decides which windows belong to the target application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMatcher {
    process_name: String,
    title_keyword: String,
}

impl TargetMatcher {
    pub fn new(process_name: &str, title_keyword: &str) -> Self {
        Self {
            process_name: normalize_process_name(process_name),
            title_keyword: title_keyword.trim().to_string(),
        }
    }

    /// `true` if `name` is the target executable, ignoring case and `.exe`.
    pub fn is_target_process(&self, name: &str) -> bool {
        !self.process_name.is_empty() && normalize_process_name(name).eq_ignore_ascii_case(&self.process_name)
    }

    /// `true` if `title` contains the configured keyword, ignoring case.
    pub fn title_matches(&self, title: &str) -> bool {
        !self.title_keyword.is_empty() && contains_ignore_case(title, &self.title_keyword)
    }

    /// A window belongs to the target if its process or its title matches.
    pub fn is_target_window(&self, window: &WindowInfo) -> bool {
        self.is_target_process(&window.process_name) || self.title_matches(&window.title)
    }

    /// Heuristic score used to pick one window per process.
    pub fn score(&self, window: &WindowInfo) -> i32 {
        let mut score = 0;
        if window.visible {
            score += 10;
        }
        if self.title_matches(&window.title) {
            score += 20;
        }
        if !contains_ignore_case(&window.class_name, "CHAT") {
            score += 5;
        }
        if !self.process_name.is_empty() && contains_ignore_case(&window.class_name, &self.process_name) {
            score += 2;
        }
        score
    }

    /// Builds the authoritative snapshot from an enumeration pass.
    pub fn build_snapshot(&self, windows: &[WindowInfo], foreground: Option<&ForegroundInfo>) -> WindowSnapshot {
        let targets: Vec<&WindowInfo> = windows.iter().filter(|w| self.is_target_window(w)).collect();

        let foreground_pid = foreground
            .filter(|fg| fg.pid != 0 && self.is_target_process(&fg.process_name))
            .map(|fg| fg.pid)
            .unwrap_or(0);
        let foreground_is_target = foreground_pid != 0;

        let master = if foreground_is_target {
            self.best_window(&targets, foreground_pid)
        } else {
            None
        };

        let mut seen = HashSet::new();
        let mut slaves = Vec::new();
        for window in &targets {
            if window.pid == 0 || window.pid == foreground_pid || !seen.insert(window.pid) {
                continue;
            }
            if let Some(best) = self.best_window(&targets, window.pid) {
                if Some(best) != master {
                    slaves.push(best);
                }
            }
        }

        WindowSnapshot {
            master,
            slaves,
            foreground_pid,
            foreground_is_target,
            process_count: seen.len() + usize::from(foreground_is_target),
        }
    }

    fn best_window(&self, targets: &[&WindowInfo], pid: u32) -> Option<WindowHandle> {
        let mut best: Option<(i32, WindowHandle)> = None;
        for window in targets.iter().filter(|w| w.pid == pid) {
            let score = self.score(window);
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, window.handle));
            }
        }
        best.map(|(_, handle)| handle)
    }
}

/// Trims whitespace and a trailing `.exe`.
pub fn normalize_process_name(name: &str) -> String {
    let name = name.trim();
    let name = match name.len().checked_sub(4) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".exe") => &name[..cut],
        _ => name,
    };
    name.to_string()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(handle: isize, pid: u32, process: &str, title: &str, class: &str, visible: bool) -> WindowInfo {
        WindowInfo {
            handle: WindowHandle(handle),
            pid,
            process_name: process.to_string(),
            title: title.to_string(),
            class_name: class.to_string(),
            visible,
        }
    }

    fn foreground(pid: u32, process: &str) -> ForegroundInfo {
        ForegroundInfo {
            handle: WindowHandle(1),
            pid,
            process_name: process.to_string(),
        }
    }

    #[test]
    fn test_normalize_strips_exe_suffix_case_insensitively() {
        assert_eq!(normalize_process_name(" Game.EXE "), "Game");
        assert_eq!(normalize_process_name("game"), "game");
        assert_eq!(normalize_process_name(".exe"), "");
    }

    #[test]
    fn test_score_prefers_visible_titled_non_chat_window() {
        // Arrange
        let matcher = TargetMatcher::new("game.exe", "Game Client");
        let main = window(10, 7, "game.exe", "Game Client", "GameWindowClass", true);
        let chat = window(11, 7, "game.exe", "", "ChatOverlay", true);

        // Act / Assert
        assert_eq!(matcher.score(&main), 10 + 20 + 5 + 2);
        assert_eq!(matcher.score(&chat), 10);
    }

    #[test]
    fn test_snapshot_picks_master_from_foreground_and_slaves_from_others() {
        // Arrange
        let matcher = TargetMatcher::new("game", "Game Client");
        let windows = vec![
            window(10, 100, "game.exe", "", "ChatOverlay", true),
            window(11, 100, "game.exe", "Game Client", "GameWnd", true),
            window(20, 200, "game.exe", "Game Client", "GameWnd", true),
            window(30, 300, "GAME.EXE", "", "GameWnd", false),
            window(40, 400, "notepad.exe", "Untitled", "Notepad", true),
        ];

        // Act
        let snapshot = matcher.build_snapshot(&windows, Some(&foreground(100, "game.exe")));

        // Assert
        assert_eq!(snapshot.master, Some(WindowHandle(11)));
        assert_eq!(snapshot.slaves, vec![WindowHandle(20), WindowHandle(30)]);
        assert!(snapshot.foreground_is_target);
        assert_eq!(snapshot.foreground_pid, 100);
        assert_eq!(snapshot.process_count, 3);
    }

    #[test]
    fn test_snapshot_without_target_foreground_has_no_master() {
        let matcher = TargetMatcher::new("game", "");
        let windows = vec![
            window(20, 200, "game.exe", "", "GameWnd", true),
            window(30, 300, "game.exe", "", "GameWnd", true),
        ];

        let snapshot = matcher.build_snapshot(&windows, Some(&foreground(999, "explorer.exe")));

        assert_eq!(snapshot.master, None);
        assert!(!snapshot.foreground_is_target);
        assert_eq!(snapshot.foreground_pid, 0);
        assert_eq!(snapshot.slaves.len(), 2);
        assert_eq!(snapshot.process_count, 2);
    }

    #[test]
    fn test_title_keyword_classifies_foreign_process_windows() {
        let matcher = TargetMatcher::new("game", "Game Client");
        let windows = vec![window(50, 500, "launcher.exe", "Game Client Launcher", "Wnd", true)];

        let snapshot = matcher.build_snapshot(&windows, None);

        assert_eq!(snapshot.slaves, vec![WindowHandle(50)]);
    }

    #[test]
    fn test_empty_snapshot_has_no_windows() {
        let snapshot = WindowSnapshot::empty();

        assert!(snapshot.master.is_none());
        assert!(snapshot.slaves.is_empty());
        assert_eq!(snapshot.process_count, 0);
    }
}
