//! Scriptable window enumerator for tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use keysync_core::domain::window::ForegroundInfo;
use keysync_core::{WindowHandle, WindowInfo};

use super::{EnumError, WindowEnumerator};

#[derive(Debug, Default)]
struct Desktop {
    windows: Vec<WindowInfo>,
    foreground: Option<ForegroundInfo>,
    failure: Option<EnumError>,
    scan_delay: Option<Duration>,
    scan_panics: bool,
    scans: u32,
    probe_delay: Option<Duration>,
    probes: u32,
}

/// A [`WindowEnumerator`] over a scripted desktop. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockWindows {
    inner: Arc<Mutex<Desktop>>,
}

impl MockWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a visible window owned by `pid`.
    pub fn add_window(&self, handle: isize, pid: u32, process_name: &str, title: &str) {
        self.lock().windows.push(WindowInfo {
            handle: WindowHandle(handle),
            pid,
            process_name: process_name.to_string(),
            title: title.to_string(),
            class_name: String::new(),
            visible: true,
        });
    }

    /// Moves focus to the window `handle` of `pid`; `pid == 0` means no
    /// foreground window.
    pub fn focus(&self, handle: isize, pid: u32, process_name: &str) {
        self.lock().foreground = (pid != 0).then(|| ForegroundInfo {
            handle: WindowHandle(handle),
            pid,
            process_name: process_name.to_string(),
        });
    }

    /// Makes every following scan fail with `error`, or succeed again with `None`.
    pub fn fail_scans(&self, error: Option<EnumError>) {
        self.lock().failure = error;
    }

    /// Makes every following scan block for `delay`.
    pub fn slow_scans(&self, delay: Option<Duration>) {
        self.lock().scan_delay = delay;
    }

    /// Makes every following scan panic on its worker thread.
    pub fn panic_scans(&self, panics: bool) {
        self.lock().scan_panics = panics;
    }

    /// Makes every following foreground query block for `delay`.
    pub fn slow_probes(&self, delay: Option<Duration>) {
        self.lock().probe_delay = delay;
    }

    /// Number of `foreground` calls so far, scans included.
    pub fn probe_count(&self) -> u32 {
        self.lock().probes
    }

    /// Number of `enumerate` calls so far.
    pub fn scan_count(&self) -> u32 {
        self.lock().scans
    }

    fn lock(&self) -> MutexGuard<'_, Desktop> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WindowEnumerator for MockWindows {
    fn enumerate(&self) -> Result<Vec<WindowInfo>, EnumError> {
        let (delay, panics) = {
            let mut desktop = self.lock();
            desktop.scans += 1;
            (desktop.scan_delay, desktop.scan_panics)
        };
        if panics {
            panic!("scripted window enumeration panic");
        }
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let desktop = self.lock();
        match &desktop.failure {
            Some(error) => Err(error.clone()),
            None => Ok(desktop.windows.clone()),
        }
    }

    fn foreground(&self) -> Option<ForegroundInfo> {
        let delay = {
            let mut desktop = self.lock();
            desktop.probes += 1;
            desktop.probe_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.lock().foreground.clone()
    }
}
