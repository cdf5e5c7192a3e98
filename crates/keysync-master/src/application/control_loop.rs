//! The engine's control loop.
//!
//! One Tokio task owns the [`SyncEngine`] and is the only code that mutates
//! it. Everything else posts to the task:
//!
//! | Source               | Channel / timer                 | Engine call        |
//! |----------------------|---------------------------------|--------------------|
//! | Keyboard hook thread | unbounded `mpsc` of [`KeyEvent`] | `handle_key`       |
//! | Heartbeat (~50 ms)   | `tokio::time::interval`         | `heartbeat`        |
//! | Probe (~200 ms)      | `interval` + `spawn_blocking`   | `probe`            |
//! | Scan (~1 s)          | `interval` + `spawn_blocking`   | `apply_scan`       |
//! | [`EngineHandle`]     | bounded `mpsc` of commands      | `toggle_pause`, …  |
//!
//! Both window queries call into other processes, so each runs on a blocking
//! worker under a timeout and is awaited as its own `select!` branch. A hung
//! query never delays key events; the worker is detached and no new query of
//! the same kind starts until it returns or panics.
//! Status is broadcast through a `watch` channel after every step.

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keysync_core::domain::window::ForegroundInfo;
use keysync_core::WindowInfo;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::error::Elapsed;
use tokio::time::{interval, timeout, MissedTickBehavior, Timeout};
use tracing::{debug, error, info, warn};

use crate::application::status::EngineStatus;
use crate::application::sync_engine::SyncEngine;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::key_source::{KeyEvent, KeyEventSource};
use crate::infrastructure::os_keyboard::KeyStateProbe;
use crate::infrastructure::shared_memory::SegmentProvider;
use crate::infrastructure::storage::config::TimingConfig;
use crate::infrastructure::storage::hotkey_store::HotkeyStore;
use crate::infrastructure::storage::profile_store::ProfileStore;
use crate::infrastructure::windows_enum::{EnumError, WindowEnumerator};

const COMMAND_CAPACITY: usize = 16;

/// Requests accepted by the running loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    TogglePause,
    /// Re-check the profile and hotkey files without waiting for the scan tick.
    ReloadFiles,
    Shutdown,
}

/// Error type for talking to the control loop.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("the control loop has stopped")]
    Stopped,
}

/// Handle to a spawned control loop.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    /// # Errors
    ///
    /// [`ControlError::Stopped`] once the loop has exited.
    pub async fn send(&self, command: EngineCommand) -> Result<(), ControlError> {
        self.commands.send(command).await.map_err(|_| ControlError::Stopped)
    }

    /// The most recently broadcast status.
    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// A receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }
}

type ScanOutput = (Result<Vec<WindowInfo>, EnumError>, Option<ForegroundInfo>);
type Job<T> = Pin<Box<Timeout<JoinHandle<T>>>>;
type JobResult<T> = Result<Result<T, JoinError>, Elapsed>;

/// Clears a worker's busy flag when the worker finishes, including by panic.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs `work` on a blocking worker bounded by `limit`, unless the previous
/// worker guarded by `busy` is still running.
fn spawn_guarded<T, F>(busy: &Arc<AtomicBool>, limit: Duration, work: F) -> Option<Job<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if busy.swap(true, Ordering::AcqRel) {
        return None;
    }
    let guard = BusyGuard(Arc::clone(busy));
    let job = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        work()
    });
    Some(Box::pin(timeout(limit, job)))
}

/// The engine plus everything that feeds it.
pub struct ControlLoop<K: KeyStateProbe, P: SegmentProvider> {
    engine: SyncEngine<K, P>,
    source: Box<dyn KeyEventSource>,
    windows: Arc<dyn WindowEnumerator>,
    clock: Box<dyn Clock>,
    timing: TimingConfig,
    profiles: Option<ProfileStore>,
    hotkeys: Option<HotkeyStore>,
    scan_busy: Arc<AtomicBool>,
    probe_busy: Arc<AtomicBool>,
}

impl<K, P> ControlLoop<K, P>
where
    K: KeyStateProbe + 'static,
    P: SegmentProvider + 'static,
{
    pub fn new(
        engine: SyncEngine<K, P>,
        source: Box<dyn KeyEventSource>,
        windows: Arc<dyn WindowEnumerator>,
        clock: Box<dyn Clock>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            engine,
            source,
            windows,
            clock,
            timing,
            profiles: None,
            hotkeys: None,
            scan_busy: Arc::new(AtomicBool::new(false)),
            probe_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Polls `store` for profile changes on every scan tick.
    pub fn with_profile_store(mut self, store: ProfileStore) -> Self {
        self.profiles = Some(store);
        self
    }

    /// Polls `store` for hotkey changes on every scan tick.
    pub fn with_hotkey_store(mut self, store: HotkeyStore) -> Self {
        self.hotkeys = Some(store);
        self
    }

    /// Spawns the loop on the current Tokio runtime.
    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (status_tx, status_rx) = watch::channel(self.engine.status());
        let task = tokio::spawn(self.run(command_rx, status_tx));
        let handle = EngineHandle {
            commands: command_tx,
            status: status_rx,
        };
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<EngineCommand>, status: watch::Sender<EngineStatus>) {
        let mut keys = match self.source.start() {
            Ok(rx) => {
                self.engine.set_capture_active(true);
                Some(rx)
            }
            Err(e) => {
                error!(error = %e, "keyboard capture unavailable, publishing without input");
                None
            }
        };
        self.engine.start(self.clock.now_ms());
        self.broadcast(&status);

        let mut heartbeat = interval(self.timing.heartbeat());
        let mut probe = interval(self.timing.probe());
        let mut scan = interval(self.timing.scan());
        for timer in [&mut heartbeat, &mut probe, &mut scan] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }
        let mut pending_scan: Option<Job<ScanOutput>> = None;
        let mut pending_probe: Option<Job<Option<ForegroundInfo>>> = None;

        info!(
            heartbeat_ms = self.timing.heartbeat_ms,
            probe_ms = self.timing.probe_ms,
            scan_ms = self.timing.scan_ms,
            "control loop running"
        );

        loop {
            tokio::select! {
                event = next_key(&mut keys) => match event {
                    Some(event) => {
                        self.engine.handle_key(event, self.clock.now_ms());
                    }
                    None => {
                        warn!("key event channel closed, capture stopped");
                        keys = None;
                        self.engine.set_capture_active(false);
                    }
                },
                command = commands.recv() => match command {
                    Some(EngineCommand::TogglePause) => self.engine.toggle_pause(self.clock.now_ms()),
                    Some(EngineCommand::ReloadFiles) => self.reload_files(),
                    Some(EngineCommand::Shutdown) | None => break,
                },
                _ = heartbeat.tick() => self.engine.heartbeat(self.clock.now_ms()),
                _ = probe.tick() => {
                    if pending_probe.is_none() {
                        pending_probe = self.start_probe();
                    }
                }
                finished = wait_job(&mut pending_probe), if pending_probe.is_some() => {
                    pending_probe = None;
                    self.finish_probe(finished);
                }
                _ = scan.tick() => {
                    self.reload_files();
                    if pending_scan.is_none() {
                        pending_scan = self.start_scan();
                    }
                }
                finished = wait_job(&mut pending_scan), if pending_scan.is_some() => {
                    pending_scan = None;
                    self.finish_scan(finished);
                }
            }
            self.broadcast(&status);
        }

        self.source.stop();
        self.engine.shutdown(self.clock.now_ms());
        self.broadcast(&status);
        info!("control loop stopped");
    }

    fn reload_files(&mut self) {
        if let Some(store) = self.profiles.as_mut() {
            match store.reload_if_changed() {
                Ok(Some(loaded)) => self.engine.set_profile(loaded.profile, self.clock.now_ms()),
                Ok(None) => {}
                Err(e) => warn!(
                    path = %store.path().display(),
                    error = %e,
                    "profile store rejected, keeping current profile"
                ),
            }
        }
        if let Some(store) = self.hotkeys.as_mut() {
            if let Some(hotkey) = store.reload_if_changed() {
                self.engine.set_hotkey(hotkey);
            }
        }
    }

    /// Starts a scan unless one is still running, which happens when an
    /// earlier scan timed out but has not returned yet.
    fn start_scan(&self) -> Option<Job<ScanOutput>> {
        let windows = Arc::clone(&self.windows);
        let job = spawn_guarded(&self.scan_busy, self.timing.scan_timeout(), move || {
            (windows.enumerate(), windows.foreground())
        });
        if job.is_none() {
            debug!("previous window scan still running, skipping");
        }
        job
    }

    fn start_probe(&self) -> Option<Job<Option<ForegroundInfo>>> {
        let windows = Arc::clone(&self.windows);
        let job = spawn_guarded(&self.probe_busy, self.timing.scan_timeout(), move || windows.foreground());
        if job.is_none() {
            debug!("previous foreground probe still running, skipping");
        }
        job
    }

    /// A failed probe leaves ownership to the next probe or scan.
    fn finish_probe(&mut self, finished: JobResult<Option<ForegroundInfo>>) {
        match finished {
            Ok(Ok(foreground)) => self.engine.probe(foreground.as_ref(), self.clock.now_ms()),
            Ok(Err(e)) => warn!(error = %e, "foreground probe worker failed"),
            Err(_) => debug!(after_ms = self.timing.scan_timeout_ms, "foreground probe timed out"),
        }
    }

    fn finish_scan(&mut self, finished: JobResult<ScanOutput>) {
        let (scan, foreground) = match finished {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => (Err(EnumError::Os(format!("scan worker failed: {e}"))), None),
            Err(_) => (
                Err(EnumError::TimedOut {
                    after_ms: self.timing.scan_timeout_ms,
                }),
                None,
            ),
        };
        self.engine.apply_scan(scan, foreground.as_ref(), self.clock.now_ms());
    }

    fn broadcast(&self, status: &watch::Sender<EngineStatus>) {
        let current = self.engine.status();
        status.send_if_modified(|published| {
            if *published == current {
                false
            } else {
                *published = current.clone();
                true
            }
        });
    }
}

async fn next_key(keys: &mut Option<UnboundedReceiver<KeyEvent>>) -> Option<KeyEvent> {
    match keys {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn wait_job<J: Future + Unpin>(job: &mut Option<J>) -> J::Output {
    match job {
        Some(job) => job.await,
        None => pending().await,
    }
}
