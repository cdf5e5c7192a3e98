//! SyncEngine: the synchronization state machine.
//!
//! The engine owns every piece of mutable state (the raw key model, the
//! active profile, the pause flags, foreground ownership and the shared
//! channel) and is driven exclusively by the control loop, one call at a time.
//!
//! # States
//!
//! ```text
//!            target foreground seen                hotkey
//!  AutoPaused ─────────────────────▶ Active ◀──────────────▶ ManualPaused
//!             ◀─────────────────────
//!             grace window expired
//! ```
//!
//! Entering any paused state zeroes the raw key state and publishes once with
//! [`FLAG_CLEAR`] so consumers release everything they hold. Key-ups are
//! always admitted; key-downs only while active.
//!
//! # Publication order
//!
//! 1. Build the frame: the profile output while active, all-up keys with the
//!    effective edge counters while paused.
//! 2. Append one ring event per output key whose down bit changed since the
//!    last emitted state.
//! 3. Publish the snapshot under the seqlock.
//!
//! When the segment is unavailable the whole publication is skipped, event
//! tracking included, so the first publication after recovery emits the
//! complete difference. A force-clear requested meanwhile is held back and
//! carried by that first publication.

use std::sync::Arc;

use keysync_core::domain::window::ForegroundInfo;
use keysync_core::keymap::{is_alt, is_ctrl, is_shift};
use keysync_core::profile::KEY_DOWN_BIT;
use keysync_core::protocol::{FLAG_CLEAR, FLAG_PAUSED};
use keysync_core::{
    FilterProfile, HotkeyDefinition, KeyStateModel, OutputFrame, SnapshotFrame, WindowInfo, KEY_COUNT,
};
use tracing::{debug, info, trace, warn};

use crate::application::foreground::{ForegroundTracker, Ownership};
use crate::application::status::{EngineStatus, SyncState};
use crate::infrastructure::key_source::KeyEvent;
use crate::infrastructure::os_keyboard::KeyStateProbe;
use crate::infrastructure::shared_memory::channel::SharedStateChannel;
use crate::infrastructure::shared_memory::SegmentProvider;
use crate::infrastructure::windows_enum::EnumError;

/// What happened to a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    /// The model changed and a snapshot was published.
    Applied,
    /// Admitted, but the key was already in that state.
    Unchanged,
    /// A key-down arrived while paused or without an effective owner.
    Blocked,
    /// A press of the hotkey key while its modifiers are held.
    HotkeySuppressed,
    /// The hotkey's rising edge toggled the manual pause.
    PauseToggled,
}

#[derive(Debug, Default, Clone, Copy)]
struct Modifiers {
    alt: bool,
    ctrl: bool,
    shift: bool,
}

impl Modifiers {
    fn track(&mut self, vk: u8, is_down: bool) {
        if is_alt(vk) {
            self.alt = is_down;
        } else if is_ctrl(vk) {
            self.ctrl = is_down;
        } else if is_shift(vk) {
            self.shift = is_down;
        }
    }
}

/// The synchronization engine.
pub struct SyncEngine<K: KeyStateProbe, P: SegmentProvider> {
    keyboard: K,
    channel: SharedStateChannel<P>,
    tracker: ForegroundTracker,
    model: KeyStateModel,
    profile: Arc<FilterProfile>,
    hotkey: HotkeyDefinition,
    manual_paused: bool,
    auto_paused: bool,
    capture_active: bool,
    modifiers: Modifiers,
    hotkey_down: bool,
    scan_failures: u32,
    clear_pending: bool,
    last_event_state: [bool; KEY_COUNT],
    output: OutputFrame,
    frame: Box<SnapshotFrame>,
}

impl<K: KeyStateProbe, P: SegmentProvider> SyncEngine<K, P> {
    /// Creates an engine that is auto-paused until a target foreground is
    /// observed (or, with auto-pause disabled, simply active).
    pub fn new(
        keyboard: K,
        provider: P,
        tracker: ForegroundTracker,
        profile: Arc<FilterProfile>,
        hotkey: HotkeyDefinition,
    ) -> Self {
        let auto_paused = tracker.auto_pause_enabled();
        Self {
            keyboard,
            channel: SharedStateChannel::new(provider),
            tracker,
            model: KeyStateModel::new(),
            profile,
            hotkey,
            manual_paused: false,
            auto_paused,
            capture_active: false,
            modifiers: Modifiers::default(),
            hotkey_down: false,
            scan_failures: 0,
            clear_pending: false,
            last_event_state: [false; KEY_COUNT],
            output: OutputFrame::new(),
            frame: Box::new(SnapshotFrame::zeroed()),
        }
    }

    /// Opens the segment and publishes the initial snapshot.
    pub fn start(&mut self, now_ms: i64) {
        info!(
            profile = self.profile.id(),
            mode = %self.profile.reported_mode(),
            hotkey = %self.hotkey,
            auto_pause = self.tracker.auto_pause_enabled(),
            "sync engine starting"
        );
        self.publish(now_ms, false);
    }

    pub fn state(&self) -> SyncState {
        SyncState::from_flags(self.manual_paused, self.auto_paused)
    }

    pub fn is_paused(&self) -> bool {
        self.manual_paused || self.auto_paused
    }

    pub fn profile(&self) -> &Arc<FilterProfile> {
        &self.profile
    }

    pub fn model(&self) -> &KeyStateModel {
        &self.model
    }

    /// Feeds one hook event through hotkey detection and admission.
    pub fn handle_key(&mut self, event: KeyEvent, now_ms: i64) -> KeyDisposition {
        let vk = event.vk_code;
        self.modifiers.track(vk, event.is_down);

        if vk == self.hotkey.key {
            let modifiers_match = self
                .hotkey
                .matches_modifiers(self.modifiers.alt, self.modifiers.ctrl, self.modifiers.shift);
            if !event.is_down {
                self.hotkey_down = false;
            } else if modifiers_match {
                if self.hotkey_down {
                    return KeyDisposition::HotkeySuppressed;
                }
                self.hotkey_down = true;
                self.toggle_pause(now_ms);
                return KeyDisposition::PauseToggled;
            }
        }

        if event.is_down && !self.admits_key_down() {
            trace!(vk, "key-down blocked");
            return KeyDisposition::Blocked;
        }

        if self.model.set_state(vk, event.is_down) {
            trace!(vk, is_down = event.is_down, injected = event.injected, "key state changed");
            self.publish(now_ms, false);
            KeyDisposition::Applied
        } else {
            KeyDisposition::Unchanged
        }
    }

    /// Flips the manual pause.
    pub fn toggle_pause(&mut self, now_ms: i64) {
        let was_paused = self.is_paused();
        self.manual_paused = !self.manual_paused;
        info!(state = %self.state(), "manual pause toggled");
        self.on_pause_changed(was_paused, now_ms);
    }

    /// Heartbeat tick: retries the segment, advances repeat emulation,
    /// reconciles against the OS key state and republishes.
    pub fn heartbeat(&mut self, now_ms: i64) {
        if !self.is_paused() {
            self.model.advance_repeat(&self.profile, now_ms);
        }
        self.reconcile();
        self.publish(now_ms, false);
    }

    /// Fast foreground probe.
    pub fn probe(&mut self, foreground: Option<&ForegroundInfo>, now_ms: i64) {
        let before = self.tracker.ownership();
        let after = self.tracker.on_probe(foreground, now_ms);
        self.log_ownership_change(before, after);
        self.update_auto_pause(now_ms);
    }

    /// Result of a full window scan. A failed scan keeps the previous snapshot
    /// and only lets the grace window run out.
    pub fn apply_scan(
        &mut self,
        scan: Result<Vec<WindowInfo>, EnumError>,
        foreground: Option<&ForegroundInfo>,
        now_ms: i64,
    ) {
        let before = self.tracker.ownership();
        let after = match scan {
            Ok(windows) => {
                if self.scan_failures > 0 {
                    info!(failures = self.scan_failures, "window scan recovered");
                    self.scan_failures = 0;
                }
                let ownership = self.tracker.on_scan(&windows, foreground, now_ms);
                let snapshot = self.tracker.snapshot();
                debug!(
                    windows = windows.len(),
                    processes = snapshot.process_count,
                    slaves = snapshot.slaves.len(),
                    master = ?snapshot.master,
                    "window scan complete"
                );
                ownership
            }
            Err(e) => {
                if self.scan_failures == 0 {
                    warn!(error = %e, "window scan failed, keeping previous snapshot");
                } else {
                    debug!(error = %e, attempt = self.scan_failures + 1, "window scan still failing");
                }
                self.scan_failures += 1;
                self.tracker.refresh(now_ms)
            }
        };
        self.log_ownership_change(before, after);
        self.update_auto_pause(now_ms);
    }

    /// Swaps in a new profile and tells consumers to drop what they hold.
    pub fn set_profile(&mut self, profile: Arc<FilterProfile>, now_ms: i64) {
        info!(
            from = self.profile.id(),
            to = profile.id(),
            mode = %profile.reported_mode(),
            "profile switched"
        );
        self.profile = profile;
        self.publish(now_ms, true);
    }

    pub fn set_hotkey(&mut self, hotkey: HotkeyDefinition) {
        if hotkey != self.hotkey {
            info!(from = %self.hotkey, to = %hotkey, "pause hotkey changed");
        }
        self.hotkey = hotkey;
        self.hotkey_down = false;
    }

    /// Records whether the global hook is installed. Without it the OS state
    /// may still release keys but never presses them.
    pub fn set_capture_active(&mut self, active: bool) {
        self.capture_active = active;
    }

    /// Releases every key and publishes a paused force-clear frame, so
    /// consumers let go before the heartbeat stops.
    pub fn shutdown(&mut self, now_ms: i64) {
        self.manual_paused = true;
        self.model.clear();
        self.publish(now_ms, true);
        info!("sync engine stopped, all keys released");
    }

    pub fn status(&self) -> EngineStatus {
        let ownership = self.tracker.ownership();
        let snapshot = self.tracker.snapshot();
        EngineStatus {
            state: self.state(),
            foreground_is_target: ownership.foreground_is_target,
            effective_pid: ownership.pid,
            master_found: snapshot.master.is_some(),
            slave_count: snapshot.slaves.len(),
            process_count: snapshot.process_count,
            profile_id: self.profile.id().to_string(),
            reported_mode: self.profile.reported_mode(),
            hotkey: self.hotkey,
            segment_ready: self.channel.is_ready(),
            capture_active: self.capture_active,
            publish_count: self.channel.publish_count(),
        }
    }

    fn admits_key_down(&self) -> bool {
        !self.is_paused() && self.tracker.ownership().effective
    }

    fn hotkey_modifiers_held(&self) -> bool {
        self.hotkey
            .matches_modifiers(self.modifiers.alt, self.modifiers.ctrl, self.modifiers.shift)
    }

    fn update_auto_pause(&mut self, now_ms: i64) {
        let auto_paused = self.tracker.auto_paused();
        if auto_paused == self.auto_paused {
            return;
        }
        let was_paused = self.is_paused();
        self.auto_paused = auto_paused;
        info!(state = %self.state(), pid = self.tracker.ownership().pid, "auto-pause changed");
        self.on_pause_changed(was_paused, now_ms);
    }

    fn on_pause_changed(&mut self, was_paused: bool, now_ms: i64) {
        match (was_paused, self.is_paused()) {
            (false, true) => {
                self.model.clear();
                self.publish(now_ms, true);
            }
            (true, false) => self.publish(now_ms, false),
            _ => {}
        }
    }

    /// Repairs the model from the OS view over the profile's input keys.
    fn reconcile(&mut self) {
        let mask = self.profile.input_mask();
        let may_press = self.capture_active && self.admits_key_down();
        let hotkey_guarded = self.hotkey_modifiers_held();

        for vk in 0..=u8::MAX {
            if mask[usize::from(vk)] == 0 {
                continue;
            }
            let os_down = self.keyboard.is_down(vk);
            let model_down = self.model.is_down(vk);
            if model_down && !os_down {
                debug!(vk, "reconcile: forcing release");
                self.model.set_state(vk, false);
            } else if !model_down && os_down && may_press && !(hotkey_guarded && vk == self.hotkey.key) {
                debug!(vk, "reconcile: forcing press");
                self.model.set_state(vk, true);
            }
        }
    }

    fn publish(&mut self, now_ms: i64, force_clear: bool) {
        let force_clear = force_clear || self.clear_pending;
        if !self.channel.ensure_open(now_ms) {
            self.clear_pending = force_clear;
            return;
        }
        self.clear_pending = false;

        let paused = self.is_paused();
        let frame = &mut *self.frame;
        if paused {
            frame.key_state = [0; KEY_COUNT];
            frame.edges = self.model.effective_edges();
            frame.target_mask = self.profile.build_mask();
        } else {
            let toggles = self.keyboard.toggles();
            self.model.apply_profile(&self.profile, &toggles, &mut self.output);
            frame.key_state = self.output.key_state;
            frame.edges = self.output.edges;
            frame.target_mask = self.output.mask;
        }
        frame.block_mask = self.profile.block_mask();

        let mut flags = 0;
        if paused {
            flags |= FLAG_PAUSED;
        }
        if force_clear {
            flags |= FLAG_CLEAR;
        }
        frame.flags = flags;
        frame.active_pid = active_pid(self.tracker.ownership());
        frame.profile_id = self.profile.profile_id();
        frame.profile_mode = self.profile.reported_mode().as_u32();
        frame.last_tick_ms = u64::try_from(now_ms).unwrap_or(0);

        let timestamp = frame.last_tick_ms;
        for (vk, byte) in frame.key_state.iter().enumerate() {
            let down = byte & KEY_DOWN_BIT != 0;
            if down != self.last_event_state[vk] {
                self.last_event_state[vk] = down;
                // `vk` indexes a KEY_COUNT array.
                self.channel.push_event(vk as u8, down, timestamp);
            }
        }

        self.channel.publish(&self.frame);
    }

    fn log_ownership_change(&self, before: Ownership, after: Ownership) {
        if before.effective != after.effective || before.pid != after.pid {
            debug!(
                effective = after.effective,
                pid = after.pid,
                foreground_is_target = after.foreground_is_target,
                "foreground ownership changed"
            );
        }
    }
}

fn active_pid(ownership: Ownership) -> u32 {
    if ownership.effective {
        ownership.pid
    } else {
        0
    }
}
