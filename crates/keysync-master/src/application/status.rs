//! Observable engine state.

use std::fmt;

use keysync_core::{HotkeyDefinition, ProfileMode};

/// Synchronization state. `ManualPaused` wins when both pauses apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    Active,
    #[default]
    AutoPaused,
    ManualPaused,
}

impl SyncState {
    pub fn from_flags(manual_paused: bool, auto_paused: bool) -> Self {
        if manual_paused {
            Self::ManualPaused
        } else if auto_paused {
            Self::AutoPaused
        } else {
            Self::Active
        }
    }

    pub fn is_paused(self) -> bool {
        self != Self::Active
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::AutoPaused => "auto-paused",
            Self::ManualPaused => "paused",
        })
    }
}

/// Snapshot of the engine for status observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub state: SyncState,
    /// The foreground window belongs to the target application right now.
    pub foreground_is_target: bool,
    /// The owner key-downs are admitted for: the foreground target, or the
    /// last one seen while its grace window lasts. `0` when none.
    pub effective_pid: u32,
    pub master_found: bool,
    pub slave_count: usize,
    pub process_count: usize,
    pub profile_id: String,
    pub reported_mode: ProfileMode,
    pub hotkey: HotkeyDefinition,
    pub segment_ready: bool,
    pub capture_active: bool,
    pub publish_count: u64,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            state: SyncState::AutoPaused,
            foreground_is_target: false,
            effective_pid: 0,
            master_found: false,
            slave_count: 0,
            process_count: 0,
            profile_id: String::new(),
            reported_mode: ProfileMode::All,
            hotkey: HotkeyDefinition::default(),
            segment_ready: false,
            capture_active: false,
            publish_count: 0,
        }
    }
}
