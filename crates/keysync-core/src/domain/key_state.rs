//! Raw per-key state: down flags, edge counters, and repeat emulation.
//!
//! The model only ever sees admitted transitions. Admission (pause, focus,
//! hotkey filtering) is the engine's job; this type just records what it is
//! told and counts rising edges.
//!
//! # Repeat emulation
//!
//! Keys the active profile marks as repeat keys do not stay "down" while
//! held. [`KeyStateModel::advance_repeat`] flips a synthetic down/up phase
//! every `profile.repeat_half_period_ms()` and counts each synthetic rising
//! edge in a separate counter. Followers therefore see
//! `edge + repeat_edges` grow periodically while the key is held. Releasing
//! the physical key drops the synthetic state immediately.

use crate::keymap::KEY_COUNT;
use crate::profile::{FilterProfile, OutputFrame};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RepeatSlot {
    active: bool,
    synthetic_down: bool,
    next_toggle_ms: i64,
    edges: u32,
}

impl RepeatSlot {
    fn stop(&mut self) {
        self.active = false;
        self.synthetic_down = false;
        self.next_toggle_ms = 0;
    }
}

/// Raw key state owned by the sync engine.
#[derive(Debug, Clone)]
pub struct KeyStateModel {
    down: [bool; KEY_COUNT],
    edges: [u32; KEY_COUNT],
    repeat: [RepeatSlot; KEY_COUNT],
}

impl KeyStateModel {
    /// Creates a model with every key up and all counters at zero.
    pub fn new() -> Self {
        Self {
            down: [false; KEY_COUNT],
            edges: [0; KEY_COUNT],
            repeat: [RepeatSlot::default(); KEY_COUNT],
        }
    }

    /// Records a transition. Returns `true` if the stored state changed.
    ///
    /// The edge counter of `vk` is incremented (wrapping) on every up→down
    /// change and on nothing else.
    pub fn set_state(&mut self, vk: u8, is_down: bool) -> bool {
        let slot = vk as usize;
        if self.down[slot] == is_down {
            return false;
        }

        self.down[slot] = is_down;
        if is_down {
            self.edges[slot] = self.edges[slot].wrapping_add(1);
        } else {
            self.repeat[slot].stop();
        }
        true
    }

    /// Releases every key, including synthetic repeat state. Edge counters
    /// are kept.
    pub fn clear(&mut self) {
        self.down = [false; KEY_COUNT];
        for slot in self.repeat.iter_mut() {
            slot.stop();
        }
    }

    pub fn is_down(&self, vk: u8) -> bool {
        self.down[vk as usize]
    }

    /// Number of physical rising edges recorded for `vk`.
    pub fn edge_count(&self, vk: u8) -> u32 {
        self.edges[vk as usize]
    }

    /// Returns `true` if any key is held.
    pub fn any_down(&self) -> bool {
        self.down.iter().any(|&d| d)
    }

    /// Advances repeat emulation to `now_ms`. Returns `true` when a synthetic
    /// phase flipped.
    pub fn advance_repeat(&mut self, profile: &FilterProfile, now_ms: i64) -> bool {
        let half_period = i64::from(profile.repeat_half_period_ms());
        let mut changed = false;

        for vk in 0..KEY_COUNT {
            let slot = &mut self.repeat[vk];
            if !self.down[vk] || !profile.is_repeat_key(vk as u8) {
                if slot.active {
                    slot.stop();
                    changed = true;
                }
                continue;
            }

            if !slot.active {
                // The first phase is the physical press itself.
                slot.active = true;
                slot.synthetic_down = true;
                slot.next_toggle_ms = now_ms + half_period;
                continue;
            }

            if now_ms >= slot.next_toggle_ms {
                slot.synthetic_down = !slot.synthetic_down;
                if slot.synthetic_down {
                    slot.edges = slot.edges.wrapping_add(1);
                }
                slot.next_toggle_ms = now_ms + half_period;
                changed = true;
            }
        }
        changed
    }

    /// Down state as followers should see it, with repeat phases applied.
    pub fn effective_down(&self) -> [bool; KEY_COUNT] {
        let mut out = self.down;
        for (vk, slot) in self.repeat.iter().enumerate() {
            if slot.active {
                out[vk] = slot.synthetic_down;
            }
        }
        out
    }

    /// Edge counters as followers should see them: physical plus synthetic.
    pub fn effective_edges(&self) -> [u32; KEY_COUNT] {
        let mut out = self.edges;
        for (edge, slot) in out.iter_mut().zip(self.repeat.iter()) {
            *edge = edge.wrapping_add(slot.edges);
        }
        out
    }

    /// Runs `profile` over the effective state.
    pub fn apply_profile(&self, profile: &FilterProfile, toggles: &[u8; KEY_COUNT], out: &mut OutputFrame) {
        profile.apply(&self.effective_down(), &self.effective_edges(), toggles, out);
    }
}

impl Default for KeyStateModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{MappingBehavior, ProfileMode};

    const VK_X: u8 = 0x58;
    const VK_A: u8 = 0x41;

    fn repeat_profile() -> FilterProfile {
        FilterProfile::new("rep", ProfileMode::All, [], Vec::new(), MappingBehavior::None)
            .with_repeat([VK_X], 100)
    }

    #[test]
    fn test_set_state_counts_only_rising_edges() {
        // Arrange
        let mut model = KeyStateModel::new();

        // Act
        assert!(model.set_state(VK_A, true));
        assert!(!model.set_state(VK_A, true), "repeated down is not a change");
        assert!(model.set_state(VK_A, false));
        assert!(!model.set_state(VK_A, false));
        assert!(model.set_state(VK_A, true));

        // Assert
        assert_eq!(model.edge_count(VK_A), 2);
        assert!(model.is_down(VK_A));
    }

    #[test]
    fn test_edge_counter_wraps_on_overflow() {
        let mut model = KeyStateModel::new();
        model.edges[VK_A as usize] = u32::MAX;

        model.set_state(VK_A, true);

        assert_eq!(model.edge_count(VK_A), 0);
    }

    #[test]
    fn test_clear_releases_keys_but_keeps_edges() {
        let mut model = KeyStateModel::new();
        model.set_state(VK_A, true);

        model.clear();

        assert!(!model.any_down());
        assert_eq!(model.edge_count(VK_A), 1);
    }

    #[test]
    fn test_repeat_key_toggles_at_half_interval() {
        // Arrange
        let profile = repeat_profile();
        let mut model = KeyStateModel::new();
        model.set_state(VK_X, true);

        // Act / Assert: first advance arms the cycle in the down phase.
        assert!(!model.advance_repeat(&profile, 0));
        assert!(model.effective_down()[VK_X as usize]);

        assert!(!model.advance_repeat(&profile, 49));
        assert!(model.advance_repeat(&profile, 50));
        assert!(!model.effective_down()[VK_X as usize]);

        assert!(model.advance_repeat(&profile, 100));
        assert!(model.effective_down()[VK_X as usize]);
        assert_eq!(model.effective_edges()[VK_X as usize], 2, "one physical plus one synthetic edge");
    }

    #[test]
    fn test_releasing_repeat_key_clears_synthetic_state_immediately() {
        let profile = repeat_profile();
        let mut model = KeyStateModel::new();
        model.set_state(VK_X, true);
        model.advance_repeat(&profile, 0);
        model.advance_repeat(&profile, 50);

        model.set_state(VK_X, false);

        assert!(!model.effective_down()[VK_X as usize]);
        assert!(!model.advance_repeat(&profile, 100));
        assert!(!model.effective_down()[VK_X as usize]);
    }

    #[test]
    fn test_non_repeat_keys_stay_down_while_held() {
        let profile = repeat_profile();
        let mut model = KeyStateModel::new();
        model.set_state(VK_A, true);

        for now in (0..1000).step_by(50) {
            model.advance_repeat(&profile, now);
        }

        assert!(model.effective_down()[VK_A as usize]);
        assert_eq!(model.effective_edges()[VK_A as usize], 1);
    }
}
