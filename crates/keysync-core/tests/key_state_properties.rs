//! Property tests for the raw key state model and the profile pipeline.
//!
//! Uses `proptest` to drive arbitrary transition sequences through
//! [`KeyStateModel`] and check the counting and filtering rules hold for
//! every input, not only the hand-picked cases in the unit tests.

use keysync_core::profile::{BLOCK_EVENT_DRIVEN, BLOCK_FORCE_RELEASE, KEY_DOWN_BIT};
use keysync_core::{FilterProfile, KeyMapping, KeyStateModel, MappingBehavior, OutputFrame, ProfileMode, KEY_COUNT};
use proptest::prelude::*;

fn transitions() -> impl Strategy<Value = Vec<(u8, bool)>> {
    prop::collection::vec((any::<u8>(), any::<bool>()), 0..400)
}

proptest! {
    #[test]
    fn prop_edge_counter_equals_number_of_rising_edges(events in transitions()) {
        // Arrange
        let mut model = KeyStateModel::new();
        let mut shadow = [false; KEY_COUNT];
        let mut rising = [0u32; KEY_COUNT];

        // Act
        for &(vk, is_down) in &events {
            let slot = vk as usize;
            let changed = model.set_state(vk, is_down);
            prop_assert_eq!(changed, shadow[slot] != is_down);
            if is_down && !shadow[slot] {
                rising[slot] += 1;
            }
            shadow[slot] = is_down;
        }

        // Assert
        for vk in 0..=255u8 {
            prop_assert_eq!(model.edge_count(vk), rising[vk as usize]);
            prop_assert_eq!(model.is_down(vk), shadow[vk as usize]);
        }
    }

    #[test]
    fn prop_clear_keeps_edge_counters(events in transitions()) {
        let mut model = KeyStateModel::new();
        for &(vk, is_down) in &events {
            model.set_state(vk, is_down);
        }
        let before = model.effective_edges();

        model.clear();

        prop_assert!(!model.any_down());
        prop_assert_eq!(model.effective_edges(), before);
    }

    #[test]
    fn prop_whitelist_output_never_leaks_unlisted_keys(
        events in transitions(),
        listed in prop::collection::btree_set(any::<u8>(), 0..20),
    ) {
        // Arrange
        let profile = FilterProfile::new("wl", ProfileMode::Whitelist, listed.iter().copied(), Vec::new(), MappingBehavior::None);
        let mut model = KeyStateModel::new();
        for &(vk, is_down) in &events {
            model.set_state(vk, is_down);
        }
        let mut out = OutputFrame::new();

        // Act
        model.apply_profile(&profile, &[0; KEY_COUNT], &mut out);

        // Assert
        for vk in 0..=255u8 {
            let slot = vk as usize;
            if listed.contains(&vk) {
                prop_assert_eq!(out.mask[slot], 1);
                prop_assert_eq!(out.is_down(vk), model.is_down(vk));
                prop_assert_eq!(out.edges[slot], model.edge_count(vk));
            } else {
                prop_assert_eq!(out.mask[slot], 0);
                prop_assert_eq!(out.key_state[slot], 0);
                prop_assert_eq!(out.edges[slot], 0);
            }
        }
    }

    #[test]
    fn prop_replace_suppresses_every_exposed_source(
        events in transitions(),
        pairs in prop::collection::vec((any::<u8>(), any::<u8>()), 1..8),
    ) {
        // Arrange
        let mappings: Vec<KeyMapping> = pairs
            .iter()
            .filter(|(source, target)| source != target)
            .map(|&(source, target)| KeyMapping::new(source, target))
            .collect();
        prop_assume!(!mappings.is_empty());
        let targets: Vec<u8> = mappings.iter().map(|m| m.target).collect();
        let sources: Vec<u8> = mappings.iter().map(|m| m.source).collect();
        let profile = FilterProfile::new("rp", ProfileMode::All, [], mappings.clone(), MappingBehavior::Replace);
        let mut model = KeyStateModel::new();
        for &(vk, is_down) in &events {
            model.set_state(vk, is_down);
        }
        let mut out = OutputFrame::new();

        // Act
        model.apply_profile(&profile, &[0; KEY_COUNT], &mut out);

        // Assert
        for mapping in &mappings {
            if !targets.contains(&mapping.source) {
                prop_assert_eq!(out.key_state[mapping.source as usize], 0);
                prop_assert_eq!(out.edges[mapping.source as usize], 0);
            }
            prop_assert_eq!(out.mask[mapping.target as usize], 1);
            if model.is_down(mapping.source) && !sources.contains(&mapping.target) {
                prop_assert_eq!(out.key_state[mapping.target as usize] & KEY_DOWN_BIT, KEY_DOWN_BIT);
            }
        }
        let block = profile.block_mask();
        for mapping in &mappings {
            prop_assert!(block[mapping.target as usize] & BLOCK_EVENT_DRIVEN != 0);
            prop_assert!(block[mapping.source as usize] & BLOCK_FORCE_RELEASE != 0);
        }
    }

    #[test]
    fn prop_repeat_edges_only_grow_while_held(steps in 1usize..200, interval in 40u32..400) {
        // Arrange
        let vk = 0x58;
        let profile = FilterProfile::new("rep", ProfileMode::All, [], Vec::new(), MappingBehavior::None)
            .with_repeat([vk], interval);
        let mut model = KeyStateModel::new();
        model.set_state(vk, true);
        let mut last = model.effective_edges()[vk as usize];

        // Act / Assert
        for step in 0..steps {
            model.advance_repeat(&profile, (step as i64) * 10);
            let now = model.effective_edges()[vk as usize];
            prop_assert!(now >= last, "edge counter went backwards");
            last = now;
        }

        model.set_state(vk, false);
        model.advance_repeat(&profile, (steps as i64) * 10);
        prop_assert!(!model.effective_down()[vk as usize]);
        prop_assert_eq!(model.effective_edges()[vk as usize], last);
    }
}
