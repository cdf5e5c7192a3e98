//! Key filtering profiles.
//!
//! A [`FilterProfile`] decides, for each of the 256 virtual-key codes, whether
//! the code is exposed to followers and whether it is remapped onto another
//! code. Profiles are immutable once built; the engine replaces the active
//! profile wholesale by swapping an `Arc<FilterProfile>`.
//!
//! # Modes (for beginners)
//!
//! | Mode        | Output mask                                  |
//! |-------------|----------------------------------------------|
//! | `All`       | every key code                               |
//! | `Whitelist` | only the codes listed in the key set         |
//! | `Blacklist` | every code except the listed ones            |
//! | `Mapping`   | only mapping targets, driven by their source |
//!
//! `Replace` is an extra behavior layered on top of `All`, `Whitelist` and
//! `Blacklist`: a mapped source key is hidden from the output and its
//! activity is redirected onto the target key's slot instead.

pub mod document;

use crate::keymap::KEY_COUNT;

pub use document::{build_profile, ProfileDocument, ProfileError};

/// Lower bound for the repeat interval of auto-toggling keys.
pub const MIN_REPEAT_INTERVAL_MS: u32 = 40;
/// Upper bound for the repeat interval of auto-toggling keys.
pub const MAX_REPEAT_INTERVAL_MS: u32 = 5000;
/// Repeat interval used when a profile does not configure one.
pub const DEFAULT_REPEAT_INTERVAL_MS: u32 = 100;
/// Shortest half-period of the synthetic down/up cycle.
pub const MIN_REPEAT_HALF_PERIOD_MS: u32 = 20;

/// Block-mask bit: the consumer must force-release this key code.
pub const BLOCK_FORCE_RELEASE: u8 = 0x01;
/// Block-mask bit: this key code is a remap target driven through the event ring.
pub const BLOCK_EVENT_DRIVEN: u8 = 0x02;

/// Output-state bit set for a key that is held down.
pub const KEY_DOWN_BIT: u8 = 0x80;

// ── Mode and behavior ─────────────────────────────────────────────────────────

/// Filtering mode of a profile. The discriminant is the value published in
/// the shared segment's `mode` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ProfileMode {
    #[default]
    All = 0,
    Whitelist = 1,
    Blacklist = 2,
    Mapping = 3,
}

impl ProfileMode {
    /// Parses a mode name case-insensitively.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        [Self::All, Self::Whitelist, Self::Blacklist, Self::Mapping]
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(text))
    }

    /// Canonical name as written in the profile store.
    pub fn name(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Whitelist => "Whitelist",
            Self::Blacklist => "Blacklist",
            Self::Mapping => "Mapping",
        }
    }

    /// Wire value of this mode.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decodes a wire value; unknown values yield `None`.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::All),
            1 => Some(Self::Whitelist),
            2 => Some(Self::Blacklist),
            3 => Some(Self::Mapping),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProfileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How mappings interact with the non-`Mapping` modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MappingBehavior {
    /// Mappings are ignored outside `Mapping` mode.
    #[default]
    None,
    /// Sources are suppressed and their activity is redirected onto targets.
    Replace,
}

impl MappingBehavior {
    /// Parses a behavior name case-insensitively.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("none") {
            Some(Self::None)
        } else if text.eq_ignore_ascii_case("replace") {
            Some(Self::Replace)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Replace => "Replace",
        }
    }
}

/// A single `source → target` remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyMapping {
    pub source: u8,
    pub target: u8,
}

impl KeyMapping {
    pub fn new(source: u8, target: u8) -> Self {
        Self { source, target }
    }
}

// ── Output frame ──────────────────────────────────────────────────────────────

/// The three per-key arrays a profile produces from the raw key state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFrame {
    /// Bit 7 = down, bit 0 = host toggle state. Zero for keys that are up.
    pub key_state: [u8; KEY_COUNT],
    /// Edge counters as seen by followers.
    pub edges: [u32; KEY_COUNT],
    /// `1` for key codes that are part of the output.
    pub mask: [u8; KEY_COUNT],
}

impl OutputFrame {
    /// Returns a frame with every array zeroed.
    pub fn new() -> Self {
        Self {
            key_state: [0; KEY_COUNT],
            edges: [0; KEY_COUNT],
            mask: [0; KEY_COUNT],
        }
    }

    /// Returns `true` when the output shows `vk` as held down.
    pub fn is_down(&self, vk: u8) -> bool {
        self.key_state[vk as usize] & KEY_DOWN_BIT != 0
    }

    fn clear(&mut self) {
        self.key_state = [0; KEY_COUNT];
        self.edges = [0; KEY_COUNT];
        self.mask = [0; KEY_COUNT];
    }
}

impl Default for OutputFrame {
    fn default() -> Self {
        Self::new()
    }
}

// ── FilterProfile ─────────────────────────────────────────────────────────────

/// An immutable, fully resolved key filtering profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterProfile {
    id: String,
    profile_id: u32,
    mode: ProfileMode,
    keys: [bool; KEY_COUNT],
    mappings: Vec<KeyMapping>,
    mapping_behavior: MappingBehavior,
    repeat_keys: [bool; KEY_COUNT],
    repeat_interval_ms: u32,
}

impl FilterProfile {
    /// Builds a profile. A blank `id` becomes `"default"`.
    pub fn new(
        id: &str,
        mode: ProfileMode,
        keys: impl IntoIterator<Item = u8>,
        mappings: Vec<KeyMapping>,
        mapping_behavior: MappingBehavior,
    ) -> Self {
        let id = match id.trim() {
            "" => "default".to_string(),
            trimmed => trimmed.to_string(),
        };
        let mut key_set = [false; KEY_COUNT];
        for vk in keys {
            key_set[vk as usize] = true;
        }

        Self {
            profile_id: profile_hash(&id),
            id,
            mode,
            keys: key_set,
            mappings,
            mapping_behavior,
            repeat_keys: [false; KEY_COUNT],
            repeat_interval_ms: DEFAULT_REPEAT_INTERVAL_MS,
        }
    }

    /// Marks `keys` as auto-toggling while held. The interval is clamped to
    /// `[MIN_REPEAT_INTERVAL_MS, MAX_REPEAT_INTERVAL_MS]`.
    pub fn with_repeat(mut self, keys: impl IntoIterator<Item = u8>, interval_ms: u32) -> Self {
        for vk in keys {
            self.repeat_keys[vk as usize] = true;
        }
        self.repeat_interval_ms = interval_ms.clamp(MIN_REPEAT_INTERVAL_MS, MAX_REPEAT_INTERVAL_MS);
        self
    }

    /// The built-in `all_except_f12` profile used when no store exists.
    pub fn default_profile() -> Self {
        // Blacklist F12 and remap Q D F G C onto [ L ; ' ]
        Self::new(
            "all_except_f12",
            ProfileMode::Blacklist,
            [0x7B],
            vec![
                KeyMapping::new(0x51, 0xDB),
                KeyMapping::new(0x44, 0x4C),
                KeyMapping::new(0x46, 0xBA),
                KeyMapping::new(0x47, 0xDE),
                KeyMapping::new(0x43, 0xDD),
            ],
            MappingBehavior::Replace,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 32-bit FNV-1a hash of the profile id, published as its identity.
    pub fn profile_id(&self) -> u32 {
        self.profile_id
    }

    pub fn mode(&self) -> ProfileMode {
        self.mode
    }

    pub fn mapping_behavior(&self) -> MappingBehavior {
        self.mapping_behavior
    }

    pub fn mappings(&self) -> &[KeyMapping] {
        &self.mappings
    }

    pub fn contains_key(&self, vk: u8) -> bool {
        self.keys[vk as usize]
    }

    pub fn is_repeat_key(&self, vk: u8) -> bool {
        self.repeat_keys[vk as usize]
    }

    pub fn has_repeat_keys(&self) -> bool {
        self.repeat_keys.iter().any(|&r| r)
    }

    pub fn repeat_interval_ms(&self) -> u32 {
        self.repeat_interval_ms
    }

    /// Duration of one synthetic down or up phase for repeat keys.
    pub fn repeat_half_period_ms(&self) -> u32 {
        (self.repeat_interval_ms / 2).max(MIN_REPEAT_HALF_PERIOD_MS)
    }

    /// `true` when Replace behavior is active with at least one mapping.
    pub fn uses_replace(&self) -> bool {
        self.mapping_behavior == MappingBehavior::Replace && !self.mappings.is_empty()
    }

    /// The mode published downstream. Replace profiles report `Mapping` so
    /// that consumers also follow the event ring.
    pub fn reported_mode(&self) -> ProfileMode {
        if self.uses_replace() {
            ProfileMode::Mapping
        } else {
            self.mode
        }
    }

    /// Base output mask of the profile's mode, before Replace adjustments.
    pub fn build_mask(&self) -> [u8; KEY_COUNT] {
        let mut mask = [0u8; KEY_COUNT];
        match self.mode {
            ProfileMode::All => mask = [1; KEY_COUNT],
            ProfileMode::Whitelist => {
                for (slot, &listed) in mask.iter_mut().zip(self.keys.iter()) {
                    *slot = listed as u8;
                }
            }
            ProfileMode::Blacklist => {
                for (slot, &listed) in mask.iter_mut().zip(self.keys.iter()) {
                    *slot = (!listed) as u8;
                }
            }
            ProfileMode::Mapping => {
                for mapping in &self.mappings {
                    mask[mapping.target as usize] = 1;
                }
            }
        }
        mask
    }

    /// `1` for every mapping target.
    pub fn mapping_target_mask(&self) -> [u8; KEY_COUNT] {
        let mut mask = [0u8; KEY_COUNT];
        for mapping in &self.mappings {
            mask[mapping.target as usize] = 1;
        }
        mask
    }

    /// `1` for every mapping source.
    pub fn mapping_source_mask(&self) -> [u8; KEY_COUNT] {
        let mut mask = [0u8; KEY_COUNT];
        for mapping in &self.mappings {
            mask[mapping.source as usize] = 1;
        }
        mask
    }

    /// Block mask as published: Blacklist keys carry [`BLOCK_FORCE_RELEASE`];
    /// when the reported mode is `Mapping`, targets carry
    /// [`BLOCK_EVENT_DRIVEN`] and sources carry [`BLOCK_FORCE_RELEASE`].
    pub fn block_mask(&self) -> [u8; KEY_COUNT] {
        let mut block = [0u8; KEY_COUNT];
        if self.mode == ProfileMode::Blacklist {
            for (slot, &listed) in block.iter_mut().zip(self.keys.iter()) {
                if listed {
                    *slot = BLOCK_FORCE_RELEASE;
                }
            }
        }

        if self.reported_mode() == ProfileMode::Mapping {
            for mapping in &self.mappings {
                block[mapping.target as usize] |= BLOCK_EVENT_DRIVEN;
                block[mapping.source as usize] |= BLOCK_FORCE_RELEASE;
            }
        }
        block
    }

    /// Key codes whose physical state is reconciled against the OS: the
    /// output mask, plus mapping sources in `Mapping` mode or with Replace.
    pub fn input_mask(&self) -> [u8; KEY_COUNT] {
        let mut mask = self.build_mask();
        if self.mode == ProfileMode::Mapping || self.mapping_behavior == MappingBehavior::Replace {
            for mapping in &self.mappings {
                mask[mapping.source as usize] = 1;
            }
        }
        mask
    }

    /// Produces the output arrays from the raw down state, edge counters and
    /// host toggle bits.
    pub fn apply(
        &self,
        down: &[bool; KEY_COUNT],
        edges: &[u32; KEY_COUNT],
        toggles: &[u8; KEY_COUNT],
        out: &mut OutputFrame,
    ) {
        out.clear();
        out.mask = self.build_mask();

        if self.mode == ProfileMode::Mapping {
            for mapping in &self.mappings {
                let (source, target) = (mapping.source as usize, mapping.target as usize);
                if down[source] {
                    out.key_state[target] = down_byte(toggles[target]);
                }
                out.edges[target] = edges[source];
            }
            return;
        }

        let replace = self.uses_replace();
        let mut suppressed = [false; KEY_COUNT];
        let mut mapped_down = [false; KEY_COUNT];
        let mut mapped_edge = [0u32; KEY_COUNT];

        if replace {
            for mapping in &self.mappings {
                let (source, target) = (mapping.source as usize, mapping.target as usize);
                // Only sources the mode exposes take part in the remap.
                if out.mask[source] == 0 {
                    continue;
                }

                out.mask[target] = 1;
                suppressed[source] = true;
                mapped_down[target] |= down[source];
                mapped_edge[target] = mapped_edge[target].max(edges[source]);
            }
        }

        for vk in 0..KEY_COUNT {
            if out.mask[vk] == 0 {
                continue;
            }
            if suppressed[vk] {
                out.edges[vk] = 0;
                continue;
            }

            if down[vk] || mapped_down[vk] {
                out.key_state[vk] = down_byte(toggles[vk]);
            }
            out.edges[vk] = edges[vk].max(mapped_edge[vk]);
        }
    }
}

impl Default for FilterProfile {
    fn default() -> Self {
        Self::default_profile()
    }
}

fn down_byte(toggle: u8) -> u8 {
    KEY_DOWN_BIT | (toggle & 0x01)
}

/// 32-bit FNV-1a over the UTF-16 code units of `id`.
pub fn profile_hash(id: &str) -> u32 {
    const OFFSET: u32 = 2_166_136_261;
    const PRIME: u32 = 16_777_619;

    id.encode_utf16().fold(OFFSET, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(PRIME)
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const VK_Q: u8 = 0x51;
    const VK_W: u8 = 0x57;
    const VK_F12: u8 = 0x7B;
    const VK_OEM4: u8 = 0xDB;

    fn raw_state() -> ([bool; KEY_COUNT], [u32; KEY_COUNT], [u8; KEY_COUNT]) {
        ([false; KEY_COUNT], [0; KEY_COUNT], [0; KEY_COUNT])
    }

    // ── Masks ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_blacklist_f12_excludes_only_f12_and_flags_it_in_block_mask() {
        // Arrange
        let profile = FilterProfile::new(
            "no_f12",
            ProfileMode::Blacklist,
            [VK_F12],
            Vec::new(),
            MappingBehavior::None,
        );

        // Act
        let mask = profile.build_mask();
        let block = profile.block_mask();

        // Assert
        assert_eq!(mask[VK_F12 as usize], 0);
        assert_eq!(mask.iter().filter(|&&m| m == 1).count(), 255);
        assert_eq!(block[VK_F12 as usize] & BLOCK_FORCE_RELEASE, BLOCK_FORCE_RELEASE);
        assert_eq!(block.iter().filter(|&&b| b != 0).count(), 1);
    }

    #[test]
    fn test_whitelist_mask_contains_only_listed_keys() {
        let profile = FilterProfile::new(
            "wl",
            ProfileMode::Whitelist,
            [VK_Q, VK_W],
            Vec::new(),
            MappingBehavior::None,
        );

        let mask = profile.build_mask();

        assert_eq!(mask.iter().filter(|&&m| m == 1).count(), 2);
        assert_eq!(mask[VK_Q as usize], 1);
        assert_eq!(mask[VK_W as usize], 1);
        assert!(profile.block_mask().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_mapping_mode_exposes_targets_only() {
        let profile = FilterProfile::new(
            "map",
            ProfileMode::Mapping,
            [],
            vec![KeyMapping::new(VK_Q, VK_OEM4)],
            MappingBehavior::None,
        );

        let mask = profile.build_mask();

        assert_eq!(mask.iter().filter(|&&m| m == 1).count(), 1);
        assert_eq!(mask[VK_OEM4 as usize], 1);
        assert_eq!(profile.reported_mode(), ProfileMode::Mapping);
        let block = profile.block_mask();
        assert_eq!(block[VK_OEM4 as usize], BLOCK_EVENT_DRIVEN);
        assert_eq!(block[VK_Q as usize], BLOCK_FORCE_RELEASE);
    }

    #[test]
    fn test_input_mask_adds_mapping_sources_in_mapping_mode() {
        let profile = FilterProfile::new(
            "map",
            ProfileMode::Mapping,
            [],
            vec![KeyMapping::new(VK_Q, VK_OEM4)],
            MappingBehavior::None,
        );

        let input = profile.input_mask();

        assert_eq!(input[VK_Q as usize], 1);
        assert_eq!(input[VK_OEM4 as usize], 1);
        assert_eq!(input.iter().filter(|&&m| m == 1).count(), 2);
    }

    // ── Apply ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_all_mode_passes_state_and_edges_through() {
        // Arrange
        let profile = FilterProfile::new("all", ProfileMode::All, [], Vec::new(), MappingBehavior::None);
        let (mut down, mut edges, mut toggles) = raw_state();
        down[VK_W as usize] = true;
        edges[VK_W as usize] = 3;
        toggles[VK_W as usize] = 0x01;
        let mut out = OutputFrame::new();

        // Act
        profile.apply(&down, &edges, &toggles, &mut out);

        // Assert
        assert_eq!(out.key_state[VK_W as usize], 0x81);
        assert_eq!(out.edges[VK_W as usize], 3);
        assert!(out.mask.iter().all(|&m| m == 1));
    }

    #[test]
    fn test_replace_q_to_oem4_redirects_and_suppresses_source() {
        // Arrange
        let profile = FilterProfile::new(
            "replace",
            ProfileMode::All,
            [],
            vec![KeyMapping::new(VK_Q, VK_OEM4)],
            MappingBehavior::Replace,
        );
        let (mut down, mut edges, toggles) = raw_state();
        down[VK_Q as usize] = true;
        edges[VK_Q as usize] = 1;
        let mut out = OutputFrame::new();

        // Act
        profile.apply(&down, &edges, &toggles, &mut out);

        // Assert
        assert!(out.is_down(VK_OEM4));
        assert_eq!(out.edges[VK_OEM4 as usize], 1);
        assert!(!out.is_down(VK_Q), "source must never appear down with its target");
        assert_eq!(out.edges[VK_Q as usize], 0);
        assert_eq!(profile.block_mask()[VK_Q as usize] & BLOCK_FORCE_RELEASE, BLOCK_FORCE_RELEASE);
        assert_eq!(profile.reported_mode(), ProfileMode::Mapping);
    }

    #[test]
    fn test_replace_target_edge_takes_maximum_of_source_and_target() {
        let profile = FilterProfile::new(
            "replace",
            ProfileMode::All,
            [],
            vec![KeyMapping::new(VK_Q, VK_OEM4)],
            MappingBehavior::Replace,
        );
        let (down, mut edges, toggles) = raw_state();
        edges[VK_Q as usize] = 2;
        edges[VK_OEM4 as usize] = 5;
        let mut out = OutputFrame::new();

        profile.apply(&down, &edges, &toggles, &mut out);

        assert_eq!(out.edges[VK_OEM4 as usize], 5);
    }

    #[test]
    fn test_replace_skips_sources_outside_whitelist() {
        // Arrange: Q is not whitelisted, so its mapping is inert.
        let profile = FilterProfile::new(
            "wl_replace",
            ProfileMode::Whitelist,
            [VK_W],
            vec![KeyMapping::new(VK_Q, VK_OEM4)],
            MappingBehavior::Replace,
        );
        let (mut down, edges, toggles) = raw_state();
        down[VK_Q as usize] = true;
        let mut out = OutputFrame::new();

        // Act
        profile.apply(&down, &edges, &toggles, &mut out);

        // Assert
        assert_eq!(out.mask[VK_OEM4 as usize], 0);
        assert!(!out.is_down(VK_OEM4));
        assert!(!out.is_down(VK_Q));
    }

    #[test]
    fn test_mapping_mode_copies_source_edge_onto_target() {
        let profile = FilterProfile::new(
            "map",
            ProfileMode::Mapping,
            [],
            vec![KeyMapping::new(VK_Q, VK_OEM4)],
            MappingBehavior::None,
        );
        let (mut down, mut edges, toggles) = raw_state();
        down[VK_Q as usize] = true;
        edges[VK_Q as usize] = 7;
        down[VK_W as usize] = true;
        let mut out = OutputFrame::new();

        profile.apply(&down, &edges, &toggles, &mut out);

        assert!(out.is_down(VK_OEM4));
        assert_eq!(out.edges[VK_OEM4 as usize], 7);
        assert!(!out.is_down(VK_W), "unmapped keys are not exposed");
        assert!(!out.is_down(VK_Q));
    }

    // ── Identity and defaults ────────────────────────────────────────────────

    #[test]
    fn test_profile_hash_matches_fnv1a_reference_values() {
        // FNV-1a 32-bit of the empty string is the offset basis.
        assert_eq!(profile_hash(""), 2_166_136_261);
        assert_eq!(profile_hash("a"), 0xE40C_292C);
    }

    #[test]
    fn test_blank_id_becomes_default() {
        let profile = FilterProfile::new("  ", ProfileMode::All, [], Vec::new(), MappingBehavior::None);
        assert_eq!(profile.id(), "default");
        assert_eq!(profile.profile_id(), profile_hash("default"));
    }

    #[test]
    fn test_default_profile_is_blacklist_f12_with_replace_mappings() {
        let profile = FilterProfile::default_profile();

        assert_eq!(profile.id(), "all_except_f12");
        assert_eq!(profile.mode(), ProfileMode::Blacklist);
        assert!(profile.contains_key(VK_F12));
        assert_eq!(profile.mappings().len(), 5);
        assert!(profile.uses_replace());
    }

    #[test]
    fn test_repeat_interval_is_clamped_and_half_period_has_floor() {
        let fast = FilterProfile::new("r", ProfileMode::All, [], Vec::new(), MappingBehavior::None)
            .with_repeat([VK_W], 1);
        let slow = FilterProfile::new("r", ProfileMode::All, [], Vec::new(), MappingBehavior::None)
            .with_repeat([VK_W], 60_000);

        assert_eq!(fast.repeat_interval_ms(), MIN_REPEAT_INTERVAL_MS);
        assert_eq!(fast.repeat_half_period_ms(), MIN_REPEAT_HALF_PERIOD_MS);
        assert_eq!(slow.repeat_interval_ms(), MAX_REPEAT_INTERVAL_MS);
        assert_eq!(slow.repeat_half_period_ms(), 2500);
        assert!(fast.is_repeat_key(VK_W));
    }

    #[test]
    fn test_mode_parse_is_case_insensitive_and_round_trips_wire_value() {
        assert_eq!(ProfileMode::parse("blacklist"), Some(ProfileMode::Blacklist));
        assert_eq!(ProfileMode::parse("bogus"), None);
        assert_eq!(ProfileMode::from_u32(ProfileMode::Mapping.as_u32()), Some(ProfileMode::Mapping));
        assert_eq!(MappingBehavior::parse("REPLACE"), Some(MappingBehavior::Replace));
    }
}
