//! The JSON profile store document and its resolution into a [`FilterProfile`].
//!
//! ```json
//! {
//!   "activeProfile": "all_except_f12",
//!   "profiles": [
//!     {
//!       "id": "all_except_f12",
//!       "mode": "Blacklist",
//!       "keys": ["F12"],
//!       "mappings": { "Q": "Oem4", "D": "L" },
//!       "mappingBehavior": "Replace",
//!       "repeatKeys": ["X"],
//!       "repeatIntervalMs": 100
//!     }
//!   ]
//! }
//! ```
//!
//! Property names are matched case-insensitively. Problems inside a profile
//! definition never fail the load: they become warnings plus a safe fallback.
//! Only a document that is not valid JSON (or not an object) is rejected, so
//! the caller can keep its last-known-good profile.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{
    FilterProfile, KeyMapping, MappingBehavior, ProfileMode, DEFAULT_REPEAT_INTERVAL_MS,
    MAX_REPEAT_INTERVAL_MS, MIN_REPEAT_INTERVAL_MS,
};
use crate::keymap::parse_key_name;

/// Error type for profile document parsing.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The text is not valid JSON.
    #[error("profile store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON root is not an object.
    #[error("profile store root must be a JSON object")]
    NotAnObject,
}

/// Top-level profile store document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProfileDocument {
    #[serde(
        rename(serialize = "activeProfile", deserialize = "activeprofile"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: Vec<ProfileDefinition>,
}

/// A single named profile as written in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProfileDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    /// `source → target` key names, in file order. Later entries win when
    /// two sources drive the same target.
    #[serde(default, with = "ordered_pairs", skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<(String, String)>,
    #[serde(
        rename(serialize = "mappingBehavior", deserialize = "mappingbehavior"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mapping_behavior: Option<String>,
    #[serde(
        rename(serialize = "repeatKeys", deserialize = "repeatkeys"),
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub repeat_keys: Vec<String>,
    #[serde(
        rename(serialize = "repeatIntervalMs", deserialize = "repeatintervalms"),
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub repeat_interval_ms: Option<i64>,
}

impl ProfileDocument {
    /// The document written when no store file exists yet.
    pub fn default_document() -> Self {
        let mappings = [("Q", "Oem4"), ("D", "L"), ("F", "OemSemicolon"), ("G", "Oem7"), ("C", "Oem6")]
            .into_iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect();

        Self {
            active_profile: Some("all_except_f12".to_string()),
            profiles: vec![ProfileDefinition {
                id: "all_except_f12".to_string(),
                mode: Some("Blacklist".to_string()),
                keys: vec!["F12".to_string()],
                mappings,
                mapping_behavior: Some("Replace".to_string()),
                repeat_keys: Vec::new(),
                repeat_interval_ms: None,
            }],
        }
    }

    /// Parses a store document. Malformed profile entries are skipped and
    /// reported in the returned warnings.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when the text is not a JSON object.
    pub fn parse(text: &str) -> Result<(Self, Vec<String>), ProfileError> {
        let root = lowercase_keys(serde_json::from_str::<Value>(text)?);
        let Value::Object(mut root) = root else {
            return Err(ProfileError::NotAnObject);
        };

        let mut warnings = Vec::new();
        let active_profile = match root.remove("activeprofile") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => {
                warnings.push(format!("activeProfile must be a string, got {other}"));
                None
            }
        };

        let entries = match root.remove("profiles") {
            Some(Value::Array(entries)) => entries,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                warnings.push("profiles must be an array".to_string());
                Vec::new()
            }
        };

        let mut profiles = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<ProfileDefinition>(entry) {
                Ok(definition) => profiles.push(definition),
                Err(e) => warnings.push(format!("profile #{index} ignored: {e}")),
            }
        }

        Ok((Self { active_profile, profiles }, warnings))
    }

    /// Serializes the document as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String, ProfileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the active definition: the one whose id matches
    /// `activeProfile` case-insensitively, else the first one.
    pub fn active_definition(&self) -> Option<&ProfileDefinition> {
        let wanted = self.active_profile.as_deref().map(str::trim).filter(|s| !s.is_empty());
        wanted
            .and_then(|wanted| {
                self.profiles
                    .iter()
                    .find(|p| p.id.trim().eq_ignore_ascii_case(wanted))
            })
            .or_else(|| self.profiles.first())
    }
}

/// Resolves the active definition of `document` into a profile.
///
/// Never fails: every problem degrades to a fallback and a warning.
pub fn build_profile(document: &ProfileDocument) -> (FilterProfile, Vec<String>) {
    let mut warnings = Vec::new();

    let Some(definition) = document.active_definition() else {
        warnings.push("no usable profile found, using the built-in default".to_string());
        return (FilterProfile::default_profile(), warnings);
    };

    let mode = match definition.mode.as_deref().map(str::trim) {
        None | Some("") => ProfileMode::All,
        Some(text) => ProfileMode::parse(text).unwrap_or_else(|| {
            warnings.push(format!("unknown mode '{text}', using All"));
            ProfileMode::All
        }),
    };

    let keys = parse_key_list(&definition.keys, "key", &mut warnings);
    let mappings = parse_mappings(&definition.mappings, &mut warnings);

    let mut behavior = match definition.mapping_behavior.as_deref().map(str::trim) {
        None | Some("") => MappingBehavior::None,
        Some(text) => MappingBehavior::parse(text).unwrap_or_else(|| {
            warnings.push(format!("unknown mapping behavior '{text}', using None"));
            MappingBehavior::None
        }),
    };

    if mode == ProfileMode::Mapping && mappings.is_empty() {
        warnings.push("Mapping mode has no valid mappings, nothing will be exposed".to_string());
    }
    if behavior != MappingBehavior::None && mappings.is_empty() {
        warnings.push("mapping behavior set without valid mappings, ignoring it".to_string());
        behavior = MappingBehavior::None;
    }

    let mut profile = FilterProfile::new(&definition.id, mode, keys, mappings, behavior);

    let repeat_keys = parse_key_list(&definition.repeat_keys, "repeat key", &mut warnings);
    let interval = match definition.repeat_interval_ms {
        None => DEFAULT_REPEAT_INTERVAL_MS,
        Some(ms) if ms < i64::from(MIN_REPEAT_INTERVAL_MS) || ms > i64::from(MAX_REPEAT_INTERVAL_MS) => {
            warnings.push(format!(
                "repeatIntervalMs {ms} out of range [{MIN_REPEAT_INTERVAL_MS}, {MAX_REPEAT_INTERVAL_MS}], clamped"
            ));
            ms.clamp(i64::from(MIN_REPEAT_INTERVAL_MS), i64::from(MAX_REPEAT_INTERVAL_MS)) as u32
        }
        Some(ms) => ms as u32,
    };
    profile = profile.with_repeat(repeat_keys, interval);

    (profile, warnings)
}

fn parse_key_list(names: &[String], what: &str, warnings: &mut Vec<String>) -> Vec<u8> {
    names
        .iter()
        .filter_map(|name| {
            let vk = parse_key_name(name);
            if vk.is_none() {
                warnings.push(format!("invalid {what} name '{name}'"));
            }
            vk
        })
        .collect()
}

fn parse_mappings(table: &[(String, String)], warnings: &mut Vec<String>) -> Vec<KeyMapping> {
    let mut mappings = Vec::with_capacity(table.len());
    for (source, target) in table {
        let Some(source_vk) = parse_key_name(source) else {
            warnings.push(format!("invalid mapping source '{source}'"));
            continue;
        };
        let Some(target_vk) = parse_key_name(target) else {
            warnings.push(format!("invalid mapping target '{target}'"));
            continue;
        };
        mappings.push(KeyMapping::new(source_vk, target_vk));
    }
    mappings
}

/// A JSON object of strings kept as pairs in document order.
mod ordered_pairs {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(pairs: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (key, value) in pairs {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(String, String)>, D::Error> {
        deserializer.deserialize_map(PairsVisitor)
    }

    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object mapping key names to key names")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some(pair) = access.next_entry::<String, String>()? {
                pairs.push(pair);
            }
            Ok(pairs)
        }
    }
}

/// Lowercases every object key so that property names match regardless of case.
fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), lowercase_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}
