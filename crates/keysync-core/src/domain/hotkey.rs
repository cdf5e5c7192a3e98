//! Pause-toggle hotkey definition.
//!
//! A hotkey is one main key plus an exact set of required modifiers. The
//! textual form is `Ctrl+Alt+Shift+Key` in any order, e.g. `Alt+.` or
//! `Ctrl+F10`.

use thiserror::Error;

use crate::keymap::{key_name, parse_key_name};

/// `VK_OEM_PERIOD`
const VK_OEM_PERIOD: u8 = 0xBE;

/// Error type for hotkey parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HotkeyError {
    #[error("hotkey text is empty")]
    Empty,
    #[error("unrecognized key '{0}'")]
    UnknownKey(String),
    #[error("no main key given")]
    MissingKey,
}

/// A key plus the exact modifier combination that must be held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotkeyDefinition {
    pub key: u8,
    pub alt: bool,
    pub ctrl: bool,
    pub shift: bool,
}

impl HotkeyDefinition {
    pub fn new(key: u8, alt: bool, ctrl: bool, shift: bool) -> Self {
        Self { key, alt, ctrl, shift }
    }

    /// Parses `"Alt+."`-style text.
    ///
    /// # Errors
    ///
    /// Returns [`HotkeyError`] for empty text, an unknown token, or a
    /// combination without a main key.
    pub fn parse(text: &str) -> Result<Self, HotkeyError> {
        if text.trim().is_empty() {
            return Err(HotkeyError::Empty);
        }

        let mut hotkey = Self::new(0, false, false, false);
        for token in text.split('+').map(str::trim).filter(|t| !t.is_empty()) {
            if token.eq_ignore_ascii_case("alt") {
                hotkey.alt = true;
            } else if token.eq_ignore_ascii_case("ctrl") || token.eq_ignore_ascii_case("control") {
                hotkey.ctrl = true;
            } else if token.eq_ignore_ascii_case("shift") {
                hotkey.shift = true;
            } else {
                hotkey.key = parse_hotkey_key(token).ok_or_else(|| HotkeyError::UnknownKey(token.to_string()))?;
            }
        }

        if hotkey.key == 0 {
            return Err(HotkeyError::MissingKey);
        }
        Ok(hotkey)
    }

    /// `true` when the held modifiers are exactly the required ones.
    pub fn matches_modifiers(&self, alt: bool, ctrl: bool, shift: bool) -> bool {
        self.alt == alt && self.ctrl == ctrl && self.shift == shift
    }
}

impl Default for HotkeyDefinition {
    /// `Alt+.`
    fn default() -> Self {
        Self::new(VK_OEM_PERIOD, true, false, false)
    }
}

impl std::fmt::Display for HotkeyDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        match self.key {
            VK_OEM_PERIOD => f.write_str("."),
            0x0D => f.write_str("Enter"),
            0x1B => f.write_str("Esc"),
            vk => match key_name(vk) {
                Some(name) => f.write_str(name),
                None => write!(f, "0x{vk:02X}"),
            },
        }
    }
}

fn parse_hotkey_key(token: &str) -> Option<u8> {
    if token == "." || token.eq_ignore_ascii_case("period") {
        return Some(VK_OEM_PERIOD);
    }

    let mut chars = token.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        if ch.is_ascii_alphabetic() {
            return Some(ch.to_ascii_uppercase() as u8);
        }
        if ch.is_ascii_digit() {
            // D0..D9 share their codes with ASCII '0'..'9'.
            return Some(ch as u8);
        }
    }

    if token.eq_ignore_ascii_case("esc") {
        return Some(0x1B);
    }

    // F1..F24, space, tab, enter, escape, and every other VK name.
    parse_key_name(token)
}
