//! Windows Virtual Key (VK) code name table.
//!
//! Names follow the .NET `System.Windows.Forms.Keys` enumeration, which is
//! what users already write in existing profile files (`"D1"`, `"Oem4"`,
//! `"OemSemicolon"`, `"LShiftKey"`). Reference: winuser.h `VK_*` constants.
//!
//! # How this table works
//!
//! `VK_NAME_TABLE` is a compile-time array of 256 canonical names indexed by
//! VK code; unnamed codes hold `""`. `VK_ALIASES` lists alternative spellings
//! (`Enter` for `Return`, `Oem1` for `OemSemicolon`, …) accepted when parsing.

/// Returns the canonical name of `vk`, or `None` if the code is unnamed.
pub fn key_name(vk: u8) -> Option<&'static str> {
    let name = VK_NAME_TABLE[vk as usize];
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Parses a key name into its VK code.
///
/// Accepts canonical names and aliases (case-insensitive), and numeric codes
/// written as `0x41` or `65`. Code `0` (`None`) is never a valid key.
pub fn parse_key_name(text: &str) -> Option<u8> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u8::from_str_radix(hex, 16).ok().filter(|&vk| vk != 0);
    }
    if text.bytes().all(|b| b.is_ascii_digit()) && text.len() > 1 {
        return text.parse::<u8>().ok().filter(|&vk| vk != 0);
    }

    if let Some(vk) = VK_NAME_TABLE
        .iter()
        .position(|name| !name.is_empty() && name.eq_ignore_ascii_case(text))
    {
        return Some(vk as u8);
    }

    VK_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(text))
        .map(|&(_, vk)| vk)
}

/// Alternative spellings accepted by [`parse_key_name`].
const VK_ALIASES: &[(&str, u8)] = &[
    ("Enter", 0x0D),
    ("CapsLock", 0x14),
    ("HanguelMode", 0x15),
    ("HangulMode", 0x15),
    ("KanjiMode", 0x19),
    ("Esc", 0x1B),
    ("PageUp", 0x21),
    ("PageDown", 0x22),
    ("PrintScreen", 0x2C),
    ("Oem1", 0xBA),
    ("Oem2", 0xBF),
    ("Oem3", 0xC0),
    ("Oem4", 0xDB),
    ("Oem5", 0xDC),
    ("Oem6", 0xDD),
    ("Oem7", 0xDE),
    ("Oem102", 0xE2),
    ("ScrollLock", 0x91),
];

/// Canonical VK name table indexed by VK code (0x00–0xFF).
const VK_NAME_TABLE: [&str; 256] = {
    let mut t = [""; 256];

    // ── Mouse buttons and control codes ──────────────────────────────────────
    t[0x01] = "LButton";
    t[0x02] = "RButton";
    t[0x03] = "Cancel";
    t[0x04] = "MButton";
    t[0x05] = "XButton1";
    t[0x06] = "XButton2";
    t[0x08] = "Back";
    t[0x09] = "Tab";
    t[0x0A] = "LineFeed";
    t[0x0C] = "Clear";
    t[0x0D] = "Return";
    t[0x10] = "ShiftKey";
    t[0x11] = "ControlKey";
    t[0x12] = "Menu";
    t[0x13] = "Pause";
    t[0x14] = "Capital";
    t[0x15] = "KanaMode";
    t[0x17] = "JunjaMode";
    t[0x18] = "FinalMode";
    t[0x19] = "HanjaMode";
    t[0x1B] = "Escape";
    t[0x1C] = "IMEConvert";
    t[0x1D] = "IMENonconvert";
    t[0x1E] = "IMEAccept";
    t[0x1F] = "IMEModeChange";
    t[0x20] = "Space";

    // ── Navigation ────────────────────────────────────────────────────────────
    t[0x21] = "Prior";
    t[0x22] = "Next";
    t[0x23] = "End";
    t[0x24] = "Home";
    t[0x25] = "Left";
    t[0x26] = "Up";
    t[0x27] = "Right";
    t[0x28] = "Down";
    t[0x29] = "Select";
    t[0x2A] = "Print";
    t[0x2B] = "Execute";
    t[0x2C] = "Snapshot";
    t[0x2D] = "Insert";
    t[0x2E] = "Delete";
    t[0x2F] = "Help";

    // ── Digit row (D0=0x30 … D9=0x39) ────────────────────────────────────────
    t[0x30] = "D0";
    t[0x31] = "D1";
    t[0x32] = "D2";
    t[0x33] = "D3";
    t[0x34] = "D4";
    t[0x35] = "D5";
    t[0x36] = "D6";
    t[0x37] = "D7";
    t[0x38] = "D8";
    t[0x39] = "D9";

    // ── Letters (A=0x41 … Z=0x5A) ────────────────────────────────────────────
    t[0x41] = "A";
    t[0x42] = "B";
    t[0x43] = "C";
    t[0x44] = "D";
    t[0x45] = "E";
    t[0x46] = "F";
    t[0x47] = "G";
    t[0x48] = "H";
    t[0x49] = "I";
    t[0x4A] = "J";
    t[0x4B] = "K";
    t[0x4C] = "L";
    t[0x4D] = "M";
    t[0x4E] = "N";
    t[0x4F] = "O";
    t[0x50] = "P";
    t[0x51] = "Q";
    t[0x52] = "R";
    t[0x53] = "S";
    t[0x54] = "T";
    t[0x55] = "U";
    t[0x56] = "V";
    t[0x57] = "W";
    t[0x58] = "X";
    t[0x59] = "Y";
    t[0x5A] = "Z";

    t[0x5B] = "LWin";
    t[0x5C] = "RWin";
    t[0x5D] = "Apps";
    t[0x5F] = "Sleep";

    // ── Numpad ────────────────────────────────────────────────────────────────
    t[0x60] = "NumPad0";
    t[0x61] = "NumPad1";
    t[0x62] = "NumPad2";
    t[0x63] = "NumPad3";
    t[0x64] = "NumPad4";
    t[0x65] = "NumPad5";
    t[0x66] = "NumPad6";
    t[0x67] = "NumPad7";
    t[0x68] = "NumPad8";
    t[0x69] = "NumPad9";
    t[0x6A] = "Multiply";
    t[0x6B] = "Add";
    t[0x6C] = "Separator";
    t[0x6D] = "Subtract";
    t[0x6E] = "Decimal";
    t[0x6F] = "Divide";

    // ── Function keys (F1=0x70 … F24=0x87) ───────────────────────────────────
    t[0x70] = "F1";
    t[0x71] = "F2";
    t[0x72] = "F3";
    t[0x73] = "F4";
    t[0x74] = "F5";
    t[0x75] = "F6";
    t[0x76] = "F7";
    t[0x77] = "F8";
    t[0x78] = "F9";
    t[0x79] = "F10";
    t[0x7A] = "F11";
    t[0x7B] = "F12";
    t[0x7C] = "F13";
    t[0x7D] = "F14";
    t[0x7E] = "F15";
    t[0x7F] = "F16";
    t[0x80] = "F17";
    t[0x81] = "F18";
    t[0x82] = "F19";
    t[0x83] = "F20";
    t[0x84] = "F21";
    t[0x85] = "F22";
    t[0x86] = "F23";
    t[0x87] = "F24";

    t[0x90] = "NumLock";
    t[0x91] = "Scroll";

    // ── Side-specific modifiers ──────────────────────────────────────────────
    t[0xA0] = "LShiftKey";
    t[0xA1] = "RShiftKey";
    t[0xA2] = "LControlKey";
    t[0xA3] = "RControlKey";
    t[0xA4] = "LMenu";
    t[0xA5] = "RMenu";

    // ── Browser / media ──────────────────────────────────────────────────────
    t[0xA6] = "BrowserBack";
    t[0xA7] = "BrowserForward";
    t[0xA8] = "BrowserRefresh";
    t[0xA9] = "BrowserStop";
    t[0xAA] = "BrowserSearch";
    t[0xAB] = "BrowserFavorites";
    t[0xAC] = "BrowserHome";
    t[0xAD] = "VolumeMute";
    t[0xAE] = "VolumeDown";
    t[0xAF] = "VolumeUp";
    t[0xB0] = "MediaNextTrack";
    t[0xB1] = "MediaPreviousTrack";
    t[0xB2] = "MediaStop";
    t[0xB3] = "MediaPlayPause";
    t[0xB4] = "LaunchMail";
    t[0xB5] = "SelectMedia";
    t[0xB6] = "LaunchApplication1";
    t[0xB7] = "LaunchApplication2";

    // ── OEM punctuation (US layout labels in comments) ───────────────────────
    t[0xBA] = "OemSemicolon"; // ; :
    t[0xBB] = "Oemplus"; // = +
    t[0xBC] = "Oemcomma"; // , <
    t[0xBD] = "OemMinus"; // - _
    t[0xBE] = "OemPeriod"; // . >
    t[0xBF] = "OemQuestion"; // / ?
    t[0xC0] = "Oemtilde"; // ` ~
    t[0xDB] = "OemOpenBrackets"; // [ {
    t[0xDC] = "OemPipe"; // \ |
    t[0xDD] = "OemCloseBrackets"; // ] }
    t[0xDE] = "OemQuotes"; // ' "
    t[0xDF] = "Oem8";
    t[0xE2] = "OemBackslash";

    t[0xE5] = "ProcessKey";
    t[0xE7] = "Packet";
    t[0xF6] = "Attn";
    t[0xF7] = "Crsel";
    t[0xF8] = "Exsel";
    t[0xF9] = "EraseEof";
    t[0xFA] = "Play";
    t[0xFB] = "Zoom";
    t[0xFC] = "NoName";
    t[0xFD] = "Pa1";
    t[0xFE] = "OemClear";

    t
};
