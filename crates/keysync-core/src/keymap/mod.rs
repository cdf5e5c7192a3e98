//! Windows virtual-key (VK) codes and their textual names.
//!
//! The profile store and the hotkey file refer to keys by name (`"F12"`,
//! `"Oem4"`, `"OemSemicolon"`); the hook and the shared segment use the raw
//! 8-bit VK code. This module converts between the two.

pub mod vk;

pub use vk::{key_name, parse_key_name};

/// Number of addressable virtual-key codes. Every per-key array in the
/// system (state, edges, masks) has exactly this many entries.
pub const KEY_COUNT: usize = 256;

/// `VK_SHIFT`
pub const VK_SHIFT: u8 = 0x10;
/// `VK_CONTROL`
pub const VK_CONTROL: u8 = 0x11;
/// `VK_MENU` (Alt)
pub const VK_MENU: u8 = 0x12;
/// `VK_LSHIFT`
pub const VK_LSHIFT: u8 = 0xA0;
/// `VK_RSHIFT`
pub const VK_RSHIFT: u8 = 0xA1;
/// `VK_LCONTROL`
pub const VK_LCONTROL: u8 = 0xA2;
/// `VK_RCONTROL`
pub const VK_RCONTROL: u8 = 0xA3;
/// `VK_LMENU`
pub const VK_LMENU: u8 = 0xA4;
/// `VK_RMENU`
pub const VK_RMENU: u8 = 0xA5;

/// Returns `true` for the generic and side-specific Alt key codes.
pub fn is_alt(vk: u8) -> bool {
    matches!(vk, VK_MENU | VK_LMENU | VK_RMENU)
}

/// Returns `true` for the generic and side-specific Ctrl key codes.
pub fn is_ctrl(vk: u8) -> bool {
    matches!(vk, VK_CONTROL | VK_LCONTROL | VK_RCONTROL)
}

/// Returns `true` for the generic and side-specific Shift key codes.
pub fn is_shift(vk: u8) -> bool {
    matches!(vk, VK_SHIFT | VK_LSHIFT | VK_RSHIFT)
}
