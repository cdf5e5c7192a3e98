//! Domain types that hold no OS resources.
//!
//! - [`key_state`] – raw key state, edge counters and repeat emulation.
//! - [`hotkey`] – the pause-toggle hotkey definition.
//! - [`window`] – target-window classification and the window snapshot.

pub mod hotkey;
pub mod key_state;
pub mod window;
