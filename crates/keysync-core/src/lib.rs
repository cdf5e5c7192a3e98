//! # keysync-core
//!
//! Shared library for KeySync containing the key filtering engine, the raw
//! key state model, window classification, and the shared-memory protocol.
//!
//! This crate has zero dependencies on OS APIs. Everything that touches the
//! operating system (the keyboard hook, window enumeration, the named file
//! mapping) lives in `keysync-master` and talks to this crate through plain
//! data and the [`protocol::SegmentMemory`] trait.
//!
//! # Architecture overview
//!
//! KeySync lets one operator drive several instances of the same application
//! from a single keyboard. The focused instance is the *master*; the other
//! instances are *followers* that mirror the master's keyboard state through
//! an injected consumer reading a shared-memory segment.
//!
//! - **`keymap`** – Windows virtual-key names and codes used by the profile
//!   store and the hotkey file.
//! - **`profile`** – The immutable [`FilterProfile`] that decides which key
//!   codes are exposed and how they are remapped, plus the JSON profile
//!   document it is built from.
//! - **`domain`** – The [`KeyStateModel`] (down state, edge counters, repeat
//!   emulation), the pause [`HotkeyDefinition`], and window classification.
//! - **`protocol`** – The fixed binary layout of the shared segment and the
//!   seqlock writer/reader pair that publishes it.

pub mod domain;
pub mod keymap;
pub mod profile;
pub mod protocol;

pub use domain::hotkey::HotkeyDefinition;
pub use domain::key_state::KeyStateModel;
pub use domain::window::{WindowHandle, WindowInfo, WindowSnapshot};
pub use keymap::KEY_COUNT;
pub use profile::{FilterProfile, KeyMapping, MappingBehavior, OutputFrame, ProfileMode};
pub use protocol::layout::{LayoutError, SnapshotFrame};
pub use protocol::seqlock::{StateReader, StateWriter};
