//! File-system storage for the master process.
//!
//! - [`config`] – the TOML application configuration.
//! - [`profile_store`] – the JSON key filtering profile store, hot-reloaded.
//! - [`hotkey_store`] – the INI pause-hotkey file, hot-reloaded.
//!
//! Both hot-reloaded stores are polled by modification time from the engine's
//! slow scan tick; neither runs its own watcher thread.

pub mod config;
pub mod hotkey_store;
pub mod profile_store;

use std::path::Path;
use std::time::SystemTime;

/// Modification time of `path`, or `None` if it cannot be read.
pub(crate) fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
