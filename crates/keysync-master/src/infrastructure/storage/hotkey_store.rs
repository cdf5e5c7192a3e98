//! The INI-style pause-hotkey file.
//!
//! ```ini
//! [hotkey]
//! ; Toggle sync (examples: Alt+. / Ctrl+F10)
//! toggle_sync=Alt+.
//! ```
//!
//! Only the `toggle_sync` entry is read; section headers, blank lines and
//! `;`/`#` comments are ignored. An absent, empty, or unparsable value falls
//! back to the default `Alt+.` with a warning.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use keysync_core::HotkeyDefinition;
use tracing::{info, warn};

use super::modified_time;

/// Content written when the hotkey file does not exist.
pub const DEFAULT_HOTKEY_FILE: &str = "[hotkey]\r\n; Toggle sync (examples: Alt+. / Ctrl+F10)\r\ntoggle_sync=Alt+.\r\n";

const TOGGLE_KEY: &str = "toggle_sync";

/// Hot-reloadable hotkey file.
#[derive(Debug)]
pub struct HotkeyStore {
    path: PathBuf,
    loaded_at: Option<SystemTime>,
    current: HotkeyDefinition,
}

impl HotkeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded_at: None,
            current: HotkeyDefinition::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> HotkeyDefinition {
        self.current
    }

    /// Writes [`DEFAULT_HOTKEY_FILE`] if the file is missing. Failure is
    /// logged; the default hotkey stays in effect either way.
    pub fn ensure_exists(&self) {
        if self.path.exists() {
            return;
        }
        let result = self
            .path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::write(&self.path, DEFAULT_HOTKEY_FILE));
        match result {
            Ok(()) => info!(path = %self.path.display(), "created default hotkey file"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not create hotkey file"),
        }
    }

    /// Re-reads the file if its modification time changed. Returns the new
    /// hotkey when it differs from the current one.
    pub fn reload_if_changed(&mut self) -> Option<HotkeyDefinition> {
        let stamp = modified_time(&self.path);
        if stamp == self.loaded_at {
            return None;
        }
        self.loaded_at = stamp;

        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read hotkey file");
                return None;
            }
        };

        let parsed = resolve_hotkey(text.as_deref());
        if parsed == self.current {
            return None;
        }
        self.current = parsed;
        info!(hotkey = %parsed, "pause hotkey updated");
        Some(parsed)
    }
}

/// Extracts the `toggle_sync` value from INI text.
pub fn read_toggle_value(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(';') && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(TOGGLE_KEY))
        .map(|(_, value)| value.trim())
}

/// Parses the hotkey from file text, falling back to the default.
pub fn resolve_hotkey(text: Option<&str>) -> HotkeyDefinition {
    let Some(raw) = text.and_then(read_toggle_value) else {
        warn!("no toggle_sync entry, using default hotkey {}", HotkeyDefinition::default());
        return HotkeyDefinition::default();
    };

    HotkeyDefinition::parse(raw).unwrap_or_else(|e| {
        warn!(value = raw, error = %e, "invalid hotkey, using default {}", HotkeyDefinition::default());
        HotkeyDefinition::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VK_F10: u8 = 0x79;

    #[test]
    fn test_read_toggle_value_skips_comments_and_sections() {
        let text = "[hotkey]\n; toggle_sync=Ctrl+A\n# note\n  Toggle_Sync = Ctrl+F10  \n";
        assert_eq!(read_toggle_value(text), Some("Ctrl+F10"));
    }

    #[test]
    fn test_default_file_content_resolves_to_default_hotkey() {
        assert_eq!(resolve_hotkey(Some(DEFAULT_HOTKEY_FILE)), HotkeyDefinition::default());
    }

    #[test]
    fn test_invalid_or_missing_value_falls_back_to_default() {
        assert_eq!(resolve_hotkey(None), HotkeyDefinition::default());
        assert_eq!(resolve_hotkey(Some("toggle_sync=")), HotkeyDefinition::default());
        assert_eq!(resolve_hotkey(Some("toggle_sync=Alt+Banana")), HotkeyDefinition::default());
        assert_eq!(resolve_hotkey(Some("toggle_sync=Ctrl+Shift")), HotkeyDefinition::default());
    }

    #[test]
    fn test_reload_picks_up_written_hotkey() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sync_hotkey.ini");
        std::fs::write(&path, "[hotkey]\ntoggle_sync=Ctrl+F10\n").expect("write");
        let mut store = HotkeyStore::new(&path);

        // Act
        let first = store.reload_if_changed();
        let second = store.reload_if_changed();

        // Assert
        assert_eq!(first, Some(HotkeyDefinition::new(VK_F10, false, true, false)));
        assert_eq!(second, None);
        assert_eq!(store.current().key, VK_F10);
    }

    #[test]
    fn test_ensure_exists_writes_default_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config").join("sync_hotkey.ini");
        let mut store = HotkeyStore::new(&path);

        store.ensure_exists();
        let change = store.reload_if_changed();

        assert!(path.exists());
        assert_eq!(change, None, "default content matches the initial hotkey");
        assert_eq!(store.current(), HotkeyDefinition::default());
    }
}
