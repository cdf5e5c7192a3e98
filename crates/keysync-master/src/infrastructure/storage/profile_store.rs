//! The JSON profile store on disk.
//!
//! [`ProfileStore`] owns the path and the modification time of the last
//! successful load. [`ProfileStore::reload_if_changed`] is cheap when the file
//! is untouched, so it can be called on every scan tick.
//!
//! A file that cannot be read or parsed never replaces the current profile:
//! the caller gets the error, logs it, and keeps publishing the last-known-good
//! profile.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use keysync_core::profile::{build_profile, ProfileDocument, ProfileError};
use keysync_core::FilterProfile;
use thiserror::Error;
use tracing::{info, warn};

use super::modified_time;

/// Error type for profile store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// A freshly resolved profile plus the diagnostics produced while resolving it.
#[derive(Debug, Clone)]
pub struct LoadedProfile {
    pub profile: Arc<FilterProfile>,
    pub warnings: Vec<String>,
}

/// Hot-reloadable profile store.
#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
    loaded_at: Option<SystemTime>,
}

impl ProfileStore {
    /// Creates a store for `path`. Nothing is read until the first reload.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded_at: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the default document if no store file exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory or file cannot be created.
    pub fn ensure_exists(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let text = ProfileDocument::default_document().to_json_pretty()?;
        std::fs::write(&self.path, text).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "created default profile store");
        Ok(())
    }

    /// Loads the store unconditionally.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] if the file cannot be read, [`StoreError::Profile`]
    /// if it is not a JSON object.
    pub fn load(&mut self) -> Result<LoadedProfile, StoreError> {
        let stamp = modified_time(&self.path);
        let text = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        // Record the attempt even on parse failure so a broken file is not
        // re-parsed and re-reported every tick.
        self.loaded_at = stamp;
        let (document, mut warnings) = ProfileDocument::parse(&text)?;
        let (profile, build_warnings) = build_profile(&document);
        warnings.extend(build_warnings);

        for warning in &warnings {
            warn!(path = %self.path.display(), "{warning}");
        }
        info!(
            profile = profile.id(),
            mode = %profile.mode(),
            reported_mode = %profile.reported_mode(),
            mappings = profile.mappings().len(),
            "profile loaded"
        );

        Ok(LoadedProfile {
            profile: Arc::new(profile),
            warnings,
        })
    }

    /// Reloads if the file's modification time differs from the last load.
    /// Returns `Ok(None)` when nothing changed.
    ///
    /// # Errors
    ///
    /// As for [`ProfileStore::load`].
    pub fn reload_if_changed(&mut self) -> Result<Option<LoadedProfile>, StoreError> {
        let stamp = modified_time(&self.path);
        if stamp.is_some() && stamp == self.loaded_at {
            return Ok(None);
        }
        if stamp.is_none() && self.loaded_at.is_none() {
            // Missing before and still missing.
            return Ok(None);
        }
        if stamp.is_none() {
            self.loaded_at = None;
            warn!(path = %self.path.display(), "profile store disappeared, keeping current profile");
            return Ok(None);
        }
        self.load().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use keysync_core::{MappingBehavior, ProfileMode};

    use super::*;

    fn write_later(path: &Path, text: &str) {
        // Bump the mtime past the previous write on coarse-grained filesystems.
        let before = modified_time(path);
        std::fs::write(path, text).expect("write");
        let mut attempts = 0;
        while modified_time(path) == before && attempts < 50 {
            std::thread::sleep(Duration::from_millis(20));
            std::fs::write(path, text).expect("write");
            attempts += 1;
        }
    }

    #[test]
    fn test_ensure_exists_writes_default_document() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = ProfileStore::new(dir.path().join("sub").join("profiles.json"));

        // Act
        store.ensure_exists().expect("ensure");
        let loaded = store.load().expect("load");

        // Assert
        assert_eq!(loaded.profile.id(), "all_except_f12");
        assert_eq!(loaded.profile.mode(), ProfileMode::Blacklist);
        assert_eq!(loaded.profile.mapping_behavior(), MappingBehavior::Replace);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_ensure_exists_keeps_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, r#"{"profiles":[{"id":"mine","mode":"All"}]}"#).expect("write");
        let mut store = ProfileStore::new(&path);

        store.ensure_exists().expect("ensure");
        let loaded = store.load().expect("load");

        assert_eq!(loaded.profile.id(), "mine");
    }

    #[test]
    fn test_reload_if_changed_is_noop_for_untouched_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = ProfileStore::new(dir.path().join("profiles.json"));
        store.ensure_exists().expect("ensure");
        store.load().expect("load");

        let again = store.reload_if_changed().expect("reload");

        assert!(again.is_none());
    }

    #[test]
    fn test_reload_if_changed_picks_up_new_profile() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("profiles.json");
        let mut store = ProfileStore::new(&path);
        store.ensure_exists().expect("ensure");
        store.load().expect("load");

        // Act
        write_later(
            &path,
            r#"{"ActiveProfile":"wasd","Profiles":[{"Id":"wasd","Mode":"Whitelist","Keys":["W","A","S","D"]}]}"#,
        );
        let reloaded = store.reload_if_changed().expect("reload").expect("changed");

        // Assert
        assert_eq!(reloaded.profile.id(), "wasd");
        assert_eq!(reloaded.profile.mode(), ProfileMode::Whitelist);
        assert!(reloaded.profile.contains_key(0x57));
    }

    #[test]
    fn test_malformed_store_is_reported_and_not_retried_until_changed() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, "{ not json").expect("write");
        let mut store = ProfileStore::new(&path);

        // Act
        let first = store.load();
        let second = store.reload_if_changed();

        // Assert
        assert!(matches!(first, Err(StoreError::Profile(ProfileError::Json(_)))));
        assert!(matches!(second, Ok(None)));
    }

    #[test]
    fn test_non_object_root_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, "[1, 2, 3]").expect("write");
        let mut store = ProfileStore::new(&path);

        assert!(matches!(store.load(), Err(StoreError::Profile(ProfileError::NotAnObject))));
    }

    #[test]
    fn test_invalid_entries_surface_as_warnings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, r#"{"profiles":[{"id":"x","mode":"Sideways","keys":["NotAKey"]}]}"#).expect("write");
        let mut store = ProfileStore::new(&path);

        let loaded = store.load().expect("load");

        assert_eq!(loaded.profile.mode(), ProfileMode::All);
        assert_eq!(loaded.warnings.len(), 2);
    }
}
