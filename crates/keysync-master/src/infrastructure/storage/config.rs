//! TOML-based configuration for the master process.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\KeySync\config.toml`
//! - Linux:    `~/.config/keysync/config.toml`
//! - macOS:    `~/Library/Application Support/KeySync/config.toml`
//!
//! ```toml
//! [sync]
//! auto_pause = true
//! log_level = "info"
//!
//! [target]
//! process_name = "dnf.exe"
//! title_keyword = "DNF Taiwan"
//!
//! [timing]
//! heartbeat_ms = 50
//! grace_ms = 800
//! ```
//!
//! # Serde default values
//!
//! Every section and field has a default, so a missing file, a missing
//! section, or a config written by an older build all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use keysync_core::protocol::SEGMENT_NAME;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the JSON profile store inside the config directory.
pub const PROFILE_FILE_NAME: &str = "profiles.json";
/// File name of the hotkey file inside the config directory.
pub const HOTKEY_FILE_NAME: &str = "sync_hotkey.ini";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Engine behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Pause automatically while no target window is in the foreground.
    #[serde(default = "default_true")]
    pub auto_pause: bool,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Name of the shared-memory segment.
    #[serde(default = "default_segment_name")]
    pub segment_name: String,
}

/// Which application's windows are synchronized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    /// Executable name, matched case-insensitively with or without `.exe`.
    #[serde(default = "default_process_name")]
    pub process_name: String,
    /// Windows whose title contains this text also count as targets.
    #[serde(default = "default_title_keyword")]
    pub title_keyword: String,
}

/// Periods of the engine's timers, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingConfig {
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_probe_ms")]
    pub probe_ms: u64,
    #[serde(default = "default_scan_ms")]
    pub scan_ms: u64,
    /// How long a target pid stays the foreground owner after it was last seen.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Upper bound on one full window scan.
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
}

/// Optional overrides for the store locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PathsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey_file: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_segment_name() -> String {
    SEGMENT_NAME.to_string()
}
fn default_process_name() -> String {
    "dnf.exe".to_string()
}
fn default_title_keyword() -> String {
    "DNF Taiwan".to_string()
}
fn default_heartbeat_ms() -> u64 {
    50
}
fn default_probe_ms() -> u64 {
    200
}
fn default_scan_ms() -> u64 {
    1000
}
fn default_grace_ms() -> u64 {
    800
}
fn default_scan_timeout_ms() -> u64 {
    2000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_pause: default_true(),
            log_level: default_log_level(),
            segment_name: default_segment_name(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            process_name: default_process_name(),
            title_keyword: default_title_keyword(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: default_heartbeat_ms(),
            probe_ms: default_probe_ms(),
            scan_ms: default_scan_ms(),
            grace_ms: default_grace_ms(),
            scan_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

impl TimingConfig {
    /// Timer periods are floored at 1ms; `tokio::time::interval` rejects zero.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }

    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms.max(1))
    }

    pub fn scan(&self) -> Duration {
        Duration::from_millis(self.scan_ms.max(1))
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms.max(1))
    }
}

impl AppConfig {
    /// Profile store location: the override, else `profiles.json` in `dir`.
    pub fn profile_path(&self, dir: &Path) -> PathBuf {
        self.paths
            .profile_file
            .clone()
            .unwrap_or_else(|| dir.join(PROFILE_FILE_NAME))
    }

    /// Hotkey file location: the override, else `sync_hotkey.ini` in `dir`.
    pub fn hotkey_path(&self, dir: &Path) -> PathBuf {
        self.paths
            .hotkey_file
            .clone()
            .unwrap_or_else(|| dir.join(HOTKEY_FILE_NAME))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `KeySync` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KeySync"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keysync"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("KeySync"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_app_config_default_has_expected_timing() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.timing.heartbeat_ms, 50);
        assert_eq!(cfg.timing.probe_ms, 200);
        assert_eq!(cfg.timing.scan_ms, 1000);
        assert_eq!(cfg.timing.grace_ms, 800);
    }

    #[test]
    fn test_sync_config_default_enables_auto_pause_and_protocol_segment() {
        let cfg = SyncConfig::default();
        assert!(cfg.auto_pause);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.segment_name, SEGMENT_NAME);
    }

    #[test]
    fn test_zero_timer_period_is_floored_to_one_millisecond() {
        let timing = TimingConfig {
            heartbeat_ms: 0,
            ..TimingConfig::default()
        };
        assert_eq!(timing.heartbeat(), Duration::from_millis(1));
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_partial_toml_fills_missing_fields_with_defaults() {
        // Arrange
        let text = "[sync]\nauto_pause = false\n\n[timing]\ngrace_ms = 1500\n";

        // Act
        let cfg: AppConfig = toml::from_str(text).expect("parse");

        // Assert
        assert!(!cfg.sync.auto_pause);
        assert_eq!(cfg.sync.log_level, "info");
        assert_eq!(cfg.timing.grace_ms, 1500);
        assert_eq!(cfg.timing.heartbeat_ms, 50);
        assert_eq!(cfg.target, TargetConfig::default());
    }

    #[test]
    fn test_empty_toml_is_default_config() {
        let cfg: AppConfig = toml::from_str("").expect("parse");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_store_paths_default_to_config_dir_and_honor_overrides() {
        // Arrange
        let dir = Path::new("/cfg");
        let mut cfg = AppConfig::default();

        // Act / Assert
        assert_eq!(cfg.profile_path(dir), dir.join("profiles.json"));
        assert_eq!(cfg.hotkey_path(dir), dir.join("sync_hotkey.ini"));

        cfg.paths.profile_file = Some(PathBuf::from("/elsewhere/p.json"));
        assert_eq!(cfg.profile_path(dir), PathBuf::from("/elsewhere/p.json"));
    }

    // ── File round-trip ───────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_config_from(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.target.process_name = "game.exe".to_string();
        cfg.timing.scan_ms = 2500;

        // Act
        save_config_to(&path, &cfg).expect("save");
        let restored = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(restored, cfg);
    }

    #[test]
    fn test_load_config_from_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync\nauto_pause = ").expect("write");

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
