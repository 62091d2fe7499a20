//! Configuration loading and management
//!
//! Handles parsing of `braindump.toml` in the data directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// File name of the configuration inside the data directory
pub const CONFIG_FILE: &str = "braindump.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local key-value slots
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote push behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Archive undo window
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Text parsing fallback
    #[serde(default)]
    pub parser: ParserConfig,
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Key holding the current task list
    #[serde(default = "default_key")]
    pub key: String,

    /// Legacy key read once when the current key is empty
    #[serde(default = "default_legacy_key")]
    pub legacy_key: String,

    /// Key holding the last app version the user has seen
    #[serde(default = "default_version_key")]
    pub version_key: String,

    /// Key holding the task list as last agreed with the remote
    #[serde(default = "default_synced_key")]
    pub synced_key: String,

    /// How long file-backed writes wait for the cross-process lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_key() -> String {
    "braindump-data".to_string()
}

fn default_legacy_key() -> String {
    "zentask-data".to_string()
}

fn default_version_key() -> String {
    "braindump-last-version".to_string()
}

fn default_synced_key() -> String {
    "braindump-synced".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key: default_key(),
            legacy_key: default_legacy_key(),
            version_key: default_version_key(),
            synced_key: default_synced_key(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Remote sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period after the last change before the board is pushed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    1000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// How long the last archive stays undoable
    #[serde(default = "default_undo_window_ms")]
    pub undo_window_ms: u64,
}

fn default_undo_window_ms() -> u64 {
    5000
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            undo_window_ms: default_undo_window_ms(),
        }
    }
}

impl ArchiveConfig {
    pub fn undo_window(&self) -> Duration {
        Duration::from_millis(self.undo_window_ms)
    }
}

/// Parser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Title length used by the truncating fallback
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    /// Program and arguments that turn free text into task fields. The text
    /// is written to its stdin; stdout must be one JSON object. Empty means
    /// titles are truncated from the text instead.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

fn default_title_max_chars() -> usize {
    50
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            title_max_chars: default_title_max_chars(),
            command: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a `braindump.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the data directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        if self.sync.debounce_ms == 0 {
            return Err(Error::InvalidConfig(
                "sync.debounce_ms must be > 0".to_string(),
            ));
        }
        if self.archive.undo_window_ms == 0 {
            return Err(Error::InvalidConfig(
                "archive.undo_window_ms must be > 0".to_string(),
            ));
        }
        if self.parser.title_max_chars == 0 {
            return Err(Error::InvalidConfig(
                "parser.title_max_chars must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("storage.key", &self.key),
            ("storage.legacy_key", &self.legacy_key),
            ("storage.version_key", &self.version_key),
            ("storage.synced_key", &self.synced_key),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{field} cannot be empty")));
            }
        }
        if self.key == self.legacy_key {
            return Err(Error::InvalidConfig(
                "storage.legacy_key must differ from storage.key".to_string(),
            ));
        }
        if self.key == self.version_key || self.legacy_key == self.version_key {
            return Err(Error::InvalidConfig(
                "storage.version_key must not reuse a task key".to_string(),
            ));
        }
        if [&self.key, &self.legacy_key, &self.version_key].contains(&&self.synced_key) {
            return Err(Error::InvalidConfig(
                "storage.synced_key must not reuse another key".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve the data directory: explicit flag, then `BRAINDUMP_DIR`, then the
/// platform data directory.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os("BRAINDUMP_DIR") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    directories::ProjectDirs::from("", "", "braindump")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| Error::InvalidConfig("could not determine a data directory".to_string()))
}
