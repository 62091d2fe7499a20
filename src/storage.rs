//! Local persistence for the board
//!
//! The board is kept in a synchronous key-value store as one JSON document per
//! key:
//!
//! ```text
//! braindump-data            # current task list (written on every change)
//! zentask-data              # legacy task list (read once, never written)
//! braindump-last-version    # last app version the user has seen
//! braindump-synced          # {"userId", "tasks"} as last agreed with the remote
//! ```
//!
//! Reads are untrusted and always pass through [`crate::migrate`]. Write
//! failures are logged and swallowed: the board keeps working from memory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use notify::{EventKind, RecursiveMode, Watcher};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::lock;
use crate::migrate::migrate_tasks;
use crate::task::Task;
use crate::version::{APP_VERSION, CHANGELOG};

/// Synchronous string key-value slot store (browser-storage semantics).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store with an optional byte quota across all keys.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would take the total stored bytes above `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("memory storage poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries()?;
        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let size = key.len() + value.len();
            if others + size > quota {
                return Err(Error::QuotaExceeded {
                    key: key.to_string(),
                    size,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    lock_timeout_ms: u64,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_timeout_ms: lock::DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`.
    pub fn key_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    /// Call `on_change` whenever another writer replaces the file behind
    /// `key`. Watching stops when the returned watcher is dropped.
    pub fn watch_key(
        &self,
        key: &str,
        on_change: impl Fn() + Send + 'static,
    ) -> Result<notify::RecommendedWatcher> {
        let path = self.key_path(key);
        let file_name = path.file_name().map(|name| name.to_os_string());
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == file_name.as_deref());
                    if relevant {
                        on_change();
                    }
                }
                Err(err) => warn!(error = %err, "local watch error"),
            })?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        debug!(path = %path.display(), "watching local tasks");
        Ok(watcher)
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Io(err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock::write_atomic_locked(self.key_path(key), value.as_bytes(), self.lock_timeout_ms)
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Io(err)),
        }
    }
}

/// Where the loaded task list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Current,
    Legacy,
    Seed,
}

/// Result of comparing the stored app version with this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub previous: Option<String>,
    pub current: &'static str,
    pub updated: bool,
}

impl VersionCheck {
    pub fn changelog(&self) -> &'static [&'static str] {
        if self.updated {
            CHANGELOG
        } else {
            &[]
        }
    }
}

/// Reads and writes the board under the configured keys.
pub struct LocalPersistence {
    kv: Box<dyn KeyValueStore>,
    config: StorageConfig,
}

impl LocalPersistence {
    pub fn new(kv: Box<dyn KeyValueStore>, config: StorageConfig) -> Self {
        Self { kv, config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Load the board: current key, then legacy key, then the welcome seed.
    ///
    /// A failure on either key is logged and falls through to the next step.
    pub fn load(&self) -> (Vec<Task>, LoadSource) {
        if let Some(tasks) = self.read_tasks(&self.config.key) {
            debug!(count = tasks.len(), "loaded tasks from current key");
            return (tasks, LoadSource::Current);
        }
        if let Some(tasks) = self.read_tasks(&self.config.legacy_key) {
            info!(
                count = tasks.len(),
                legacy_key = %self.config.legacy_key,
                "migrating tasks from legacy key"
            );
            return (tasks, LoadSource::Legacy);
        }
        (vec![Task::welcome()], LoadSource::Seed)
    }

    /// Serialize the full board under the current key.
    pub fn try_save(&self, tasks: &[Task]) -> Result<()> {
        let json = serde_json::to_string(tasks)?;
        self.kv.set(&self.config.key, &json)
    }

    /// [`Self::try_save`], logging instead of returning the failure.
    pub fn save(&self, tasks: &[Task]) -> bool {
        match self.try_save(tasks) {
            Ok(()) => true,
            Err(err) => {
                error!(key = %self.config.key, error = %err, "failed to save tasks");
                false
            }
        }
    }

    /// The list under the current key only, without legacy or seed fallback.
    pub fn read_current(&self) -> Option<Vec<Task>> {
        self.read_tasks(&self.config.key)
    }

    /// The list last agreed with the remote for `user_id`, if one is recorded.
    pub fn load_synced(&self, user_id: &str) -> Option<Vec<Task>> {
        let key = &self.config.synced_key;
        let raw = match self.kv.get(key) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return None,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to read synced tasks");
                return None;
            }
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to parse synced tasks");
                return None;
            }
        };
        if value.get("userId").and_then(Value::as_str) != Some(user_id) {
            return None;
        }
        value.get("tasks").and_then(migrate_tasks)
    }

    /// Record `tasks` as agreed with the remote for `user_id`.
    pub fn save_synced(&self, user_id: &str, tasks: &[Task]) {
        let key = &self.config.synced_key;
        let record = json!({ "userId": user_id, "tasks": tasks });
        if let Err(err) = self.kv.set(key, &record.to_string()) {
            warn!(key = %key, error = %err, "failed to record synced tasks");
        }
    }

    /// Compare the stored last-seen version with this build and record it.
    pub fn check_version(&self) -> VersionCheck {
        let previous = match self.kv.get(&self.config.version_key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(err) => {
                warn!(error = %err, "failed to read last app version");
                None
            }
        };
        let updated = previous.as_deref().is_some_and(|v| v != APP_VERSION);
        if let Err(err) = self.kv.set(&self.config.version_key, APP_VERSION) {
            warn!(error = %err, "failed to record app version");
        }
        VersionCheck {
            previous,
            current: APP_VERSION,
            updated,
        }
    }

    fn read_tasks(&self, key: &str) -> Option<Vec<Task>> {
        let raw = match self.kv.get(key) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return None,
            Err(err) => {
                error!(key, error = %err, "failed to read tasks from storage");
                return None;
            }
        };
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                error!(key, error = %err, "failed to parse stored tasks");
                return None;
            }
        };
        let tasks = migrate_tasks(&value);
        if tasks.is_none() {
            warn!(key, "stored tasks are not a list");
        }
        tasks
    }
}
