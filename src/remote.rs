//! Remote document store for cross-device sync.
//!
//! One document per identity:
//!
//! ```json
//! { "tasks": [ ...Task ], "lastUpdated": "2024-05-01T10:00:00Z", ...other fields }
//! ```
//!
//! Writes are merge-upserts of the whole task list; fields other than
//! `tasks` and `lastUpdated` are preserved. Subscriptions deliver the current
//! document first (when it exists) and then every subsequent write, the
//! subscriber's own writes included.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::{EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};
use crate::task::Task;

/// Raw task list as stored remotely; migrated before it reaches the board.
pub type RemoteTasks = Vec<Value>;

/// Signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    #[serde(default, deserialize_with = "lenient_tasks")]
    pub tasks: RemoteTasks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl RemoteDocument {
    /// Replace the task list and stamp the write time.
    pub fn upsert_tasks(&mut self, tasks: &[Task]) -> Result<()> {
        self.tasks = tasks
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<_, _>>()?;
        self.last_updated = Some(Utc::now());
        Ok(())
    }
}

fn lenient_tasks<'de, D>(deserializer: D) -> std::result::Result<RemoteTasks, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => Vec::new(),
    })
}

/// Live feed of remote task lists. Dropping it cancels the subscription.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<RemoteTasks>,
    disposer: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::UnboundedReceiver<RemoteTasks>,
        disposer: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            disposer: Some(Box::new(disposer)),
        }
    }

    /// Wait for the next snapshot; `None` once the feed has closed.
    pub async fn recv(&mut self) -> Option<RemoteTasks> {
        self.rx.recv().await
    }

    /// Next queued snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<RemoteTasks> {
        self.rx.try_recv().ok()
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispose) = self.disposer.take() {
            dispose();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.disposer.is_some())
            .finish()
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Point read of the user's document.
    async fn fetch(&self, user_id: &str) -> Result<Option<RemoteDocument>>;

    /// Merge-upsert the user's task list.
    async fn save(&self, user_id: &str, tasks: &[Task]) -> Result<()>;

    /// Open a live feed of the user's task list.
    fn subscribe(&self, user_id: &str) -> Result<Subscription>;
}

type SubscriberList = Vec<(u64, mpsc::UnboundedSender<RemoteTasks>)>;

#[derive(Default)]
struct MemoryRemoteInner {
    documents: Mutex<HashMap<String, RemoteDocument>>,
    subscribers: Mutex<HashMap<String, SubscriberList>>,
    next_subscriber: AtomicU64,
    offline: AtomicBool,
    saves: AtomicUsize,
}

/// In-process remote store. Clones share the same documents.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<MemoryRemoteInner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every fetch and save fails.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful saves since creation.
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    pub fn document(&self, user_id: &str) -> Option<RemoteDocument> {
        self.documents().ok()?.get(user_id).cloned()
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.subscribers()
            .map(|subs| subs.get(user_id).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    fn check_online(&self) -> Result<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(Error::Remote("remote store unreachable".to_string()));
        }
        Ok(())
    }

    fn documents(&self) -> Result<MutexGuard<'_, HashMap<String, RemoteDocument>>> {
        self.inner
            .documents
            .lock()
            .map_err(|_| Error::Remote("document map poisoned".to_string()))
    }

    fn subscribers(&self) -> Result<MutexGuard<'_, HashMap<String, SubscriberList>>> {
        self.inner
            .subscribers
            .lock()
            .map_err(|_| Error::Remote("subscriber map poisoned".to_string()))
    }

    fn notify(&self, user_id: &str, tasks: &RemoteTasks) -> Result<()> {
        let mut subscribers = self.subscribers()?;
        if let Some(list) = subscribers.get_mut(user_id) {
            list.retain(|(_, tx)| tx.send(tasks.clone()).is_ok());
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(&self, user_id: &str) -> Result<Option<RemoteDocument>> {
        self.check_online()?;
        Ok(self.documents()?.get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, tasks: &[Task]) -> Result<()> {
        self.check_online()?;
        let snapshot = {
            let mut documents = self.documents()?;
            let document = documents.entry(user_id.to_string()).or_default();
            document.upsert_tasks(tasks)?;
            document.tasks.clone()
        };
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        debug!(user_id, count = snapshot.len(), "memory remote saved");
        self.notify(user_id, &snapshot)
    }

    fn subscribe(&self, user_id: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(document) = self.documents()?.get(user_id) {
            let _ = tx.send(document.tasks.clone());
        }

        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.subscribers()?
            .entry(user_id.to_string())
            .or_default()
            .push((id, tx));

        let inner = Arc::clone(&self.inner);
        let user = user_id.to_string();
        Ok(Subscription::new(rx, move || {
            if let Ok(mut subscribers) = inner.subscribers.lock() {
                if let Some(list) = subscribers.get_mut(&user) {
                    list.retain(|(sub_id, _)| *sub_id != id);
                }
            }
        }))
    }
}

/// Remote store backed by a shared directory: `<root>/users/<uid>.json`.
///
/// Subscriptions watch the users directory with `notify`, so two processes
/// pointed at the same directory see each other's writes.
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn users_dir(&self) -> PathBuf {
        self.root.join("users")
    }

    pub fn document_path(&self, user_id: &str) -> PathBuf {
        let name: String = user_id
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
            .collect();
        self.users_dir().join(format!("{name}.json"))
    }
}

fn read_document(path: &Path) -> Result<Option<RemoteDocument>> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(None),
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|err| Error::Remote(format!("{}: {err}", path.display()))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::Io(err)),
    }
}

fn write_document(path: &Path, tasks: &[Task]) -> Result<()> {
    let lock_path = lock::lock_path_for(path);
    let _lock = lock::FileLock::acquire(&lock_path, DEFAULT_LOCK_TIMEOUT_MS)?;
    let mut document = read_document(path)?.unwrap_or_default();
    document.upsert_tasks(tasks)?;
    let json = serde_json::to_vec_pretty(&document)?;
    lock::write_atomic(path, &json)
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| Error::Remote(format!("remote task failed: {err}")))?
}

#[async_trait]
impl RemoteStore for DirectoryRemote {
    async fn fetch(&self, user_id: &str) -> Result<Option<RemoteDocument>> {
        let path = self.document_path(user_id);
        blocking(move || read_document(&path)).await
    }

    async fn save(&self, user_id: &str, tasks: &[Task]) -> Result<()> {
        let path = self.document_path(user_id);
        let tasks = tasks.to_vec();
        blocking(move || write_document(&path, &tasks)).await
    }

    fn subscribe(&self, user_id: &str) -> Result<Subscription> {
        let users_dir = self.users_dir();
        fs::create_dir_all(&users_dir)?;
        let path = self.document_path(user_id);

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(document) = read_document(&path)? {
            let _ = tx.send(document.tasks);
        }

        let file_name = path.file_name().map(|name| name.to_os_string());
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(error = %err, "remote watch error");
                        return;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                if !event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == file_name.as_deref())
                {
                    return;
                }
                match read_document(&path) {
                    Ok(Some(document)) => {
                        let _ = tx.send(document.tasks);
                    }
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "failed to read remote document"),
                }
            })?;
        watcher.watch(&users_dir, RecursiveMode::NonRecursive)?;

        Ok(Subscription::new(rx, move || drop(watcher)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use serde_json::json;

    #[tokio::test]
    async fn memory_remote_merge_upserts_and_notifies() {
        let remote = MemoryRemote::new();
        let mut sub = remote.subscribe("u1").unwrap();
        assert!(sub.try_recv().is_none());

        remote.save("u1", &[Task::welcome()]).await.unwrap();
        let pushed = sub.recv().await.unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(remote.save_count(), 1);

        let document = remote.fetch("u1").await.unwrap().unwrap();
        assert!(document.last_updated.is_some());
        assert!(remote.fetch("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let remote = MemoryRemote::new();
        let sub = remote.subscribe("u1").unwrap();
        assert_eq!(remote.subscriber_count("u1"), 1);
        sub.cancel();
        assert_eq!(remote.subscriber_count("u1"), 0);
    }

    #[tokio::test]
    async fn offline_remote_fails_without_side_effects() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        assert!(matches!(
            remote.save("u1", &[Task::welcome()]).await,
            Err(Error::Remote(_))
        ));
        assert!(remote.fetch("u1").await.is_err());
        assert_eq!(remote.save_count(), 0);
        remote.set_offline(false);
        assert!(remote.fetch("u1").await.unwrap().is_none());
    }

    #[test]
    fn document_keeps_unknown_fields_and_tolerates_bad_tasks() {
        let document: RemoteDocument = serde_json::from_value(json!({
            "tasks": "oops",
            "preferences": {"theme": "dark"}
        }))
        .unwrap();
        assert!(document.tasks.is_empty());
        assert_eq!(document.extra["preferences"]["theme"], json!("dark"));

        let round = serde_json::to_value(&document).unwrap();
        assert_eq!(round["preferences"]["theme"], json!("dark"));
    }

    #[tokio::test]
    async fn directory_remote_round_trips_documents() {
        let temp = tempfile::TempDir::new().unwrap();
        let remote = DirectoryRemote::new(temp.path());
        assert!(remote.fetch("alice").await.unwrap().is_none());

        remote.save("alice", &[Task::welcome()]).await.unwrap();
        let document = remote.fetch("alice").await.unwrap().unwrap();
        assert_eq!(document.tasks.len(), 1);
        assert_eq!(document.tasks[0]["title"], json!(crate::task::WELCOME_TITLE));
        assert!(remote.document_path("../alice").starts_with(remote.users_dir()));
    }

    #[tokio::test]
    async fn directory_subscription_starts_with_current_document() {
        let temp = tempfile::TempDir::new().unwrap();
        let remote = DirectoryRemote::new(temp.path());
        remote.save("bob", &[Task::welcome()]).await.unwrap();

        let mut sub = remote.subscribe("bob").unwrap();
        let first = sub.try_recv().unwrap();
        assert_eq!(first.len(), 1);
    }
}
