//! The synchronization core.
//!
//! [`Board`] exclusively owns the task list. Every mutation, whether a user
//! action, a drag gesture or a remote snapshot, goes through it and fans out
//! the same way:
//!
//! 1. the full list is written to local storage (failures logged)
//! 2. the push scheduler decides whether a debounced remote push is armed
//! 3. events are queued for the caller to render
//!
//! The list last agreed with the remote is recorded per user. Signing in
//! while the local list differs from that record pushes the local list
//! instead of adopting the remote one, so edits made between sessions
//! survive.
//!
//! Timers (push debounce, undo window) are deadlines on the tokio clock.
//! [`Board::run`] services them together with commands and the remote feed;
//! [`Board::tick`] does one non-blocking pass for callers that drive time
//! themselves.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::archive::UndoWindow;
use crate::config::Config;
use crate::drag::{DragEngine, DragOutcome, DropTarget};
use crate::error::{Error, Result};
use crate::events::BoardEvent;
use crate::migrate::migrate_list;
use crate::parser::{generic_fallback, ModelParser, TaskParser};
use crate::remote::{Identity, RemoteStore, RemoteTasks, Subscription};
use crate::storage::{KeyValueStore, LoadSource, LocalPersistence, VersionCheck};
use crate::store::TaskStore;
use crate::sync::{PushDecision, PushScheduler, PushState, SyncStatus};
use crate::task::{new_task_id, Status, Task};

pub const PARSE_FAILED_NOTICE: &str =
    "Sorry, I couldn't process that. It was saved as a plain task instead.";

/// Requests accepted by [`Board::run`].
#[derive(Debug, Clone)]
pub enum BoardCommand {
    AddText(String),
    ChangeStatus { task_id: String, status: Status },
    Archive(String),
    UndoArchive,
    Restore(String),
    DeleteForever(String),
    ArchiveDone,
    /// Local storage was written by another process.
    ReloadLocal,
    SignIn(Identity),
    SignOut,
    Flush,
    Shutdown,
}

struct RemoteSession {
    identity: Identity,
    subscription: Option<Subscription>,
    /// The subscription's first snapshot mirrors what the initial fetch
    /// already applied; pushes stay disabled until it has been consumed.
    initial_load_done: bool,
}

enum Step {
    Command(Option<BoardCommand>),
    Remote(RemoteTasks),
    Timer,
}

pub struct Board {
    store: TaskStore,
    local: LocalPersistence,
    load_source: LoadSource,
    version: VersionCheck,
    remote: Option<Arc<dyn RemoteStore>>,
    session: Option<RemoteSession>,
    push: PushScheduler,
    undo: UndoWindow,
    drag: DragEngine,
    parser: Arc<dyn TaskParser>,
    status: SyncStatus,
    events: VecDeque<BoardEvent>,
}

impl Board {
    /// Load the board from local storage, write it back under the current
    /// key and record the app version.
    pub fn open(config: &Config, kv: Box<dyn KeyValueStore>) -> Self {
        let local = LocalPersistence::new(kv, config.storage.clone());
        let (tasks, load_source) = local.load();
        let version = local.check_version();
        info!(count = tasks.len(), source = ?load_source, "board opened");
        if version.updated {
            info!(previous = ?version.previous, current = version.current, "app updated");
        }

        let board = Self {
            store: TaskStore::new(tasks),
            local,
            load_source,
            version,
            remote: None,
            session: None,
            push: PushScheduler::new(config.sync.debounce()),
            undo: UndoWindow::new(config.archive.undo_window()),
            drag: DragEngine::new(),
            parser: Arc::new(ModelParser::from_config(&config.parser)),
            status: SyncStatus::default(),
            events: VecDeque::new(),
        };
        board.local.save(board.store.tasks());
        board
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn TaskParser>) -> Self {
        self.parser = parser;
        self
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.store.get(id)
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        self.store.visible().collect()
    }

    pub fn archived_tasks(&self) -> Vec<&Task> {
        self.store.archived().collect()
    }

    pub fn column(&self, status: Status) -> Vec<&Task> {
        self.store.column(status).collect()
    }

    pub fn load_source(&self) -> LoadSource {
        self.load_source
    }

    pub fn sync_status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|session| &session.identity)
    }

    pub fn push_state(&self) -> PushState {
        self.push.state()
    }

    pub fn undo_task_id(&self) -> Option<&str> {
        self.undo.task_id()
    }

    pub fn active_drag(&self) -> Option<&str> {
        self.drag.active_task()
    }

    /// Version comparison made when the board was opened.
    pub fn version(&self) -> &VersionCheck {
        &self.version
    }

    /// Drain queued events.
    pub fn take_events(&mut self) -> Vec<BoardEvent> {
        self.events.drain(..).collect()
    }

    // =========================================================================
    // Local mutations
    // =========================================================================

    /// Prepend a task built elsewhere.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        let task_id = task.id.clone();
        self.store.add(task)?;
        self.events.push_back(BoardEvent::TaskAdded { task_id });
        self.after_change();
        Ok(())
    }

    /// Parse free text into a task and prepend it. Parse failures still add a
    /// task (generic fallback) and queue one notice.
    pub async fn add_from_text(&mut self, text: &str) -> Result<Task> {
        let fields = match self.parser.parse(text).await {
            Ok(fields) => fields,
            Err(err) => {
                error!(error = %err, "failed to parse task text");
                self.events.push_back(BoardEvent::Notice {
                    message: PARSE_FAILED_NOTICE.to_string(),
                });
                generic_fallback(text)
            }
        };
        let mut task = Task::from_fields(fields);
        while self.store.get(&task.id).is_some() {
            task.id = new_task_id();
        }
        self.add_task(task.clone())?;
        Ok(task)
    }

    /// Explicit status change from the task menu.
    pub fn change_status(&mut self, task_id: &str, status: Status) -> Result<bool> {
        let from = self.require(task_id)?.status;
        if !self.store.update_status(task_id, status)? {
            return Ok(false);
        }
        self.record_status_change(task_id, from, status);
        if status == Status::Done && from != Status::Done {
            self.celebrate(task_id);
        }
        self.after_change();
        Ok(true)
    }

    /// Reorder one column to match `ids`.
    pub fn reorder(&mut self, status: Status, ids: &[String]) -> Result<bool> {
        if !self.store.update_order(status, ids)? {
            return Ok(false);
        }
        self.events.push_back(BoardEvent::Reordered { status });
        self.after_change();
        Ok(true)
    }

    /// Archive a task and offer undo for it, replacing any earlier offer.
    pub fn archive(&mut self, task_id: &str) -> Result<bool> {
        if !self.store.archive(task_id)? {
            return Ok(false);
        }
        self.events.push_back(BoardEvent::TaskArchived {
            task_id: task_id.to_string(),
        });
        if let Some(replaced) = self.undo.offer(task_id, Instant::now()) {
            self.events.push_back(BoardEvent::UndoClosed { task_id: replaced });
        }
        self.events.push_back(BoardEvent::UndoOffered {
            task_id: task_id.to_string(),
        });
        self.after_change();
        Ok(true)
    }

    /// Restore the last archived task if its undo window is still open.
    pub fn undo_archive(&mut self) -> bool {
        let Some(task_id) = self.undo.take(Instant::now()) else {
            return false;
        };
        match self.store.restore(&task_id) {
            Ok(true) => {
                self.events.push_back(BoardEvent::TaskRestored { task_id });
                self.after_change();
                true
            }
            Ok(false) => false,
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "undo target no longer exists");
                false
            }
        }
    }

    /// Hide the undo affordance without restoring.
    pub fn dismiss_undo(&mut self) {
        if let Some(task_id) = self.undo.dismiss() {
            self.events.push_back(BoardEvent::UndoClosed { task_id });
        }
    }

    /// Restore any archived task, independent of the undo window.
    pub fn restore(&mut self, task_id: &str) -> Result<bool> {
        if !self.store.restore(task_id)? {
            return Ok(false);
        }
        self.events.push_back(BoardEvent::TaskRestored {
            task_id: task_id.to_string(),
        });
        self.after_change();
        Ok(true)
    }

    /// Permanently remove an archived task.
    pub fn delete_forever(&mut self, task_id: &str) -> Result<Task> {
        let removed = self.store.delete_forever(task_id)?;
        if self.undo.task_id() == Some(task_id) {
            self.dismiss_undo();
        }
        self.events.push_back(BoardEvent::TaskDeleted {
            task_id: removed.id.clone(),
        });
        self.after_change();
        Ok(removed)
    }

    /// Archive every visible Done task. Not undoable through the undo window.
    pub fn archive_done(&mut self) -> usize {
        let ids: Vec<String> = self
            .store
            .column(Status::Done)
            .map(|task| task.id.clone())
            .collect();
        let count = self.store.archive_status(Status::Done);
        if count == 0 {
            return 0;
        }
        for task_id in ids {
            self.events.push_back(BoardEvent::TaskArchived { task_id });
        }
        self.after_change();
        count
    }

    /// Pick up the list another process wrote under the current key and treat
    /// it as a local edit. Returns whether anything changed.
    pub fn reload_local(&mut self) -> bool {
        let Some(tasks) = self.local.read_current() else {
            return false;
        };
        if tasks.as_slice() == self.store.tasks() {
            return false;
        }
        let count = tasks.len();
        info!(count, "reloaded tasks written elsewhere");
        self.store.replace(tasks);
        self.events.push_back(BoardEvent::LocalReloaded { count });
        self.after_change();
        true
    }

    // =========================================================================
    // Drag and drop
    // =========================================================================

    pub fn drag_start(&mut self, task_id: &str) -> Result<Status> {
        let status = self.drag.start(&self.store, task_id)?;
        debug!(task_id, status = %status, "drag started");
        Ok(status)
    }

    /// Pointer over `target`: moves the dragged task into the target's column.
    pub fn drag_over(&mut self, target: &DropTarget) -> Result<bool> {
        let Some(task_id) = self.drag.active_task().map(str::to_string) else {
            return Err(Error::NoActiveDrag);
        };
        let from = self.store.get(&task_id).map(|task| task.status);
        if !self.drag.hover(&mut self.store, target)? {
            return Ok(false);
        }
        if let (Some(from), Some(to)) = (from, self.store.get(&task_id).map(|t| t.status)) {
            self.record_status_change(&task_id, from, to);
        }
        self.after_change();
        Ok(true)
    }

    /// Release the dragged task over `target` (`None` outside every target).
    pub fn drag_end(&mut self, target: Option<&DropTarget>) -> Result<DragOutcome> {
        let outcome = self.drag.end(&mut self.store, target)?;
        debug!(
            task_id = %outcome.task_id,
            reordered = outcome.reordered,
            abandoned = outcome.abandoned,
            "drag ended"
        );
        if outcome.reordered {
            self.events.push_back(BoardEvent::Reordered {
                status: outcome.final_status,
            });
            self.after_change();
        }
        if outcome.completed {
            self.celebrate(&outcome.task_id);
        }
        Ok(outcome)
    }

    pub fn drag_cancel(&mut self) -> bool {
        self.drag.cancel()
    }

    // =========================================================================
    // Remote sync
    // =========================================================================

    /// React to an identity becoming active: fetch once, then either adopt
    /// the remote list or upload the local one, then subscribe.
    ///
    /// Remote failures are logged and reported as events; only a missing
    /// remote store is an error.
    pub async fn sign_in(&mut self, identity: Identity) -> Result<()> {
        let remote = self.remote.clone().ok_or(Error::RemoteNotConfigured)?;
        if self.session.is_some() {
            self.sign_out();
        }
        info!(user_id = %identity.uid, "signed in");
        let user_id = identity.uid.clone();
        self.session = Some(RemoteSession {
            identity,
            subscription: None,
            initial_load_done: false,
        });

        self.status.syncing = true;
        let result = self.initial_sync(remote.as_ref(), &user_id).await;
        self.status.syncing = false;

        if let Err(err) = result {
            error!(user_id = %user_id, error = %err, "failed to load remote tasks");
            self.events.push_back(BoardEvent::SyncFailed {
                message: err.to_string(),
            });
        }
        Ok(())
    }

    async fn initial_sync(&mut self, remote: &dyn RemoteStore, user_id: &str) -> Result<()> {
        let remote_tasks = if self.has_unsynced_edits(user_id) {
            info!(user_id, "local tasks changed since the last sync");
            None
        } else {
            remote
                .fetch(user_id)
                .await?
                .map(|document| document.tasks)
                .filter(|tasks| !tasks.is_empty())
        };

        match remote_tasks {
            Some(raw) => self.apply_remote_tasks(&raw),
            None => {
                remote.save(user_id, self.store.tasks()).await?;
                info!(user_id, count = self.store.len(), "uploaded local tasks");
                self.events.push_back(BoardEvent::Pushed {
                    count: self.store.len(),
                });
            }
        }
        self.local.save_synced(user_id, self.store.tasks());
        self.status.last_synced = Some(Utc::now());

        let subscription = remote.subscribe(user_id)?;
        if let Some(session) = self.session.as_mut() {
            session.subscription = Some(subscription);
        }
        Ok(())
    }

    /// React to the identity going away. Local tasks are kept; the feed and
    /// any pending push are cancelled.
    pub fn sign_out(&mut self) {
        if let Some(session) = self.session.take() {
            info!(user_id = %session.identity.uid, "signed out");
        }
        self.push.cancel();
    }

    /// Apply one snapshot from the remote feed. The first snapshot of a
    /// session only marks the initial load as done.
    pub fn apply_remote_snapshot(&mut self, raw: RemoteTasks) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.initial_load_done {
            session.initial_load_done = true;
            debug!(user_id = %session.identity.uid, "initial remote snapshot consumed");
            return false;
        }
        let user_id = session.identity.uid.clone();
        self.apply_remote_tasks(&raw);
        self.local.save_synced(&user_id, self.store.tasks());
        self.status.last_synced = Some(Utc::now());
        true
    }

    /// Whether the local list differs from the one last agreed with the
    /// remote for `user_id`. Without a record there is nothing to carry over.
    fn has_unsynced_edits(&self, user_id: &str) -> bool {
        self.local
            .load_synced(user_id)
            .is_some_and(|synced| synced.as_slice() != self.store.tasks())
    }

    fn apply_remote_tasks(&mut self, raw: &[serde_json::Value]) {
        let tasks = migrate_list(raw);
        let count = tasks.len();
        self.push.suppress_next();
        self.store.replace(tasks);
        self.events.push_back(BoardEvent::RemoteApplied { count });
        self.after_change();
    }

    /// Push immediately if a push is pending.
    pub async fn flush(&mut self) {
        if self.push.take_pending() {
            self.push_now().await;
        }
    }

    async fn push_now(&mut self) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let Some(user_id) = self.session.as_ref().map(|s| s.identity.uid.clone()) else {
            return;
        };
        let tasks = self.store.snapshot();

        self.status.syncing = true;
        match remote.save(&user_id, &tasks).await {
            Ok(()) => {
                debug!(user_id = %user_id, count = tasks.len(), "pushed tasks");
                self.local.save_synced(&user_id, &tasks);
                self.status.last_synced = Some(Utc::now());
                self.events.push_back(BoardEvent::Pushed { count: tasks.len() });
            }
            Err(err) => {
                error!(user_id = %user_id, error = %err, "failed to push tasks");
                self.events.push_back(BoardEvent::SyncFailed {
                    message: err.to_string(),
                });
            }
        }
        self.status.syncing = false;
    }

    // =========================================================================
    // Driving
    // =========================================================================

    /// Earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.push.deadline(), self.undo.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Apply queued remote snapshots, then fire due timers.
    pub async fn tick(&mut self) {
        loop {
            let next = self
                .session
                .as_mut()
                .and_then(|session| session.subscription.as_mut())
                .and_then(Subscription::try_recv);
            let Some(raw) = next else { break };
            self.apply_remote_snapshot(raw);
        }
        self.fire_due_timers().await;
    }

    async fn fire_due_timers(&mut self) {
        let now = Instant::now();
        if let Some(task_id) = self.undo.expire_due(now) {
            debug!(task_id = %task_id, "undo window closed");
            self.events.push_back(BoardEvent::UndoClosed { task_id });
        }
        if self.push.take_due(now) {
            self.push_now().await;
        }
    }

    /// Service commands, remote snapshots and timers until the command
    /// channel closes or `Shutdown` arrives. Queued events are handed to
    /// `observer` after every step.
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<BoardCommand>,
        mut observer: impl FnMut(BoardEvent),
    ) {
        loop {
            self.events.drain(..).for_each(&mut observer);
            let deadline = self.next_deadline();
            let step = tokio::select! {
                command = commands.recv() => Step::Command(command),
                Some(raw) = next_snapshot(self.session.as_mut()) => Step::Remote(raw),
                () = sleep_until(deadline) => Step::Timer,
            };
            match step {
                Step::Command(None) | Step::Command(Some(BoardCommand::Shutdown)) => break,
                Step::Command(Some(command)) => self.handle(command).await,
                Step::Remote(raw) => {
                    self.apply_remote_snapshot(raw);
                }
                Step::Timer => self.fire_due_timers().await,
            }
        }
        self.shutdown();
        self.events.drain(..).for_each(&mut observer);
    }

    async fn handle(&mut self, command: BoardCommand) {
        let result = match command {
            BoardCommand::AddText(text) => self.add_from_text(&text).await.map(|_| ()),
            BoardCommand::ChangeStatus { task_id, status } => {
                self.change_status(&task_id, status).map(|_| ())
            }
            BoardCommand::Archive(task_id) => self.archive(&task_id).map(|_| ()),
            BoardCommand::UndoArchive => {
                self.undo_archive();
                Ok(())
            }
            BoardCommand::Restore(task_id) => self.restore(&task_id).map(|_| ()),
            BoardCommand::DeleteForever(task_id) => self.delete_forever(&task_id).map(|_| ()),
            BoardCommand::ArchiveDone => {
                self.archive_done();
                Ok(())
            }
            BoardCommand::ReloadLocal => {
                self.reload_local();
                Ok(())
            }
            BoardCommand::SignIn(identity) => self.sign_in(identity).await,
            BoardCommand::SignOut => {
                self.sign_out();
                Ok(())
            }
            BoardCommand::Flush => {
                self.flush().await;
                Ok(())
            }
            BoardCommand::Shutdown => Ok(()),
        };
        if let Err(err) = result {
            warn!(error = %err, "board command rejected");
            self.events.push_back(BoardEvent::Notice {
                message: err.to_string(),
            });
        }
    }

    /// Tear down: cancel the feed, the pending push, the undo offer and any
    /// drag. Local storage already holds the latest state.
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.subscription = None;
        }
        self.push.cancel();
        self.undo.dismiss();
        self.drag.cancel();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn after_change(&mut self) {
        self.local.save(self.store.tasks());
        let push_enabled = self
            .session
            .as_ref()
            .is_some_and(|session| session.initial_load_done);
        match self.push.on_change(Instant::now(), push_enabled) {
            PushDecision::Armed(_) => debug!("remote push armed"),
            PushDecision::Suppressed => debug!("remote push suppressed for remote update"),
            PushDecision::LocalOnly => {}
        }
    }

    fn record_status_change(&mut self, task_id: &str, from: Status, to: Status) {
        self.events.push_back(BoardEvent::StatusChanged {
            task_id: task_id.to_string(),
            from,
            to,
        });
    }

    fn celebrate(&mut self, task_id: &str) {
        info!(task_id, "task completed");
        self.events.push_back(BoardEvent::Celebrate {
            task_id: task_id.to_string(),
        });
    }

    fn require(&self, task_id: &str) -> Result<&Task> {
        self.store
            .get(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }
}

async fn next_snapshot(session: Option<&mut RemoteSession>) -> Option<RemoteTasks> {
    match session.and_then(|session| session.subscription.as_mut()) {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
