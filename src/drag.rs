//! Drag-and-drop reconciliation.
//!
//! One gesture at a time. Hovering over a target in another column moves the
//! dragged task there immediately (a committed store mutation, not a
//! preview). Dropping onto a task in the same column moves the dragged task
//! to that task's position. Completion is reported once per gesture when the
//! task ends in Done after starting elsewhere.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::store::TaskStore;
use crate::task::Status;

/// What the pointer is over: a task card or a column body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    Task(String),
    Column(Status),
}

impl DropTarget {
    /// Resolve a raw target id: a task id first, then a column name.
    pub fn resolve(raw: &str, store: &TaskStore) -> Option<Self> {
        if store.get(raw).is_some() {
            return Some(DropTarget::Task(raw.to_string()));
        }
        raw.parse::<Status>().ok().map(DropTarget::Column)
    }

    /// The status a drop here implies. Unknown task ids resolve to nothing.
    pub fn status(&self, store: &TaskStore) -> Option<Status> {
        match self {
            DropTarget::Task(id) => store.get(id).map(|task| task.status),
            DropTarget::Column(status) => Some(*status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        task_id: String,
        start_status: Status,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DragOutcome {
    pub task_id: String,
    pub start_status: Status,
    pub final_status: Status,
    /// Position changed within the column.
    pub reordered: bool,
    /// Ended in Done after starting elsewhere.
    pub completed: bool,
    /// Released outside any target.
    pub abandoned: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DragEngine {
    state: DragState,
}

impl DragEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn active_task(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging { task_id, .. } => Some(task_id),
            DragState::Idle => None,
        }
    }

    /// Begin a gesture. A gesture already in progress is replaced.
    pub fn start(&mut self, store: &TaskStore, task_id: &str) -> Result<Status> {
        let task = store
            .get(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        self.state = DragState::Dragging {
            task_id: task.id.clone(),
            start_status: task.status,
        };
        Ok(task.status)
    }

    /// Pointer moved over `target`. Returns true when the dragged task's
    /// status changed.
    pub fn hover(&self, store: &mut TaskStore, target: &DropTarget) -> Result<bool> {
        let DragState::Dragging { task_id, .. } = &self.state else {
            return Err(Error::NoActiveDrag);
        };
        let Some(current) = store.get(task_id).map(|task| task.status) else {
            return Ok(false);
        };
        match target.status(store) {
            Some(status) if status != current => store.update_status(task_id, status),
            _ => Ok(false),
        }
    }

    /// Release the task over `target` (`None` when outside every target).
    pub fn end(
        &mut self,
        store: &mut TaskStore,
        target: Option<&DropTarget>,
    ) -> Result<DragOutcome> {
        let DragState::Dragging {
            task_id,
            start_status,
        } = std::mem::take(&mut self.state)
        else {
            return Err(Error::NoActiveDrag);
        };
        let final_status = store
            .get(&task_id)
            .map(|task| task.status)
            .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;

        let mut outcome = DragOutcome {
            completed: final_status == Status::Done && start_status != Status::Done,
            task_id,
            start_status,
            final_status,
            reordered: false,
            abandoned: target.is_none(),
        };

        if let Some(DropTarget::Task(target_id)) = target {
            let same_column = store
                .get(target_id)
                .is_some_and(|target| target.status == final_status);
            if same_column {
                outcome.reordered = store.move_to(&outcome.task_id, target_id)?;
            }
        }
        Ok(outcome)
    }

    /// Drop the gesture without touching the store.
    pub fn cancel(&mut self) -> bool {
        !matches!(std::mem::take(&mut self.state), DragState::Idle)
    }
}
