//! Undo window for archived tasks.
//!
//! Only the most recent archive is undoable, and only until its window
//! lapses. Expiry hides the affordance; the task stays archived. The board
//! applies the actual store mutations; this type only tracks which id is
//! undoable and until when.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct UndoWindow {
    window: Duration,
    pending: Option<PendingUndo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingUndo {
    task_id: String,
    deadline: Instant,
}

impl UndoWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Offer undo for `task_id`, replacing any earlier offer.
    /// Returns the id whose offer was replaced.
    pub fn offer(&mut self, task_id: impl Into<String>, now: Instant) -> Option<String> {
        let replaced = self.pending.take().map(|p| p.task_id);
        self.pending = Some(PendingUndo {
            task_id: task_id.into(),
            deadline: now + self.window,
        });
        replaced
    }

    /// Claim the undoable id if the window is still open.
    pub fn take(&mut self, now: Instant) -> Option<String> {
        let pending = self.pending.take()?;
        if now < pending.deadline {
            Some(pending.task_id)
        } else {
            None
        }
    }

    /// Close the window if it has lapsed, returning the id that expired.
    pub fn expire_due(&mut self, now: Instant) -> Option<String> {
        let due = self.pending.as_ref().is_some_and(|p| now >= p.deadline);
        if due {
            self.pending.take().map(|p| p.task_id)
        } else {
            None
        }
    }

    /// Hide the affordance early.
    pub fn dismiss(&mut self) -> Option<String> {
        self.pending.take().map(|p| p.task_id)
    }

    pub fn is_offered(&self) -> bool {
        self.pending.is_some()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.task_id.as_str())
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }
}
