//! The canonical ordered task list.
//!
//! Updates are copy-on-write: a mutation never touches a sequence that
//! someone else holds through [`TaskStore::snapshot`], so observers detect
//! change with `Arc::ptr_eq`. Mutators return `Ok(false)` when the request is
//! already satisfied and leave the sequence untouched.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::task::{Status, Task};

#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Arc<Vec<Task>>,
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Arc::new(tasks),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Shared handle to the current sequence.
    pub fn snapshot(&self) -> Arc<Vec<Task>> {
        Arc::clone(&self.tasks)
    }

    /// Whether `snapshot` is still the current sequence.
    pub fn is_current(&self, snapshot: &Arc<Vec<Task>>) -> bool {
        Arc::ptr_eq(&self.tasks, snapshot)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    pub fn visible(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| task.is_visible())
    }

    pub fn archived(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|task| task.is_archived)
    }

    /// Visible tasks of one status, in board order.
    pub fn column(&self, status: Status) -> impl Iterator<Item = &Task> {
        self.visible().filter(move |task| task.status == status)
    }

    /// Prepend a new task.
    pub fn add(&mut self, task: Task) -> Result<()> {
        if self.get(&task.id).is_some() {
            return Err(Error::DuplicateTask(task.id));
        }
        Arc::make_mut(&mut self.tasks).insert(0, task);
        Ok(())
    }

    pub fn update_status(&mut self, id: &str, status: Status) -> Result<bool> {
        let index = self.require(id)?;
        if self.tasks[index].status == status {
            return Ok(false);
        }
        Arc::make_mut(&mut self.tasks)[index].status = status;
        Ok(true)
    }

    /// Reorder the visible tasks of `status` to match `ids`.
    ///
    /// `ids` must be a permutation of the column's ids. Tasks of other
    /// statuses keep their slots; the column's tasks are written back into the
    /// slots the column already occupied.
    pub fn update_order(&mut self, status: Status, ids: &[String]) -> Result<bool> {
        let slots: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.is_visible() && task.status == status)
            .map(|(index, _)| index)
            .collect();

        if ids.len() != slots.len() {
            return Err(Error::InvalidArgument(format!(
                "expected {} ids for column {status}, got {}",
                slots.len(),
                ids.len()
            )));
        }

        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            let index = slots
                .iter()
                .copied()
                .find(|&slot| self.tasks[slot].id == *id)
                .ok_or_else(|| {
                    Error::InvalidArgument(format!("task {id} is not in column {status}"))
                })?;
            if ordered.contains(&index) {
                return Err(Error::InvalidArgument(format!("task {id} listed twice")));
            }
            ordered.push(index);
        }

        if ordered == slots {
            return Ok(false);
        }

        let reordered: Vec<Task> = ordered.iter().map(|&i| self.tasks[i].clone()).collect();
        let tasks = Arc::make_mut(&mut self.tasks);
        for (slot, task) in slots.into_iter().zip(reordered) {
            tasks[slot] = task;
        }
        Ok(true)
    }

    /// Move the task `id` to the index currently held by `target_id`,
    /// shifting the tasks in between.
    pub fn move_to(&mut self, id: &str, target_id: &str) -> Result<bool> {
        let from = self.require(id)?;
        let to = self.require(target_id)?;
        if from == to {
            return Ok(false);
        }
        let tasks = Arc::make_mut(&mut self.tasks);
        let task = tasks.remove(from);
        tasks.insert(to, task);
        Ok(true)
    }

    pub fn archive(&mut self, id: &str) -> Result<bool> {
        self.set_archived(id, true)
    }

    pub fn restore(&mut self, id: &str) -> Result<bool> {
        self.set_archived(id, false)
    }

    /// Archive every visible task in `status`. Returns how many changed.
    pub fn archive_status(&mut self, status: Status) -> usize {
        let count = self.column(status).count();
        if count == 0 {
            return 0;
        }
        for task in Arc::make_mut(&mut self.tasks).iter_mut() {
            if task.status == status {
                task.is_archived = true;
            }
        }
        count
    }

    /// Permanently remove an archived task.
    pub fn delete_forever(&mut self, id: &str) -> Result<Task> {
        let index = self.require(id)?;
        if !self.tasks[index].is_archived {
            return Err(Error::NotArchived(id.to_string()));
        }
        Ok(Arc::make_mut(&mut self.tasks).remove(index))
    }

    /// Swap in a whole new sequence (remote snapshot).
    pub fn replace(&mut self, tasks: Vec<Task>) {
        self.tasks = Arc::new(tasks);
    }

    fn set_archived(&mut self, id: &str, archived: bool) -> Result<bool> {
        let index = self.require(id)?;
        if self.tasks[index].is_archived == archived {
            return Ok(false);
        }
        Arc::make_mut(&mut self.tasks)[index].is_archived = archived;
        Ok(true)
    }

    fn require(&self, id: &str) -> Result<usize> {
        self.position(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }
}
