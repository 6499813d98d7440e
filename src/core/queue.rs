//! Bounded FIFO task queue.

use std::collections::BTreeMap;

use super::task::{Task, TaskId};

/// Holding area for tasks that could not be dispatched immediately.
///
/// Keyed by task id, which is assigned in submission order, so iteration
/// order is submission order. That gives O(log n) removal for cancellation
/// and lets a task that bounced off a closing worker return to its original
/// position.
pub(crate) struct TaskQueue<P> {
    max_depth: usize,
    tasks: BTreeMap<TaskId, Task<P>>,
}

impl<P> TaskQueue<P> {
    /// Create a queue holding at most `max_depth` tasks.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            tasks: BTreeMap::new(),
        }
    }

    /// Insert a task at its submission-order position.
    ///
    /// Admission is checked by the caller with [`is_full`](Self::is_full)
    /// before a task is created; a task that bounced off a closing worker
    /// goes back in regardless.
    pub fn push(&mut self, task: Task<P>) {
        self.tasks.insert(task.id, task);
    }

    /// Oldest queued task.
    pub fn pop(&mut self) -> Option<Task<P>> {
        self.tasks.pop_first().map(|(_, task)| task)
    }

    /// Remove a specific task (cancellation).
    pub fn remove(&mut self, id: TaskId) -> Option<Task<P>> {
        self.tasks.remove(&id)
    }

    /// Remove every queued task, oldest first.
    pub fn drain(&mut self) -> Vec<Task<P>> {
        std::mem::take(&mut self.tasks).into_values().collect()
    }

    pub fn is_full(&self) -> bool {
        self.tasks.len() >= self.max_depth
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }
}
