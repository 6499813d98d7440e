//! Worker registry records and the least-loaded selection policy.

use std::collections::{BTreeMap, HashSet};
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{WorkerSnapshot, WorkerState};
use crate::core::task::{Task, TaskId, WorkerId};

/// A task handed to a worker unit together with its interruption token.
pub(crate) struct Assignment<P> {
    pub task: Task<P>,
    pub interrupt: CancellationToken,
}

/// Pool-side bookkeeping for one worker unit.
pub(crate) struct WorkerRecord<P> {
    pub state: WorkerState,
    pub assigned: HashSet<TaskId>,
    /// `None` once the worker stops accepting assignments.
    pub inbox: Option<mpsc::UnboundedSender<Assignment<P>>>,
    pub thread: Option<JoinHandle<()>>,
    pub completed: u64,
    pub errors: u64,
}

impl<P> WorkerRecord<P> {
    pub fn starting(inbox: mpsc::UnboundedSender<Assignment<P>>) -> Self {
        Self {
            state: WorkerState::Starting,
            assigned: HashSet::new(),
            inbox: Some(inbox),
            thread: None,
            completed: 0,
            errors: 0,
        }
    }

    /// Ready, still accepting assignments and below `limit`.
    pub fn has_capacity(&self, limit: usize) -> bool {
        self.state.is_ready() && self.inbox.is_some() && self.assigned.len() < limit
    }

    /// Recompute Idle/Busy from the assignment set. Other states are kept.
    pub fn refresh_state(&mut self) {
        if self.state.is_ready() {
            self.state = match self.assigned.len() {
                0 => WorkerState::Idle,
                n => WorkerState::Busy(n),
            };
        }
    }

    /// Stop accepting assignments; in-flight work continues.
    pub fn close(&mut self) {
        self.inbox = None;
        self.state = WorkerState::Draining;
    }

    pub fn snapshot(&self, id: WorkerId) -> WorkerSnapshot {
        WorkerSnapshot {
            id,
            state: self.state,
            assigned: self.assigned.len(),
            completed: self.completed,
            errors: self.errors,
        }
    }
}

/// Pick the worker with the fewest assigned tasks among those below `limit`.
///
/// Worker ids increase with creation order and `min_by_key` keeps the first
/// minimum, so ties go to the oldest worker.
pub(crate) fn select_least_loaded<P>(
    workers: &BTreeMap<WorkerId, WorkerRecord<P>>,
    limit: usize,
) -> Option<WorkerId> {
    workers
        .iter()
        .filter(|(_, worker)| worker.has_capacity(limit))
        .min_by_key(|(_, worker)| worker.assigned.len())
        .map(|(id, _)| *id)
}
