//! Task data model: identifiers, lifecycle states and submission options.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::cancel::CancelSignal;
use super::error::TaskResult;

/// Unique task identifier, assigned in submission order.
pub type TaskId = u64;

/// Worker unit identifier, assigned in creation order.
pub type WorkerId = u64;

/// Task priority.
///
/// Recorded on every task and visible to handlers. Dispatch order is strictly
/// FIFO; priority does not reorder the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Latency-sensitive work.
    High,
    /// Must-run work.
    Critical,
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the task queue.
    Queued,
    /// Assigned to a worker, handler not yet invoked.
    Dispatched,
    /// Handler is executing.
    Running,
    /// Resolved with a value.
    Completed,
    /// Resolved with an error.
    Failed,
    /// Resolved as cancelled.
    Cancelled,
}

impl TaskState {
    /// Terminal state corresponding to a resolved outcome.
    pub fn settled<R>(result: &TaskResult<R>) -> Self {
        match result {
            Ok(_) => Self::Completed,
            Err(err) if err.is_cancelled() => Self::Cancelled,
            Err(_) => Self::Failed,
        }
    }

    /// Whether the task has been resolved.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Dispatched => "dispatched",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Per-submission options.
///
/// ```rust,ignore
/// let opts = TaskOptions::new()
///     .with_handler("thumbnail")
///     .with_signal(token.clone())
///     .with_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Default)]
pub struct TaskOptions {
    /// Named entry point; `None` selects the pool default.
    pub handler: Option<String>,
    /// External cancellation signal.
    pub signal: Option<CancelSignal>,
    /// Advisory flag that the payload owns large buffers. Payloads are
    /// always moved into the worker.
    pub transfer_hint: bool,
    /// Recorded priority.
    pub priority: Priority,
    /// Deadline relative to submission.
    pub timeout: Option<Duration>,
}

impl TaskOptions {
    /// Options selecting the default handler with no signal or deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a named entry point.
    #[must_use]
    pub fn with_handler(mut self, name: impl Into<String>) -> Self {
        self.handler = Some(name.into());
        self
    }

    /// Attach a cancellation signal (token or emitter).
    #[must_use]
    pub fn with_signal(mut self, signal: impl Into<CancelSignal>) -> Self {
        self.signal = Some(signal.into());
        self
    }

    /// Set the transfer hint.
    #[must_use]
    pub const fn with_transfer_hint(mut self, transfer: bool) -> Self {
        self.transfer_hint = transfer;
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Cancel the task if it has not resolved within `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A submitted unit of work travelling from the queue to a worker.
#[derive(Debug)]
pub(crate) struct Task<P> {
    pub id: TaskId,
    pub payload: P,
    pub handler: Option<String>,
    pub priority: Priority,
    pub transfer_hint: bool,
    pub deadline: Option<Instant>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{CancelReason, TaskError};

    #[test]
    fn test_settled_state() {
        assert_eq!(TaskState::settled::<u8>(&Ok(1)), TaskState::Completed);
        assert_eq!(
            TaskState::settled::<u8>(&Err(TaskError::Cancelled(CancelReason::Requested))),
            TaskState::Cancelled
        );
        assert_eq!(TaskState::settled::<u8>(&Err(TaskError::Shutdown)), TaskState::Failed);
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_options_builder() {
        let opts = TaskOptions::new()
            .with_handler("resize")
            .with_priority(Priority::High)
            .with_transfer_hint(true)
            .with_timeout(Duration::from_millis(250));
        assert_eq!(opts.handler.as_deref(), Some("resize"));
        assert_eq!(opts.priority, Priority::High);
        assert!(opts.transfer_hint);
        assert_eq!(opts.timeout, Some(Duration::from_millis(250)));
        assert!(opts.signal.is_none());
    }
}
