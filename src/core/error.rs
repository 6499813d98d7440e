//! Error types for pool construction, submission and task outcomes.

use std::fmt;

use thiserror::Error;

use super::task::WorkerId;

/// Errors returned synchronously by the pool.
///
/// A `PoolError` from `submit` means no task was created; nothing will ever
/// be delivered for it.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The task queue is at capacity.
    #[error("task queue is full ({depth}/{max_depth})")]
    QueueFull {
        /// Queue depth at the moment of rejection.
        depth: usize,
        /// Configured maximum queue depth.
        max_depth: usize,
    },
    /// The pool is shutting down or has been shut down.
    #[error("pool has been shut down")]
    PoolShutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The handler module could not be loaded at startup.
    #[error("module load failed: {0}")]
    ModuleLoad(#[from] LoadError),
    /// An OS thread for a worker could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    /// Waiting for a result timed out.
    #[error("operation timed out")]
    Timeout,
    /// The result of a handle was already taken.
    #[error("result already consumed")]
    ResultConsumed,
}

/// Failure to resolve a handler module into a table of entry points.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The module exposes neither a default nor a named entry point.
    #[error("module exposes no entry points")]
    NoEntryPoints,
    /// A handler required by the pool configuration is missing.
    #[error("module does not export handler `{0}`")]
    MissingHandler(String),
    /// The loader itself reported a failure.
    #[error("{0}")]
    Failed(String),
}

impl LoadError {
    /// Build a loader failure from any displayable error.
    pub fn failed(err: impl fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Why a task was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller's cancellation signal fired or `cancel()` was called.
    Requested,
    /// The task's deadline elapsed.
    DeadlineExceeded,
    /// The pool was shut down non-gracefully while the task was in flight.
    Shutdown,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "cancellation requested"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::Shutdown => write!(f, "pool shut down"),
        }
    }
}

/// Failure outcome delivered through a task's result channel.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The handler returned an error; the original error is preserved.
    #[error("handler failed: {0:#}")]
    Handler(anyhow::Error),
    /// The worker executing the task terminated unexpectedly.
    #[error("worker {worker_id} crashed: {reason}")]
    WorkerCrashed {
        /// Worker that crashed.
        worker_id: WorkerId,
        /// Panic message or exit description.
        reason: String,
    },
    /// The task was cancelled before it produced a result.
    #[error("task cancelled: {0}")]
    Cancelled(CancelReason),
    /// The requested entry point is not exported by the loaded module.
    #[error("unknown handler `{0}`")]
    UnknownHandler(String),
    /// The task was still queued when the pool shut down.
    #[error("pool shut down before the task was dispatched")]
    Shutdown,
    /// No worker was live and a new one failed to load the module.
    #[error("no worker could load the module: {0}")]
    ModuleLoad(LoadError),
}

impl TaskError {
    /// Whether this outcome is a cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Whether the task failed because its worker crashed.
    #[must_use]
    pub const fn is_worker_crash(&self) -> bool {
        matches!(self, Self::WorkerCrashed { .. })
    }

    /// The error returned by the handler, if that is what failed.
    #[must_use]
    pub const fn handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Handler(err) => Some(err),
            _ => None,
        }
    }
}

/// Outcome delivered to the caller for a single task.
pub type TaskResult<R> = Result<R, TaskError>;
