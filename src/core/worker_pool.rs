//! Worker pool with dedicated worker threads, each running its own loaded
//! handler module.
//!
//! The pool owns a registry of worker units and a bounded FIFO task queue,
//! both guarded by a single lock. Every dispatch decision is made under that
//! lock, so concurrent submissions and worker completions can never race on
//! queue order or assign a task twice.
//!
//! # Key Features
//!
//! - **Least-loaded dispatch**: fewest assigned tasks wins, oldest worker on ties
//! - **Elastic population**: grows under queue pressure, retires idle workers
//! - **Crash isolation**: a faulting worker fails only its own tasks and is replaced
//! - **Cancellation**: queued tasks are removed, in-flight tasks are interrupted
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_worker_pool::config::WorkerPoolConfig;
//! use prometheus_worker_pool::core::{handler_fn, HandlerTable, TaskOptions, WorkerPool};
//!
//! let pool = WorkerPool::new(
//!     WorkerPoolConfig::new().with_min_threads(1).with_max_threads(4),
//!     || Ok(HandlerTable::single(handler_fn(|n: u64, _ctx| async move { Ok(n * 2) }))),
//! )?;
//!
//! let handle = pool.submit(21, TaskOptions::new())?;
//! assert_eq!(handle.await?, 42);
//! pool.shutdown(true);
//! ```

mod manager;
mod registry;
mod unit;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::task::WorkerId;

pub use manager::WorkerPool;

/// Lifecycle state of a worker unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Thread spawned, module not yet loaded.
    Starting,
    /// Ready with no assigned tasks.
    Idle,
    /// Ready with this many assigned tasks.
    Busy(usize),
    /// No longer accepting assignments; finishing in-flight work.
    Draining,
    /// Exited.
    Terminated,
}

impl WorkerState {
    /// Whether the worker can be handed new tasks.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Idle | Self::Busy(_))
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Idle => write!(f, "idle"),
            Self::Busy(n) => write!(f, "busy({n})"),
            Self::Draining => write!(f, "draining"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Point-in-time view of one worker unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    /// Worker identifier (creation order).
    pub id: WorkerId,
    /// Current lifecycle state.
    pub state: WorkerState,
    /// Tasks currently assigned.
    pub assigned: usize,
    /// Tasks this worker completed successfully.
    pub completed: u64,
    /// Handler errors and faults observed on this worker.
    pub errors: u64,
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Live worker units, including starting and draining ones.
    pub live_workers: usize,
    /// Workers still loading their module.
    pub starting_workers: usize,
    /// Ready workers with no assigned tasks.
    pub idle_workers: usize,
    /// Ready workers with at least one assigned task.
    pub busy_workers: usize,
    /// Workers finishing in-flight work before exiting.
    pub draining_workers: usize,
    /// Tasks waiting in the queue.
    pub queued_tasks: usize,
    /// Tasks dispatched to a worker and not yet resolved.
    pub in_flight_tasks: usize,
    /// Total tasks accepted.
    pub submitted_tasks: u64,
    /// Total tasks resolved with a value.
    pub completed_tasks: u64,
    /// Total tasks resolved with an error.
    pub failed_tasks: u64,
    /// Total tasks resolved as cancelled.
    pub cancelled_tasks: u64,
    /// Total submissions rejected because the queue was full.
    pub rejected_tasks: u64,
    /// Total worker crashes.
    pub worker_crashes: u64,
}

/// Internal lifetime counters (lock-free).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub cancelled_tasks: AtomicU64,
    pub rejected_tasks: AtomicU64,
    pub worker_crashes: AtomicU64,
}

impl PoolCounters {
    /// Statistics with the lifetime counters filled in; gauges are left at zero.
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            cancelled_tasks: self.cancelled_tasks.load(Ordering::Relaxed),
            rejected_tasks: self.rejected_tasks.load(Ordering::Relaxed),
            worker_crashes: self.worker_crashes.load(Ordering::Relaxed),
            ..PoolStats::default()
        }
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What a call to `shutdown` did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Whether in-flight tasks were allowed to finish.
    pub graceful: bool,
    /// Queued tasks rejected with a shutdown error.
    pub rejected_tasks: usize,
    /// In-flight tasks resolved as cancelled (non-graceful only).
    pub interrupted_tasks: usize,
    /// Workers that did not exit within the shutdown timeout and were detached.
    pub detached_workers: usize,
}
