//! Aggregate pool events for the embedding application.

use serde::Serialize;

use super::task::WorkerId;
use super::worker_pool::{ShutdownReport, WorkerSnapshot};

/// Event broadcast by a pool. Obtain a receiver with `WorkerPool::subscribe`.
///
/// Delivery is best-effort: a receiver that falls behind by more than the
/// configured `event_capacity` observes a lag error and skips ahead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    /// A worker loaded its module and is ready for tasks.
    WorkerStarted {
        /// The new worker.
        worker_id: WorkerId,
    },
    /// A worker exited. The snapshot is taken at exit.
    WorkerExited(WorkerSnapshot),
    /// A worker crashed or failed to load its module.
    WorkerError {
        /// The failed worker.
        worker_id: WorkerId,
        /// Panic message or load error.
        reason: String,
        /// Tasks that failed with it.
        failed_tasks: usize,
    },
    /// The task queue became empty.
    QueueDrained,
    /// A submission was rejected because the queue was full.
    Saturated {
        /// Queue depth at rejection.
        depth: usize,
        /// Configured maximum.
        max_depth: usize,
    },
    /// Shutdown finished; every worker has exited or been detached.
    ShutdownComplete(ShutdownReport),
}
