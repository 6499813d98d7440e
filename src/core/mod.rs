//! Core scheduling abstractions: tasks, handlers, cancellation and the pool.

pub mod cancel;
pub mod error;
pub mod events;
pub mod handler;
pub(crate) mod queue;
pub mod result;
pub mod task;
pub mod worker_pool;

pub use cancel::{AbortEmitter, CancelSignal, ListenerId};
pub use error::{CancelReason, LoadError, PoolError, TaskError, TaskResult};
pub use events::PoolEvent;
pub use handler::{handler_fn, FnHandler, Handler, HandlerTable, ModuleLoader, TaskContext};
pub use result::{CancelOutcome, TaskHandle};
pub use task::{Priority, TaskId, TaskOptions, TaskState, WorkerId};
pub use worker_pool::{PoolStats, ShutdownReport, WorkerPool, WorkerSnapshot, WorkerState};
