//! Result channel: the single-resolution completion handle for a task.
//!
//! The pool keeps the [`ResultSlot`] and the caller keeps the [`TaskHandle`].
//! A slot can be resolved once; later attempts return `false` and change
//! nothing, so whichever of completion, failure or cancellation lands first
//! is the outcome the caller observes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;

use super::error::{CancelReason, PoolError, TaskError, TaskResult};
use super::task::TaskId;

/// What a cancellation request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was still queued and has been resolved as cancelled.
    Cancelled,
    /// The task is in flight; an interruption was delivered to its worker.
    InterruptRequested,
    /// The task had already resolved; nothing changed.
    AlreadySettled,
}

/// Cancellation entry point the handle uses to reach its pool.
pub(crate) trait TaskCanceller: Send + Sync {
    fn cancel(&self, id: TaskId, reason: CancelReason) -> CancelOutcome;
}

/// Pool-side half of the result channel.
pub(crate) struct ResultSlot<R> {
    tx: Option<oneshot::Sender<TaskResult<R>>>,
}

impl<R> ResultSlot<R> {
    /// Deliver the outcome. Returns `false` if the slot was already resolved.
    pub fn resolve(&mut self, result: TaskResult<R>) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // The caller may have dropped its handle; the outcome still counts.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub const fn is_resolved(&self) -> bool {
        self.tx.is_none()
    }
}

/// Create a connected slot/handle pair.
pub(crate) fn channel<R>(
    id: TaskId,
    canceller: Weak<dyn TaskCanceller>,
) -> (ResultSlot<R>, TaskHandle<R>) {
    let (tx, rx) = oneshot::channel();
    (
        ResultSlot { tx: Some(tx) },
        TaskHandle {
            id,
            rx: Some(rx),
            canceller,
        },
    )
}

/// Caller-side handle for a submitted task.
///
/// Await it to get the task's outcome. Dropping the handle does not cancel
/// the task.
pub struct TaskHandle<R> {
    id: TaskId,
    rx: Option<oneshot::Receiver<TaskResult<R>>>,
    canceller: Weak<dyn TaskCanceller>,
}

impl<R> TaskHandle<R> {
    /// Identifier of the task.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Request cancellation of the task.
    ///
    /// Queued tasks are resolved as cancelled immediately. In-flight tasks
    /// receive a cooperative interruption. Resolved tasks are unaffected.
    pub fn cancel(&self) -> CancelOutcome {
        self.canceller
            .upgrade()
            .map_or(CancelOutcome::AlreadySettled, |pool| {
                pool.cancel(self.id, CancelReason::Requested)
            })
    }

    /// Wait for the outcome for at most `timeout`.
    ///
    /// On timeout the handle stays usable and can be awaited again.
    ///
    /// # Errors
    ///
    /// - `PoolError::Timeout` if the task did not resolve in time
    /// - `PoolError::ResultConsumed` if the outcome was already taken
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<TaskResult<R>, PoolError> {
        let rx = self.rx.as_mut().ok_or(PoolError::ResultConsumed)?;
        let outcome = tokio::time::timeout(timeout, rx).await;
        match outcome {
            Ok(received) => {
                self.rx = None;
                Ok(received.unwrap_or(Err(TaskError::Shutdown)))
            }
            Err(_) => Err(PoolError::Timeout),
        }
    }

    /// Block the current thread until the task resolves.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Returns the task's failure outcome.
    pub fn blocking_wait(mut self) -> TaskResult<R> {
        match self.rx.take() {
            Some(rx) => rx.blocking_recv().unwrap_or(Err(TaskError::Shutdown)),
            None => Err(TaskError::Shutdown),
        }
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = TaskResult<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(Err(TaskError::Shutdown));
        };
        let polled = Pin::new(rx).poll(cx);
        match polled {
            Poll::Ready(received) => {
                this.rx = None;
                // A dropped sender means the pool went away without resolving.
                Poll::Ready(received.unwrap_or(Err(TaskError::Shutdown)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<R> std::fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("consumed", &self.rx.is_none())
            .finish()
    }
}
