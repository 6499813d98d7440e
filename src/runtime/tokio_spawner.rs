//! Tokio runtime used for watching cancellation tokens and task deadlines.

use std::future::Future;

use tokio::runtime::{Handle, Runtime};
use tokio::task::AbortHandle;

/// Owns a small multi-threaded tokio runtime and spawns futures onto it.
///
/// Worker units never run on this runtime; it only hosts the lightweight
/// watchers that turn token cancellation and deadline expiry into pool
/// cancellation requests.
pub struct TokioSpawner {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl TokioSpawner {
    /// Create a spawner backed by a new runtime with `worker_threads` threads
    /// named `{name}-watch`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the runtime cannot be built.
    pub fn with_worker_threads(worker_threads: usize, name: &str) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name(format!("{name}-watch"))
            .enable_time()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Spawn a future, returning a handle that can abort it.
    pub fn spawn<F>(&self, fut: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut).abort_handle()
    }
}

impl Drop for TokioSpawner {
    fn drop(&mut self) {
        // The last pool reference may be released from inside a worker's
        // runtime, where a blocking runtime drop would panic.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TokioSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioSpawner")
            .field("running", &self.runtime.is_some())
            .finish()
    }
}
