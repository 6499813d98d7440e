//! Handler module contract: entry points, handler tables and module loaders.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::LoadError;
use super::task::{Priority, TaskId, WorkerId};

/// An entry point that executes a task payload.
///
/// Handlers run on a worker unit's own single-threaded tokio runtime, so
/// they may await freely without blocking the caller's runtime.
///
/// Returning `Err` fails the task with a handler error. Panicking is treated
/// as a fault of the whole worker unit: every task assigned to it fails with
/// a worker-crash error and the unit is replaced.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_worker_pool::core::{Handler, TaskContext};
///
/// struct Resize;
///
/// #[async_trait]
/// impl Handler<Image, Thumbnail> for Resize {
///     async fn call(&self, image: Image, ctx: TaskContext) -> anyhow::Result<Thumbnail> {
///         if ctx.is_cancelled() {
///             anyhow::bail!("interrupted");
///         }
///         Ok(image.thumbnail(128))
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<P, R>: Send + Sync + 'static
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Execute `payload`.
    async fn call(&self, payload: P, ctx: TaskContext) -> anyhow::Result<R>;
}

/// Adapter turning an async closure into a [`Handler`].
pub struct FnHandler<F>(F);

/// Wrap an async closure as a handler.
pub fn handler_fn<P, R, F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(P, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<P, R, F, Fut> Handler<P, R> for FnHandler<F>
where
    P: Send + 'static,
    R: Send + 'static,
    F: Fn(P, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    async fn call(&self, payload: P, ctx: TaskContext) -> anyhow::Result<R> {
        (self.0)(payload, ctx).await
    }
}

/// Resolved entry points of a loaded module.
pub struct HandlerTable<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    default: Option<Arc<dyn Handler<P, R>>>,
    named: HashMap<String, Arc<dyn Handler<P, R>>>,
}

impl<P, R> HandlerTable<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default: None,
            named: HashMap::new(),
        }
    }

    /// A table exposing a single default entry point.
    #[must_use]
    pub fn single(handler: impl Handler<P, R>) -> Self {
        Self::new().with_default(handler)
    }

    /// Set the default entry point.
    #[must_use]
    pub fn with_default(mut self, handler: impl Handler<P, R>) -> Self {
        self.default = Some(Arc::new(handler));
        self
    }

    /// Add a named entry point.
    #[must_use]
    pub fn with_handler(mut self, name: impl Into<String>, handler: impl Handler<P, R>) -> Self {
        self.named.insert(name.into(), Arc::new(handler));
        self
    }

    /// Find the entry point for a task.
    ///
    /// An explicit `name` wins; otherwise `default_name` (the pool's
    /// configured default) and finally the table's default entry point.
    #[must_use]
    pub fn resolve(
        &self,
        name: Option<&str>,
        default_name: Option<&str>,
    ) -> Option<Arc<dyn Handler<P, R>>> {
        match name.or(default_name) {
            Some(name) => self.named.get(name).cloned(),
            None => self.default.clone(),
        }
    }

    /// Whether a named entry point exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Names of the exported entry points, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.named.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check the table against the pool's default handler requirement.
    ///
    /// # Errors
    ///
    /// - `LoadError::NoEntryPoints` if nothing is exported
    /// - `LoadError::MissingHandler` if `default_name` is not exported
    pub fn validate(&self, default_name: Option<&str>) -> Result<(), LoadError> {
        if self.default.is_none() && self.named.is_empty() {
            return Err(LoadError::NoEntryPoints);
        }
        if let Some(name) = default_name {
            if !self.contains(name) {
                return Err(LoadError::MissingHandler(name.to_string()));
            }
        }
        Ok(())
    }
}

impl<P, R> Default for HandlerTable<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P, R> fmt::Debug for HandlerTable<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.named.keys().collect();
        names.sort_unstable();
        f.debug_struct("HandlerTable")
            .field("default", &self.default.is_some())
            .field("named", &names)
            .finish()
    }
}

/// Resolves the handler module once per worker unit, on the worker's thread.
///
/// Closures returning a [`HandlerTable`] implement this trait.
pub trait ModuleLoader<P, R>: Send + Sync + 'static
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Load the module and resolve its entry points.
    ///
    /// # Errors
    ///
    /// A `LoadError` at pool construction is fatal to the pool.
    fn load(&self) -> Result<HandlerTable<P, R>, LoadError>;
}

impl<P, R, F> ModuleLoader<P, R> for F
where
    P: Send + 'static,
    R: Send + 'static,
    F: Fn() -> Result<HandlerTable<P, R>, LoadError> + Send + Sync + 'static,
{
    fn load(&self) -> Result<HandlerTable<P, R>, LoadError> {
        self()
    }
}

/// Per-invocation context handed to a handler.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    worker_id: WorkerId,
    handler: Option<String>,
    priority: Priority,
    transfer_hint: bool,
    interrupt: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: TaskId,
        worker_id: WorkerId,
        handler: Option<String>,
        priority: Priority,
        transfer_hint: bool,
        interrupt: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            worker_id,
            handler,
            priority,
            transfer_hint,
            interrupt,
        }
    }

    /// Identifier of the task being executed.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Worker unit executing the task.
    #[must_use]
    pub const fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Name of the entry point, `None` for the module default.
    #[must_use]
    pub fn handler_name(&self) -> Option<&str> {
        self.handler.as_deref()
    }

    /// Priority recorded at submission.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Transfer hint recorded at submission.
    #[must_use]
    pub const fn transfer_hint(&self) -> bool {
        self.transfer_hint
    }

    /// Whether an interruption has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Completes when an interruption is requested.
    pub async fn cancelled(&self) {
        self.interrupt.cancelled().await;
    }

    /// The interruption token itself, for handing to nested work.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }
}
