//! Worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable prefix read by [`WorkerPoolConfig::from_env`].
pub const ENV_PREFIX: &str = "WORKER_POOL_";

/// Configuration for a [`WorkerPool`](crate::core::WorkerPool).
///
/// Every field has a default derived from the host's CPU count, so a JSON
/// document or the environment only needs to name the values it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Minimum number of live worker units.
    pub min_threads: usize,
    /// Maximum number of live worker units.
    pub max_threads: usize,
    /// How long a worker may sit without assignments before it is retired
    /// (only while more than `min_threads` are live).
    pub idle_timeout_ms: u64,
    /// Maximum number of tasks waiting for a worker. Zero disables queueing.
    pub max_queue_depth: usize,
    /// Maximum number of tasks assigned to one worker at a time.
    pub max_concurrent_tasks_per_worker: usize,
    /// Entry point used for tasks that do not name one. `None` uses the
    /// module's default entry point.
    pub default_handler: Option<String>,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Stack size for worker threads in bytes.
    pub thread_stack_size: usize,
    /// How long a non-graceful `shutdown` waits for workers before
    /// detaching them. Graceful shutdown always waits for every worker.
    pub shutdown_timeout_ms: u64,
    /// Buffer size of the pool event channel.
    pub event_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        let min_threads = (cpus / 2).max(1);
        let max_threads = (cpus * 3 / 2).max(min_threads);
        Self {
            min_threads,
            max_threads,
            idle_timeout_ms: 60_000,
            max_queue_depth: max_threads * max_threads,
            max_concurrent_tasks_per_worker: 1,
            default_handler: None,
            thread_name_prefix: "pool-worker".into(),
            thread_stack_size: 2 * 1024 * 1024,
            shutdown_timeout_ms: 5_000,
            event_capacity: 256,
        }
    }
}

impl WorkerPoolConfig {
    /// Configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of workers.
    #[must_use]
    pub const fn with_min_threads(mut self, min_threads: usize) -> Self {
        self.min_threads = min_threads;
        self
    }

    /// Set the maximum number of workers.
    #[must_use]
    pub const fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set both bounds to `count`, giving a fixed-size pool.
    #[must_use]
    pub const fn with_fixed_threads(self, count: usize) -> Self {
        self.with_min_threads(count).with_max_threads(count)
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Set the maximum queue depth.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Set the per-worker concurrency limit.
    #[must_use]
    pub const fn with_max_concurrent_tasks_per_worker(mut self, limit: usize) -> Self {
        self.max_concurrent_tasks_per_worker = limit;
        self
    }

    /// Set the default entry point name.
    #[must_use]
    pub fn with_default_handler(mut self, name: impl Into<String>) -> Self {
        self.default_handler = Some(name.into());
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set how long a non-graceful shutdown waits for workers to exit.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Shutdown timeout as a `Duration`.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_threads == 0 {
            return Err("max_threads must be greater than 0".into());
        }
        if self.min_threads > self.max_threads {
            return Err(format!(
                "min_threads ({}) cannot be larger than max_threads ({})",
                self.min_threads, self.max_threads
            ));
        }
        if self.max_concurrent_tasks_per_worker == 0 {
            return Err("max_concurrent_tasks_per_worker must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        if self.event_capacity == 0 {
            return Err("event_capacity must be greater than 0".into());
        }
        if self.thread_name_prefix.contains('\0') {
            return Err("thread_name_prefix must not contain null bytes".into());
        }
        if matches!(self.default_handler.as_deref(), Some("")) {
            return Err("default_handler must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `WORKER_POOL_*` environment variables,
    /// loading a `.env` file first if one exists.
    ///
    /// Recognised variables: `MIN_THREADS`, `MAX_THREADS`, `IDLE_TIMEOUT_MS`,
    /// `MAX_QUEUE_DEPTH`, `MAX_CONCURRENT_TASKS_PER_WORKER`,
    /// `DEFAULT_HANDLER`, `THREAD_NAME_PREFIX`, `SHUTDOWN_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or the
    /// validation failure.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is fine; the process environment still applies.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Build configuration from an arbitrary key lookup (keys without prefix).
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            fallback: T,
        ) -> Result<T, String> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| format!("{ENV_PREFIX}{key}: cannot parse `{raw}`")),
                None => Ok(fallback),
            }
        }

        let defaults = Self::default();
        let max_threads = parsed(&lookup, "MAX_THREADS", defaults.max_threads)?;
        let cfg = Self {
            min_threads: parsed(&lookup, "MIN_THREADS", defaults.min_threads.min(max_threads))?,
            max_threads,
            idle_timeout_ms: parsed(&lookup, "IDLE_TIMEOUT_MS", defaults.idle_timeout_ms)?,
            max_queue_depth: parsed(&lookup, "MAX_QUEUE_DEPTH", defaults.max_queue_depth)?,
            max_concurrent_tasks_per_worker: parsed(
                &lookup,
                "MAX_CONCURRENT_TASKS_PER_WORKER",
                defaults.max_concurrent_tasks_per_worker,
            )?,
            default_handler: lookup("DEFAULT_HANDLER").filter(|name| !name.is_empty()),
            thread_name_prefix: lookup("THREAD_NAME_PREFIX").unwrap_or(defaults.thread_name_prefix),
            shutdown_timeout_ms: parsed(
                &lookup,
                "SHUTDOWN_TIMEOUT_MS",
                defaults.shutdown_timeout_ms,
            )?,
            ..defaults
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Milliseconds in `timeout`, clamped to `u64::MAX`.
fn saturating_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = WorkerPoolConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.min_threads >= 1);
        assert!(cfg.max_threads >= cfg.min_threads);
        assert_eq!(cfg.max_queue_depth, cfg.max_threads * cfg.max_threads);
        assert_eq!(cfg.max_concurrent_tasks_per_worker, 1);
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MIN_THREADS", "2"),
            ("MAX_THREADS", "6"),
            ("IDLE_TIMEOUT_MS", "250"),
            ("DEFAULT_HANDLER", "resize"),
        ]
        .into_iter()
        .collect();

        let cfg =
            WorkerPoolConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).unwrap();
        assert_eq!(cfg.min_threads, 2);
        assert_eq!(cfg.max_threads, 6);
        assert_eq!(cfg.idle_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.default_handler.as_deref(), Some("resize"));
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err =
            WorkerPoolConfig::from_lookup(|key| (key == "MAX_THREADS").then(|| "many".to_string()))
                .unwrap_err();
        assert!(err.contains("WORKER_POOL_MAX_THREADS"));
    }

    #[test]
    fn test_huge_timeouts_saturate() {
        let cfg = WorkerPoolConfig::new()
            .with_idle_timeout(Duration::MAX)
            .with_shutdown_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(cfg.idle_timeout_ms, u64::MAX);
        assert_eq!(cfg.shutdown_timeout_ms, u64::MAX);

        let cfg = WorkerPoolConfig::new().with_idle_timeout(Duration::from_micros(1_500));
        assert_eq!(cfg.idle_timeout_ms, 1);
    }
}
