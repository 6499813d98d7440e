//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper installs a default env-based subscriber if none is set.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Like [`init_tracing`], but falls back to `directive` when `RUST_LOG` is
/// unset or invalid, e.g. `"prometheus_worker_pool=debug"`.
pub fn init_tracing_with_default(directive: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
