//! # Prometheus Worker Pool
//!
//! A worker-thread task pool: submit units of work from any context and have
//! them executed on a managed set of background OS threads, with results
//! delivered through single-resolution handles.
//!
//! ## Core Problem Solved
//!
//! CPU-bound or blocking handlers must not run on the caller's async runtime,
//! and a misbehaving handler must not take the rest of the application down:
//!
//! - **Isolation**: each worker thread runs its own copy of the handler module
//! - **Backpressure**: a bounded queue rejects overflow synchronously instead of blocking
//! - **Recovery**: a crashed worker fails only its own tasks and is replaced
//! - **Cancellation**: tokens and abort emitters cancel queued or running tasks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prometheus_worker_pool::config::WorkerPoolConfig;
//! use prometheus_worker_pool::core::{
//!     handler_fn, HandlerTable, TaskContext, TaskOptions, WorkerPool,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let pool = WorkerPool::new(
//!     WorkerPoolConfig::from_env()?,
//!     || {
//!         Ok(HandlerTable::single(handler_fn(|text: String, _ctx: TaskContext| async move {
//!             Ok(text.len())
//!         }))
//!         .with_handler("words", handler_fn(|text: String, _ctx: TaskContext| async move {
//!             Ok(text.split_whitespace().count())
//!         })))
//!     },
//! )?;
//!
//! let token = CancellationToken::new();
//! let handle = pool.submit(
//!     "hello worker pool".to_string(),
//!     TaskOptions::new().with_handler("words").with_signal(token.clone()),
//! )?;
//! assert_eq!(handle.await?, 3);
//!
//! pool.shutdown(true);
//! ```
//!
//! For complete examples, see:
//! - `tests/worker_pool_test.rs` - scheduling, crash recovery and shutdown
//! - `tests/cancellation_test.rs` - cancellation races

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task model, scheduling and worker lifecycle.
pub mod core;
/// Configuration models for the pool.
pub mod config;
/// Runtime adapters used by the pool's background watchers.
pub mod runtime;
/// Shared utilities.
pub mod util;
