//! Shared fixtures for the integration tests: a job payload covering every
//! handler behaviour the tests need, and a module loader exporting it.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use prometheus_worker_pool::config::WorkerPoolConfig;
use prometheus_worker_pool::core::{handler_fn, HandlerTable, LoadError, PoolEvent, TaskContext};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// How long any single wait in a test may take before it is a failure.
pub const WAIT: Duration = Duration::from_secs(5);

pub type Started = mpsc::UnboundedSender<u64>;

#[derive(Debug)]
pub enum Job {
    /// Return the number.
    Echo(u64),
    /// Report `id` as started, wait for `release`, return `id`.
    Gated {
        id: u64,
        started: Started,
        release: CancellationToken,
    },
    /// Count the invocation and return the new count.
    Tally(Arc<AtomicUsize>),
    /// Fail with the message.
    Fail(&'static str),
    /// Panic inside the handler.
    Panic,
    /// Report started, then fail as soon as an interrupt arrives.
    Cooperative { started: Started },
    /// Report started, ignore interrupts, return 7 once released.
    Stubborn {
        started: Started,
        release: CancellationToken,
    },
}

async fn run_job(job: Job, ctx: TaskContext) -> anyhow::Result<u64> {
    match job {
        Job::Echo(n) => Ok(n),
        Job::Gated { id, started, release } => {
            let _ = started.send(id);
            release.cancelled().await;
            Ok(id)
        }
        Job::Tally(count) => Ok(count.fetch_add(1, Ordering::SeqCst) as u64 + 1),
        Job::Fail(message) => bail!(message),
        Job::Panic => panic!("handler exploded"),
        Job::Cooperative { started } => {
            let _ = started.send(ctx.task_id());
            ctx.cancelled().await;
            bail!("interrupted")
        }
        Job::Stubborn { started, release } => {
            let _ = started.send(ctx.task_id());
            release.cancelled().await;
            Ok(7)
        }
    }
}

/// Module with the job runner as default entry point and a `double` entry.
pub fn module() -> Result<HandlerTable<Job, u64>, LoadError> {
    Ok(HandlerTable::single(handler_fn(run_job)).with_handler(
        "double",
        handler_fn(|job: Job, _ctx: TaskContext| async move {
            match job {
                Job::Echo(n) => Ok(n * 2),
                other => bail!("double cannot run {other:?}"),
            }
        }),
    ))
}

pub fn config(min: usize, max: usize) -> WorkerPoolConfig {
    WorkerPoolConfig::new()
        .with_min_threads(min)
        .with_max_threads(max)
        .with_max_queue_depth(64)
        .with_max_concurrent_tasks_per_worker(1)
        .with_shutdown_timeout(Duration::from_secs(5))
}

pub fn gate() -> (Started, mpsc::UnboundedReceiver<u64>) {
    mpsc::unbounded_channel()
}

/// Wait for the next started notification.
pub async fn next_started(rx: &mut mpsc::UnboundedReceiver<u64>) -> u64 {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a task to start")
        .expect("started channel closed")
}

/// Wait for the first event matching `pred`.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<PoolEvent>,
    pred: impl Fn(&PoolEvent) -> bool,
) -> PoolEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `cond` until it holds or `WAIT` elapses.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
