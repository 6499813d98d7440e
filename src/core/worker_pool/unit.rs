//! Worker unit: one OS thread with its own single-threaded tokio runtime.
//!
//! The unit loads the handler module once, reports ready, and then executes
//! assignments concurrently on its runtime until its inbox is closed. Every
//! state change is reported to the pool through `Shared`; the unit never
//! touches pool state directly.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::manager::{Outcome, Shared};
use super::registry::Assignment;
use crate::core::error::LoadError;
use crate::core::handler::{HandlerTable, TaskContext};
use crate::core::task::WorkerId;

/// Startup handshake: each initial worker reports its load result once.
pub(crate) type StartupTx = Sender<Result<WorkerId, LoadError>>;

/// Why a worker unit's thread ended.
#[derive(Debug)]
pub(crate) enum UnitExit {
    /// Inbox closed and in-flight work finished.
    Drained,
    /// Retired after the idle timeout.
    Retired,
    /// Panicked or otherwise faulted.
    Crashed(String),
    /// Module or runtime could not be set up.
    LoadFailed(LoadError),
}

/// Spawn the thread for worker `id`.
pub(crate) fn spawn_unit<P, R>(
    shared: Arc<Shared<P, R>>,
    id: WorkerId,
    inbox: mpsc::UnboundedReceiver<Assignment<P>>,
    startup: Option<StartupTx>,
) -> std::io::Result<JoinHandle<()>>
where
    P: Send + 'static,
    R: Send + 'static,
{
    let name = format!("{}-{id}", shared.config().thread_name_prefix);
    let stack_size = shared.config().thread_stack_size;
    thread::Builder::new()
        .name(name)
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id = id, "Worker thread started");
            let mut startup = startup;
            let run = AssertUnwindSafe(|| run_unit(&shared, id, inbox, &mut startup));
            let exit = panic::catch_unwind(run)
                .unwrap_or_else(|payload| UnitExit::Crashed(panic_message(payload.as_ref())));

            // A unit that never reached ready still owes its startup report.
            if let Some(tx) = startup.take() {
                let err = match &exit {
                    UnitExit::LoadFailed(err) => err.clone(),
                    UnitExit::Crashed(reason) => {
                        LoadError::failed(format!("worker crashed during startup: {reason}"))
                    }
                    UnitExit::Drained | UnitExit::Retired => {
                        LoadError::failed("worker exited during startup")
                    }
                };
                let _ = tx.send(Err(err));
            }

            shared.on_unit_exit(id, exit);
            debug!(worker_id = id, "Worker thread exiting");
        })
}

fn run_unit<P, R>(
    shared: &Arc<Shared<P, R>>,
    id: WorkerId,
    inbox: mpsc::UnboundedReceiver<Assignment<P>>,
    startup: &mut Option<StartupTx>,
) -> UnitExit
where
    P: Send + 'static,
    R: Send + 'static,
{
    // Each worker has its own single-threaded tokio runtime
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(worker_id = id, error = %e, "Failed to create worker runtime");
            return UnitExit::LoadFailed(LoadError::failed(format!("worker runtime: {e}")));
        }
    };

    let default_handler = shared.config().default_handler.as_deref();
    let table = match shared.load_module() {
        Ok(table) => match table.validate(default_handler) {
            Ok(()) => Arc::new(table),
            Err(err) => return UnitExit::LoadFailed(err),
        },
        Err(err) => return UnitExit::LoadFailed(err),
    };

    // Mark ready before the handshake so the pool is dispatchable once `new` returns.
    shared.on_unit_ready(id);
    if let Some(tx) = startup.take() {
        let _ = tx.send(Ok(id));
    }

    runtime.block_on(unit_loop(shared, id, table, inbox))
}

async fn unit_loop<P, R>(
    shared: &Arc<Shared<P, R>>,
    id: WorkerId,
    table: Arc<HandlerTable<P, R>>,
    mut inbox: mpsc::UnboundedReceiver<Assignment<P>>,
) -> UnitExit
where
    P: Send + 'static,
    R: Send + 'static,
{
    let idle_timeout = shared.config().idle_timeout();
    let mut running = JoinSet::new();
    let mut open = true;
    // Disarmed when the pool refuses retirement; re-armed by the next assignment.
    let mut retire_armed = true;

    loop {
        if !open && running.is_empty() {
            return UnitExit::Drained;
        }

        tokio::select! {
            received = inbox.recv(), if open => match received {
                Some(assignment) => {
                    retire_armed = true;
                    running.spawn(execute(Arc::clone(shared), id, Arc::clone(&table), assignment));
                }
                None => {
                    debug!(
                        worker_id = id,
                        in_flight = running.len(),
                        "Worker inbox closed, draining"
                    );
                    open = false;
                }
            },
            Some(joined) = running.join_next(), if !running.is_empty() => {
                if let Err(err) = joined {
                    if err.is_panic() {
                        let reason = panic_message(err.into_panic().as_ref());
                        warn!(
                            worker_id = id,
                            reason = %reason,
                            "Handler panicked; worker is crashing"
                        );
                        return UnitExit::Crashed(reason);
                    }
                }
            },
            () = tokio::time::sleep(idle_timeout),
                if open && retire_armed && running.is_empty() =>
            {
                if shared.try_retire(id) {
                    return UnitExit::Retired;
                }
                retire_armed = false;
            },
        }
    }
}

/// Run one assignment and report its outcome.
async fn execute<P, R>(
    shared: Arc<Shared<P, R>>,
    worker_id: WorkerId,
    table: Arc<HandlerTable<P, R>>,
    assignment: Assignment<P>,
) where
    P: Send + 'static,
    R: Send + 'static,
{
    let Assignment { task, interrupt } = assignment;
    let task_id = task.id;
    let name = task.handler.or_else(|| shared.config().default_handler.clone());

    let Some(handler) = table.resolve(name.as_deref(), None) else {
        let name = name.unwrap_or_else(|| "<default>".to_string());
        shared.report(worker_id, task_id, Outcome::UnknownHandler(name));
        return;
    };

    if !shared.mark_running(task_id) {
        shared.report(worker_id, task_id, Outcome::Interrupted);
        return;
    }

    debug!(
        worker_id,
        task_id,
        handler = name.as_deref().unwrap_or("<default>"),
        "Worker executing task"
    );
    let ctx = TaskContext::new(
        task_id,
        worker_id,
        name,
        task.priority,
        task.transfer_hint,
        interrupt,
    );
    let result = handler.call(task.payload, ctx).await;
    shared.report(worker_id, task_id, Outcome::Finished(result));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}
