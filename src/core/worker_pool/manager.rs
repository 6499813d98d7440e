//! Pool manager: worker registry, task queue, dispatch and lifecycle.
//!
//! All mutable pool state lives in one `PoolState` behind one
//! `parking_lot::Mutex`. Submissions, worker reports, cancellation watchers
//! and idle timers all go through it, and every path that can free capacity
//! or add work ends in `Shared::dispatch`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::registry::{self, Assignment, WorkerRecord};
use super::unit::{self, StartupTx, UnitExit};
use super::{PoolCounters, PoolStats, ShutdownReport, WorkerSnapshot, WorkerState};
use crate::config::WorkerPoolConfig;
use crate::core::cancel::{CancelSignal, Registration};
use crate::core::error::{CancelReason, LoadError, PoolError, TaskError, TaskResult};
use crate::core::events::PoolEvent;
use crate::core::handler::{HandlerTable, ModuleLoader};
use crate::core::queue::TaskQueue;
use crate::core::result::{self, CancelOutcome, ResultSlot, TaskCanceller, TaskHandle};
use crate::core::task::{Task, TaskId, TaskOptions, TaskState, WorkerId};
use crate::runtime::TokioSpawner;

/// How an assignment ended, as reported by its worker.
pub(crate) enum Outcome<R> {
    /// The handler returned.
    Finished(anyhow::Result<R>),
    /// Interruption arrived before the handler was invoked.
    Interrupted,
    /// The requested entry point does not exist.
    UnknownHandler(String),
}

/// Pool-side record of an unresolved task.
struct TaskEntry<R> {
    state: TaskState,
    slot: ResultSlot<R>,
    worker: Option<WorkerId>,
    interrupt: CancellationToken,
    registrations: Vec<Registration>,
    cancel_reason: Option<CancelReason>,
}

struct PoolState<P, R> {
    queue: TaskQueue<P>,
    tasks: HashMap<TaskId, TaskEntry<R>>,
    workers: BTreeMap<WorkerId, WorkerRecord<P>>,
    next_task_id: TaskId,
    next_worker_id: WorkerId,
    shutting_down: bool,
    /// Set by a module load failure after startup. Blocks growth until a
    /// worker loads successfully or a submission finds no live workers.
    growth_blocked: Option<LoadError>,
    exited_threads: Vec<JoinHandle<()>>,
    report: Option<ShutdownReport>,
}

impl<P, R> PoolState<P, R> {
    /// Workers that count towards `min_threads`.
    fn active_workers(&self) -> usize {
        self.workers
            .values()
            .filter(|w| w.state != WorkerState::Draining)
            .count()
    }

    /// Send `task` to `worker_id`, handing it back if the worker's inbox is closed.
    fn assign(&mut self, worker_id: WorkerId, task: Task<P>) -> Result<(), Task<P>> {
        let task_id = task.id;
        let Some(entry) = self.tasks.get_mut(&task_id) else {
            // Resolved while queued; nothing left to run.
            return Ok(());
        };
        let Some(worker) = self.workers.get_mut(&worker_id) else {
            return Err(task);
        };
        let Some(inbox) = worker.inbox.as_ref() else {
            return Err(task);
        };

        let assignment = Assignment {
            task,
            interrupt: entry.interrupt.clone(),
        };
        match inbox.send(assignment) {
            Ok(()) => {
                worker.assigned.insert(task_id);
                worker.refresh_state();
                entry.state = TaskState::Dispatched;
                entry.worker = Some(worker_id);
                debug!(task_id, worker_id, "Task dispatched");
                Ok(())
            }
            Err(mpsc::error::SendError(bounced)) => {
                // The unit is on its way out; its exit report will follow.
                worker.close();
                Err(bounced.task)
            }
        }
    }
}

/// State shared between the pool handle, worker threads and watchers.
pub(crate) struct Shared<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    pool_id: Uuid,
    config: WorkerPoolConfig,
    loader: Box<dyn ModuleLoader<P, R>>,
    state: Mutex<PoolState<P, R>>,
    /// Signalled whenever a worker leaves the registry.
    exited: Condvar,
    counters: PoolCounters,
    events: broadcast::Sender<PoolEvent>,
    watcher: TokioSpawner,
    this: Weak<Self>,
}

impl<P, R> Shared<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn load_module(&self) -> Result<HandlerTable<P, R>, LoadError> {
        self.loader.load()
    }

    fn emit(&self, event: PoolEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn canceller(&self) -> Weak<dyn TaskCanceller> {
        let weak: Weak<dyn TaskCanceller> = self.this.clone();
        weak
    }

    /// Resolve a removed entry, update counters and release its watchers.
    fn settle(&self, task_id: TaskId, entry: TaskEntry<R>, result: TaskResult<R>) {
        let outcome = TaskState::settled(&result);
        let counter = match outcome {
            TaskState::Completed => &self.counters.completed_tasks,
            TaskState::Cancelled => &self.counters.cancelled_tasks,
            _ => &self.counters.failed_tasks,
        };
        PoolCounters::bump(counter);

        match &result {
            Err(
                err @ (TaskError::WorkerCrashed { .. }
                | TaskError::UnknownHandler(_)
                | TaskError::ModuleLoad(_)),
            ) => {
                warn!(task_id, worker_id = ?entry.worker, error = %err, "Task failed");
            }
            _ => debug!(task_id, state = %outcome, "Task settled"),
        }

        let TaskEntry {
            mut slot,
            registrations,
            ..
        } = entry;
        for registration in registrations {
            registration.release();
        }
        slot.resolve(result);
    }

    /// Assign queued tasks to workers, then grow the pool if tasks remain.
    fn dispatch(&self, state: &mut PoolState<P, R>) {
        let had_queue = !state.queue.is_empty();
        let limit = self.config.max_concurrent_tasks_per_worker;

        while !state.queue.is_empty() {
            let Some(worker_id) = registry::select_least_loaded(&state.workers, limit) else {
                break;
            };
            let Some(task) = state.queue.pop() else {
                break;
            };

            if task.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
                if let Some(entry) = state.tasks.remove(&task.id) {
                    let expired = TaskError::Cancelled(CancelReason::DeadlineExceeded);
                    self.settle(task.id, entry, Err(expired));
                }
                continue;
            }

            if let Err(task) = state.assign(worker_id, task) {
                state.queue.push(task);
            }
        }

        self.grow(state);
        self.fail_stranded(state);

        if had_queue && state.queue.is_empty() {
            debug!("Task queue drained");
            self.emit(PoolEvent::QueueDrained);
        }
    }

    /// Start workers while the queue holds more than starting workers will absorb.
    fn grow(&self, state: &mut PoolState<P, R>) {
        if state.shutting_down || state.growth_blocked.is_some() {
            return;
        }
        let limit = self.config.max_concurrent_tasks_per_worker;
        loop {
            let starting = state
                .workers
                .values()
                .filter(|w| w.state == WorkerState::Starting)
                .count();
            if state.queue.len() <= starting * limit
                || state.workers.len() >= self.config.max_threads
            {
                return;
            }
            debug!(queued = state.queue.len(), live = state.workers.len(), "Growing pool");
            if let Err(err) = self.spawn_worker(state, None) {
                error!(error = %err, "Failed to grow pool");
                return;
            }
        }
    }

    /// Keep `min_threads` workers alive.
    fn ensure_min(&self, state: &mut PoolState<P, R>) {
        while !state.shutting_down
            && state.growth_blocked.is_none()
            && state.active_workers() < self.config.min_threads
            && state.workers.len() < self.config.max_threads
        {
            if let Err(err) = self.spawn_worker(state, None) {
                error!(error = %err, "Failed to restore minimum worker count");
                return;
            }
        }
    }

    /// With no workers left and growth blocked, queued tasks can never run.
    fn fail_stranded(&self, state: &mut PoolState<P, R>) {
        if !state.workers.is_empty() || state.queue.is_empty() {
            return;
        }
        let Some(err) = state.growth_blocked.clone() else {
            return;
        };
        warn!(
            queued = state.queue.len(),
            error = %err,
            "No workers can load the module; failing queued tasks"
        );
        for task in state.queue.drain() {
            if let Some(entry) = state.tasks.remove(&task.id) {
                self.settle(task.id, entry, Err(TaskError::ModuleLoad(err.clone())));
            }
        }
    }

    fn spawn_worker(
        &self,
        state: &mut PoolState<P, R>,
        startup: Option<StartupTx>,
    ) -> Result<WorkerId, PoolError> {
        let shared = self.this.upgrade().ok_or(PoolError::PoolShutdown)?;
        let id = state.next_worker_id;
        state.next_worker_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        let thread = unit::spawn_unit(shared, id, rx, startup).map_err(PoolError::WorkerSpawn)?;
        let mut record = WorkerRecord::starting(tx);
        record.thread = Some(thread);
        state.workers.insert(id, record);
        debug!(worker_id = id, live = state.workers.len(), "Worker spawned");
        Ok(id)
    }

    pub fn on_unit_ready(&self, id: WorkerId) {
        let mut state = self.state.lock();
        let Some(worker) = state.workers.get_mut(&id) else {
            return;
        };
        if worker.state == WorkerState::Starting {
            worker.state = WorkerState::Idle;
        }
        state.growth_blocked = None;
        info!(pool_id = %self.pool_id, worker_id = id, "Worker ready");
        self.emit(PoolEvent::WorkerStarted { worker_id: id });
        self.dispatch(&mut state);
    }

    pub fn on_unit_exit(&self, id: WorkerId, exit: UnitExit) {
        let mut state = self.state.lock();
        state.exited_threads.retain(|handle| !handle.is_finished());
        let Some(mut record) = state.workers.remove(&id) else {
            return;
        };
        if let Some(thread) = record.thread.take() {
            state.exited_threads.push(thread);
        }

        let mut replace = false;
        match &exit {
            UnitExit::Drained => debug!(worker_id = id, "Worker drained"),
            UnitExit::Retired => info!(worker_id = id, "Idle worker retired"),
            UnitExit::Crashed(reason) => {
                PoolCounters::bump(&self.counters.worker_crashes);
                record.errors += 1;
                let failed = record.assigned.len();
                error!(worker_id = id, reason = %reason, failed_tasks = failed, "Worker crashed");
                for task_id in record.assigned.drain() {
                    if let Some(entry) = state.tasks.remove(&task_id) {
                        let err = TaskError::WorkerCrashed {
                            worker_id: id,
                            reason: reason.clone(),
                        };
                        self.settle(task_id, entry, Err(err));
                    }
                }
                self.emit(PoolEvent::WorkerError {
                    worker_id: id,
                    reason: reason.clone(),
                    failed_tasks: failed,
                });
                replace = true;
            }
            UnitExit::LoadFailed(err) => {
                record.errors += 1;
                error!(worker_id = id, error = %err, "Worker failed to load module");
                state.growth_blocked = Some(err.clone());
                self.emit(PoolEvent::WorkerError {
                    worker_id: id,
                    reason: err.to_string(),
                    failed_tasks: 0,
                });
            }
        }

        record.state = WorkerState::Terminated;
        self.emit(PoolEvent::WorkerExited(record.snapshot(id)));

        if replace && !state.shutting_down && state.workers.len() < self.config.max_threads {
            match self.spawn_worker(&mut state, None) {
                Ok(new_id) => {
                    info!(worker_id = new_id, replaces = id, "Replacement worker spawned");
                }
                Err(err) => error!(error = %err, "Failed to replace crashed worker"),
            }
        }
        self.ensure_min(&mut state);
        self.dispatch(&mut state);
        self.exited.notify_all();
    }

    /// Called by an idle worker whose timer fired. Grants retirement only
    /// above `min_threads`.
    pub fn try_retire(&self, id: WorkerId) -> bool {
        let mut state = self.state.lock();
        if state.shutting_down || state.active_workers() <= self.config.min_threads {
            return false;
        }
        let Some(worker) = state.workers.get_mut(&id) else {
            return false;
        };
        if !worker.assigned.is_empty() || !worker.state.is_ready() {
            return false;
        }
        worker.close();
        debug!(worker_id = id, "Retiring idle worker");
        true
    }

    /// Move a dispatched task to Running unless it was interrupted first.
    pub fn mark_running(&self, task_id: TaskId) -> bool {
        let mut state = self.state.lock();
        match state.tasks.get_mut(&task_id) {
            Some(entry) if !entry.interrupt.is_cancelled() => {
                entry.state = TaskState::Running;
                true
            }
            _ => false,
        }
    }

    /// Record the end of an assignment and resolve its task.
    pub fn report(&self, worker_id: WorkerId, task_id: TaskId, outcome: Outcome<R>) {
        let mut state = self.state.lock();
        if let Some(worker) = state.workers.get_mut(&worker_id) {
            worker.assigned.remove(&task_id);
            match &outcome {
                Outcome::Finished(Ok(_)) => worker.completed += 1,
                Outcome::Finished(Err(_)) | Outcome::UnknownHandler(_) => worker.errors += 1,
                Outcome::Interrupted => {}
            }
            worker.refresh_state();
        }

        if let Some(entry) = state.tasks.remove(&task_id) {
            let result = match outcome {
                Outcome::Finished(Ok(value)) => Ok(value),
                Outcome::Finished(Err(err)) => match entry.cancel_reason {
                    Some(reason) => Err(TaskError::Cancelled(reason)),
                    None => Err(TaskError::Handler(err)),
                },
                Outcome::Interrupted => Err(TaskError::Cancelled(
                    entry.cancel_reason.unwrap_or(CancelReason::Requested),
                )),
                Outcome::UnknownHandler(name) => Err(TaskError::UnknownHandler(name)),
            };
            self.settle(task_id, entry, result);
        }

        self.dispatch(&mut state);
    }

    fn submit(&self, payload: P, options: TaskOptions) -> Result<TaskHandle<R>, PoolError> {
        let TaskOptions {
            handler,
            signal,
            transfer_hint,
            priority,
            timeout,
        } = options;

        let mut state = self.state.lock();
        if state.shutting_down {
            return Err(PoolError::PoolShutdown);
        }
        if state.workers.is_empty() {
            // Give the module another chance once nothing is left running.
            if let Some(err) = state.growth_blocked.take() {
                info!(error = %err, "Retrying worker start after an earlier load failure");
            }
        }

        let limit = self.config.max_concurrent_tasks_per_worker;
        // Only an empty queue may be bypassed; otherwise FIFO order would break.
        let direct = if state.queue.is_empty() {
            registry::select_least_loaded(&state.workers, limit)
        } else {
            None
        };
        if direct.is_none() && state.queue.is_full() {
            return Err(self.reject_full(state));
        }

        let task_id = state.next_task_id;
        state.next_task_id += 1;

        let (slot, handle) = result::channel(task_id, self.canceller());
        let entry = TaskEntry {
            state: TaskState::Queued,
            slot,
            worker: None,
            interrupt: CancellationToken::new(),
            registrations: Vec::new(),
            cancel_reason: None,
        };

        if signal.as_ref().is_some_and(CancelSignal::is_aborted) {
            debug!(task_id, "Signal already aborted at submission");
            PoolCounters::bump(&self.counters.submitted_tasks);
            self.settle(task_id, entry, Err(TaskError::Cancelled(CancelReason::Requested)));
            return Ok(handle);
        }

        let mut task = Task {
            id: task_id,
            payload,
            handler,
            priority,
            transfer_hint,
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
        };
        state.tasks.insert(task_id, entry);

        // A selected worker may close before the send lands. `assign` marks
        // it Draining, so each retry picks a different worker.
        let mut target = direct;
        let undispatched = loop {
            let Some(worker_id) = target else {
                break Some(task);
            };
            match state.assign(worker_id, task) {
                Ok(()) => break None,
                Err(bounced) => {
                    task = bounced;
                    target = registry::select_least_loaded(&state.workers, limit);
                }
            }
        };
        let dispatched = undispatched.is_none();

        if let Some(task) = undispatched {
            if state.queue.is_full() {
                // Every candidate closed under us and there is no room to wait.
                state.tasks.remove(&task_id);
                return Err(self.reject_full(state));
            }
            state.queue.push(task);
            self.dispatch(&mut state);
        }
        PoolCounters::bump(&self.counters.submitted_tasks);
        debug!(task_id, ?priority, dispatched, "Task submitted to worker pool");
        drop(state);

        self.watch(task_id, signal, timeout);
        Ok(handle)
    }

    /// Record and report a submission refused because the queue is full.
    fn reject_full(&self, state: MutexGuard<'_, PoolState<P, R>>) -> PoolError {
        let depth = state.queue.len();
        let max_depth = state.queue.max_depth();
        drop(state);
        PoolCounters::bump(&self.counters.rejected_tasks);
        warn!(depth, max_depth, "Worker pool queue is full");
        self.emit(PoolEvent::Saturated { depth, max_depth });
        PoolError::QueueFull { depth, max_depth }
    }

    /// Hook the task's cancellation signal and deadline up to `cancel`.
    fn watch(
        &self,
        task_id: TaskId,
        signal: Option<CancelSignal>,
        timeout: Option<std::time::Duration>,
    ) {
        let mut registrations = Vec::new();
        if let Some(signal) = signal {
            let pool = self.this.clone();
            registrations.push(signal.register(&self.watcher, move || {
                if let Some(pool) = pool.upgrade() {
                    pool.cancel_task(task_id, CancelReason::Requested);
                }
            }));
        }
        if let Some(timeout) = timeout {
            let pool = self.this.clone();
            registrations.push(Registration::Watch(self.watcher.spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(pool) = pool.upgrade() {
                    pool.cancel_task(task_id, CancelReason::DeadlineExceeded);
                }
            })));
        }
        if registrations.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        if let Some(entry) = state.tasks.get_mut(&task_id) {
            entry.registrations.extend(registrations);
            return;
        }
        drop(state);
        // Already resolved: the watchers have nothing left to cancel.
        for registration in registrations {
            registration.release();
        }
    }

    fn cancel_task(&self, task_id: TaskId, reason: CancelReason) -> CancelOutcome {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(entry) = state.tasks.get_mut(&task_id) else {
            return CancelOutcome::AlreadySettled;
        };

        match entry.state {
            TaskState::Queued => {
                state.queue.remove(task_id);
                if let Some(entry) = state.tasks.remove(&task_id) {
                    info!(task_id, %reason, "Queued task cancelled");
                    self.settle(task_id, entry, Err(TaskError::Cancelled(reason)));
                }
                if state.queue.is_empty() {
                    self.emit(PoolEvent::QueueDrained);
                }
                CancelOutcome::Cancelled
            }
            TaskState::Dispatched | TaskState::Running => {
                entry.cancel_reason.get_or_insert(reason);
                entry.interrupt.cancel();
                info!(task_id, worker_id = ?entry.worker, %reason, "Interrupt requested");
                CancelOutcome::InterruptRequested
            }
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled => {
                CancelOutcome::AlreadySettled
            }
        }
    }

    /// Stop accepting work, reject the queue, close every inbox.
    ///
    /// Returns `(rejected, interrupted)` task counts.
    fn begin_shutdown(&self, state: &mut PoolState<P, R>, graceful: bool) -> (usize, usize) {
        state.shutting_down = true;

        let queued = state.queue.drain();
        let rejected = queued.len();
        for task in queued {
            if let Some(entry) = state.tasks.remove(&task.id) {
                self.settle(task.id, entry, Err(TaskError::Shutdown));
            }
        }
        if rejected > 0 {
            self.emit(PoolEvent::QueueDrained);
        }

        let mut interrupted = 0;
        if !graceful {
            let in_flight: Vec<TaskId> = state.tasks.keys().copied().collect();
            for task_id in in_flight {
                if let Some(entry) = state.tasks.remove(&task_id) {
                    entry.interrupt.cancel();
                    self.settle(task_id, entry, Err(TaskError::Cancelled(CancelReason::Shutdown)));
                    interrupted += 1;
                }
            }
        }

        for worker in state.workers.values_mut() {
            worker.close();
        }
        (rejected, interrupted)
    }

    fn shutdown(&self, graceful: bool) -> ShutdownReport {
        let mut state = self.state.lock();

        if state.shutting_down {
            // Another caller owns the shutdown; wait for its report.
            while state.report.is_none() {
                self.exited.wait(&mut state);
            }
            return state.report.clone().unwrap_or_default();
        }

        info!(pool_id = %self.pool_id, graceful, "Shutting down worker pool");
        let (rejected_tasks, interrupted_tasks) = self.begin_shutdown(&mut state, graceful);

        // Graceful shutdown lets every in-flight task finish; only a
        // non-graceful one gives up on workers after `shutdown_timeout`.
        let deadline = if graceful {
            None
        } else {
            Instant::now().checked_add(self.config.shutdown_timeout())
        };
        while !state.workers.is_empty() {
            match deadline {
                Some(deadline) => {
                    if self.exited.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.exited.wait(&mut state),
            }
        }
        let detached: Vec<WorkerId> = state.workers.keys().copied().collect();
        let threads = std::mem::take(&mut state.exited_threads);
        drop(state);

        for thread in threads {
            if thread.join().is_err() {
                warn!("Worker thread panicked while exiting");
            }
        }
        for worker_id in &detached {
            warn!(worker_id, "Worker did not exit within timeout - detaching");
        }

        let report = ShutdownReport {
            graceful,
            rejected_tasks,
            interrupted_tasks,
            detached_workers: detached.len(),
        };
        self.state.lock().report = Some(report.clone());
        self.exited.notify_all();

        info!(
            pool_id = %self.pool_id,
            rejected = rejected_tasks,
            interrupted = interrupted_tasks,
            detached = detached.len(),
            "Worker pool shut down complete"
        );
        self.emit(PoolEvent::ShutdownComplete(report.clone()));
        report
    }
}

impl<P, R> TaskCanceller for Shared<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn cancel(&self, id: TaskId, reason: CancelReason) -> CancelOutcome {
        self.cancel_task(id, reason)
    }
}

/// Worker pool with dedicated OS threads, each running the loaded handler
/// module on its own single-threaded tokio runtime.
///
/// `P` is the task payload and `R` the handler's result. Payloads are moved
/// into the worker that runs them and results are moved back, so neither
/// needs to be serializable.
///
/// # Design
///
/// - **Single lock**: queue, registry and task table are mutated only under one mutex
/// - **No polling**: workers await their inbox; shutdown waits on a condvar
/// - **Push cancellation**: tokens and emitters call into the pool when they fire
pub struct WorkerPool<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    shared: Arc<Shared<P, R>>,
}

impl<P, R> WorkerPool<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Create a pool and start its initial workers.
    ///
    /// `max(min_threads, 1)` workers are started and each loads the module
    /// through `loader` on its own thread. This call returns once all of them
    /// are ready, so a module that fails to load is reported here and no task
    /// is ever accepted.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::ModuleLoad` if any initial worker fails to load the module
    /// - `PoolError::WorkerSpawn` if a thread or the watcher runtime cannot start
    pub fn new(
        config: WorkerPoolConfig,
        loader: impl ModuleLoader<P, R>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let watcher = TokioSpawner::with_worker_threads(1, &config.thread_name_prefix)
            .map_err(PoolError::WorkerSpawn)?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let initial = config.min_threads.max(1);

        let shared = Arc::new_cyclic(|this| Shared {
            pool_id: Uuid::new_v4(),
            state: Mutex::new(PoolState {
                queue: TaskQueue::new(config.max_queue_depth),
                tasks: HashMap::new(),
                workers: BTreeMap::new(),
                next_task_id: 0,
                next_worker_id: 0,
                shutting_down: false,
                growth_blocked: None,
                exited_threads: Vec::new(),
                report: None,
            }),
            config,
            loader: Box::new(loader),
            exited: Condvar::new(),
            counters: PoolCounters::default(),
            events,
            watcher,
            this: this.clone(),
        });
        let pool = Self { shared };

        let (startup_tx, startup_rx) = crossbeam_channel::bounded(initial);
        {
            let mut state = pool.shared.state.lock();
            for _ in 0..initial {
                if let Err(err) = pool.shared.spawn_worker(&mut state, Some(startup_tx.clone())) {
                    drop(state);
                    pool.shutdown(false);
                    return Err(err);
                }
            }
        }
        drop(startup_tx);

        for _ in 0..initial {
            let failure = match startup_rx.recv() {
                Ok(Ok(_)) => continue,
                Ok(Err(err)) => err,
                Err(_) => LoadError::failed("worker exited during startup"),
            };
            error!(error = %failure, "Worker pool startup failed");
            pool.shutdown(false);
            return Err(PoolError::ModuleLoad(failure));
        }

        info!(
            pool_id = %pool.shared.pool_id,
            min_threads = pool.shared.config.min_threads,
            max_threads = pool.shared.config.max_threads,
            max_queue_depth = pool.shared.config.max_queue_depth,
            per_worker = pool.shared.config.max_concurrent_tasks_per_worker,
            "WorkerPool initialized"
        );
        Ok(pool)
    }

    /// Unique identifier of this pool, used in log events.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.pool_id
    }

    /// The configuration the pool was built with.
    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.shared.config
    }

    /// Submit a task.
    ///
    /// Never blocks. The task is assigned to the least-loaded ready worker if
    /// the queue is empty, otherwise it joins the back of the queue.
    ///
    /// # Errors
    ///
    /// - `PoolError::QueueFull` if the task would have to queue and the queue
    ///   is at capacity; no task is created
    /// - `PoolError::PoolShutdown` if the pool is shutting down
    pub fn submit(&self, payload: P, options: TaskOptions) -> Result<TaskHandle<R>, PoolError> {
        self.shared.submit(payload, options)
    }

    /// Submit a task to the default entry point with default options.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_default(&self, payload: P) -> Result<TaskHandle<R>, PoolError> {
        self.submit(payload, TaskOptions::default())
    }

    /// Request cancellation of a task by id.
    pub fn cancel(&self, id: TaskId) -> CancelOutcome {
        self.shared.cancel_task(id, CancelReason::Requested)
    }

    /// Lifecycle state of an unresolved task; `None` once it has resolved.
    #[must_use]
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.shared.state.lock().tasks.get(&id).map(|entry| entry.state)
    }

    /// Snapshots of the live workers in creation order.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerSnapshot> {
        let state = self.shared.state.lock();
        state
            .workers
            .iter()
            .map(|(id, worker)| worker.snapshot(*id))
            .collect()
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let mut stats = self.shared.counters.snapshot();
        let state = self.shared.state.lock();
        stats.live_workers = state.workers.len();
        for worker in state.workers.values() {
            match worker.state {
                WorkerState::Starting => stats.starting_workers += 1,
                WorkerState::Idle => stats.idle_workers += 1,
                WorkerState::Busy(_) => stats.busy_workers += 1,
                WorkerState::Draining | WorkerState::Terminated => stats.draining_workers += 1,
            }
        }
        stats.queued_tasks = state.queue.len();
        stats.in_flight_tasks = state
            .tasks
            .values()
            .filter(|entry| matches!(entry.state, TaskState::Dispatched | TaskState::Running))
            .count();
        stats
    }

    /// Subscribe to pool events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutting_down
    }

    /// Shut the pool down and wait for its workers to exit.
    ///
    /// Queued tasks are rejected with [`TaskError::Shutdown`]. With
    /// `graceful`, in-flight tasks run to completion and this call returns
    /// only after every worker has exited, however long that takes.
    /// Otherwise in-flight tasks are interrupted and resolved as cancelled
    /// immediately, and workers that have not exited within
    /// `shutdown_timeout` are detached.
    ///
    /// Blocks the calling thread; use [`shutdown_async`](Self::shutdown_async)
    /// from async code. Calling it again waits for the first call and
    /// returns its report.
    pub fn shutdown(&self, graceful: bool) -> ShutdownReport {
        self.shared.shutdown(graceful)
    }

    /// Async form of [`shutdown`](Self::shutdown); the wait runs on tokio's
    /// blocking pool.
    pub async fn shutdown_async(&self, graceful: bool) -> ShutdownReport {
        let shared = Arc::clone(&self.shared);
        match tokio::task::spawn_blocking(move || shared.shutdown(graceful)).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "Shutdown task failed");
                ShutdownReport {
                    graceful,
                    ..ShutdownReport::default()
                }
            }
        }
    }
}

impl<P, R> Drop for WorkerPool<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn drop(&mut self) {
        // Signal shutdown but don't join workers in Drop.
        let mut state = self.shared.state.lock();
        if !state.shutting_down {
            self.shared.begin_shutdown(&mut state, true);
            debug!("WorkerPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

impl<P, R> std::fmt::Debug for WorkerPool<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("id", &self.shared.pool_id)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
