use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tabprof_core::{SchedulerConfig, TaskStatus};
use tabprof_rules::{AnalysisEngine, ConnectionProvider};
use tabprof_store::ResultStore;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, SchedulerError},
    execute::{run_task, Outcome},
    types::{AnalysisTask, TaskPhase, TaskStats},
};

/// A task record plus the token its execution listens on.
struct TaskEntry {
    task: AnalysisTask,
    cancel: CancellationToken,
}

/// Every task ever submitted, plus how many of them are still `pending`.
///
/// `pending` drives admission: a task cancelled while queued frees its slot
/// immediately, even though its id is still in the channel.
#[derive(Default)]
struct TaskTable {
    entries: HashMap<String, TaskEntry>,
    pending: usize,
}

/// State shared between the manager handle, the dispatcher and executions.
pub(crate) struct Shared {
    pub(crate) config: SchedulerConfig,
    /// All status writes happen under this lock.
    tasks: RwLock<TaskTable>,
    /// Worker pool. Starts empty; `start()` adds `max_workers` permits.
    workers: Arc<Semaphore>,
    pub(crate) engine: Arc<AnalysisEngine>,
    pub(crate) provider: Arc<dyn ConnectionProvider>,
    pub(crate) store: Arc<dyn ResultStore>,
    /// Parent of every task token; cancelled by `stop()`.
    shutdown: CancellationToken,
    executions: TaskTracker,
    /// Signalled after every terminal transition.
    finished: Notify,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, TaskTable> {
        self.tasks.read().expect("task map poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, TaskTable> {
        self.tasks.write().expect("task map poisoned")
    }

    fn is_pending(&self, id: &str) -> bool {
        self.read()
            .entries
            .get(id)
            .is_some_and(|e| e.task.status == TaskStatus::Pending)
    }

    /// Pending -> running. Returns `None` if the task left `pending` while
    /// it sat in the queue.
    fn begin_running(&self, id: &str) -> Option<(AnalysisTask, CancellationToken)> {
        let mut guard = self.write();
        let tasks = &mut *guard;
        let entry = tasks.entries.get_mut(id)?;
        if entry.task.status != TaskStatus::Pending {
            return None;
        }
        tasks.pending -= 1;
        entry.task.status = TaskStatus::Running;
        entry.task.started_at = Some(Utc::now());
        info!(task_id = %id, table = %entry.task.table_name, "task running");
        Some((entry.task.clone(), entry.cancel.clone()))
    }

    /// Apply `f` to a task that is still non-terminal.
    pub(crate) fn update(&self, id: &str, f: impl FnOnce(&mut AnalysisTask)) {
        let mut tasks = self.write();
        if let Some(entry) = tasks.entries.get_mut(id) {
            if !entry.task.is_terminal() {
                f(&mut entry.task);
            }
        }
    }

    pub(crate) fn advance(&self, id: &str, phase: TaskPhase) {
        self.update(id, |task| task.advance(phase));
        debug!(task_id = %id, ?phase, "task phase");
    }

    /// Record the terminal status of an execution.
    ///
    /// This is the only path that finalizes a running task. A task that is
    /// already terminal is left untouched and `None` is returned.
    pub(crate) fn finish(&self, id: &str, outcome: Outcome) -> Option<AnalysisTask> {
        let snapshot = {
            let mut tasks = self.write();
            let entry = tasks.entries.get_mut(id)?;
            if entry.task.is_terminal() {
                warn!(task_id = %id, status = %entry.task.status, "late terminal write ignored");
                return None;
            }

            let task = &mut entry.task;
            match outcome {
                Outcome::Completed(results) => {
                    task.status = TaskStatus::Completed;
                    task.results = Some(results);
                    task.advance(TaskPhase::Done);
                }
                Outcome::Failed { error, results } => {
                    task.status = TaskStatus::Failed;
                    task.error = Some(error);
                    task.results = results;
                    task.advance(TaskPhase::Done);
                }
                Outcome::Cancelled => {
                    task.status = TaskStatus::Cancelled;
                    task.error = Some("cancelled while running".to_string());
                }
            }
            task.completed_at = Some(Utc::now());
            task.clone()
        };

        info!(
            task_id = %id,
            status = %snapshot.status,
            duration_ms = snapshot.duration().map(|d| d.num_milliseconds()),
            "task finished"
        );
        self.finished.notify_waiters();
        Some(snapshot)
    }

    /// Cancel every task still waiting in the queue.
    fn cancel_pending(&self, reason: &str) -> usize {
        let now = Utc::now();
        let mut count = 0;
        {
            let mut tasks = self.write();
            for entry in tasks.entries.values_mut() {
                if entry.task.status == TaskStatus::Pending {
                    entry.cancel.cancel();
                    entry.task.status = TaskStatus::Cancelled;
                    entry.task.error = Some(reason.to_string());
                    entry.task.completed_at = Some(now);
                    count += 1;
                }
            }
            tasks.pending -= count;
        }
        if count > 0 {
            self.finished.notify_waiters();
        }
        count
    }
}

/// Accepts profiling tasks, runs them on a bounded worker pool and tracks
/// their lifecycle.
///
/// ```text
/// submit ──► queue (FIFO, bounded) ──► dispatcher ──► permit ──► execution
///                                                                  │
///            task map (RwLock) ◄── status / progress / results ◄───┘
/// ```
pub struct TaskManager {
    shared: Arc<Shared>,
    queue_tx: mpsc::UnboundedSender<String>,
    /// Taken by the dispatcher on `start()`.
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new(
        config: SchedulerConfig,
        engine: Arc<AnalysisEngine>,
        provider: Arc<dyn ConnectionProvider>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        // Bounded by the pending count in `submit`, not by the channel.
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            tasks: RwLock::new(TaskTable::default()),
            workers: Arc::new(Semaphore::new(0)),
            engine,
            provider,
            store,
            shutdown: CancellationToken::new(),
            executions: TaskTracker::new(),
            finished: Notify::new(),
        });
        Self {
            shared,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            dispatcher: Mutex::new(None),
        }
    }

    /// Launch the dispatcher and fill the worker pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.shared.shutdown.is_cancelled() {
            return Err(SchedulerError::Stopped);
        }
        let rx = self
            .queue_rx
            .lock()
            .expect("queue receiver poisoned")
            .take()
            .ok_or(SchedulerError::AlreadyStarted)?;

        self.shared.workers.add_permits(self.shared.config.max_workers);
        let handle = tokio::spawn(dispatch_loop(Arc::clone(&self.shared), rx));
        *self.dispatcher.lock().expect("dispatcher handle poisoned") = Some(handle);

        info!(
            max_workers = self.shared.config.max_workers,
            queue_capacity = self.shared.config.queue_capacity,
            "task manager started"
        );
        Ok(())
    }

    /// Stop dispatching, cancel queued and in-flight tasks, and wait up to
    /// the configured grace period for executions to finalize.
    pub async fn stop(&self) {
        if self.shared.shutdown.is_cancelled() {
            return;
        }
        info!("task manager stopping");
        // Also cancels every task token (they are child tokens).
        self.shared.shutdown.cancel();

        let dispatcher = self
            .dispatcher
            .lock()
            .expect("dispatcher handle poisoned")
            .take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatcher exited abnormally");
            }
        }
        // Never started: drop the receiver so late senders see a closed queue.
        drop(self.queue_rx.lock().expect("queue receiver poisoned").take());

        let cancelled = self.shared.cancel_pending("scheduler stopped");
        if cancelled > 0 {
            info!(count = cancelled, "queued tasks cancelled");
        }

        self.shared.executions.close();
        let grace = self.shared.config.stop_grace();
        if tokio::time::timeout(grace, self.shared.executions.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.shared.executions.len(),
                grace_ms = grace.as_millis() as u64,
                "executions still running after stop grace period"
            );
        }
        info!("task manager stopped");
    }

    /// Queue a pending task. Never blocks: once `queue_capacity` tasks are
    /// pending, further submissions are rejected with
    /// [`SchedulerError::QueueFull`].
    ///
    /// The task is visible to [`get_task`](Self::get_task) as soon as this
    /// returns.
    pub fn submit(&self, task: AnalysisTask) -> Result<()> {
        if task.status != TaskStatus::Pending {
            return Err(SchedulerError::InvalidTask {
                id: task.id,
                reason: format!("expected pending status, got {}", task.status),
            });
        }
        if self.shared.shutdown.is_cancelled() {
            return Err(SchedulerError::Stopped);
        }

        // Enqueue and insert under one write lock so the dispatcher cannot
        // observe the id before the record exists.
        let mut tasks = self.shared.write();
        if tasks.entries.contains_key(&task.id) {
            return Err(SchedulerError::DuplicateTask { id: task.id });
        }
        let capacity = self.shared.config.queue_capacity.max(1);
        if tasks.pending >= capacity {
            warn!(task_id = %task.id, capacity, "submission queue full");
            return Err(SchedulerError::QueueFull { capacity });
        }
        if self.queue_tx.send(task.id.clone()).is_err() {
            return Err(SchedulerError::Stopped);
        }

        info!(
            task_id = %task.id,
            table = %task.table_name,
            database = %task.database_id,
            "task submitted"
        );
        let cancel = self.shared.shutdown.child_token();
        tasks.entries.insert(task.id.clone(), TaskEntry { task, cancel });
        tasks.pending += 1;
        Ok(())
    }

    /// Snapshot of one task.
    pub fn get_task(&self, id: &str) -> Option<AnalysisTask> {
        self.shared.read().entries.get(id).map(|e| e.task.clone())
    }

    /// Snapshot of every task targeting `database_id`, in any status.
    pub fn get_tasks_by_database(&self, database_id: &str) -> Vec<AnalysisTask> {
        self.shared
            .read()
            .entries
            .values()
            .filter(|e| e.task.database_id == database_id)
            .map(|e| e.task.clone())
            .collect()
    }

    /// Counts per status over one snapshot.
    pub fn stats(&self) -> TaskStats {
        let tasks = self.shared.read();
        let mut stats = TaskStats::default();
        for entry in tasks.entries.values() {
            stats.record(entry.task.status);
        }
        stats
    }

    /// Cancel a task.
    ///
    /// A pending task becomes `cancelled` immediately and is never run. For
    /// a running task the execution is signalled and this waits, up to the
    /// cancellation grace period, for it to finalize itself. The returned
    /// snapshot may be `completed` or `failed` if the execution finished
    /// before it observed the signal.
    pub async fn cancel(&self, id: &str) -> Result<AnalysisTask> {
        {
            let mut guard = self.shared.write();
            let tasks = &mut *guard;
            let entry = tasks
                .entries
                .get_mut(id)
                .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })?;

            if entry.task.is_terminal() {
                return Err(SchedulerError::AlreadyTerminal {
                    id: id.to_string(),
                    status: entry.task.status,
                });
            }

            entry.cancel.cancel();
            if entry.task.status == TaskStatus::Pending {
                tasks.pending -= 1;
                entry.task.status = TaskStatus::Cancelled;
                entry.task.error = Some("cancelled before dispatch".to_string());
                entry.task.completed_at = Some(Utc::now());
                let snapshot = entry.task.clone();
                drop(guard);
                info!(task_id = %id, "pending task cancelled");
                self.shared.finished.notify_waiters();
                return Ok(snapshot);
            }
        }

        info!(task_id = %id, "cancellation requested for running task");
        let grace = self.shared.config.cancel_grace();
        match tokio::time::timeout(grace, self.wait(id)).await {
            Ok(Some(task)) => Ok(task),
            Ok(None) => Err(SchedulerError::TaskNotFound { id: id.to_string() }),
            Err(_) => {
                warn!(
                    task_id = %id,
                    grace_ms = grace.as_millis() as u64,
                    "task did not acknowledge cancellation"
                );
                Err(SchedulerError::CancelTimeout { id: id.to_string() })
            }
        }
    }

    /// Resolve once the task is terminal. `None` if the id is unknown.
    pub async fn wait(&self, id: &str) -> Option<AnalysisTask> {
        loop {
            // Register interest before checking, so a transition between the
            // check and the await is not missed.
            let notified = self.shared.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let task = self.get_task(id)?;
            if task.is_terminal() {
                return Some(task);
            }
            notified.await;
        }
    }

    pub fn engine(&self) -> &Arc<AnalysisEngine> {
        &self.shared.engine
    }
}

/// Single consumer of the submission queue.
///
/// Dequeues ids in FIFO order, waits for a worker permit, marks the task
/// running and hands it to its own Tokio task. The permit moves into the
/// execution and is released when it ends.
async fn dispatch_loop(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<String>) {
    info!("dispatcher started");
    loop {
        let id = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(id) => id,
                None => break,
            },
        };

        // Cancelled while queued: do not wait for a permit on its behalf.
        if !shared.is_pending(&id) {
            debug!(task_id = %id, "skipping task that left pending while queued");
            continue;
        }

        let permit = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            permit = Arc::clone(&shared.workers).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let Some((task, cancel)) = shared.begin_running(&id) else {
            debug!(task_id = %id, "task left pending before dispatch");
            continue;
        };

        shared
            .executions
            .spawn(run_task(Arc::clone(&shared), task, cancel, permit));
    }
    info!("dispatcher stopped");
}
