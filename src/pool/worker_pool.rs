//! Worker Pool
//!
//! The pool owns a bounded set of execution contexts and shuttles commands
//! to them. Each context runs on its own tokio task with a private store; the
//! only shared mutable state is the pool's metadata (the OCC registry and the
//! `available` set), mutated under the pool's reentrant mutex.
//!
//! ## Dispatch
//!
//! 1. Under the pool mutex, read `available`. If non-empty, pick the lowest
//!    id (deterministic for testability), transition it Idle → Busy through
//!    OCC, and ship the command to its inbox. On a version conflict, retry
//!    with another id up to a small bound, then fall back to the queue.
//! 2. Otherwise (or when the submission carries a delay) enqueue into the
//!    task queue and hand the caller a future completed on execution.
//!
//! ## Completion and recovery
//!
//! A worker releases itself (Busy → Idle through OCC, back into
//! `available`) *before* delivering its result, so a caller that awaits one
//! command and submits the next lands on the same lowest-id context. A
//! background drainer waits on the queue and places ripened tasks on freed
//! workers. A context that terminates abnormally is observed through its
//! `JoinHandle`: the pool removes it, rejects its in-flight future with
//! `WorkerCrashed`, spawns a replacement, and drains the queue.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::command::{Command, CommandResult};
use crate::error::OctopusError;
use crate::pool::occ::{OccRegistry, WorkerId, WorkerState};
use crate::queue::{Task, TaskQueue};
use crate::store::ExecutionContext;
use crate::sync::{OwnerId, ReentrantMutex};

/// Dispatch retries before falling back to the queue; completion retries
/// before giving up on a Busy → Idle transition.
const OCC_RETRY_BOUND: usize = 3;

/// Worker inbox capacity. A worker only receives work while idle, so the
/// inbox holds at most one command plus slack for claim races.
const INBOX_CAPACITY: usize = 4;

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of execution contexts the pool maintains.
    pub max_workers: usize,
}

impl PoolConfig {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_workers: 8 }
    }
}

/// A command on its way to a worker, with every submission waiting on it.
struct Job {
    command: Command,
    priority: i32,
    waiters: Vec<oneshot::Sender<CommandResult>>,
}

impl Job {
    fn from_task(task: Task) -> Self {
        Self {
            command: task.command,
            priority: task.priority,
            waiters: task.waiters,
        }
    }

    fn reject(self, error: OctopusError) {
        for waiter in self.waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }
}

struct WorkerHandle {
    inbox: mpsc::Sender<Job>,
    abort: AbortHandle,
    monitor: JoinHandle<()>,
}

struct PoolInner {
    config: PoolConfig,
    /// Serializes dispatch decisions and membership changes.
    mutex: ReentrantMutex,
    /// Version-guarded worker metadata.
    occ: OccRegistry,
    workers: Mutex<HashMap<WorkerId, WorkerHandle>>,
    /// Idle workers eligible for dispatch; lowest id is picked first.
    available: Mutex<BTreeSet<WorkerId>>,
    queue: TaskQueue,
    /// Wakes the drainer when a worker frees up.
    freed: Notify,
    shutdown_tx: watch::Sender<bool>,
    shutting_down: AtomicBool,
    next_worker_id: AtomicU32,
    /// Background loops, aborted at the end of shutdown.
    loops: Mutex<Vec<JoinHandle<()>>>,
}

/// Pool of execution contexts with queue-backed dispatch.
///
/// Cheap to clone; all clones drive the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Starts a pool with `config.max_workers` execution contexts.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: PoolConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(PoolInner {
            config,
            mutex: ReentrantMutex::new(),
            occ: OccRegistry::new(),
            workers: Mutex::new(HashMap::new()),
            available: Mutex::new(BTreeSet::new()),
            queue: TaskQueue::new(),
            freed: Notify::new(),
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
            next_worker_id: AtomicU32::new(0),
            loops: Mutex::new(Vec::new()),
        });

        for _ in 0..inner.config.max_workers {
            inner.spawn_worker();
        }

        let drainer = tokio::spawn(drainer_loop(Arc::clone(&inner), shutdown_rx));
        inner.loops.lock().unwrap().push(drainer);

        info!(workers = inner.config.max_workers, "worker pool started");
        Self { inner }
    }

    /// Submits a command with default priority and no delay.
    pub async fn dispatch(&self, command: Command) -> DispatchHandle {
        self.dispatch_with(command, 0, Duration::ZERO).await
    }

    /// Submits a command with explicit priority (lower runs first) and delay.
    ///
    /// The returned handle resolves once a context has executed the command.
    /// A delayed submission always goes through the queue; an undelayed one
    /// is handed straight to an idle context when there is one.
    pub async fn dispatch_with(
        &self,
        command: Command,
        priority: i32,
        delay: Duration,
    ) -> DispatchHandle {
        let (tx, rx) = oneshot::channel();

        if self.inner.shutting_down.load(Ordering::SeqCst) {
            let _ = tx.send(Err(OctopusError::ShuttingDown));
            return DispatchHandle { rx, queued: None };
        }

        let mut job = Job {
            command,
            priority,
            waiters: vec![tx],
        };

        if delay.is_zero() {
            match self.inner.try_direct(job).await {
                None => return DispatchHandle { rx, queued: None },
                Some(returned) => job = returned,
            }
        }

        let task = Task {
            command: job.command,
            priority: job.priority,
            ready_at: Instant::now() + delay,
            waiters: job.waiters,
        };
        let digest = task.digest();
        self.inner.queue.enqueue(task).await;

        DispatchHandle {
            rx,
            queued: Some((digest, Arc::clone(&self.inner))),
        }
    }

    /// Number of live execution contexts.
    pub fn worker_count(&self) -> usize {
        self.inner.workers.lock().unwrap().len()
    }

    /// Number of queued (including not-yet-ready) tasks.
    pub async fn backlog(&self) -> usize {
        self.inner.queue.len().await
    }

    /// Force-terminates a worker as if it had crashed; the pool replaces it.
    ///
    /// Returns `false` if no such worker exists.
    pub fn kill_worker(&self, id: WorkerId) -> bool {
        let abort = {
            let workers = self.inner.workers.lock().unwrap();
            workers.get(&id).map(|handle| handle.abort.clone())
        };
        match abort {
            Some(abort) => {
                abort.abort();
                true
            }
            None => false,
        }
    }

    /// Stops accepting work, rejects everything still queued with
    /// `ShuttingDown`, lets in-flight commands finish, and joins all workers.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("worker pool shutting down");
        let _ = self.inner.shutdown_tx.send(true);

        for task in self.inner.queue.drain().await {
            task.complete(Err(OctopusError::ShuttingDown));
        }

        // Closing an inbox is the graceful stop signal: the worker finishes
        // what it holds and exits.
        let handles: Vec<(WorkerId, WorkerHandle)> = {
            self.inner.workers.lock().unwrap().drain().collect()
        };
        for (id, handle) in handles {
            drop(handle.inbox);
            let _ = handle.monitor.await;
            self.inner.occ.deregister(id);
        }
        self.inner.available.lock().unwrap().clear();

        // Catch submissions that slipped past the intake check.
        for task in self.inner.queue.drain().await {
            task.complete(Err(OctopusError::ShuttingDown));
        }

        let loops: Vec<_> = self.inner.loops.lock().unwrap().drain(..).collect();
        for task in loops {
            task.abort();
            let _ = task.await;
        }
        info!("worker pool shutdown complete");
    }
}

/// A pending dispatch: await the result, or cancel before a worker claims it.
pub struct DispatchHandle {
    rx: oneshot::Receiver<CommandResult>,
    /// Present when the task went through the queue (the only place a
    /// cancellation can still reach it).
    queued: Option<(u64, Arc<PoolInner>)>,
}

impl DispatchHandle {
    /// Waits for the command's result.
    ///
    /// A dropped result channel means the executing worker died before
    /// replying; that surfaces as `WorkerCrashed`.
    pub async fn wait(self) -> CommandResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(OctopusError::WorkerCrashed(1)),
        }
    }

    /// Cancels the dispatch if the task is still queued.
    ///
    /// Returns `true` if the task was removed before any worker claimed it;
    /// every submission merged onto it is rejected with `Cancelled`. A task
    /// already in flight cannot be cancelled and `false` is returned.
    pub async fn cancel(self) -> bool {
        if let Some((digest, inner)) = self.queued {
            if let Some(task) = inner.queue.remove(digest).await {
                task.complete(Err(OctopusError::Cancelled));
                return true;
            }
        }
        false
    }
}

impl PoolInner {
    /// Spawns a context, its run loop, and its monitor. Caller must either
    /// hold the pool mutex or be initializing the pool.
    fn spawn_worker(self: &Arc<Self>) {
        let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);

        self.occ.register(id);
        let worker = tokio::spawn(worker_loop(Arc::clone(self), id, inbox_rx));
        let abort = worker.abort_handle();
        let monitor = tokio::spawn(monitor_worker(Arc::clone(self), id, worker));

        self.workers.lock().unwrap().insert(
            id,
            WorkerHandle {
                inbox: inbox_tx,
                abort,
                monitor,
            },
        );
        self.available.lock().unwrap().insert(id);
        debug!(worker = id, "execution context spawned");
    }

    /// Attempts a direct hand-off to an idle worker.
    ///
    /// Returns the job back when no worker could take it.
    async fn try_direct(self: &Arc<Self>, job: Job) -> Option<Job> {
        let owner = OwnerId::next();
        self.mutex.lock(owner).await;
        let claimed = self.claim_available_worker();
        self.mutex.unlock(owner).unwrap();

        match claimed {
            Some(id) => self.ship(id, job),
            None => Some(job),
        }
    }

    /// Picks the lowest available id and transitions it Idle → Busy through
    /// OCC. A conflict or vanished worker drops that id from `available` and
    /// tries the next, up to the retry bound. Caller holds the pool mutex.
    fn claim_available_worker(&self) -> Option<WorkerId> {
        for _ in 0..OCC_RETRY_BOUND {
            let id = {
                let available = self.available.lock().unwrap();
                available.iter().next().copied()
            }?;

            let Some(meta) = self.occ.get(id) else {
                self.available.lock().unwrap().remove(&id);
                continue;
            };

            match self.occ.perform(id, meta.version, |meta| {
                meta.state = WorkerState::Busy;
                Ok(())
            }) {
                Ok(()) => {
                    self.available.lock().unwrap().remove(&id);
                    return Some(id);
                }
                Err(error) => {
                    // Stale view of this worker; forget it and try another.
                    debug!(worker = id, %error, "dispatch claim retried");
                    self.available.lock().unwrap().remove(&id);
                }
            }
        }
        None
    }

    /// Sends a job to a claimed worker's inbox. Returns the job back if the
    /// worker vanished between claim and send.
    fn ship(&self, id: WorkerId, job: Job) -> Option<Job> {
        let inbox = {
            let workers = self.workers.lock().unwrap();
            workers.get(&id).map(|handle| handle.inbox.clone())
        };
        match inbox {
            Some(inbox) => match inbox.try_send(job) {
                Ok(()) => {
                    debug!(worker = id, "command shipped");
                    None
                }
                Err(error) => Some(error.into_inner()),
            },
            None => Some(job),
        }
    }

    /// Busy → Idle through OCC and back into `available`. Runs on the worker
    /// task right after a command finishes, before the result is delivered.
    async fn release_worker(&self, id: WorkerId) {
        let owner = OwnerId::next();
        self.mutex.lock(owner).await;
        for _ in 0..OCC_RETRY_BOUND {
            let Some(meta) = self.occ.get(id) else {
                break;
            };
            match self.occ.perform(id, meta.version, |meta| {
                meta.state = WorkerState::Idle;
                Ok(())
            }) {
                Ok(()) => {
                    self.available.lock().unwrap().insert(id);
                    break;
                }
                Err(OctopusError::Conflict { .. }) => continue,
                Err(_) => break,
            }
        }
        self.mutex.unlock(owner).unwrap();
    }

    /// Removes a crashed worker and spawns a replacement.
    async fn handle_crash(self: &Arc<Self>, id: WorkerId) {
        let owner = OwnerId::next();
        self.mutex.lock(owner).await;

        if let Some(meta) = self.occ.get(id) {
            let _ = self.occ.perform(id, meta.version, |meta| {
                meta.state = WorkerState::Terminated;
                Ok(())
            });
        }
        self.occ.deregister(id);
        self.available.lock().unwrap().remove(&id);
        self.workers.lock().unwrap().remove(&id);

        let replace = !self.shutting_down.load(Ordering::SeqCst)
            && self.workers.lock().unwrap().len() < self.config.max_workers;
        if replace {
            self.spawn_worker();
            info!(worker = id, "crashed worker replaced");
        }

        self.mutex.unlock(owner).unwrap();
        self.freed.notify_one();
    }
}

/// Run loop of one execution context.
///
/// Waits on the inbox and, when TTL deadlines are pending, on a timer for
/// the earliest one (eager expiry). Exits when the inbox closes.
async fn worker_loop(inner: Arc<PoolInner>, id: WorkerId, mut inbox: mpsc::Receiver<Job>) {
    let mut ctx = ExecutionContext::new(id);
    debug!(worker = id, "execution context started");

    loop {
        let received = match ctx.next_deadline() {
            Some(deadline) => {
                tokio::select! {
                    job = inbox.recv() => job,
                    _ = tokio::time::sleep_until(deadline.into()) => {
                        let purged = ctx.purge_due();
                        if purged > 0 {
                            debug!(worker = id, purged, "eagerly expired keys");
                        }
                        continue;
                    }
                }
            }
            None => inbox.recv().await,
        };

        let Some(job) = received else {
            break;
        };

        let result = ctx.execute(&job.command);

        // Release before replying: a caller that awaits this result and
        // immediately dispatches again finds this context available.
        inner.release_worker(id).await;
        for waiter in job.waiters {
            let _ = waiter.send(result.clone());
        }
        inner.freed.notify_one();
    }

    debug!(worker = id, "execution context stopped");
}

/// Watches one worker task; abnormal termination triggers crash recovery.
async fn monitor_worker(inner: Arc<PoolInner>, id: WorkerId, worker: JoinHandle<()>) {
    match worker.await {
        Ok(()) => {} // graceful stop
        Err(error) => {
            warn!(
                worker = id,
                cancelled = error.is_cancelled(),
                "execution context terminated abnormally"
            );
            inner.handle_crash(id).await;
        }
    }
}

/// Takes ripened tasks off the queue and places them on freed workers.
async fn drainer_loop(inner: Arc<PoolInner>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        let task = tokio::select! {
            _ = shutdown_rx.changed() => break,
            task = inner.queue.dequeue() => task,
        };

        if let Some(rejected) = place(&inner, Job::from_task(task), &mut shutdown_rx).await {
            rejected.reject(OctopusError::ShuttingDown);
        }
    }
}

/// Waits for an idle worker and ships the job to it. Returns the job back
/// when shutdown interrupts the wait.
async fn place(
    inner: &Arc<PoolInner>,
    mut job: Job,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Option<Job> {
    loop {
        let owner = OwnerId::next();
        inner.mutex.lock(owner).await;
        let claimed = inner.claim_available_worker();
        inner.mutex.unlock(owner).unwrap();

        if let Some(id) = claimed {
            match inner.ship(id, job) {
                None => return None,
                // Worker vanished between claim and send; try another.
                Some(returned) => {
                    job = returned;
                    continue;
                }
            }
        }

        tokio::select! {
            _ = shutdown_rx.changed() => return Some(job),
            _ = inner.freed.notified() => {}
        }
    }
}
