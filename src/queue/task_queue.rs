//! Advanced Task Queue
//!
//! Thread-safe backlog combining three concerns:
//!
//! 1. **Priority + delay ordering**: tasks are held in a min-heap keyed by
//!    `(ready_at, priority)` with insertion order as the final tie-break.
//! 2. **Deduplication**: a structurally identical submission does not queue a
//!    second execution; its waiter is merged into the queued task.
//! 3. **Blocking dequeue**: a dequeuer suspends until the head task ripens or
//!    an earlier task arrives, whichever comes first. There is no periodic
//!    polling: the wait is a `sleep_until` on the head's ready time raced
//!    against a `Notify`.
//!
//! ## Invariants
//!
//! - A digest is present in the task map iff its entry is in the heap; every
//!   removal path (dequeue, cancel, drain) updates both under the lock.
//! - All mutating operations run inside the queue's own reentrant mutex.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::queue::{MinHeap, Task};
use crate::sync::{OwnerId, ReentrantMutex};

/// Ordering key inside the heap: ready time first, then priority.
type QueueKey = (Instant, i32);

#[derive(Debug)]
struct QueueState {
    /// Queued tasks by digest; doubles as the dedup set.
    tasks: HashMap<u64, Task>,
    /// Execution order; holds digests only.
    heap: MinHeap<QueueKey, u64>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            heap: MinHeap::new(),
        }
    }

    /// Removes and returns the head task if its ready time has passed.
    fn pop_ready(&mut self, now: Instant) -> Option<Task> {
        let ready = matches!(self.heap.peek(), Some(((ready_at, _), _)) if *ready_at <= now);
        if !ready {
            return None;
        }
        let (_, digest) = self.heap.pop()?;
        self.tasks.remove(&digest)
    }

    /// Ready time of the current head, if any.
    fn head_ready_at(&self) -> Option<Instant> {
        self.heap.peek().map(|((ready_at, _), _)| *ready_at)
    }
}

/// Thread-safe priority/delay/dedup queue with blocking dequeue.
pub struct TaskQueue {
    lock: ReentrantMutex,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            lock: ReentrantMutex::new(),
            state: Mutex::new(QueueState::new()),
            notify: Notify::new(),
        }
    }

    /// Runs `f` on the queue state inside the queue's reentrant mutex.
    async fn locked<R>(&self, f: impl FnOnce(&mut QueueState) -> R) -> R {
        let owner = OwnerId::next();
        self.lock.lock(owner).await;
        let result = {
            let mut state = self.state.lock().unwrap();
            f(&mut *state)
        };
        // We hold the mutex, so unlock cannot fail.
        self.lock.unlock(owner).unwrap();
        result
    }

    /// Inserts `task`, or merges its waiters into an already-queued
    /// structurally identical task.
    ///
    /// Returns `true` if the task was inserted, `false` if it was merged.
    /// Wakes one suspended dequeuer whenever the insertion lowers the
    /// earliest `(ready_at, priority)` the queue will serve next.
    pub async fn enqueue(&self, task: Task) -> bool {
        let digest = task.digest();
        let (inserted, wake) = self
            .locked(|state| {
                if let Some(existing) = state.tasks.get_mut(&digest) {
                    debug!(digest, "duplicate task merged into queued submission");
                    existing.waiters.extend(task.waiters);
                    return (false, false);
                }

                let key = (task.ready_at, task.priority);
                let wake = match state.heap.peek() {
                    // A parked dequeuer may be waiting with no timer at all.
                    None => true,
                    Some((head, _)) => key < *head,
                };
                state.heap.push(key, digest);
                state.tasks.insert(digest, task);
                trace!(digest, "task queued");
                (true, wake)
            })
            .await;

        // Notify outside the lock so the woken dequeuer can take it at once.
        if wake {
            self.notify.notify_one();
        }
        inserted
    }

    /// Removes and returns the earliest ready task, suspending until one
    /// becomes ready.
    ///
    /// The suspension ends when the head's ready time passes or when an
    /// enqueue lowers the earliest ready time, whichever comes first.
    pub async fn dequeue(&self) -> Task {
        loop {
            let head = self
                .locked(|state| match state.pop_ready(Instant::now()) {
                    Some(task) => Ok(task),
                    None => Err(state.head_ready_at()),
                })
                .await;

            let next_ready = match head {
                Ok(task) => return task,
                Err(at) => at,
            };

            match next_ready {
                Some(at) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(at.into()) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// Non-blocking variant of [`dequeue`](Self::dequeue); returns `None`
    /// when nothing is ready yet.
    pub async fn try_dequeue(&self) -> Option<Task> {
        self.locked(|state| state.pop_ready(Instant::now())).await
    }

    /// Removes a not-yet-claimed task by digest (dispatch cancellation).
    pub async fn remove(&self, digest: u64) -> Option<Task> {
        self.locked(|state| {
            let task = state.tasks.remove(&digest)?;
            state.heap.retain(|_, queued| *queued != digest);
            Some(task)
        })
        .await
    }

    /// Removes and returns every queued task (used at shutdown).
    pub async fn drain(&self) -> Vec<Task> {
        self.locked(|state| {
            state.heap = MinHeap::new();
            state.tasks.drain().map(|(_, task)| task).collect()
        })
        .await
    }

    /// Number of queued tasks, including not-yet-ready ones.
    pub async fn len(&self) -> usize {
        self.locked(|state| state.tasks.len()).await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
