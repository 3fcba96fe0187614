//! Reentrant Async Mutex
//!
//! A mutual-exclusion primitive that lets its current owner re-acquire
//! without blocking. Tokio's own `Mutex` deadlocks if the holding task locks
//! again; the pool, the task queue, and the transaction manager all need
//! nested critical sections, so ownership is tracked explicitly.
//!
//! ## Design Decisions
//!
//! 1. **Explicit owner tokens**: async tasks have no usable identity across
//!    await points, so callers pass an [`OwnerId`] minted from a process-wide
//!    counter. A context, a transaction, or a queue caller holds exactly one.
//! 2. **FIFO handoff**: waiters park on oneshot channels in arrival order.
//!    The releasing side installs the next waiter as owner *before*
//!    signalling, so there is no window in which a newcomer can barge in.
//! 3. **Short internal lock**: the bookkeeping sits behind a `std::sync::Mutex`
//!    that is never held across an await.
//!
//! ## Contract
//!
//! - `lock(owner)` is an awaitable acquisition; the current owner re-enters
//!   immediately and increments the hold count.
//! - `unlock(owner)` releases exactly one acquisition; a non-owner gets
//!   `NotOwner`.
//! - When the count reaches zero and waiters exist, the head waiter becomes
//!   owner with count 1.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

use crate::error::OctopusError;

/// Identity token for reentrant-mutex acquisitions.
///
/// Mint one per logical owner (an execution context, a transaction, a queue
/// caller) and pass it to every `lock`/`unlock` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocates a fresh, process-unique owner id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        OwnerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct MutexState {
    /// Current owner; `None` iff `count == 0`.
    holder: Option<OwnerId>,
    /// Balanced acquisition count for the current owner.
    count: u32,
    /// Parked acquirers in FIFO order.
    waiters: VecDeque<(OwnerId, oneshot::Sender<()>)>,
}

/// A FIFO-fair, reentrant, owner-checked async mutex.
///
/// # Example
///
/// ```
/// use octopusdb::sync::{OwnerId, ReentrantMutex};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mutex = ReentrantMutex::new();
/// let me = OwnerId::next();
///
/// mutex.lock(me).await;
/// mutex.lock(me).await; // re-entry does not block
/// mutex.unlock(me).unwrap();
/// mutex.unlock(me).unwrap();
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ReentrantMutex {
    state: Mutex<MutexState>,
}

impl ReentrantMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the mutex for `owner`, waiting in FIFO order behind other
    /// owners. Re-entry by the current owner returns immediately.
    pub async fn lock(&self, owner: OwnerId) {
        let rx = {
            let mut state = self.state.lock().unwrap();
            match state.holder {
                None => {
                    state.holder = Some(owner);
                    state.count = 1;
                    return;
                }
                Some(holder) if holder == owner => {
                    state.count += 1;
                    return;
                }
                Some(_) => {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back((owner, tx));
                    rx
                }
            }
        };

        // The releasing side installs us as holder before signalling, so a
        // completed receive means the lock is already ours. A dropped sender
        // cannot happen while the mutex is alive.
        let _ = rx.await;
    }

    /// Releases one acquisition held by `owner`.
    ///
    /// Returns `NotOwner` if `owner` does not currently hold the mutex.
    /// When the balanced count reaches zero, ownership passes to the head
    /// waiter (skipping waiters whose futures were dropped while parked).
    pub fn unlock(&self, owner: OwnerId) -> Result<(), OctopusError> {
        let mut state = self.state.lock().unwrap();
        if state.holder != Some(owner) {
            return Err(OctopusError::NotOwner);
        }

        state.count -= 1;
        if state.count > 0 {
            return Ok(());
        }

        // Hand off to the next live waiter. A send failure means that
        // waiter's future was dropped before acquisition; it never owned the
        // lock, so we simply move on.
        while let Some((next, tx)) = state.waiters.pop_front() {
            state.holder = Some(next);
            state.count = 1;
            if tx.send(()).is_ok() {
                return Ok(());
            }
        }

        state.holder = None;
        state.count = 0;
        Ok(())
    }

    /// Returns the current owner, if any. Primarily for diagnostics.
    pub fn holder(&self) -> Option<OwnerId> {
        self.state.lock().unwrap().holder
    }
}
