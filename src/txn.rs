//! Transaction Manager
//!
//! Transactions in OctopusDB are batched and serial: a transaction collects
//! commands, and `commit` runs them through the pool one after another, each
//! awaited before the next. Starting a transaction acquires the manager's
//! internal reentrant mutex, so a second `start` blocks until the first
//! transaction commits or rolls back.
//!
//! ## Limitations
//!
//! This is sequencing, not isolation: non-transactional commands interleave
//! freely with a committing batch. `rollback` performs no compensation; it
//! aborts a batch that has not started executing. Once `commit` begins,
//! rollback reports `AlreadyCommitted`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::command::{Command, Reply};
use crate::error::OctopusError;
use crate::pool::WorkerPool;
use crate::sync::{OwnerId, ReentrantMutex};

struct TxnRecord {
    ops: Vec<Command>,
    /// Mutex owner token held from `start` until commit/rollback releases it.
    owner: OwnerId,
}

struct TxnInner {
    pool: WorkerPool,
    /// Serializes whole transactions: held from `start` to commit/rollback.
    mutex: ReentrantMutex,
    next_id: AtomicU64,
    active: Mutex<HashMap<u64, TxnRecord>>,
}

/// Allocates, serializes and executes transactions.
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<TxnInner>,
}

impl TransactionManager {
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            inner: Arc::new(TxnInner {
                pool,
                mutex: ReentrantMutex::new(),
                next_id: AtomicU64::new(0),
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Begins a transaction, blocking until any transaction in progress
    /// finishes. The returned handle carries a monotonically increasing id.
    pub async fn start(&self) -> Transaction {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let owner = OwnerId::next();
        self.inner.mutex.lock(owner).await;

        self.inner
            .active
            .lock()
            .unwrap()
            .insert(id, TxnRecord { ops: Vec::new(), owner });
        debug!(txn = id, "transaction started");

        Transaction {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Appends a command to an active transaction's batch.
    pub fn add_operation(&self, id: u64, command: Command) -> Result<(), OctopusError> {
        let mut active = self.inner.active.lock().unwrap();
        let record = active.get_mut(&id).ok_or(OctopusError::AlreadyCommitted)?;
        record.ops.push(command);
        Ok(())
    }

    /// Executes the batch sequentially, each command awaited before the next.
    ///
    /// The serialization mutex is released whether or not the batch succeeds.
    /// The first failing command aborts the remainder; its error is
    /// re-raised after the abort bookkeeping.
    pub async fn commit(&self, id: u64) -> Result<Vec<Reply>, OctopusError> {
        let record = self
            .inner
            .active
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or(OctopusError::AlreadyCommitted)?;

        let mut replies = Vec::with_capacity(record.ops.len());
        let mut failure = None;
        for command in record.ops {
            match self.inner.pool.dispatch(command).await.wait().await {
                Ok(reply) => replies.push(reply),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        self.inner.mutex.unlock(record.owner)?;

        match failure {
            None => {
                debug!(txn = id, ops = replies.len(), "transaction committed");
                Ok(replies)
            }
            Some(error) => {
                debug!(txn = id, %error, "transaction aborted mid-commit");
                Err(error)
            }
        }
    }

    /// Abandons a not-yet-committed transaction: clears its batch and
    /// releases the serialization mutex. After commit this reports
    /// `AlreadyCommitted`.
    pub async fn rollback(&self, id: u64) -> Result<(), OctopusError> {
        let record = self
            .inner
            .active
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or(OctopusError::AlreadyCommitted)?;

        self.inner.mutex.unlock(record.owner)?;
        debug!(txn = id, "transaction rolled back");
        Ok(())
    }

    /// Number of transactions between `start` and commit/rollback.
    pub fn active_count(&self) -> usize {
        self.inner.active.lock().unwrap().len()
    }
}

/// Handle to one transaction.
pub struct Transaction {
    id: u64,
    inner: Arc<TxnInner>,
}

impl Transaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Appends a command to this transaction's batch.
    pub fn add(&self, command: Command) -> Result<(), OctopusError> {
        let mut active = self.inner.active.lock().unwrap();
        let record = active
            .get_mut(&self.id)
            .ok_or(OctopusError::AlreadyCommitted)?;
        record.ops.push(command);
        Ok(())
    }
}
