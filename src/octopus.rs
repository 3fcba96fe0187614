//! Command Façade
//!
//! [`Octopus`] is the embedded API surface: one async method per command,
//! each translating to a pool dispatch. A process-wide singleton is available
//! through [`Octopus::instance`]; hosts that want several independent stores
//! (or tests that want isolation) construct their own with [`Octopus::new`].
//!
//! ## Operation events
//!
//! Listeners registered with [`on_operation`](Octopus::on_operation) are
//! invoked synchronously after a command's dispatch future resolves
//! successfully, with the command kind, the key, and the value argument when
//! one was supplied. Failed commands emit nothing.

use bytes::Bytes;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use tracing::trace;

use crate::command::{Command, CommandKind, Reply};
use crate::error::OctopusError;
use crate::pool::{PoolConfig, WorkerPool};
use crate::txn::TransactionManager;

/// Notification emitted after a command completes successfully.
#[derive(Debug, Clone)]
pub struct OperationEvent {
    pub kind: CommandKind,
    pub key: Bytes,
    pub value: Option<Bytes>,
}

type OperationListener = Box<dyn Fn(&OperationEvent) + Send + Sync>;

static INSTANCE: OnceLock<Arc<Octopus>> = OnceLock::new();

/// The embedded OctopusDB handle.
pub struct Octopus {
    pool: WorkerPool,
    transactions: TransactionManager,
    listeners: RwLock<Vec<OperationListener>>,
}

impl Octopus {
    /// Creates an independent store (no singleton involvement).
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: PoolConfig) -> Arc<Self> {
        let pool = WorkerPool::new(config);
        Arc::new(Self {
            transactions: TransactionManager::new(pool.clone()),
            pool,
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Returns the process-wide singleton, creating it with the default
    /// worker count (8) on first use.
    pub fn instance() -> Arc<Self> {
        Self::instance_with_workers(crate::DEFAULT_MAX_WORKERS)
    }

    /// Returns the process-wide singleton, creating it with `max_workers`
    /// contexts on first use. Later calls ignore the argument and return the
    /// existing instance.
    pub fn instance_with_workers(max_workers: usize) -> Arc<Self> {
        Arc::clone(INSTANCE.get_or_init(|| Octopus::new(PoolConfig::new(max_workers))))
    }

    /// Registers a listener for successful operations.
    pub fn on_operation(&self, listener: impl Fn(&OperationEvent) + Send + Sync + 'static) {
        self.listeners.write().unwrap().push(Box::new(listener));
    }

    /// The underlying pool (worker counts, explicit priority/delay dispatch).
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// The transaction manager bound to this store.
    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// Stops the store: pending work is rejected, contexts drain and exit.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Dispatches, awaits, and emits the operation event on success.
    async fn run(&self, command: Command) -> Result<Reply, OctopusError> {
        let event = OperationEvent {
            kind: command.kind,
            key: command.key.clone(),
            value: command.value.clone(),
        };

        let reply = self.pool.dispatch(command).await.wait().await?;

        trace!(kind = event.kind.as_str(), "operation completed");
        let listeners = self.listeners.read().unwrap();
        for listener in listeners.iter() {
            listener(&event);
        }
        Ok(reply)
    }

    // ------------------------------------------------------------------
    // Command surface
    // ------------------------------------------------------------------

    /// Stores `value` under `key`, clearing any expiry.
    pub async fn set(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<(), OctopusError> {
        self.run(Command::set(key, value)).await.map(|_| ())
    }

    /// Returns the value under `key`, or `None` if absent (or expired).
    pub async fn get(&self, key: impl Into<Bytes>) -> Result<Option<Bytes>, OctopusError> {
        match self.run(Command::get(key)).await? {
            Reply::Value(bytes) => Ok(Some(bytes)),
            _ => Ok(None),
        }
    }

    /// Deletes `key`; returns 1 if it existed, 0 otherwise.
    pub async fn del(&self, key: impl Into<Bytes>) -> Result<i64, OctopusError> {
        self.int(Command::del(key)).await
    }

    /// Returns 1 if `key` exists, 0 otherwise.
    pub async fn exists(&self, key: impl Into<Bytes>) -> Result<i64, OctopusError> {
        self.int(Command::exists(key)).await
    }

    /// Increments the counter under `key` (creating it at 0); returns the
    /// new value in decimal.
    pub async fn incr(&self, key: impl Into<Bytes>) -> Result<Bytes, OctopusError> {
        self.counter(Command::incr(key)).await
    }

    /// Decrements the counter under `key` (creating it at 0); returns the
    /// new value in decimal.
    pub async fn decr(&self, key: impl Into<Bytes>) -> Result<Bytes, OctopusError> {
        self.counter(Command::decr(key)).await
    }

    /// Sets an expiry `ttl_secs` from now; returns 1, or 0 if `key` is absent.
    pub async fn expire(
        &self,
        key: impl Into<Bytes>,
        ttl_secs: u64,
    ) -> Result<i64, OctopusError> {
        self.int(Command::expire(key, ttl_secs)).await
    }

    /// Remaining TTL in whole seconds (rounded up), or -1 without a deadline.
    pub async fn ttl(&self, key: impl Into<Bytes>) -> Result<i64, OctopusError> {
        self.int(Command::ttl(key)).await
    }

    /// Cancels any expiry on `key`; returns 1 if one was cancelled.
    pub async fn persist(&self, key: impl Into<Bytes>) -> Result<i64, OctopusError> {
        self.int(Command::persist(key)).await
    }

    /// Prepends to the list under `key`; returns the new length.
    pub async fn lpush(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<i64, OctopusError> {
        self.int(Command::lpush(key, value)).await
    }

    /// Appends to the list under `key`; returns the new length.
    pub async fn rpush(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<i64, OctopusError> {
        self.int(Command::rpush(key, value)).await
    }

    /// Pops from the head of the list, or `None` when empty or absent.
    pub async fn lpop(&self, key: impl Into<Bytes>) -> Result<Option<Bytes>, OctopusError> {
        self.element(Command::lpop(key)).await
    }

    /// Pops from the tail of the list, or `None` when empty or absent.
    pub async fn rpop(&self, key: impl Into<Bytes>) -> Result<Option<Bytes>, OctopusError> {
        self.element(Command::rpop(key)).await
    }

    /// Adds a member to the set under `key`; returns the new cardinality.
    pub async fn sadd(
        &self,
        key: impl Into<Bytes>,
        member: impl Into<Bytes>,
    ) -> Result<i64, OctopusError> {
        self.int(Command::sadd(key, member)).await
    }

    /// Removes a member from the set; returns 1 if it was present.
    pub async fn srem(
        &self,
        key: impl Into<Bytes>,
        member: impl Into<Bytes>,
    ) -> Result<i64, OctopusError> {
        self.int(Command::srem(key, member)).await
    }

    /// Members of the set under `key` (order unspecified; empty if absent).
    pub async fn smembers(&self, key: impl Into<Bytes>) -> Result<Vec<Bytes>, OctopusError> {
        match self.run(Command::smembers(key)).await? {
            Reply::Members(members) => Ok(members),
            _ => Ok(Vec::new()),
        }
    }

    /// Submits a command with explicit priority and delay, bypassing the
    /// immediate-await convenience of the per-command methods.
    pub async fn dispatch(
        &self,
        command: Command,
        priority: i32,
        delay: Duration,
    ) -> crate::pool::DispatchHandle {
        self.pool.dispatch_with(command, priority, delay).await
    }

    // Reply-shape helpers. The context returns a fixed shape per command
    // kind, so the fallback arms are never taken in practice.

    async fn int(&self, command: Command) -> Result<i64, OctopusError> {
        match self.run(command).await? {
            Reply::Int(n) => Ok(n),
            _ => Ok(0),
        }
    }

    async fn counter(&self, command: Command) -> Result<Bytes, OctopusError> {
        match self.run(command).await? {
            Reply::Value(bytes) => Ok(bytes),
            _ => Ok(Bytes::new()),
        }
    }

    async fn element(&self, command: Command) -> Result<Option<Bytes>, OctopusError> {
        match self.run(command).await? {
            Reply::Value(bytes) => Ok(Some(bytes)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tokio::time::sleep;

    fn store() -> Arc<Octopus> {
        Octopus::new(PoolConfig::new(4))
    }

    #[tokio::test]
    async fn singleton_identity() {
        let a = Octopus::instance_with_workers(2);
        let b = Octopus::instance();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn string_round_trip() {
        let db = store();

        db.set("name", "Alice").await.unwrap();
        assert_eq!(db.get("name").await.unwrap(), Some(Bytes::from("Alice")));
        assert_eq!(db.del("name").await.unwrap(), 1);
        assert_eq!(db.get("name").await.unwrap(), None);
        assert_eq!(db.exists("name").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn counters_with_expiry() {
        let db = store();

        db.set("c", "10").await.unwrap();
        assert_eq!(db.incr("c").await.unwrap(), Bytes::from("11"));
        assert_eq!(db.decr("c").await.unwrap(), Bytes::from("10"));
        assert_eq!(db.expire("c", 1).await.unwrap(), 1);

        sleep(Duration::from_millis(1_300)).await;
        assert_eq!(db.ttl("c").await.unwrap(), -1);
        assert_eq!(db.get("c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sets_deduplicate_members() {
        let db = store();

        assert_eq!(db.sadd("s", "a").await.unwrap(), 1);
        assert_eq!(db.sadd("s", "a").await.unwrap(), 1);
        assert_eq!(db.sadd("s", "b").await.unwrap(), 2);

        let members: HashSet<Bytes> = db.smembers("s").await.unwrap().into_iter().collect();
        assert_eq!(members, HashSet::from([Bytes::from("a"), Bytes::from("b")]));
    }

    #[tokio::test]
    async fn lists_push_and_pop_both_ends() {
        let db = store();

        assert_eq!(db.rpush("L", "x").await.unwrap(), 1);
        assert_eq!(db.rpush("L", "y").await.unwrap(), 2);
        assert_eq!(db.lpop("L").await.unwrap(), Some(Bytes::from("x")));
        assert_eq!(db.rpop("L").await.unwrap(), Some(Bytes::from("y")));
        assert_eq!(db.lpop("L").await.unwrap(), None);
    }

    #[tokio::test]
    async fn typed_errors_reach_the_caller() {
        let db = store();

        db.rpush("L", "x").await.unwrap();
        assert_eq!(db.get("L").await, Err(OctopusError::WrongType));

        db.set("word", "hello").await.unwrap();
        assert_eq!(db.incr("word").await, Err(OctopusError::NotInteger));
    }

    #[tokio::test]
    async fn operation_events_fire_after_success_only() {
        let db = store();

        let seen: Arc<Mutex<Vec<(CommandKind, Bytes)>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            db.on_operation(move |event| {
                seen.lock().unwrap().push((event.kind, event.key.clone()));
            });
        }

        db.set("k", "v").await.unwrap();
        db.get("k").await.unwrap();
        // A failed command emits nothing.
        db.rpush("L", "x").await.unwrap();
        let _ = db.incr("L").await;

        let events = seen.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (CommandKind::Set, Bytes::from("k")),
                (CommandKind::Get, Bytes::from("k")),
                (CommandKind::RPush, Bytes::from("L")),
            ]
        );
    }

    #[tokio::test]
    async fn transactions_are_reachable_from_the_facade() {
        let db = store();

        let txn = db.transactions().start().await;
        txn.add(Command::set("name", "Bob")).unwrap();
        txn.add(Command::get("name")).unwrap();
        let replies = db.transactions().commit(txn.id()).await.unwrap();
        assert_eq!(
            replies,
            vec![Reply::Ok, Reply::Value(Bytes::from("Bob"))]
        );
    }

    #[tokio::test]
    async fn eager_expiry_clears_unread_keys() {
        let db = store();

        db.set("ghost", "v").await.unwrap();
        db.expire("ghost", 1).await.unwrap();

        // No reads touch the key while it expires; the context's deadline
        // timer removes it. The follow-up TTL probe reports no deadline and
        // the key is gone.
        sleep(Duration::from_millis(1_400)).await;
        assert_eq!(db.ttl("ghost").await.unwrap(), -1);
        assert_eq!(db.exists("ghost").await.unwrap(), 0);
    }
}
