//! # OctopusDB - A Parallel In-Memory Key-Value Store
//!
//! OctopusDB is an embedded, Redis-inspired key-value store that exploits
//! multi-core parallelism by spreading command execution across a pool of
//! isolated worker contexts. Clients submit single-key commands (strings,
//! counters with TTL, lists, sets) and receive results asynchronously. The
//! store lives inside the host process; there is no network protocol.
//!
//! ## Features
//!
//! - **Worker pool**: a bounded set of execution contexts, each owning a
//!   private key-value map, executing one command at a time
//! - **Advanced task queue**: backlog with priority, delay (ready-time) and
//!   structural deduplication; dequeuers wait on deadline timers, never poll
//! - **OCC-guarded metadata**: dispatch and completion race safely through
//!   version-validated read-modify-write on worker state
//! - **TTL support**: lazy expiry on access plus eager expiry from a
//!   deadline timer in each context's run loop
//! - **Transactions**: batched command sequences serialized by a reentrant
//!   mutex, committed one command at a time
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             OctopusDB                               │
//! │                                                                     │
//! │  ┌───────────┐     ┌──────────────┐      ┌───────────────────────┐  │
//! │  │  Octopus  │────>│  WorkerPool  │─────>│  ExecutionContext 0   │  │
//! │  │ (façade)  │     │              │      │   store / ttl maps    │  │
//! │  └───────────┘     │  OCC-guarded │      ├───────────────────────┤  │
//! │                    │  metadata +  │─────>│  ExecutionContext 1   │  │
//! │  ┌───────────┐     │  `available` │      ├───────────────────────┤  │
//! │  │ Txn       │────>│              │─────>│  ...  (max_workers)   │  │
//! │  │ Manager   │     └──────┬───────┘      └───────────────────────┘  │
//! │  └───────────┘            │ backlog                                 │
//! │                    ┌──────▼───────┐                                 │
//! │                    │  TaskQueue   │  (ready_at, priority) min-heap  │
//! │                    │              │  + digest dedup + timer waits   │
//! │                    └──────────────┘                                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use octopusdb::Octopus;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), octopusdb::OctopusError> {
//!     // Process-wide singleton with 8 worker contexts.
//!     let db = Octopus::instance();
//!
//!     db.set("name", "Alice").await?;
//!     assert_eq!(db.get("name").await?.as_deref(), Some(&b"Alice"[..]));
//!
//!     db.set("visits", "10").await?;
//!     let visits = db.incr("visits").await?; // b"11"
//!
//!     db.rpush("queue", "job-1").await?;
//!     db.rpush("queue", "job-2").await?;
//!     let next = db.lpop("queue").await?; // Some(b"job-1")
//!
//!     db.expire("name", 60).await?; // gone in a minute
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! ### Strings & Counters
//! - `set`, `get`, `del`, `exists`
//! - `incr`, `decr` (typed `NotInteger` on non-numeric values)
//!
//! ### Expiry
//! - `expire`, `ttl`, `persist`
//!
//! ### Lists
//! - `lpush`, `rpush`, `lpop`, `rpop`
//!
//! ### Sets
//! - `sadd`, `srem`, `smembers`
//!
//! ## Module Overview
//!
//! - [`octopus`]: the singleton command façade and operation events
//! - [`pool`]: the worker pool and the OCC metadata registry
//! - [`queue`]: min-heap, task records, and the priority/delay/dedup queue
//! - [`store`]: value tags and the per-context key-value engine
//! - [`sync`]: the reentrant async mutex
//! - [`txn`]: the transaction manager
//! - [`command`]: command and reply types
//! - [`error`]: the crate error taxonomy
//!
//! ## Design Highlights
//!
//! ### Per-Context Ownership
//!
//! There is no shared store. Each context owns its maps outright, so command
//! execution takes no locks at all. The pool's metadata is the only shared
//! mutable state, guarded by a reentrant mutex and mediated by OCC. A caller
//! that awaits each command before submitting the next always lands on the
//! lowest-id idle context, which keeps a sequential session coherent.
//!
//! ### Timer-Driven Waiting
//!
//! Nothing in OctopusDB polls. A dequeuer blocked on a delayed task sleeps
//! until the head's ready time and is woken early if an earlier task
//! arrives; a context with pending TTLs sleeps until the earliest deadline
//! and purges due keys when it fires.
//!
//! ### Lazy + Eager Expiry
//!
//! Keys with TTL are expired on access (lazy) and by the context's deadline
//! timer (eager), so memory is reclaimed even for keys nobody reads again.

pub mod command;
pub mod error;
pub mod octopus;
pub mod pool;
pub mod queue;
pub mod store;
pub mod sync;
pub mod txn;

// Re-export commonly used types for convenience
pub use command::{Command, CommandKind, CommandResult, Reply};
pub use error::OctopusError;
pub use octopus::{Octopus, OperationEvent};
pub use pool::{DispatchHandle, PoolConfig, WorkerPool};
pub use queue::TaskQueue;
pub use store::ExecutionContext;
pub use txn::{Transaction, TransactionManager};

/// Default number of execution contexts in the pool.
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Version of OctopusDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
