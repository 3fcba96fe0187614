//! Worker Pool Module
//!
//! This module provides the execution substrate of OctopusDB: worker
//! metadata guarded by optimistic concurrency control, and the pool that
//! dispatches commands to a bounded set of execution contexts.
//!
//! ## Architecture
//!
//! ```text
//! dispatch(command, priority, delay)
//!        │
//!        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                           │
//! │                                                             │
//! │  available? ──yes──> OCC Idle->Busy ──> worker inbox        │
//! │      │                                                      │
//! │      no / delayed                                           │
//! │      ▼                                                      │
//! │  TaskQueue ──(ready)──> drainer ──> OCC claim ──> inbox     │
//! │                                                             │
//! │  completion: OCC Busy->Idle, drain queue                    │
//! │  crash:      remove worker, reject future, replace, drain   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod occ;
pub mod worker_pool;

// Re-export commonly used types
pub use occ::{OccRegistry, WorkerId, WorkerMeta, WorkerState};
pub use worker_pool::{DispatchHandle, PoolConfig, WorkerPool};
