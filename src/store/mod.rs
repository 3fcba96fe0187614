//! Store Module
//!
//! This module provides the data plane of OctopusDB: the tagged [`Value`]
//! kept under each key and the [`ExecutionContext`] that owns a private
//! key-value map and TTL map and executes one command at a time.
//!
//! ## Ownership Model
//!
//! ```text
//! ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │ ExecutionContext │  │ ExecutionContext │  │ ExecutionContext │
//! │  store: k -> V   │  │  store: k -> V   │  │  store: k -> V   │
//! │  ttl:   k -> t   │  │  ttl:   k -> t   │  │  ttl:   k -> t   │
//! └──────────────────┘  └──────────────────┘  └──────────────────┘
//! ```
//!
//! Each context owns its maps outright, with no locks and no sharing.
//! Concurrency lives one layer up, in the worker pool that shuttles commands
//! between contexts.
//!
//! ## Expiry
//!
//! Keys expire two ways:
//! 1. **Lazy**: every command checks the target key's deadline first and
//!    deletes the entry if it has passed.
//! 2. **Eager**: the context tracks deadlines in a min-heap; its run loop
//!    sleeps until the earliest one and purges due keys even if nobody reads
//!    them.

pub mod context;
pub mod value;

// Re-export commonly used types
pub use context::ExecutionContext;
pub use value::Value;
