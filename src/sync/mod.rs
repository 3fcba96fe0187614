//! Synchronization Primitives
//!
//! This module provides the reentrant mutex that serializes OctopusDB's
//! critical sections: pool metadata transitions, task-queue mutations, and
//! transaction sequencing all run under one.

pub mod mutex;

// Re-export commonly used types
pub use mutex::{OwnerId, ReentrantMutex};
