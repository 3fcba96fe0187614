//! Error Types
//!
//! This module defines the single error enum propagated to callers of
//! OctopusDB. Worker-local errors (`WrongType`, `NotInteger`) are reported as
//! command results and never degrade the worker that produced them; the
//! remaining variants surface from the dispatch substrate.

use thiserror::Error;

/// Errors propagated to OctopusDB callers as typed values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OctopusError {
    /// Operation applied to a key holding an incompatible value tag.
    #[error("WRONGTYPE operation against a key holding the wrong kind of value")]
    WrongType,

    /// INCR/DECR applied to a value that is not an integer.
    #[error("value is not an integer or out of range")]
    NotInteger,

    /// No metadata is registered for the worker id.
    #[error("no metadata registered for worker {0}")]
    NotFound(u32),

    /// The metadata version moved since the caller read it.
    #[error("version conflict for worker {id}: expected {expected}, found {actual}")]
    Conflict {
        /// Worker whose metadata was contended.
        id: u32,
        /// Version the caller read.
        expected: u64,
        /// Version actually present.
        actual: u64,
    },

    /// A closure running inside an OCC section failed; the version was not
    /// advanced.
    #[error("operation failed inside OCC section: {0}")]
    OperationFailed(Box<OctopusError>),

    /// The worker executing the command terminated abnormally.
    /// Tokio tasks carry no OS exit status, so the code is synthetic: 1 for
    /// any abnormal termination (panic or abort).
    #[error("worker terminated abnormally (exit code {0})")]
    WorkerCrashed(i32),

    /// The caller cancelled the dispatch before a worker claimed the task.
    #[error("dispatch cancelled before execution")]
    Cancelled,

    /// The pool no longer accepts work.
    #[error("pool is shutting down")]
    ShuttingDown,

    /// The transaction was already committed (or is unknown to the manager).
    #[error("transaction already committed")]
    AlreadyCommitted,

    /// A reentrant mutex was released by a task that does not hold it.
    #[error("reentrant mutex released by a non-owner")]
    NotOwner,
}
