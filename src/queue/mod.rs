//! Task Queue Module
//!
//! This module provides the backlog coordination for the worker pool: a
//! generic binary min-heap, the task record shuttled through it, and the
//! [`TaskQueue`] that combines priority, delay (ready-time) and structural
//! deduplication with a blocking dequeue.
//!
//! ## Architecture
//!
//! ```text
//! enqueue(command, priority, delay)
//!        │
//!        ▼
//! ┌───────────────────────────────────────────┐
//! │                TaskQueue                  │
//! │                                           │
//! │  tasks: digest ──> Task   (dedup + data)  │
//! │  heap:  (ready_at, priority) ──> digest   │
//! │                                           │
//! │  dequeue() sleeps until the head ripens   │
//! │  or an earlier task arrives               │
//! └───────────────────────────────────────────┘
//! ```
//!
//! There is no periodic polling: a suspended dequeuer waits on a timer
//! derived from the head's ready time plus a notification that fires when an
//! earlier task is enqueued.

pub mod heap;
pub mod task;
pub mod task_queue;

// Re-export commonly used types
pub use heap::MinHeap;
pub use task::Task;
pub use task_queue::TaskQueue;
