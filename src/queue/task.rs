//! Task Record
//!
//! A [`Task`] is a command plus its submission metadata, waiting in the
//! queue for a worker. The waiter list exists because deduplication merges
//! structurally identical submissions: one execution, every submitter
//! completed with its result.

use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::command::{Command, CommandResult};

/// A queued unit of work.
#[derive(Debug)]
pub struct Task {
    /// The command to execute.
    pub command: Command,
    /// Submission priority; lower values run first among equally ready tasks.
    pub priority: i32,
    /// Earliest monotonic time at which the task may run.
    pub ready_at: Instant,
    /// Dispatch futures to complete when the task executes (or is rejected).
    pub waiters: Vec<oneshot::Sender<CommandResult>>,
}

impl Task {
    /// Builds a task becoming ready `delay` from now.
    pub fn new(
        command: Command,
        priority: i32,
        delay: Duration,
        waiter: oneshot::Sender<CommandResult>,
    ) -> Self {
        Self {
            command,
            priority,
            ready_at: Instant::now() + delay,
            waiters: vec![waiter],
        }
    }

    /// Structural identity used for deduplication.
    pub fn digest(&self) -> u64 {
        self.command.digest()
    }

    /// Completes every waiter with (a clone of) `result`.
    ///
    /// Send failures are ignored: a waiter that dropped its receiver no
    /// longer cares about the outcome.
    pub fn complete(self, result: CommandResult) {
        for waiter in self.waiters {
            let _ = waiter.send(result.clone());
        }
    }
}
