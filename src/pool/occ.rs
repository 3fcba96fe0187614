//! Optimistic Concurrency Control for Worker Metadata
//!
//! Dispatch and completion callbacks race: a completion for worker 3 can
//! arrive while a dispatcher is still deciding to hand worker 3 new work.
//! Rather than hold a lock across the whole decision, each mutation is a
//! version-validated read-modify-write: the caller states the version it
//! based its decision on, and a mismatch means the decision is stale.
//!
//! ## Algorithm
//!
//! `perform(id, expected_version, op)`:
//! 1. Look up the metadata; absent ⇒ `NotFound`.
//! 2. Compare versions; mismatch ⇒ `Conflict`.
//! 3. Run `op`; failure ⇒ `OperationFailed`, version unchanged.
//! 4. Success ⇒ increment the version, return the op's result.
//!
//! Steps 1–4 are mutually exclusive (a single registry lock; the registry is
//! small and ops are cheap). Callers retry on `Conflict`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::OctopusError;

/// Identifier of an execution context within the pool.
pub type WorkerId = u32;

/// Lifecycle state of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Registered and ready for a command.
    Idle,
    /// Executing a command.
    Busy,
    /// Exited; kept only transiently while the pool cleans up.
    Terminated,
}

/// Version-guarded metadata for one execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerMeta {
    pub id: WorkerId,
    pub state: WorkerState,
    /// Incremented on every successful mutation through
    /// [`OccRegistry::perform`]; never decreases.
    pub version: u64,
}

/// Registry of worker metadata with version-validated mutation.
#[derive(Debug, Default)]
pub struct OccRegistry {
    workers: Mutex<HashMap<WorkerId, WorkerMeta>>,
}

impl OccRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new worker as `Idle` at version 0.
    pub fn register(&self, id: WorkerId) {
        let mut workers = self.workers.lock().unwrap();
        workers.insert(
            id,
            WorkerMeta {
                id,
                state: WorkerState::Idle,
                version: 0,
            },
        );
    }

    /// Removes a worker's metadata entirely (crash cleanup, shutdown).
    pub fn deregister(&self, id: WorkerId) -> Option<WorkerMeta> {
        self.workers.lock().unwrap().remove(&id)
    }

    /// Snapshot of one worker's metadata.
    pub fn get(&self, id: WorkerId) -> Option<WorkerMeta> {
        self.workers.lock().unwrap().get(&id).cloned()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Version-validated read-modify-write on one worker's metadata.
    ///
    /// On success the version is incremented and the op's result returned.
    /// `Conflict` means another mutation landed since the caller read
    /// `expected_version`; re-read and retry.
    pub fn perform<R>(
        &self,
        id: WorkerId,
        expected_version: u64,
        op: impl FnOnce(&mut WorkerMeta) -> Result<R, OctopusError>,
    ) -> Result<R, OctopusError> {
        let mut workers = self.workers.lock().unwrap();
        let meta = workers.get_mut(&id).ok_or(OctopusError::NotFound(id))?;

        if meta.version != expected_version {
            return Err(OctopusError::Conflict {
                id,
                expected: expected_version,
                actual: meta.version,
            });
        }

        let result =
            op(meta).map_err(|cause| OctopusError::OperationFailed(Box::new(cause)))?;
        meta.version += 1;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn perform_mutates_and_bumps_the_version() {
        let registry = OccRegistry::new();
        registry.register(7);

        let state = registry
            .perform(7, 0, |meta| {
                meta.state = WorkerState::Busy;
                Ok(meta.state)
            })
            .unwrap();
        assert_eq!(state, WorkerState::Busy);

        let meta = registry.get(7).unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(meta.state, WorkerState::Busy);
    }

    #[test]
    fn missing_worker_is_not_found() {
        let registry = OccRegistry::new();
        let err = registry.perform(9, 0, |_| Ok(())).unwrap_err();
        assert_eq!(err, OctopusError::NotFound(9));
    }

    #[test]
    fn stale_version_conflicts() {
        let registry = OccRegistry::new();
        registry.register(1);
        registry.perform(1, 0, |_| Ok(())).unwrap();

        let err = registry.perform(1, 0, |_| Ok(())).unwrap_err();
        assert_eq!(
            err,
            OctopusError::Conflict {
                id: 1,
                expected: 0,
                actual: 1
            }
        );
    }

    #[test]
    fn failed_op_leaves_the_version_alone() {
        let registry = OccRegistry::new();
        registry.register(1);

        let err = registry
            .perform(1, 0, |_| Err::<(), _>(OctopusError::WrongType))
            .unwrap_err();
        assert_eq!(
            err,
            OctopusError::OperationFailed(Box::new(OctopusError::WrongType))
        );
        assert_eq!(registry.get(1).unwrap().version, 0);
    }

    #[test]
    fn concurrent_performs_with_one_expected_version_admit_one_winner() {
        let registry = Arc::new(OccRegistry::new());
        registry.register(1);

        let mut joins = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            joins.push(std::thread::spawn(move || {
                registry.perform(1, 0, |meta| {
                    meta.state = WorkerState::Busy;
                    Ok(())
                })
            }));
        }

        let outcomes: Vec<_> = joins.into_iter().map(|j| j.join().unwrap()).collect();
        let successes = outcomes.iter().filter(|o| o.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|o| matches!(o, Err(OctopusError::Conflict { .. })))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(registry.get(1).unwrap().version, 1);
    }
}
