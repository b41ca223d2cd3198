//! Bounded-concurrency task runner.
//!
//! Runs a batch of independent chunk tasks with at most K in flight. On the
//! first failure no new task is dispatched; tasks already running are
//! allowed to settle, their outcomes are logged, and the run fails with the
//! first error. On success every task's result is returned keyed by index.

mod progress;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;

use tokio::task::{self, JoinSet};

use crate::error::{FerryError, Result};
use crate::retry::ChunkError;

pub use progress::{ChunkProgress, ProgressCallback, TransferStats};
pub(crate) use progress::ProgressTracker;

/// First task failure of a run.
#[derive(Debug)]
pub struct TaskFailure {
    /// Index of the failed task.
    pub index: usize,
    /// Error it failed with (after its own retries).
    pub error: ChunkError,
}

/// Runs tasks with an upper bound on simultaneously in-flight tasks.
#[derive(Clone)]
pub struct BoundedRunner {
    max_concurrent: usize,
    on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for BoundedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedRunner")
            .field("max_concurrent", &self.max_concurrent)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl BoundedRunner {
    /// Runner allowing `max_concurrent` tasks at once. Zero is rejected.
    pub fn new(max_concurrent: usize) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(FerryError::InvalidConcurrency { max_concurrent });
        }
        Ok(Self {
            max_concurrent,
            on_progress: None,
        })
    }

    /// Invoke `callback` once per completed task, in completion order.
    pub fn with_progress(mut self, callback: Option<ProgressCallback>) -> Self {
        self.on_progress = callback;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Runs `tasks`; the task at position `i` has index `i`.
    ///
    /// Futures are lazy, so a task that is never dispatched (because an
    /// earlier one failed) never starts any work. Dropping the returned
    /// future aborts every task still in flight.
    pub async fn run<T, Fut>(&self, tasks: Vec<Fut>) -> Result<BTreeMap<usize, T>, TaskFailure>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, ChunkError>> + Send + 'static,
    {
        let total = tasks.len();
        let mut results = BTreeMap::new();
        if total == 0 {
            return Ok(results);
        }

        let mut pending = tasks.into_iter().enumerate();
        let mut in_flight = JoinSet::new();
        // A panic only surfaces as a JoinError, which carries the task id.
        let mut indices: HashMap<task::Id, usize> = HashMap::new();
        let mut tracker = ProgressTracker::new(total);
        let mut first_failure: Option<TaskFailure> = None;

        loop {
            while first_failure.is_none() && in_flight.len() < self.max_concurrent {
                let Some((index, task)) = pending.next() else {
                    break;
                };
                let handle = in_flight.spawn(async move { (index, task.await) });
                indices.insert(handle.id(), index);
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };
            let (index, outcome) = match joined {
                Ok((id, pair)) => {
                    indices.remove(&id);
                    pair
                }
                Err(join_err) => {
                    let index = indices.remove(&join_err.id()).unwrap_or(usize::MAX);
                    (index, Err(ChunkError::Panicked(join_err.to_string())))
                }
            };

            match outcome {
                Ok(value) => {
                    results.insert(index, value);
                    let progress = tracker.complete(index);
                    if let Some(cb) = &self.on_progress {
                        cb(ChunkProgress {
                            progress,
                            chunk_index: index,
                        });
                    }
                }
                Err(error) => {
                    if first_failure.is_none() {
                        tracing::warn!(chunk = index, error = %error, "chunk failed; no further chunks will be dispatched");
                        first_failure = Some(TaskFailure { index, error });
                    } else {
                        tracing::warn!(chunk = index, error = %error, "additional chunk failure while draining");
                    }
                }
            }
        }

        if let Some(failure) = first_failure {
            return Err(failure);
        }
        debug_assert!(tracker.all_completed());
        tracing::debug!(tasks = total, completed = tracker.completed(), "all chunk tasks completed");
        Ok(results)
    }
}
