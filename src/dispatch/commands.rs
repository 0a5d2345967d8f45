//! # Dispatch Command Types
//!
//! Two mailboxes, two sum types:
//! - [`DispatcherCommand`]: everything a worker (or a handle) can send to the
//!   dispatcher. Reporting an outcome always doubles as a request for more
//!   work, so each worker has at most one message in flight.
//! - [`WorkerCommand`]: the dispatcher's reply to a request.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

use crate::failure::WorkFailure;

/// Index of a worker within its pool, `0..number_of_workers`
pub type WorkerId = usize;

/// Type alias for command response channels
pub type CommandResponder<T> = oneshot::Sender<T>;

pub enum DispatcherCommand<E> {
    /// Sent once by each worker on startup
    RequestWork { worker_id: WorkerId },
    /// Item completed; fold `result` and hand out the next item
    WorkSucceeded { worker_id: WorkerId, result: E },
    /// Item failed; tally `failure` and hand out the next item
    WorkFailed {
        worker_id: WorkerId,
        failure: WorkFailure,
    },
    /// Snapshot of the dispatcher counters; not a request for work
    GetProcessingStats {
        resp: CommandResponder<DispatchStats>,
    },
}

impl<E> DispatcherCommand<E> {
    /// Worker that sent the command, `None` for handle queries
    pub fn worker_id(&self) -> Option<WorkerId> {
        match self {
            DispatcherCommand::RequestWork { worker_id }
            | DispatcherCommand::WorkSucceeded { worker_id, .. }
            | DispatcherCommand::WorkFailed { worker_id, .. } => Some(*worker_id),
            DispatcherCommand::GetProcessingStats { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DispatcherCommand::RequestWork { .. } => "request_work",
            DispatcherCommand::WorkSucceeded { .. } => "work_succeeded",
            DispatcherCommand::WorkFailed { .. } => "work_failed",
            DispatcherCommand::GetProcessingStats { .. } => "get_processing_stats",
        }
    }
}

impl<E> fmt::Debug for DispatcherCommand<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherCommand::RequestWork { worker_id } => f
                .debug_struct("RequestWork")
                .field("worker_id", worker_id)
                .finish(),
            DispatcherCommand::WorkSucceeded { worker_id, .. } => f
                .debug_struct("WorkSucceeded")
                .field("worker_id", worker_id)
                .finish_non_exhaustive(),
            DispatcherCommand::WorkFailed { worker_id, failure } => f
                .debug_struct("WorkFailed")
                .field("worker_id", worker_id)
                .field("failure", failure)
                .finish(),
            DispatcherCommand::GetProcessingStats { .. } => {
                f.debug_struct("GetProcessingStats").finish_non_exhaustive()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand<T> {
    Work(T),
    NoMoreWork,
}

/// Point-in-time dispatcher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub items_dispatched: u64,
    pub items_processed: u64,
    pub total_failures: u64,
    pub workers_with_no_more_work: usize,
    pub number_of_workers: usize,
}

impl DispatchStats {
    /// Items handed out whose outcome has not been reported yet
    pub fn items_in_flight(&self) -> u64 {
        self.items_dispatched.saturating_sub(self.items_processed)
    }
}
