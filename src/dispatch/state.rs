//! # Dispatch State Machine
//!
//! All bookkeeping of one dispatch run, driven one command at a time by the
//! coordinator task. Nothing here is async and nothing is shared: the
//! coordinator owns the state, so no locking is needed even though workers
//! run concurrently.
//!
//! Each command produces a [`DispatchOutcome`] telling the coordinator what
//! to deliver. Driving `handle` directly (without spawning workers) exercises
//! the full protocol deterministically.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::commands::{DispatchStats, DispatcherCommand, WorkerCommand, WorkerId};
use crate::constants::{actors, defaults};
use crate::error::{DispatchError, DispatchResult};
use crate::failure::{FailureCounts, WorkFailure};
use crate::processing_result::{ProcessingResult, ResultAccumulator};
use crate::reporter::ProgressReporter;
use crate::work_source::WorkSource;

/// What the coordinator must do after handling one command
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome<T> {
    /// Deliver `command` to the worker
    Reply {
        worker_id: WorkerId,
        command: WorkerCommand<T>,
    },
    /// Deliver `NoMoreWork` to the worker, then stop: the completion reporter
    /// has already run
    Completed { worker_id: WorkerId },
    /// Query answered, nothing to deliver
    Answered,
    /// Command arrived after completion and was dropped
    Rejected,
}

/// Final result of a dispatch run
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary<E> {
    pub run_id: Uuid,
    pub items_dispatched: u64,
    pub items_processed: u64,
    pub accumulated: E,
    pub failures: FailureCounts,
    pub elapsed: Duration,
}

impl<E> DispatchSummary<E> {
    pub fn total_failures(&self) -> u64 {
        self.failures.total()
    }

    pub fn successes(&self) -> u64 {
        self.items_processed - self.failures.total()
    }
}

pub struct DispatchState<T, E> {
    run_id: Uuid,
    source: WorkSource<T>,
    number_of_workers: usize,
    items_processed: u64,
    workers_with_no_more_work: usize,
    processing_result: ProcessingResult<E>,
    progress_reporter: Box<dyn ProgressReporter<E>>,
    completion_reporter: Box<dyn ProgressReporter<E>>,
    completed: bool,
}

impl<T, E> DispatchState<T, E> {
    /// Validate the arguments and build the initial state
    ///
    /// Fails with `InvalidArgument` when `items` yields nothing or
    /// `number_of_workers` is zero.
    pub fn new<I>(
        items: I,
        number_of_workers: usize,
        base_result: E,
        accumulator: impl ResultAccumulator<E> + 'static,
        progress_reporter: impl ProgressReporter<E> + 'static,
        completion_reporter: impl ProgressReporter<E> + 'static,
    ) -> DispatchResult<Self>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let source = WorkSource::new(items)?;
        if number_of_workers == 0 {
            return Err(DispatchError::invalid_argument(
                "number_of_workers must be greater than zero",
            ));
        }
        if number_of_workers > defaults::MAX_WORKER_COUNT {
            return Err(DispatchError::invalid_argument(format!(
                "number_of_workers must not exceed {}",
                defaults::MAX_WORKER_COUNT
            )));
        }

        Ok(Self {
            run_id: Uuid::new_v4(),
            source,
            number_of_workers,
            items_processed: 0,
            workers_with_no_more_work: 0,
            processing_result: ProcessingResult::with_boxed_accumulator(
                base_result,
                Box::new(accumulator),
            ),
            progress_reporter: Box::new(progress_reporter),
            completion_reporter: Box::new(completion_reporter),
            completed: false,
        })
    }

    pub fn handle(&mut self, command: DispatcherCommand<E>) -> DispatchOutcome<T> {
        if self.completed {
            warn!(
                actor = actors::DISPATCHER,
                run_id = %self.run_id,
                command = command.kind(),
                worker_id = ?command.worker_id(),
                "Command received after completion, dropping"
            );
            return DispatchOutcome::Rejected;
        }

        match command {
            DispatcherCommand::RequestWork { worker_id } => {
                self.dispatch_work_if_available(worker_id)
            }
            DispatcherCommand::WorkSucceeded { worker_id, result } => {
                self.processing_result.add_success(result);
                self.record_processed(worker_id);
                self.dispatch_work_if_available(worker_id)
            }
            DispatcherCommand::WorkFailed { worker_id, failure } => {
                self.record_failure(worker_id, &failure);
                self.record_processed(worker_id);
                self.dispatch_work_if_available(worker_id)
            }
            DispatcherCommand::GetProcessingStats { resp } => {
                if resp.send(self.stats()).is_err() {
                    debug!(
                        actor = actors::DISPATCHER,
                        run_id = %self.run_id,
                        "Stats requester went away before the reply"
                    );
                }
                DispatchOutcome::Answered
            }
        }
    }

    fn record_failure(&mut self, worker_id: WorkerId, failure: &WorkFailure) {
        let count = self.processing_result.add_failure(failure);
        debug!(
            actor = actors::DISPATCHER,
            run_id = %self.run_id,
            worker_id = worker_id,
            category = %failure.category,
            error = %failure.message,
            category_count = count,
            "Work item failed"
        );
    }

    fn record_processed(&mut self, worker_id: WorkerId) {
        self.items_processed += 1;
        trace!(
            actor = actors::DISPATCHER,
            run_id = %self.run_id,
            worker_id = worker_id,
            items_processed = self.items_processed,
            "Outcome recorded"
        );
        self.progress_reporter.report_progress(
            self.items_processed,
            self.processing_result.accumulated_result(),
            self.processing_result.failures(),
        );
    }

    fn dispatch_work_if_available(&mut self, worker_id: WorkerId) -> DispatchOutcome<T> {
        if let Some(item) = self.source.next_item() {
            return DispatchOutcome::Reply {
                worker_id,
                command: WorkerCommand::Work(item),
            };
        }

        self.workers_with_no_more_work += 1;
        debug!(
            actor = actors::DISPATCHER,
            run_id = %self.run_id,
            worker_id = worker_id,
            workers_with_no_more_work = self.workers_with_no_more_work,
            number_of_workers = self.number_of_workers,
            "No more work for worker"
        );

        if self.workers_with_no_more_work < self.number_of_workers {
            return DispatchOutcome::Reply {
                worker_id,
                command: WorkerCommand::NoMoreWork,
            };
        }

        self.completed = true;
        self.completion_reporter.report_progress(
            self.items_processed,
            self.processing_result.accumulated_result(),
            self.processing_result.failures(),
        );
        info!(
            actor = actors::DISPATCHER,
            run_id = %self.run_id,
            items_processed = self.items_processed,
            total_failures = self.processing_result.total_failures(),
            "All workers told no more work, dispatch complete"
        );
        DispatchOutcome::Completed { worker_id }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            items_dispatched: self.source.items_dispatched(),
            items_processed: self.items_processed,
            total_failures: self.processing_result.total_failures(),
            workers_with_no_more_work: self.workers_with_no_more_work,
            number_of_workers: self.number_of_workers,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn number_of_workers(&self) -> usize {
        self.number_of_workers
    }

    pub fn items_processed(&self) -> u64 {
        self.items_processed
    }

    pub fn workers_with_no_more_work(&self) -> usize {
        self.workers_with_no_more_work
    }

    pub fn processing_result(&self) -> &ProcessingResult<E> {
        &self.processing_result
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn into_summary(self, elapsed: Duration) -> DispatchSummary<E> {
        let items_dispatched = self.source.items_dispatched();
        let (accumulated, failures) = self.processing_result.into_parts();
        DispatchSummary {
            run_id: self.run_id,
            items_dispatched,
            items_processed: self.items_processed,
            accumulated,
            failures,
            elapsed,
        }
    }
}

impl<T, E: fmt::Debug> fmt::Debug for DispatchState<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchState")
            .field("run_id", &self.run_id)
            .field("source", &self.source)
            .field("number_of_workers", &self.number_of_workers)
            .field("items_processed", &self.items_processed)
            .field("workers_with_no_more_work", &self.workers_with_no_more_work)
            .field("processing_result", &self.processing_result)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}
