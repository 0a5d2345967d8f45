//! # Progress Reporting
//!
//! Callbacks invoked by the dispatcher after every processed item and once
//! more at completion, always on the coordinator task. They run inline and
//! delay the next dispatch decision until they return, so they must not block
//! for long. The borrowed accumulated value and failure counts are only valid
//! for the duration of the call.

use std::time::Instant;
use tracing::info;

use crate::failure::FailureCounts;

pub trait ProgressReporter<E>: Send {
    fn report_progress(&mut self, items_processed: u64, accumulated: &E, failures: &FailureCounts);
}

impl<E, F> ProgressReporter<E> for F
where
    F: FnMut(u64, &E, &FailureCounts) + Send,
{
    fn report_progress(&mut self, items_processed: u64, accumulated: &E, failures: &FailureCounts) {
        self(items_processed, accumulated, failures)
    }
}

/// Reporter that ignores every call
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressReporter;

impl<E> ProgressReporter<E> for NoopProgressReporter {
    fn report_progress(&mut self, _: u64, _: &E, _: &FailureCounts) {}
}

/// Logs a structured progress line every `interval` items
///
/// Each line carries the time spent on the batch since the previous line.
/// Run identity comes from the coordinator's `dispatch` span.
#[derive(Debug)]
pub struct LoggingProgressReporter {
    interval: u64,
    last_report: Instant,
    label: &'static str,
}

impl LoggingProgressReporter {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            last_report: Instant::now(),
            label: "Batch processed",
        }
    }

    /// Reporter for the completion callback: logs on every call
    pub fn completion() -> Self {
        Self {
            interval: 1,
            last_report: Instant::now(),
            label: "Dispatch run completed",
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    fn should_report(&self, items_processed: u64) -> bool {
        items_processed % self.interval == 0
    }
}

impl<E: std::fmt::Debug> ProgressReporter<E> for LoggingProgressReporter {
    fn report_progress(&mut self, items_processed: u64, accumulated: &E, failures: &FailureCounts) {
        if !self.should_report(items_processed) {
            return;
        }
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_report).as_millis() as u64;
        self.last_report = now;

        info!(
            items_processed = items_processed,
            elapsed_ms = elapsed_ms,
            accumulated = ?accumulated,
            failure_categories = failures.len(),
            failures_total = failures.total(),
            "{}",
            self.label
        );
    }
}
