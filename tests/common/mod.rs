//! Shared fixtures for dispatch integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use workpull_core::{
    Categorize, FailureCategory, FailureCounts, ProgressReporter, WorkContext, WorkerId,
};

#[derive(Debug, Clone, thiserror::Error)]
#[error("KABOOM")]
pub struct RuntimeError;

impl Categorize for RuntimeError {
    fn category(&self) -> FailureCategory {
        FailureCategory::new("RuntimeError")
    }
}

/// One callback invocation as seen by a [`Recorder`]
#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent<E> {
    Progress {
        items_processed: u64,
        accumulated: E,
        failures: FailureCounts,
    },
    Completion {
        items_processed: u64,
        accumulated: E,
        failures: FailureCounts,
    },
}

impl<E> ReportEvent<E> {
    pub fn is_completion(&self) -> bool {
        matches!(self, ReportEvent::Completion { .. })
    }

    pub fn items_processed(&self) -> u64 {
        match self {
            ReportEvent::Progress {
                items_processed, ..
            }
            | ReportEvent::Completion {
                items_processed, ..
            } => *items_processed,
        }
    }
}

/// Records progress and completion calls into one ordered log
#[derive(Debug)]
pub struct Recorder<E> {
    events: Arc<Mutex<Vec<ReportEvent<E>>>>,
}

impl<E> Clone for Recorder<E> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<E: Clone + Send + 'static> Recorder<E> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn progress_reporter(&self) -> impl ProgressReporter<E> + 'static {
        let events = Arc::clone(&self.events);
        move |items_processed: u64, accumulated: &E, failures: &FailureCounts| {
            events.lock().unwrap().push(ReportEvent::Progress {
                items_processed,
                accumulated: accumulated.clone(),
                failures: failures.clone(),
            });
        }
    }

    pub fn completion_reporter(&self) -> impl ProgressReporter<E> + 'static {
        let events = Arc::clone(&self.events);
        move |items_processed: u64, accumulated: &E, failures: &FailureCounts| {
            events.lock().unwrap().push(ReportEvent::Completion {
                items_processed,
                accumulated: accumulated.clone(),
                failures: failures.clone(),
            });
        }
    }

    pub fn events(&self) -> Vec<ReportEvent<E>> {
        self.events.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<ReportEvent<E>> {
        self.events()
            .into_iter()
            .filter(ReportEvent::is_completion)
            .collect()
    }
}

pub fn sum(accumulated: &i64, result: i64) -> i64 {
    accumulated + result
}

/// Every worker returns its item unchanged
pub fn echo_factory<T: Send + 'static>(
    _worker_id: WorkerId,
) -> impl Fn(T, WorkContext) -> futures::future::Ready<Result<T, RuntimeError>> + Send + Sync {
    |item: T, _ctx: WorkContext| futures::future::ready(Ok(item))
}

/// Every worker fails every item with `RuntimeError`
pub fn failing_factory<T: Send + 'static>(
    _worker_id: WorkerId,
) -> impl Fn(T, WorkContext) -> futures::future::Ready<Result<i64, RuntimeError>> + Send + Sync {
    |_item: T, _ctx: WorkContext| futures::future::ready(Err(RuntimeError))
}
