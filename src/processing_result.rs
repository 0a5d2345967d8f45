//! # Processing Result
//!
//! Mutable accumulation state for one dispatch run: the reduced value of all
//! successful results plus the failure tally. Owned exclusively by the
//! dispatcher, so every update happens on a single logical thread.

use std::fmt;

use crate::failure::{FailureCounts, WorkFailure};

/// Reducer folding a new result into the running value
///
/// Called exactly once per successful item, strictly sequentially. Results
/// from different workers arrive in completion order, which is arbitrary:
/// reducers that are not associative and commutative observe
/// order-dependent totals.
///
/// ```rust
/// use workpull_core::ResultAccumulator;
///
/// let sum = |acc: &i64, next: i64| acc + next;
/// assert_eq!(sum.accumulate(&40, 2), 42);
/// ```
pub trait ResultAccumulator<E>: Send {
    fn accumulate(&self, accumulated: &E, result: E) -> E;
}

impl<E, F> ResultAccumulator<E> for F
where
    F: Fn(&E, E) -> E + Send,
{
    fn accumulate(&self, accumulated: &E, result: E) -> E {
        self(accumulated, result)
    }
}

pub struct ProcessingResult<E> {
    accumulated: E,
    failures: FailureCounts,
    accumulator: Box<dyn ResultAccumulator<E>>,
}

impl<E> ProcessingResult<E> {
    pub fn new(base_result: E, accumulator: impl ResultAccumulator<E> + 'static) -> Self {
        Self::with_boxed_accumulator(base_result, Box::new(accumulator))
    }

    pub(crate) fn with_boxed_accumulator(
        base_result: E,
        accumulator: Box<dyn ResultAccumulator<E>>,
    ) -> Self {
        Self {
            accumulated: base_result,
            failures: FailureCounts::new(),
            accumulator,
        }
    }

    pub fn add_success(&mut self, result: E) {
        self.accumulated = self.accumulator.accumulate(&self.accumulated, result);
    }

    pub fn add_failure(&mut self, failure: &WorkFailure) -> u64 {
        self.failures.increment(&failure.category)
    }

    pub fn accumulated_result(&self) -> &E {
        &self.accumulated
    }

    pub fn failures(&self) -> &FailureCounts {
        &self.failures
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.total()
    }

    pub fn into_parts(self) -> (E, FailureCounts) {
        (self.accumulated, self.failures)
    }
}

impl<E: fmt::Debug> fmt::Debug for ProcessingResult<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingResult")
            .field("accumulated", &self.accumulated)
            .field("failures", &self.failures)
            .field("accumulator", &"ResultAccumulator")
            .finish()
    }
}
