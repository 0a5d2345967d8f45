#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Workpull Core
//!
//! Pull-based work distribution: a single coordinator hands out items from a
//! finite source to a fixed pool of async workers, one item per worker at a
//! time, and folds their results into one accumulated value plus a tally of
//! failures by category.
//!
//! ## Overview
//!
//! Workers *pull*. Each worker asks for an item, processes it, and reports
//! the outcome, which is also its next request. Fast workers therefore
//! receive more items than slow ones and no worker ever queues work it has
//! not started. When the source runs dry every worker is told there is no
//! more work, and once the last one has been told the run completes.
//!
//! ## Module Organization
//!
//! - [`dispatch`] - Coordinator, workers and the pull protocol
//! - [`processing_result`] - Reducer and accumulated state
//! - [`failure`] - Failure categories and counting
//! - [`reporter`] - Progress and completion callbacks
//! - [`work_source`] - The finite item sequence
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use workpull_core::{NoopProgressReporter, WorkContext, WorkDispatcher, WorkerId};
//!
//! # async fn example() -> workpull_core::DispatchResult<()> {
//! let factory = |_worker_id: WorkerId| {
//!     |item: u64, _ctx: WorkContext| async move { Ok::<_, String>(item * 2) }
//! };
//!
//! let summary = WorkDispatcher::spawn(
//!     1..=100_u64,
//!     4,
//!     factory,
//!     0_u64,
//!     |acc: &u64, next: u64| acc + next,
//!     NoopProgressReporter,
//!     |items: u64, total: &u64, _failures: &workpull_core::FailureCounts| {
//!         println!("{items} items, total {total}");
//!     },
//! )?
//! .join()
//! .await?;
//!
//! assert_eq!(summary.accumulated, 10_100);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod actors;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod failure;
pub mod logging;
pub mod processing_result;
pub mod reporter;
pub mod work_source;

pub use config::DispatchConfig;
pub use dispatch::{
    DispatchHandle, DispatchOutcome, DispatchState, DispatchStats, DispatchSummary,
    DispatcherCommand, WorkContext, WorkDispatcher, WorkProcessor, WorkerCommand, WorkerFactory,
    WorkerId, WorkerState,
};
pub use error::{DispatchError, DispatchResult};
pub use failure::{Categorize, FailureCategory, FailureCounts, WorkFailure};
pub use processing_result::{ProcessingResult, ResultAccumulator};
pub use reporter::{LoggingProgressReporter, NoopProgressReporter, ProgressReporter};
pub use work_source::WorkSource;
