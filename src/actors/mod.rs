//! # Lightweight Actors
//!
//! The dispatcher and its workers are plain Tokio tasks that own their state
//! and talk only through typed mailboxes. [`PoolActor`] gives both the same
//! shape: a name for log fields and optional start/stop hooks run by their
//! processing loops.
//!
//! ```text
//! Worker ──RequestWork / WorkSucceeded / WorkFailed──→ WorkDispatcher
//!   ↑                                                        │
//!   └──────────────── Work(item) / NoMoreWork ───────────────┘
//! ```

pub mod traits;

pub use traits::PoolActor;
