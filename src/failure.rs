//! # Failure Classification
//!
//! Failed work items are tallied by *category*, never by message or identity.
//! Two failures of the same category always increment one shared counter.
//!
//! Processing errors opt in through [`Categorize`]. A category is usually a
//! fixed name per error kind, or the error's type name via
//! [`FailureCategory::of`] when the type itself is the classification.

use serde::{Deserialize, Serialize};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::fmt;

use crate::constants::categories;

/// Classification key for failure counting
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureCategory(Cow<'static, str>);

impl FailureCategory {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Category named after a type, e.g. `my_app::errors::ParseError`
    pub fn of<T: ?Sized>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    pub fn panic() -> Self {
        Self::new(categories::PANIC)
    }

    pub fn unknown() -> Self {
        Self::new(categories::UNKNOWN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FailureCategory {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for FailureCategory {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

/// Errors that can be tallied as work item failures
pub trait Categorize {
    fn category(&self) -> FailureCategory;
}

impl Categorize for std::io::Error {
    fn category(&self) -> FailureCategory {
        FailureCategory::new(format!("{}::{:?}", categories::IO_PREFIX, self.kind()))
    }
}

impl Categorize for tokio::time::error::Elapsed {
    fn category(&self) -> FailureCategory {
        FailureCategory::new(categories::TIMEOUT)
    }
}

impl Categorize for tokio::task::JoinError {
    fn category(&self) -> FailureCategory {
        if self.is_panic() {
            FailureCategory::panic()
        } else {
            FailureCategory::new(categories::CANCELLED)
        }
    }
}

impl Categorize for anyhow::Error {
    fn category(&self) -> FailureCategory {
        let root = self.root_cause();
        if let Some(io_error) = root.downcast_ref::<std::io::Error>() {
            return io_error.category();
        }
        if root.is::<tokio::time::error::Elapsed>() {
            return FailureCategory::new(categories::TIMEOUT);
        }
        FailureCategory::unknown()
    }
}

impl Categorize for Box<dyn std::error::Error + Send + Sync> {
    fn category(&self) -> FailureCategory {
        if let Some(io_error) = self.downcast_ref::<std::io::Error>() {
            return io_error.category();
        }
        FailureCategory::unknown()
    }
}

impl Categorize for String {
    fn category(&self) -> FailureCategory {
        FailureCategory::new(categories::MESSAGE)
    }
}

impl Categorize for &'static str {
    fn category(&self) -> FailureCategory {
        FailureCategory::new(categories::MESSAGE)
    }
}

/// A failed work item as reported by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkFailure {
    pub category: FailureCategory,
    pub message: String,
}

impl WorkFailure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn from_error<E>(error: &E) -> Self
    where
        E: Categorize + fmt::Display + ?Sized,
    {
        Self::new(error.category(), error.to_string())
    }

    /// Build a failure from a caught panic payload
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "processing function panicked".to_string()
        };
        Self::new(FailureCategory::panic(), message)
    }
}

impl fmt::Display for WorkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// Failure counts keyed by category
///
/// Counts only ever increase for the lifetime of a dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureCounts(HashMap<FailureCategory, u64>);

impl FailureCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence and return the new count for the category
    pub fn increment(&mut self, category: &FailureCategory) -> u64 {
        let count = self.0.entry(category.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Count for a category, zero when never seen
    pub fn get(&self, category: &str) -> u64 {
        self.0.get(category).copied().unwrap_or(0)
    }

    /// Number of distinct categories seen
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FailureCategory, u64)> {
        self.0.iter().map(|(category, count)| (category, *count))
    }

    pub fn as_map(&self) -> &HashMap<FailureCategory, u64> {
        &self.0
    }
}
