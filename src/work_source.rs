//! # Work Source
//!
//! A finite, forward-only, lazily-produced sequence of work items. Read only
//! by the dispatcher. Once it runs dry it stays dry: the underlying iterator
//! is fused, so nothing can be rewound or re-injected.

use std::fmt;
use std::iter::{Fuse, Peekable};

use crate::error::{DispatchError, DispatchResult};

pub struct WorkSource<T> {
    items: Peekable<Fuse<Box<dyn Iterator<Item = T> + Send>>>,
    items_dispatched: u64,
}

impl<T> WorkSource<T> {
    /// Wrap a sequence of items, rejecting one that yields nothing
    pub fn new<I>(items: I) -> DispatchResult<Self>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let boxed: Box<dyn Iterator<Item = T> + Send> = Box::new(items.into_iter());
        let mut items = boxed.fuse().peekable();
        if items.peek().is_none() {
            return Err(DispatchError::invalid_argument(
                "items_to_dispatch must not be empty",
            ));
        }
        Ok(Self {
            items,
            items_dispatched: 0,
        })
    }

    /// Pull the next item, if any remain
    pub fn next_item(&mut self) -> Option<T> {
        let item = self.items.next()?;
        self.items_dispatched += 1;
        Some(item)
    }

    pub fn items_dispatched(&self) -> u64 {
        self.items_dispatched
    }
}

impl<T> fmt::Debug for WorkSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkSource")
            .field("items_dispatched", &self.items_dispatched)
            .finish_non_exhaustive()
    }
}
