//! # Core Actor Traits

use crate::error::DispatchResult;

/// Base trait for the dispatcher and worker actors
///
/// ## Lifecycle
///
/// - `started()`: called by the actor's loop before the first message
/// - `stopped()`: called once the loop has exited
///
/// Both default to no-ops. An error from `started()` aborts the loop before
/// any message is handled; an error from `stopped()` is logged and dropped.
pub trait PoolActor: Send + 'static {
    /// Actor name for log fields
    fn name(&self) -> &'static str;

    fn started(&mut self) -> DispatchResult<()> {
        Ok(())
    }

    fn stopped(&mut self) -> DispatchResult<()> {
        Ok(())
    }
}
