//! # Typed Dispatch Channels
//!
//! NewType wrappers over `tokio::sync::mpsc` so a dispatcher mailbox can never
//! be handed where a worker mailbox is expected. All channels are bounded.

use std::fmt;
use tokio::sync::mpsc;

use super::commands::{DispatcherCommand, WorkerCommand};
use crate::constants::defaults;

// ============================================================================
// Dispatcher Command Channel Types
// ============================================================================

/// Sender side of the dispatcher mailbox, shared by every worker
pub struct DispatcherCommandSender<E>(pub(crate) mpsc::Sender<DispatcherCommand<E>>);

/// Receiver side of the dispatcher mailbox, owned by the coordinator task
pub struct DispatcherCommandReceiver<E>(pub(crate) mpsc::Receiver<DispatcherCommand<E>>);

impl<E> DispatcherCommandSender<E> {
    pub async fn send(
        &self,
        command: DispatcherCommand<E>,
    ) -> Result<(), mpsc::error::SendError<DispatcherCommand<E>>> {
        self.0.send(command).await
    }

    pub fn max_capacity(&self) -> usize {
        self.0.max_capacity()
    }
}

impl<E> Clone for DispatcherCommandSender<E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<E> fmt::Debug for DispatcherCommandSender<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DispatcherCommandSender").field(&self.0).finish()
    }
}

impl<E> DispatcherCommandReceiver<E> {
    pub async fn recv(&mut self) -> Option<DispatcherCommand<E>> {
        self.0.recv().await
    }

    /// Close the receiver, preventing further sends
    pub fn close(&mut self) {
        self.0.close()
    }
}

impl<E> fmt::Debug for DispatcherCommandReceiver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DispatcherCommandReceiver").field(&self.0).finish()
    }
}

// ============================================================================
// Worker Command Channel Types
// ============================================================================

/// Sender side of one worker's mailbox, held by the dispatcher
pub struct WorkerCommandSender<T>(pub(crate) mpsc::Sender<WorkerCommand<T>>);

/// Receiver side of one worker's mailbox
pub struct WorkerCommandReceiver<T>(pub(crate) mpsc::Receiver<WorkerCommand<T>>);

impl<T> WorkerCommandSender<T> {
    /// Deliver without waiting; the dispatcher never blocks on a worker
    pub fn try_send(
        &self,
        command: WorkerCommand<T>,
    ) -> Result<(), mpsc::error::TrySendError<WorkerCommand<T>>> {
        self.0.try_send(command)
    }
}

impl<T> fmt::Debug for WorkerCommandSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WorkerCommandSender").field(&self.0).finish()
    }
}

impl<T> WorkerCommandReceiver<T> {
    pub async fn recv(&mut self) -> Option<WorkerCommand<T>> {
        self.0.recv().await
    }
}

impl<T> fmt::Debug for WorkerCommandReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WorkerCommandReceiver").field(&self.0).finish()
    }
}

// ============================================================================
// Channel Factory
// ============================================================================

#[derive(Debug)]
pub struct ChannelFactory;

impl ChannelFactory {
    /// Dispatcher mailbox; the buffer size is clamped to
    /// `1..=MAX_COMMAND_BUFFER_SIZE`
    pub fn dispatcher_command_channel<E>(
        buffer_size: usize,
    ) -> (DispatcherCommandSender<E>, DispatcherCommandReceiver<E>) {
        let capacity = buffer_size.clamp(1, defaults::MAX_COMMAND_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(capacity);
        (DispatcherCommandSender(tx), DispatcherCommandReceiver(rx))
    }

    /// Worker mailbox sized for the single reply a worker can be owed
    pub fn worker_command_channel<T>() -> (WorkerCommandSender<T>, WorkerCommandReceiver<T>) {
        let (tx, rx) = mpsc::channel(defaults::WORKER_MAILBOX_SIZE);
        (WorkerCommandSender(tx), WorkerCommandReceiver(rx))
    }
}
