//! # Dispatch
//!
//! The pull protocol between one coordinator and a fixed pool of workers.
//!
//! - [`commands`]: mailbox message types
//! - [`channels`]: typed wrappers over the bounded mailboxes
//! - [`state`]: the synchronous dispatch state machine
//! - [`worker`]: the worker pull loop and processing traits
//! - [`dispatcher`]: spawning, the coordinator task and the run handle

pub mod channels;
pub mod commands;
pub mod dispatcher;
pub mod state;
pub mod worker;

pub use channels::{
    ChannelFactory, DispatcherCommandReceiver, DispatcherCommandSender, WorkerCommandReceiver,
    WorkerCommandSender,
};
pub use commands::{CommandResponder, DispatchStats, DispatcherCommand, WorkerCommand, WorkerId};
pub use dispatcher::{DispatchHandle, WorkDispatcher};
pub use state::{DispatchOutcome, DispatchState, DispatchSummary};
pub use worker::{WorkContext, WorkProcessor, Worker, WorkerExit, WorkerFactory, WorkerState};
