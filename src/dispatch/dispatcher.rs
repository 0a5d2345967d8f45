//! # Work Dispatcher
//!
//! Spawns a pool of workers and a single coordinator task. The coordinator
//! owns the [`DispatchState`] and serves the pool's requests one at a time,
//! so items are handed out only as fast as workers finish them.
//!
//! ```text
//!                      ┌──────────────┐
//!   RequestWork ──────→│              │──Work(item)──→ worker 0
//!   WorkSucceeded ────→│ Coordinator  │──Work(item)──→ worker 1
//!   WorkFailed ───────→│ (one task)   │──NoMoreWork──→ worker 2
//!   GetProcessingStats→│              │
//!                      └──────────────┘
//! ```
//!
//! Once every worker has been told there is no more work the completion
//! reporter runs, the coordinator stops reading its mailbox, waits for the
//! workers to exit and returns a [`DispatchSummary`] through the
//! [`DispatchHandle`]. A worker task that ends before it is told there is no
//! more work ends the run with [`DispatchError::DispatcherTerminated`].

use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::channels::{
    ChannelFactory, DispatcherCommandReceiver, DispatcherCommandSender, WorkerCommandSender,
};
use super::commands::{DispatchStats, DispatcherCommand, WorkerCommand, WorkerId};
use super::state::{DispatchOutcome, DispatchState, DispatchSummary};
use super::worker::{Worker, WorkerExit, WorkerFactory, WorkerState};
use crate::actors::PoolActor;
use crate::config::DispatchConfig;
use crate::constants::{actors, defaults};
use crate::error::{DispatchError, DispatchResult};
use crate::processing_result::ResultAccumulator;
use crate::reporter::ProgressReporter;

pub struct WorkDispatcher<T, E, W> {
    state: DispatchState<T, E>,
    factory: W,
    command_buffer_size: usize,
}

impl<T, E, W> WorkDispatcher<T, E, W>
where
    T: Send + 'static,
    E: Send + 'static,
    W: WorkerFactory<T, E>,
{
    /// Validate the arguments and prepare a dispatch run
    ///
    /// Fails with [`DispatchError::InvalidArgument`] when `items` yields
    /// nothing or `number_of_workers` is zero. The factory is not called
    /// until [`start`](Self::start).
    #[allow(clippy::too_many_arguments)]
    pub fn new<I>(
        items: I,
        number_of_workers: usize,
        factory: W,
        base_result: E,
        accumulator: impl ResultAccumulator<E> + 'static,
        progress_reporter: impl ProgressReporter<E> + 'static,
        completion_reporter: impl ProgressReporter<E> + 'static,
    ) -> DispatchResult<Self>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let state = DispatchState::new(
            items,
            number_of_workers,
            base_result,
            accumulator,
            progress_reporter,
            completion_reporter,
        )?;

        Ok(Self {
            state,
            factory,
            command_buffer_size: defaults::COMMAND_BUFFER_SIZE,
        })
    }

    /// Build and start in one step
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<I>(
        items: I,
        number_of_workers: usize,
        factory: W,
        base_result: E,
        accumulator: impl ResultAccumulator<E> + 'static,
        progress_reporter: impl ProgressReporter<E> + 'static,
        completion_reporter: impl ProgressReporter<E> + 'static,
    ) -> DispatchResult<DispatchHandle<E>>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::new(
            items,
            number_of_workers,
            factory,
            base_result,
            accumulator,
            progress_reporter,
            completion_reporter,
        )?
        .start()
    }

    pub fn with_config(self, config: &DispatchConfig) -> Self {
        self.with_command_buffer_size(config.command_buffer_size)
    }

    pub fn with_command_buffer_size(mut self, command_buffer_size: usize) -> Self {
        self.command_buffer_size = command_buffer_size;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.state.run_id()
    }

    pub fn number_of_workers(&self) -> usize {
        self.state.number_of_workers()
    }

    /// Spawn the workers, then the coordinator
    pub fn start(self) -> DispatchResult<DispatchHandle<E>> {
        let runtime = Handle::try_current()
            .map_err(|e| DispatchError::RuntimeUnavailable(e.to_string()))?;

        let run_id = self.state.run_id();
        let number_of_workers = self.state.number_of_workers();
        let (command_tx, command_rx) = ChannelFactory::dispatcher_command_channel(
            self.command_buffer_size.max(number_of_workers),
        );

        info!(
            actor = actors::DISPATCHER,
            run_id = %run_id,
            number_of_workers = number_of_workers,
            command_buffer_size = command_tx.max_capacity(),
            "Starting work dispatcher"
        );

        let mut mailboxes = Vec::with_capacity(number_of_workers);
        let mut workers = JoinSet::new();
        for worker_id in 0..number_of_workers {
            let (mailbox_tx, mailbox_rx) = ChannelFactory::worker_command_channel();
            let processor = self.factory.create(worker_id);
            let worker = Worker::new(
                worker_id,
                run_id,
                processor,
                command_tx.clone(),
                mailbox_rx,
                runtime.clone(),
            );
            workers.spawn(worker.run());
            mailboxes.push(mailbox_tx);
            debug!(
                actor = actors::WORKER,
                run_id = %run_id,
                worker_id = worker_id,
                "Worker spawned"
            );
        }

        let coordinator = Coordinator {
            state: self.state,
            commands: command_rx,
            mailboxes,
            workers,
            started_at: Instant::now(),
        };
        let span = info_span!("dispatch", run_id = %run_id);
        let task = runtime.spawn(coordinator.run().instrument(span));

        Ok(DispatchHandle {
            run_id,
            commands: command_tx,
            task,
        })
    }
}

/// Owns the dispatch state for the lifetime of the run
struct Coordinator<T, E> {
    state: DispatchState<T, E>,
    commands: DispatcherCommandReceiver<E>,
    mailboxes: Vec<WorkerCommandSender<T>>,
    workers: JoinSet<WorkerExit>,
    started_at: Instant,
}

impl<T, E> Coordinator<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    async fn run(mut self) -> DispatchResult<DispatchSummary<E>> {
        self.started()?;

        let terminated = loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break Some(
                            "dispatcher mailbox closed before every worker was told no more work"
                                .to_string(),
                        );
                    };
                    match self.state.handle(command) {
                        DispatchOutcome::Reply { worker_id, command } => {
                            self.deliver(worker_id, command)
                        }
                        DispatchOutcome::Completed { worker_id } => {
                            self.deliver(worker_id, WorkerCommand::NoMoreWork);
                            break None;
                        }
                        DispatchOutcome::Answered | DispatchOutcome::Rejected => {}
                    }
                }
                Some(joined) = self.workers.join_next() => {
                    if let Some(reason) = self.worker_finished(joined) {
                        break Some(reason);
                    }
                }
            }
        };

        // Pending stats requests see their responder dropped
        self.commands.close();
        // Idle workers see their mailbox close
        self.mailboxes.clear();
        if terminated.is_some() {
            self.workers.abort_all();
        }
        while let Some(joined) = self.workers.join_next().await {
            self.worker_finished(joined);
        }

        if let Err(error) = self.stopped() {
            warn!(
                actor = self.name(),
                run_id = %self.state.run_id(),
                error = %error,
                "Dispatcher stop hook failed"
            );
        }

        if let Some(reason) = terminated {
            error!(
                actor = actors::DISPATCHER,
                run_id = %self.state.run_id(),
                items_processed = self.state.items_processed(),
                reason = %reason,
                "Dispatch run terminated"
            );
            return Err(DispatchError::DispatcherTerminated(reason));
        }
        Ok(self.state.into_summary(self.started_at.elapsed()))
    }

    fn deliver(&self, worker_id: WorkerId, command: WorkerCommand<T>) {
        let Some(mailbox) = self.mailboxes.get(worker_id) else {
            error!(
                actor = actors::DISPATCHER,
                run_id = %self.state.run_id(),
                worker_id = worker_id,
                "Reply addressed to unknown worker"
            );
            return;
        };

        if let Err(error) = mailbox.try_send(command) {
            warn!(
                actor = actors::DISPATCHER,
                run_id = %self.state.run_id(),
                worker_id = worker_id,
                error = %error,
                "Failed to deliver reply to worker"
            );
        }
    }

    /// Log a worker task's exit, returning why the run cannot go on if it
    /// ended without being told there is no more work
    fn worker_finished(&self, joined: Result<WorkerExit, JoinError>) -> Option<String> {
        match joined {
            Ok(exit) if exit.state == WorkerState::Terminated => {
                debug!(
                    actor = actors::WORKER,
                    run_id = %self.state.run_id(),
                    worker_id = exit.worker_id,
                    items_processed = exit.items_processed,
                    "Worker finished"
                );
                None
            }
            Ok(exit) => {
                warn!(
                    actor = actors::WORKER,
                    run_id = %self.state.run_id(),
                    worker_id = exit.worker_id,
                    items_processed = exit.items_processed,
                    state = %exit.state,
                    "Worker exited before being told no more work"
                );
                Some(format!(
                    "worker {} exited before being told no more work",
                    exit.worker_id
                ))
            }
            Err(join_error) if join_error.is_cancelled() => {
                debug!(
                    actor = actors::WORKER,
                    run_id = %self.state.run_id(),
                    "Worker task aborted"
                );
                Some(format!("worker task cancelled: {join_error}"))
            }
            Err(join_error) => {
                error!(
                    actor = actors::WORKER,
                    run_id = %self.state.run_id(),
                    error = %join_error,
                    "Worker task ended abnormally"
                );
                Some(format!("worker task panicked: {join_error}"))
            }
        }
    }
}

impl<T, E> PoolActor for Coordinator<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn name(&self) -> &'static str {
        actors::DISPATCHER
    }

    fn started(&mut self) -> DispatchResult<()> {
        debug!(
            actor = self.name(),
            run_id = %self.state.run_id(),
            number_of_workers = self.mailboxes.len(),
            "Coordinator started"
        );
        Ok(())
    }

    fn stopped(&mut self) -> DispatchResult<()> {
        info!(
            actor = self.name(),
            run_id = %self.state.run_id(),
            items_processed = self.state.items_processed(),
            elapsed_ms = self.started_at.elapsed().as_millis() as u64,
            "Coordinator stopped"
        );
        Ok(())
    }
}

/// Handle to a running dispatch
#[derive(Debug)]
pub struct DispatchHandle<E> {
    run_id: Uuid,
    commands: DispatcherCommandSender<E>,
    task: JoinHandle<DispatchResult<DispatchSummary<E>>>,
}

impl<E: Send + 'static> DispatchHandle<E> {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Counters as seen by the coordinator when it reaches this query
    ///
    /// Fails with [`DispatchError::ChannelClosed`] once the run is over.
    pub async fn stats(&self) -> DispatchResult<DispatchStats> {
        let (resp, rx) = oneshot::channel();
        self.commands
            .send(DispatcherCommand::GetProcessingStats { resp })
            .await
            .map_err(|_| DispatchError::ChannelClosed("dispatcher mailbox closed".to_string()))?;
        rx.await.map_err(|_| {
            DispatchError::ChannelClosed("dispatcher exited before answering".to_string())
        })
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to complete
    pub async fn join(self) -> DispatchResult<DispatchSummary<E>> {
        self.task.await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureCounts;
    use crate::reporter::NoopProgressReporter;
    use crate::WorkContext;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn adder(acc: &u64, next: u64) -> u64 {
        acc + next
    }

    fn identity_factory(
        _worker_id: WorkerId,
    ) -> impl Fn(u64, WorkContext) -> futures::future::Ready<Result<u64, String>> + Send + Sync
    {
        |item: u64, _ctx: WorkContext| futures::future::ready(Ok(item))
    }

    #[test]
    fn test_start_outside_runtime_is_rejected() {
        let dispatcher = WorkDispatcher::new(
            vec![1_u64],
            1,
            identity_factory,
            0_u64,
            adder,
            NoopProgressReporter,
            NoopProgressReporter,
        )
        .unwrap();

        let error = dispatcher.start().unwrap_err();
        assert!(matches!(error, DispatchError::RuntimeUnavailable(_)));
    }

    #[test]
    fn test_factory_not_called_when_construction_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let factory = move |worker_id: WorkerId| {
            counted.fetch_add(1, Ordering::SeqCst);
            identity_factory(worker_id)
        };

        let error = WorkDispatcher::new(
            Vec::<u64>::new(),
            2,
            factory,
            0_u64,
            adder,
            NoopProgressReporter,
            NoopProgressReporter,
        )
        .err()
        .expect("construction should fail");

        assert!(error.is_invalid_argument());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_factory_called_once_per_worker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let factory = move |worker_id: WorkerId| {
            counted.fetch_add(1, Ordering::SeqCst);
            identity_factory(worker_id)
        };

        let summary = WorkDispatcher::spawn(
            1..=4_u64,
            3,
            factory,
            0_u64,
            adder,
            NoopProgressReporter,
            NoopProgressReporter,
        )
        .unwrap()
        .join()
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(summary.accumulated, 10);
        assert_eq!(summary.items_processed, 4);
    }

    #[tokio::test]
    async fn test_small_buffer_is_raised_to_worker_count() {
        let dispatcher = WorkDispatcher::new(
            0..100_u64,
            16,
            identity_factory,
            0_u64,
            adder,
            NoopProgressReporter,
            |_: u64, _: &u64, _: &FailureCounts| {},
        )
        .unwrap()
        .with_command_buffer_size(1);

        let summary = dispatcher.start().unwrap().join().await.unwrap();
        assert_eq!(summary.accumulated, (0..100).sum::<u64>());
    }

    #[tokio::test]
    async fn test_stats_after_completion_fails_with_channel_closed() {
        let handle = WorkDispatcher::spawn(
            vec![5_u64],
            1,
            identity_factory,
            0_u64,
            adder,
            NoopProgressReporter,
            NoopProgressReporter,
        )
        .unwrap();

        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }

        let error = handle.stats().await.unwrap_err();
        assert!(matches!(error, DispatchError::ChannelClosed(_)));
        assert_eq!(handle.join().await.unwrap().accumulated, 5);
    }

    fn coordinator_with_workers(
        number_of_workers: usize,
        workers: JoinSet<WorkerExit>,
    ) -> (Coordinator<u64, u64>, DispatcherCommandSender<u64>) {
        let state = DispatchState::new(
            vec![1_u64, 2, 3],
            number_of_workers,
            0_u64,
            adder,
            NoopProgressReporter,
            NoopProgressReporter,
        )
        .unwrap();
        let (command_tx, command_rx) = ChannelFactory::dispatcher_command_channel(4);
        let mailboxes = (0..number_of_workers)
            .map(|_| ChannelFactory::worker_command_channel().0)
            .collect();
        let coordinator = Coordinator {
            state,
            commands: command_rx,
            mailboxes,
            workers,
            started_at: Instant::now(),
        };
        (coordinator, command_tx)
    }

    #[tokio::test]
    async fn test_dead_worker_terminates_run() {
        let mut workers = JoinSet::new();
        workers.spawn(async {
            if true {
                panic!("worker died");
            }
            WorkerExit {
                worker_id: 0,
                items_processed: 0,
                state: WorkerState::Terminated,
            }
        });
        // Held like a DispatchHandle holds it, so the mailbox never closes
        let (coordinator, _commands) = coordinator_with_workers(2, workers);

        let outcome = timeout(Duration::from_secs(5), coordinator.run())
            .await
            .expect("coordinator did not notice the dead worker");

        match outcome {
            Err(DispatchError::DispatcherTerminated(reason)) => {
                assert!(reason.contains("panicked"), "{reason}")
            }
            other => panic!("expected DispatcherTerminated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_worker_exiting_early_terminates_run() {
        let mut workers = JoinSet::new();
        workers.spawn(async {
            WorkerExit {
                worker_id: 1,
                items_processed: 0,
                state: WorkerState::Idle,
            }
        });
        // A second worker that would otherwise wait forever
        workers.spawn(async {
            futures::future::pending::<()>().await;
            WorkerExit {
                worker_id: 0,
                items_processed: 0,
                state: WorkerState::Terminated,
            }
        });
        let (coordinator, _commands) = coordinator_with_workers(2, workers);

        let outcome = timeout(Duration::from_secs(5), coordinator.run())
            .await
            .expect("coordinator did not notice the early exit");

        assert_eq!(
            outcome.map(|summary| summary.items_processed),
            Err(DispatchError::DispatcherTerminated(
                "worker 1 exited before being told no more work".to_string()
            ))
        );
    }
}
