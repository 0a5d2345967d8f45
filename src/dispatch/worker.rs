//! # Worker
//!
//! A worker pulls one item at a time from its dispatcher, runs the
//! processing function on it, and reports the outcome. The report doubles as
//! the next request, so a worker never holds more than one item and never
//! pulls a second item before reporting the first.
//!
//! ```text
//! Idle ──Work(item)──→ Processing ──outcome reported──→ Idle
//!   │
//!   └──NoMoreWork──→ Terminated
//! ```

use async_trait::async_trait;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::channels::{DispatcherCommandSender, WorkerCommandReceiver};
use super::commands::{DispatcherCommand, WorkerCommand, WorkerId};
use crate::actors::PoolActor;
use crate::constants::actors;
use crate::failure::{Categorize, WorkFailure};

/// Execution context handed to the processing function with each item
#[derive(Debug, Clone)]
pub struct WorkContext {
    worker_id: WorkerId,
    run_id: Uuid,
    runtime: Handle,
}

impl WorkContext {
    pub fn new(worker_id: WorkerId, run_id: Uuid, runtime: Handle) -> Self {
        Self {
            worker_id,
            run_id,
            runtime,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Runtime the worker runs on; extra work may be spawned onto it
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

/// Asynchronous processing function applied to each work item
///
/// Closures `Fn(T, WorkContext) -> impl Future<Output = Result<E, Err>>`
/// implement this trait directly.
///
/// ```rust,no_run
/// use workpull_core::{WorkContext, WorkProcessor};
///
/// let double = |item: u64, _ctx: WorkContext| async move { Ok::<_, String>(item * 2) };
/// # fn assert_processor<P: WorkProcessor<u64, u64>>(_: &P) {}
/// # assert_processor(&double);
/// ```
#[async_trait]
pub trait WorkProcessor<T: Send + 'static, E: Send + 'static>: Send + Sync + 'static {
    type Error: Categorize + fmt::Display + Send + 'static;

    async fn process(&self, item: T, context: WorkContext) -> Result<E, Self::Error>;
}

#[async_trait]
impl<T, E, Err, F, Fut> WorkProcessor<T, E> for F
where
    T: Send + 'static,
    E: Send + 'static,
    Err: Categorize + fmt::Display + Send + 'static,
    F: Fn(T, WorkContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<E, Err>> + Send + 'static,
{
    type Error = Err;

    async fn process(&self, item: T, context: WorkContext) -> Result<E, Err> {
        (self)(item, context).await
    }
}

/// Creates the processing function for each worker in a pool
pub trait WorkerFactory<T: Send + 'static, E: Send + 'static>: Send + 'static {
    type Processor: WorkProcessor<T, E>;

    fn create(&self, worker_id: WorkerId) -> Self::Processor;
}

impl<T, E, F, P> WorkerFactory<T, E> for F
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(WorkerId) -> P + Send + 'static,
    P: WorkProcessor<T, E>,
{
    type Processor = P;

    fn create(&self, worker_id: WorkerId) -> P {
        self(worker_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Processing,
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "idle"),
            WorkerState::Processing => write!(f, "processing"),
            WorkerState::Terminated => write!(f, "terminated"),
        }
    }
}

/// How a worker's loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub worker_id: WorkerId,
    pub items_processed: u64,
    pub state: WorkerState,
}

pub struct Worker<T, E, P> {
    worker_id: WorkerId,
    run_id: Uuid,
    processor: P,
    dispatcher: DispatcherCommandSender<E>,
    mailbox: WorkerCommandReceiver<T>,
    runtime: Handle,
    state: WorkerState,
    items_processed: u64,
}

impl<T, E, P> Worker<T, E, P>
where
    T: Send + 'static,
    E: Send + 'static,
    P: WorkProcessor<T, E>,
{
    pub fn new(
        worker_id: WorkerId,
        run_id: Uuid,
        processor: P,
        dispatcher: DispatcherCommandSender<E>,
        mailbox: WorkerCommandReceiver<T>,
        runtime: Handle,
    ) -> Self {
        Self {
            worker_id,
            run_id,
            processor,
            dispatcher,
            mailbox,
            runtime,
            state: WorkerState::Idle,
            items_processed: 0,
        }
    }

    /// Request work, then process items until told there is no more
    pub async fn run(mut self) -> WorkerExit {
        if let Err(error) = self.started() {
            error!(
                actor = self.name(),
                run_id = %self.run_id,
                worker_id = self.worker_id,
                error = %error,
                "Worker failed to start"
            );
            return self.exit();
        }

        let request = DispatcherCommand::RequestWork {
            worker_id: self.worker_id,
        };
        if self.dispatcher.send(request).await.is_err() {
            warn!(
                actor = self.name(),
                run_id = %self.run_id,
                worker_id = self.worker_id,
                "Dispatcher gone before first request"
            );
            return self.exit();
        }

        while let Some(command) = self.mailbox.recv().await {
            match command {
                WorkerCommand::Work(item) => {
                    self.state = WorkerState::Processing;
                    let report = self.process_item(item).await;
                    self.items_processed += 1;
                    self.state = WorkerState::Idle;

                    if self.dispatcher.send(report).await.is_err() {
                        warn!(
                            actor = self.name(),
                            run_id = %self.run_id,
                            worker_id = self.worker_id,
                            "Dispatcher gone, outcome not reported"
                        );
                        break;
                    }
                }
                WorkerCommand::NoMoreWork => {
                    self.state = WorkerState::Terminated;
                    break;
                }
            }
        }

        if self.state != WorkerState::Terminated {
            debug!(
                actor = self.name(),
                run_id = %self.run_id,
                worker_id = self.worker_id,
                state = %self.state,
                "Worker mailbox closed without no-more-work"
            );
        }
        self.exit()
    }

    async fn process_item(&self, item: T) -> DispatcherCommand<E> {
        let worker_id = self.worker_id;
        let context = WorkContext::new(worker_id, self.run_id, self.runtime.clone());
        let processor = &self.processor;

        // Classifying the error runs caller code too, so it stays under the guard
        let outcome = AssertUnwindSafe(async move {
            match processor.process(item, context).await {
                Ok(result) => DispatcherCommand::WorkSucceeded { worker_id, result },
                Err(error) => DispatcherCommand::WorkFailed {
                    worker_id,
                    failure: WorkFailure::from_error(&error),
                },
            }
        })
        .catch_unwind()
        .await;

        outcome.unwrap_or_else(|panic| {
            let failure = WorkFailure::from_panic(panic.as_ref());
            warn!(
                actor = self.name(),
                run_id = %self.run_id,
                worker_id = worker_id,
                error = %failure.message,
                "Processing function panicked"
            );
            DispatcherCommand::WorkFailed { worker_id, failure }
        })
    }

    fn exit(mut self) -> WorkerExit {
        if let Err(error) = self.stopped() {
            warn!(
                actor = self.name(),
                worker_id = self.worker_id,
                error = %error,
                "Worker stop hook failed"
            );
        }
        debug!(
            actor = self.name(),
            run_id = %self.run_id,
            worker_id = self.worker_id,
            items_processed = self.items_processed,
            state = %self.state,
            "Worker exiting"
        );
        WorkerExit {
            worker_id: self.worker_id,
            items_processed: self.items_processed,
            state: self.state,
        }
    }
}

impl<T, E, P> PoolActor for Worker<T, E, P>
where
    T: Send + 'static,
    E: Send + 'static,
    P: WorkProcessor<T, E>,
{
    fn name(&self) -> &'static str {
        actors::WORKER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::channels::{ChannelFactory, DispatcherCommandReceiver, WorkerCommandSender};
    use crate::failure::FailureCategory;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    #[derive(Debug, thiserror::Error)]
    #[error("KABOOM")]
    struct RuntimeError;

    impl Categorize for RuntimeError {
        fn category(&self) -> FailureCategory {
            FailureCategory::new("RuntimeError")
        }
    }

    struct Harness<T, E> {
        dispatcher_rx: DispatcherCommandReceiver<E>,
        mailbox: WorkerCommandSender<T>,
        handle: JoinHandle<WorkerExit>,
    }

    fn spawn_worker<T, E, P>(processor: P) -> Harness<T, E>
    where
        T: Send + 'static,
        E: Send + 'static,
        P: WorkProcessor<T, E>,
    {
        let (dispatcher_tx, dispatcher_rx) = ChannelFactory::dispatcher_command_channel(4);
        let (mailbox, worker_rx) = ChannelFactory::worker_command_channel();
        let worker = Worker::new(
            0,
            Uuid::new_v4(),
            processor,
            dispatcher_tx,
            worker_rx,
            Handle::current(),
        );
        Harness {
            dispatcher_rx,
            mailbox,
            handle: tokio::spawn(worker.run()),
        }
    }

    async fn next_command<E>(rx: &mut DispatcherCommandReceiver<E>) -> DispatcherCommand<E> {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for worker")
            .expect("worker channel closed")
    }

    #[tokio::test]
    async fn test_worker_requests_work_when_started() {
        let mut harness =
            spawn_worker(|_item: String, _ctx: WorkContext| async { Ok::<_, String>("WORKED") });

        let command = next_command(&mut harness.dispatcher_rx).await;
        assert!(matches!(command, DispatcherCommand::RequestWork { worker_id: 0 }));
    }

    #[tokio::test]
    async fn test_worker_reports_success_and_asks_for_more() {
        let mut harness = spawn_worker(|item: String, _ctx: WorkContext| async move {
            Ok::<_, String>(format!("WORKED on {item}"))
        });
        next_command(&mut harness.dispatcher_rx).await;

        harness
            .mailbox
            .try_send(WorkerCommand::Work("WORK!".to_string()))
            .unwrap();

        match next_command(&mut harness.dispatcher_rx).await {
            DispatcherCommand::WorkSucceeded { worker_id, result } => {
                assert_eq!(worker_id, 0);
                assert_eq!(result, "WORKED on WORK!");
            }
            other => panic!("expected WorkSucceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_worker_reports_failure_with_category() {
        let mut harness = spawn_worker(|_item: String, _ctx: WorkContext| async {
            Err::<String, _>(RuntimeError)
        });
        next_command(&mut harness.dispatcher_rx).await;

        harness
            .mailbox
            .try_send(WorkerCommand::Work("WORK!".to_string()))
            .unwrap();

        match next_command(&mut harness.dispatcher_rx).await {
            DispatcherCommand::WorkFailed { failure, .. } => {
                assert_eq!(failure.category, FailureCategory::new("RuntimeError"));
                assert_eq!(failure.message, "KABOOM");
            }
            other => panic!("expected WorkFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_worker_reports_panic_as_failure() {
        let mut harness = spawn_worker(|_item: u32, _ctx: WorkContext| async {
            if true {
                panic!("processing blew up");
            }
            Ok::<u32, String>(0)
        });
        next_command(&mut harness.dispatcher_rx).await;

        harness.mailbox.try_send(WorkerCommand::Work(1)).unwrap();

        match next_command(&mut harness.dispatcher_rx).await {
            DispatcherCommand::WorkFailed { failure, .. } => {
                assert_eq!(failure.category, FailureCategory::panic());
                assert_eq!(failure.message, "processing blew up");
            }
            other => panic!("expected WorkFailed, got {other:?}"),
        }
    }

    #[derive(Debug)]
    struct UnclassifiableError;

    impl fmt::Display for UnclassifiableError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("unclassifiable")
        }
    }

    impl Categorize for UnclassifiableError {
        fn category(&self) -> FailureCategory {
            panic!("classifier blew up")
        }
    }

    #[tokio::test]
    async fn test_worker_reports_classifier_panic_as_failure() {
        let mut harness = spawn_worker(|_item: u32, _ctx: WorkContext| async {
            Err::<u32, _>(UnclassifiableError)
        });
        next_command(&mut harness.dispatcher_rx).await;

        harness.mailbox.try_send(WorkerCommand::Work(1)).unwrap();

        match next_command(&mut harness.dispatcher_rx).await {
            DispatcherCommand::WorkFailed { worker_id, failure } => {
                assert_eq!(worker_id, 0);
                assert_eq!(failure.category, FailureCategory::panic());
                assert_eq!(failure.message, "classifier blew up");
            }
            other => panic!("expected WorkFailed, got {other:?}"),
        }

        // Still alive and pulling
        harness.mailbox.try_send(WorkerCommand::NoMoreWork).unwrap();
        let exit = timeout(Duration::from_secs(5), harness.handle)
            .await
            .expect("worker did not exit")
            .unwrap();
        assert_eq!(exit.state, WorkerState::Terminated);
        assert_eq!(exit.items_processed, 1);
    }

    #[tokio::test]
    async fn test_worker_terminates_on_no_more_work() {
        let mut harness =
            spawn_worker(|item: u32, _ctx: WorkContext| async move { Ok::<_, String>(item) });
        next_command(&mut harness.dispatcher_rx).await;

        harness.mailbox.try_send(WorkerCommand::NoMoreWork).unwrap();

        let exit = timeout(Duration::from_secs(5), harness.handle)
            .await
            .expect("worker did not exit")
            .unwrap();
        assert_eq!(exit.state, WorkerState::Terminated);
        assert_eq!(exit.items_processed, 0);
        assert!(harness.dispatcher_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_context_carries_worker_identity() {
        let mut harness = spawn_worker(|_item: u8, ctx: WorkContext| async move {
            let spawned = ctx.runtime().spawn(async { 21_u64 * 2 });
            let value = spawned.await.map_err(|e| e.to_string())?;
            Ok::<_, String>((ctx.worker_id(), value))
        });
        next_command(&mut harness.dispatcher_rx).await;

        harness.mailbox.try_send(WorkerCommand::Work(0)).unwrap();

        match next_command(&mut harness.dispatcher_rx).await {
            DispatcherCommand::WorkSucceeded { result, .. } => assert_eq!(result, (0, 42)),
            other => panic!("expected WorkSucceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_factory_closure_creates_processors() {
        let factory = |worker_id: WorkerId| {
            move |item: u64, _ctx: WorkContext| async move {
                Ok::<_, String>(item + worker_id as u64)
            }
        };
        fn assert_factory<W: WorkerFactory<u64, u64>>(_: &W) {}
        assert_factory(&factory);
    }
}
