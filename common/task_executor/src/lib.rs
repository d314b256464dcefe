use futures::channel::mpsc::Sender;
use futures::future::{self, Either, FutureExt};
use slog::{debug, o, trace};
use std::future::Future;
use tokio::runtime::Handle;

/// Provides a reason when the validator client is shut down.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The node shut down successfully.
    Success(&'static str),
    /// The node shut down due to an error condition.
    Failure(&'static str),
}

impl ShutdownReason {
    pub fn message(&self) -> &'static str {
        match self {
            ShutdownReason::Success(msg) => msg,
            ShutdownReason::Failure(msg) => msg,
        }
    }
}

/// A wrapper over a runtime handle which can spawn async tasks that are cancelled together when
/// the exit signal fires.
#[derive(Clone)]
pub struct TaskExecutor {
    /// The handle to the runtime on which tasks are spawned.
    handle: Handle,
    /// The receiver exit future which on receiving shuts down the task.
    exit: async_channel::Receiver<()>,
    /// Sender given to tasks, so that if they encounter a state in which execution cannot
    /// continue they can request that everything shuts down.
    signal_tx: Sender<ShutdownReason>,
    log: slog::Logger,
}

impl TaskExecutor {
    /// Create a new task executor.
    ///
    /// The exit signal fires once every sender half of `exit` has been dropped (or has sent a
    /// message).
    pub fn new(
        handle: Handle,
        exit: async_channel::Receiver<()>,
        log: slog::Logger,
        signal_tx: Sender<ShutdownReason>,
    ) -> Self {
        Self {
            handle,
            exit,
            signal_tx,
            log,
        }
    }

    /// Clones the task executor adding a service name.
    pub fn clone_with_name(&self, service_name: String) -> Self {
        TaskExecutor {
            handle: self.handle.clone(),
            exit: self.exit.clone(),
            signal_tx: self.signal_tx.clone(),
            log: self.log.new(o!("service" => service_name)),
        }
    }

    /// Spawn a future on the runtime, dropping it as soon as the exit signal fires.
    pub fn spawn(&self, task: impl Future<Output = ()> + Send + 'static, name: &'static str) {
        let future = self.cancellable(task, name).map(|_| ());
        self.handle.spawn(future);
    }

    /// Spawn a future and return a handle which resolves to `Some(output)` if the task ran to
    /// completion, or `None` if it was cancelled by the exit signal.
    pub fn spawn_handle<R: Send + 'static>(
        &self,
        task: impl Future<Output = R> + Send + 'static,
        name: &'static str,
    ) -> tokio::task::JoinHandle<Option<R>> {
        self.handle.spawn(self.cancellable(task, name))
    }

    fn cancellable<R>(
        &self,
        task: impl Future<Output = R> + Send + 'static,
        name: &'static str,
    ) -> impl Future<Output = Option<R>> + Send + 'static
    where
        R: Send + 'static,
    {
        let exit = self.exit.clone();
        let log = self.log.clone();

        async move {
            let exit_future = async move {
                let _ = exit.recv().await;
            };
            match future::select(Box::pin(task), Box::pin(exit_future)).await {
                Either::Left((output, _)) => {
                    trace!(log, "Async task completed"; "task" => name);
                    Some(output)
                }
                Either::Right(_) => {
                    debug!(log, "Async task shutdown, exit received"; "task" => name);
                    None
                }
            }
        }
    }

    /// Returns a future that resolves once the exit signal fires.
    pub fn exit(&self) -> impl Future<Output = ()> {
        let exit = self.exit.clone();
        async move {
            let _ = exit.recv().await;
        }
    }

    /// Get a channel to request shutting down.
    pub fn shutdown_sender(&self) -> Sender<ShutdownReason> {
        self.signal_tx.clone()
    }

    /// Returns the underlying runtime handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Returns a reference to the logger.
    pub fn log(&self) -> &slog::Logger {
        &self.log
    }
}

pub mod test_utils {
    use super::{ShutdownReason, TaskExecutor};
    use futures::channel::mpsc;
    use tokio::runtime::Handle;

    /// Owns the exit sender for a `TaskExecutor` created on the current runtime.
    ///
    /// Dropping (or calling `shutdown`) fires the executor's exit signal.
    pub struct TestRuntime {
        exit_tx: Option<async_channel::Sender<()>>,
        _signal_rx: mpsc::Receiver<ShutdownReason>,
        pub task_executor: TaskExecutor,
    }

    impl TestRuntime {
        /// Must be called from within a tokio runtime.
        pub fn new(log: slog::Logger) -> Self {
            let (exit_tx, exit_rx) = async_channel::bounded(1);
            let (signal_tx, signal_rx) = mpsc::channel(1);
            let task_executor = TaskExecutor::new(Handle::current(), exit_rx, log, signal_tx);

            Self {
                exit_tx: Some(exit_tx),
                _signal_rx: signal_rx,
                task_executor,
            }
        }

        pub fn shutdown(&mut self) {
            self.exit_tx.take();
        }
    }
}
