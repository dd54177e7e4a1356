//! The task executor: an unbounded queue drained by a dispatcher that runs
//! every job as its own task.
//!
//! ```text
//! ┌─────────────┐  push   ┌───────────┐  recv  ┌────────────┐  spawn   worker
//! │  webhook /  │ ──────▶ │ unbounded │ ─────▶ │ dispatcher │ ──────▶  worker
//! │  CLI        │         │   queue   │        └────────────┘          worker
//! └─────────────┘         └───────────┘                                  │
//!                                                                        ▼
//!                                                              TaskTracker (count)
//! ```
//!
//! Pushing never waits for a job to run. Shutdown is a graceful drain: no new
//! jobs are accepted, jobs already queued are still dispatched, and shutdown
//! returns once every worker has finished. Running jobs are never cancelled,
//! so a pick is never interrupted between moving a branch and reporting it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// A unit of work.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    /// The executor no longer accepts work.
    #[error("executor is shutting down")]
    ShuttingDown,
}

/// Runs pushed jobs concurrently, one task per job.
pub struct TaskExecutor {
    queue: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    tracker: TaskTracker,
    closing: CancellationToken,
    dispatcher: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("in_flight", &self.tracker.len())
            .field("closing", &self.closing.is_cancelled())
            .finish()
    }
}

impl TaskExecutor {
    /// Starts the dispatcher. Must be called from within a tokio runtime.
    pub fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = TaskTracker::new();
        let dispatcher = tokio::spawn(dispatch(rx, tracker.clone()));
        debug!("Task executor started");

        TaskExecutor {
            queue: Mutex::new(Some(tx)),
            tracker,
            closing: CancellationToken::new(),
            dispatcher: tokio::sync::Mutex::new(Some(dispatcher)),
        }
    }

    /// Queues a job. Fails once shutdown has begun.
    pub fn push<F>(&self, job: F) -> Result<(), ExecutorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closing.is_cancelled() {
            return Err(ExecutorError::ShuttingDown);
        }
        let queue = self.queue.lock().map_err(|_| ExecutorError::ShuttingDown)?;
        let tx = queue.as_ref().ok_or(ExecutorError::ShuttingDown)?;
        tx.send(Box::pin(job))
            .map_err(|_| ExecutorError::ShuttingDown)
    }

    /// Number of workers currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Stops accepting work and waits for every queued and running job.
    ///
    /// Safe to call more than once; later calls wait for the same drain.
    pub async fn shutdown(&self) {
        self.closing.cancel();
        // Dropping the sender lets the dispatcher drain what is queued and exit.
        if let Ok(mut queue) = self.queue.lock() {
            queue.take();
        }

        let mut dispatcher = self.dispatcher.lock().await;
        if let Some(handle) = dispatcher.take() {
            info!(in_flight = self.tracker.len(), "Draining task executor");
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatcher task failed");
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        debug!("Task executor drained");
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<Job>, tracker: TaskTracker) {
    while let Some(job) = rx.recv().await {
        tracker.spawn(supervise(job));
    }
    debug!("Queue closed, dispatcher exiting");
}

/// Runs a job in its own task so a panic is contained and logged.
async fn supervise(job: Job) {
    if let Err(e) = tokio::spawn(job).await
        && e.is_panic()
    {
        error!("Worker panicked");
    }
}
