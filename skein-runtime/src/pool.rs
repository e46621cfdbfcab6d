//! Worker pool
//!
//! The pool is a task whose mailbox carries work items. `nworkers` worker
//! loops share that one mailbox; each item is executed on tokio's blocking
//! thread pool so a slow callable never stalls the async workers.
//!
//! Stopping the pool sends a single shutdown signal. The worker that receives
//! it passes it on to the next one, and the last worker to stop releases the
//! pool body so [`WorkerPool::join`] returns once every worker is done.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::Notify;

use crate::error::TaskError;
use crate::future::FutureResult;
use crate::mailbox::DEFAULT_MAILBOX_CAPACITY;
use crate::registry::TaskRegistry;
use crate::task::{panic_message, Received, Task, TaskId, TaskState};

/// A unit of work consumed by exactly one worker and never retried
#[async_trait]
pub trait WorkItem: Send {
    /// Whether the caller gave up on the result before execution began
    fn is_cancelled(&self) -> bool;

    /// Run the work and resolve its future
    async fn execute(self: Box<Self>);
}

struct Job<T, F> {
    future: FutureResult<T>,
    call: Option<F>,
}

/// A job dropped without running, for instance one left queued behind the
/// final shutdown signal, cancels its future so `get` does not hang.
impl<T, F> Drop for Job<T, F> {
    fn drop(&mut self) {
        if self.call.is_some() && self.future.cancel() {
            debug!("Work item discarded before execution");
        }
    }
}

#[async_trait]
impl<T, F> WorkItem for Job<T, F>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    fn is_cancelled(&self) -> bool {
        self.future.is_cancelled()
    }

    async fn execute(mut self: Box<Self>) {
        let Some(call) = self.call.take() else {
            return;
        };
        match tokio::task::spawn_blocking(call).await {
            Ok(Ok(value)) => {
                self.future.set(value);
            }
            Ok(Err(err)) => {
                self.future.set_error(err);
            }
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic().as_ref());
                self.future
                    .set_error(anyhow::anyhow!("work item panicked: {}", message));
            }
            Err(join_err) => {
                self.future
                    .set_error(anyhow::anyhow!("work item aborted: {}", join_err));
            }
        }
    }
}

/// Fixed-size pool of workers fed through a shared mailbox
pub struct WorkerPool {
    task: Task<Box<dyn WorkItem>>,
    nworkers: usize,
}

impl WorkerPool {
    pub fn new(nworkers: usize, registry: &TaskRegistry) -> Result<Self, TaskError> {
        Self::with_capacity(nworkers, registry, DEFAULT_MAILBOX_CAPACITY)
    }

    pub fn with_capacity(
        nworkers: usize,
        registry: &TaskRegistry,
        capacity: usize,
    ) -> Result<Self, TaskError> {
        if nworkers == 0 {
            return Err(TaskError::InvalidWorkerCount(nworkers));
        }
        Ok(Self {
            task: Task::with_capacity("workerpool", registry, capacity),
            nworkers,
        })
    }

    pub async fn start(&self, wait: bool) -> Result<TaskId, TaskError> {
        let nworkers = self.nworkers;
        self.task
            .start(move |task| run_workers(task, nworkers), wait)
            .await
    }

    /// Submit `call` for execution and return its future right away
    pub async fn apply<T, F>(&self, call: F) -> Result<FutureResult<T>, TaskError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let future = FutureResult::new();
        let job = Job {
            future: future.clone(),
            call: Some(call),
        };
        self.task.send(Box::new(job)).await?;
        Ok(future)
    }

    pub async fn stop(&self) -> Result<(), TaskError> {
        self.task.stop().await
    }

    /// Wait until every worker has stopped
    pub async fn join(&self) -> Result<(), TaskError> {
        self.task.join().await
    }

    pub fn finalize(&self) -> Result<(), TaskError> {
        self.task.finalize()
    }

    pub fn id(&self) -> Option<TaskId> {
        self.task.id()
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    pub fn nworkers(&self) -> usize {
        self.nworkers
    }

    /// Items waiting for a worker
    pub fn queued(&self) -> usize {
        self.task.queued()
    }
}

struct Crew {
    running: AtomicUsize,
    all_done: Notify,
}

async fn run_workers(task: Task<Box<dyn WorkItem>>, nworkers: usize) -> anyhow::Result<()> {
    let crew = Arc::new(Crew {
        running: AtomicUsize::new(nworkers),
        all_done: Notify::new(),
    });

    for worker in 1..nworkers {
        tokio::spawn(work(task.clone(), Arc::clone(&crew), worker));
    }
    work(task, Arc::clone(&crew), 0).await;

    crew.all_done.notified().await;
    Ok(())
}

async fn work(task: Task<Box<dyn WorkItem>>, crew: Arc<Crew>, worker: usize) {
    loop {
        match task.recv().await {
            Ok(Received::Message(item)) => {
                if item.is_cancelled() {
                    debug!("Worker {} skipping cancelled work item", worker);
                    continue;
                }
                item.execute().await;
            }
            Ok(Received::Shutdown) => break,
            Err(err) => {
                error!("Worker {} lost its mailbox: {}", worker, err);
                break;
            }
        }
    }

    if crew.running.fetch_sub(1, Ordering::SeqCst) > 1 {
        // Hand the shutdown signal on to the next worker
        if let Err(err) = task.stop().await {
            warn!("Worker {} could not pass on shutdown: {}", worker, err);
        }
    } else {
        // notify_one keeps a permit, so the pool body cannot miss this
        crew.all_done.notify_one();
    }
    info!("Worker {} stopped", worker);
}
