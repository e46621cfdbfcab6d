//! Task lifecycle, mailbox messaging and crash capture
//!
//! A [`Task`] is a lightweight execution unit with a private bounded mailbox.
//! It is created in the `INIT` state, launched with [`Task::start`], and runs
//! a user-supplied async body until the body returns. A body that fails or
//! panics does not take anything down with it: the fault is recorded as a
//! [`CrashRecord`] and the task still reaches `EXIT`.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::TaskError;
use crate::mailbox::{Letter, Mailbox, DEFAULT_MAILBOX_CAPACITY};
use crate::registry::{TaskMonitor, TaskRegistry, TaskSummary};

/// Identifier assigned to a task when it is first started
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle state. Transitions only move forward: INIT -> RUNNING -> EXIT -> FINAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Init,
    Running,
    Exit,
    Final,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Exit | TaskState::Final)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Init => write!(f, "INIT"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Exit => write!(f, "EXIT"),
            TaskState::Final => write!(f, "FINAL"),
        }
    }
}

/// How a task body went down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashKind {
    /// The body returned an error
    Error,
    /// The body panicked
    Panic,
    /// The execution context was torn down before the body finished
    Aborted,
}

/// Post-mortem record of a crashed task body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashRecord {
    pub kind: CrashKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Outcome of a successful receive
#[derive(Debug, PartialEq, Eq)]
pub enum Received<M> {
    Message(M),
    /// The shutdown signal injected by [`Task::stop`]; the body should return
    Shutdown,
}

impl<M> Received<M> {
    pub fn into_message(self) -> Option<M> {
        match self {
            Received::Message(msg) => Some(msg),
            Received::Shutdown => None,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Received::Shutdown)
    }
}

struct TaskInner<M> {
    name: String,
    capacity: usize,
    registry: TaskRegistry,
    id: OnceLock<TaskId>,
    launched: AtomicBool,
    mailbox: RwLock<Option<Arc<Mailbox<M>>>>,
    state: watch::Sender<TaskState>,
    received: AtomicU64,
    crash: Mutex<Option<CrashRecord>>,
}

/// Handle to a task. Cloning the handle does not clone the task.
pub struct Task<M> {
    inner: Arc<TaskInner<M>>,
}

impl<M> Clone for Task<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> fmt::Debug for Task<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id.get())
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl<M: Send + 'static> Task<M> {
    /// Create a task with the default mailbox capacity
    pub fn new(name: impl Into<String>, registry: &TaskRegistry) -> Self {
        Self::with_capacity(name, registry, DEFAULT_MAILBOX_CAPACITY)
    }

    /// Create a task whose mailbox holds at most `capacity` messages
    pub fn with_capacity(name: impl Into<String>, registry: &TaskRegistry, capacity: usize) -> Self {
        let (state, _) = watch::channel(TaskState::Init);
        Self {
            inner: Arc::new(TaskInner {
                name: name.into(),
                capacity: capacity.max(1),
                registry: registry.clone(),
                id: OnceLock::new(),
                launched: AtomicBool::new(false),
                mailbox: RwLock::new(None),
                state,
                received: AtomicU64::new(0),
                crash: Mutex::new(None),
            }),
        }
    }

    /// Launch the task body.
    ///
    /// Allocates the mailbox, assigns an id, registers the task and spawns the
    /// execution context. With `wait` set, returns only once the state has
    /// left `INIT`: the body was entered, or its context was torn down first.
    pub async fn start<F, Fut>(&self, body: F, wait: bool) -> Result<TaskId, TaskError>
    where
        F: FnOnce(Task<M>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.inner.launched.swap(true, Ordering::SeqCst) {
            return Err(TaskError::AlreadyStarted(self.inner.name.clone()));
        }

        {
            let mut mailbox = self.inner.mailbox.write();
            if mailbox.is_none() {
                *mailbox = Some(Arc::new(Mailbox::new(self.inner.capacity)));
            }
        }
        let id = *self
            .inner
            .id
            .get_or_init(|| self.inner.registry.next_id());

        let mut started = self.inner.state.subscribe();
        self.inner
            .registry
            .register(id, Arc::new(self.clone()) as Arc<dyn TaskMonitor>);
        tokio::spawn(self.clone().bootstrap(body, ExitGuard(self.clone())));

        if wait {
            // The exit guard publishes EXIT if the context is dropped unpolled
            let _ = started.wait_for(|state| *state != TaskState::Init).await;
        }
        Ok(id)
    }

    async fn bootstrap<F, Fut>(self, body: F, _exit_guard: ExitGuard<M>)
    where
        F: FnOnce(Task<M>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = self.label();
        self.inner.state.send_replace(TaskState::Running);
        info!("Task {} starting", label);

        let handle = self.clone();
        let outcome = AssertUnwindSafe(async move { body(handle).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.record_crash(CrashKind::Error, format!("{:#}", err)),
            Err(payload) => self.record_crash(CrashKind::Panic, panic_message(payload.as_ref())),
        }

        info!("Task {} exit", label);
        self.inner.state.send_replace(TaskState::Exit);
    }

    fn record_crash(&self, kind: CrashKind, message: String) {
        error!("Task {} crashed: {}", self.label(), message);
        *self.inner.crash.lock() = Some(CrashRecord {
            kind,
            message,
            at: Utc::now(),
        });
    }

    /// Inject the shutdown signal. A body blocked on something other than its
    /// mailbox is not interrupted.
    pub async fn stop(&self) -> Result<(), TaskError> {
        debug!("Stopping task {}", self.label());
        self.mailbox()?.put(Letter::Shutdown).await;
        Ok(())
    }

    /// Wait until the body has reached a terminal state
    pub async fn join(&self) -> Result<(), TaskError> {
        if !self.inner.launched.load(Ordering::SeqCst) {
            return Err(TaskError::NotStarted(self.inner.name.clone()));
        }
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(TaskState::is_terminal).await;
        Ok(())
    }

    /// Deregister the task and drop its mailbox. Refused while the body runs.
    pub fn finalize(&self) -> Result<(), TaskError> {
        match self.state() {
            TaskState::Running => return Err(TaskError::StillRunning(self.inner.name.clone())),
            TaskState::Init => return Err(TaskError::NotStarted(self.inner.name.clone())),
            TaskState::Final => return Ok(()),
            TaskState::Exit => {}
        }

        if let Some(id) = self.id() {
            self.inner.registry.unregister(id);
        }
        self.inner.mailbox.write().take();
        self.inner.state.send_replace(TaskState::Final);
        debug!("Task {} finalized", self.label());
        Ok(())
    }

    /// Enqueue a message, waiting for mailbox space if it is full
    pub async fn send(&self, msg: M) -> Result<(), TaskError> {
        self.mailbox()?.put(Letter::Message(msg)).await;
        Ok(())
    }

    /// Enqueue without waiting. `Ok(false)` means the mailbox was full.
    pub fn try_send(&self, msg: M) -> Result<bool, TaskError> {
        Ok(self.mailbox()?.try_put(Letter::Message(msg)))
    }

    /// Wait for the next letter
    pub async fn recv(&self) -> Result<Received<M>, TaskError> {
        let letter = self.mailbox()?.take().await;
        letter.map(|l| self.accept(l)).ok_or(TaskError::Empty)
    }

    /// Wait for the next letter for at most `timeout`
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<Received<M>, TaskError> {
        let letter = self.mailbox()?.take_timeout(timeout).await;
        letter
            .map(|l| self.accept(l))
            .ok_or(TaskError::Timeout(timeout))
    }

    /// Take the next letter if one is queued
    pub fn try_recv(&self) -> Result<Received<M>, TaskError> {
        let letter = self.mailbox()?.try_take();
        letter.map(|l| self.accept(l)).ok_or(TaskError::Empty)
    }

    fn accept(&self, letter: Letter<M>) -> Received<M> {
        match letter {
            Letter::Message(msg) => {
                self.inner.received.fetch_add(1, Ordering::Relaxed);
                Received::Message(msg)
            }
            Letter::Shutdown => Received::Shutdown,
        }
    }

    fn mailbox(&self) -> Result<Arc<Mailbox<M>>, TaskError> {
        self.inner
            .mailbox
            .read()
            .clone()
            .ok_or_else(|| TaskError::NotStarted(self.inner.name.clone()))
    }
}

impl<M> Task<M> {
    pub fn id(&self) -> Option<TaskId> {
        self.inner.id.get().copied()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> TaskState {
        *self.inner.state.borrow()
    }

    /// Number of ordinary messages received so far
    pub fn received(&self) -> u64 {
        self.inner.received.load(Ordering::Relaxed)
    }

    /// Number of letters waiting in the mailbox
    pub fn queued(&self) -> usize
    where
        M: Send,
    {
        self.inner
            .mailbox
            .read()
            .as_ref()
            .map(|mailbox| mailbox.depth())
            .unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// The captured fault, if the body crashed
    pub fn crash(&self) -> Option<CrashRecord> {
        self.inner.crash.lock().clone()
    }

    fn label(&self) -> String {
        match self.id() {
            Some(id) => format!("{}-{}", self.inner.name, id),
            None => self.inner.name.clone(),
        }
    }
}

/// Owned by the spawned execution context. Dropping it before the task
/// reached a terminal state means the context was torn down mid-flight.
struct ExitGuard<M>(Task<M>);

impl<M> Drop for ExitGuard<M> {
    fn drop(&mut self) {
        let inner = &self.0.inner;
        if inner.state.borrow().is_terminal() {
            return;
        }
        let message = "execution context dropped before the body finished".to_string();
        error!("Task {} aborted: {}", self.0.label(), message);
        *inner.crash.lock() = Some(CrashRecord {
            kind: CrashKind::Aborted,
            message,
            at: Utc::now(),
        });
        inner.state.send_replace(TaskState::Exit);
    }
}

#[async_trait]
impl<M: Send + 'static> TaskMonitor for Task<M> {
    fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id().unwrap_or(TaskId(0)),
            name: self.name().to_string(),
            state: self.state(),
            crashed: self.inner.crash.lock().is_some(),
            received: self.received(),
            queued: self.queued(),
        }
    }

    fn crash_record(&self) -> Option<CrashRecord> {
        self.crash()
    }

    async fn request_stop(&self) -> Result<(), TaskError> {
        self.stop().await
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
