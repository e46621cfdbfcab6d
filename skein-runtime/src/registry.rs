//! Task registry and monitoring
//!
//! The registry is an explicit object owned by the application and handed to
//! every task it creates. It assigns task ids and keeps the live tasks so they
//! can be listed, stopped, or inspected after a crash.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::TaskError;
use crate::task::{CrashRecord, TaskId, TaskState};

/// Type-erased view of a task, whatever its message type
#[async_trait]
pub trait TaskMonitor: Send + Sync {
    fn summary(&self) -> TaskSummary;

    fn crash_record(&self) -> Option<CrashRecord>;

    /// Inject the shutdown signal into the task's mailbox
    async fn request_stop(&self) -> Result<(), TaskError>;
}

/// One row of the monitoring table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub crashed: bool,
    pub received: u64,
    pub queued: usize,
}

impl TaskSummary {
    /// State label, marking crashed tasks distinctly from clean exits
    pub fn state_label(&self) -> String {
        if self.crashed {
            format!("{}(CRASH)", self.state)
        } else {
            self.state.to_string()
        }
    }
}

/// Fixed-width rendering of a registry snapshot
#[derive(Debug, Clone, Default)]
pub struct TaskTable(pub Vec<TaskSummary>);

impl fmt::Display for TaskTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>6} {:<15} {:>6} {:>6} {}", "Task", "State", "Recv", "Queue", "Name")?;
        writeln!(
            f,
            "{} {} {} {} {}",
            "-".repeat(6),
            "-".repeat(15),
            "-".repeat(6),
            "-".repeat(6),
            "-".repeat(40)
        )?;
        for row in &self.0 {
            writeln!(
                f,
                "{:>6} {:<15} {:>6} {:>6} {}",
                row.id,
                row.state_label(),
                row.received,
                row.queued,
                row.name
            )?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct RegistryInner {
    last_id: AtomicU64,
    tasks: Mutex<BTreeMap<TaskId, Arc<dyn TaskMonitor>>>,
}

/// Registry of live tasks (id -> task)
///
/// A registered task and the registry reference each other, so a task is
/// only released once [`Task::finalize`](crate::Task::finalize) removes it.
/// Tasks that are never finalized live as long as the registry.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&self) -> TaskId {
        TaskId::new(self.inner.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub(crate) fn register(&self, id: TaskId, task: Arc<dyn TaskMonitor>) {
        self.inner.tasks.lock().insert(id, task);
    }

    pub(crate) fn unregister(&self, id: TaskId) {
        self.inner.tasks.lock().remove(&id);
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.inner.tasks.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }

    /// Summaries of every registered task, in id order
    pub fn snapshot(&self) -> Vec<TaskSummary> {
        self.inner
            .tasks
            .lock()
            .values()
            .map(|task| task.summary())
            .collect()
    }

    pub fn table(&self) -> TaskTable {
        TaskTable(self.snapshot())
    }

    /// Ask the task with the given id to shut down
    pub async fn stop(&self, id: TaskId) -> Result<(), TaskError> {
        // Release the registry lock before waiting on the task's mailbox
        let task = self.lookup(id)?;
        task.request_stop().await
    }

    /// The crash record of the task with the given id, if it crashed
    pub fn crash(&self, id: TaskId) -> Result<Option<CrashRecord>, TaskError> {
        Ok(self.lookup(id)?.crash_record())
    }

    fn lookup(&self, id: TaskId) -> Result<Arc<dyn TaskMonitor>, TaskError> {
        self.inner
            .tasks
            .lock()
            .get(&id)
            .cloned()
            .ok_or(TaskError::NotFound(id))
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.len())
            .finish()
    }
}
