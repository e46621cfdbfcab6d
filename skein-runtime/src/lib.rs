//! Task runtime for Skein
//!
//! This crate provides lightweight tasks with bounded mailboxes and crash
//! capture, an explicit registry for monitoring them, single-assignment
//! future results, and a worker pool built on both.

pub mod error;
pub mod future;
pub mod mailbox;
pub mod pool;
pub mod registry;
pub mod task;

// Re-export commonly used types
pub use error::{FutureError, TaskError};
pub use future::{FutureResult, Resolution};
pub use mailbox::DEFAULT_MAILBOX_CAPACITY;
pub use pool::{WorkItem, WorkerPool};
pub use registry::{TaskMonitor, TaskRegistry, TaskSummary, TaskTable};
pub use task::{CrashKind, CrashRecord, Received, Task, TaskId, TaskState};
