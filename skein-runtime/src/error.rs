//! Runtime error types

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::task::TaskId;

/// Errors raised by task lifecycle and mailbox operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task has no mailbox: it was never started, or was finalized
    #[error("Task {0} has no message queue")]
    NotStarted(String),

    #[error("Task {0} was already started")]
    AlreadyStarted(String),

    /// Non-blocking receive found nothing queued
    #[error("Mailbox is empty")]
    Empty,

    #[error("Receive timed out after {0:?}")]
    Timeout(Duration),

    #[error("Task {0} is still running")]
    StillRunning(String),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Worker pool needs at least one worker, got {0}")]
    InvalidWorkerCount(usize),
}

impl TaskError {
    /// Whether the error is a receive miss the caller may simply retry
    pub fn is_receive_miss(&self) -> bool {
        matches!(self, TaskError::Empty | TaskError::Timeout(_))
    }
}

/// Errors surfaced by [`crate::FutureResult::get`]
#[derive(Error, Debug, Clone)]
pub enum FutureError {
    /// The work item failed; the captured fault is shared between readers
    #[error("{0}")]
    Failed(Arc<anyhow::Error>),

    /// The result is unavailable because the future was cancelled
    #[error("Result unavailable: cancelled")]
    Cancelled,
}

impl FutureError {
    /// The captured fault, if the work item failed
    pub fn fault(&self) -> Option<&anyhow::Error> {
        match self {
            FutureError::Failed(err) => Some(err.as_ref()),
            FutureError::Cancelled => None,
        }
    }
}
