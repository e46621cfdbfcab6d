//! Single-assignment asynchronous results
//!
//! A [`FutureResult`] starts pending and is resolved exactly once, by a value,
//! an error, or cancellation. The first resolution wins: later attempts are
//! ignored and report `false`, so a reader that already observed a value never
//! sees it replaced by a cancellation.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::FutureError;
use crate::task::panic_message;

/// The settled outcome of a future
#[derive(Debug)]
pub enum Resolution<T> {
    Value(T),
    Failed(Arc<anyhow::Error>),
    Cancelled,
}

impl<T: Clone> Resolution<T> {
    fn to_result(&self) -> Result<T, FutureError> {
        match self {
            Resolution::Value(value) => Ok(value.clone()),
            Resolution::Failed(err) => Err(FutureError::Failed(Arc::clone(err))),
            Resolution::Cancelled => Err(FutureError::Cancelled),
        }
    }
}

type Callback<T> = Box<dyn FnOnce(&Resolution<T>) + Send>;

struct Slot<T> {
    resolution: Option<Arc<Resolution<T>>>,
    callback: Option<Callback<T>>,
}

struct FutureInner<T> {
    slot: Mutex<Slot<T>>,
    cancelled: AtomicBool,
    resolved: watch::Sender<bool>,
}

/// Handle to a single-assignment result. Clones share the same cell.
pub struct FutureResult<T> {
    inner: Arc<FutureInner<T>>,
}

impl<T> Clone for FutureResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for FutureResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FutureResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureResult")
            .field("resolved", &self.is_resolved())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl<T> FutureResult<T> {
    pub fn new() -> Self {
        let (resolved, _) = watch::channel(false);
        Self {
            inner: Arc::new(FutureInner {
                slot: Mutex::new(Slot {
                    resolution: None,
                    callback: None,
                }),
                cancelled: AtomicBool::new(false),
                resolved,
            }),
        }
    }

    /// Resolve with a value. Returns `false` if already resolved.
    pub fn set(&self, value: T) -> bool {
        self.resolve(Resolution::Value(value))
    }

    /// Resolve with a fault. Returns `false` if already resolved.
    pub fn set_error(&self, err: impl Into<anyhow::Error>) -> bool {
        self.resolve(Resolution::Failed(Arc::new(err.into())))
    }

    /// Cancel a pending future. Has no effect once a value or error is set,
    /// and cannot interrupt work that is already executing.
    pub fn cancel(&self) -> bool {
        self.resolve(Resolution::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_resolved(&self) -> bool {
        *self.inner.resolved.borrow()
    }

    /// Register a callback fired once with the resolution. If the future is
    /// already resolved the callback runs immediately on the caller.
    ///
    /// A panicking callback is logged and swallowed; it never unwinds into
    /// whoever resolved the future.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnOnce(&Resolution<T>) + Send + 'static,
    {
        let resolved = {
            let mut slot = self.inner.slot.lock();
            match &slot.resolution {
                Some(resolution) => Arc::clone(resolution),
                None => {
                    slot.callback = Some(Box::new(callback));
                    return;
                }
            }
        };
        fire(callback, &resolved);
    }

    fn resolve(&self, resolution: Resolution<T>) -> bool {
        let is_cancel = matches!(resolution, Resolution::Cancelled);
        let (resolution, callback) = {
            let mut slot = self.inner.slot.lock();
            if slot.resolution.is_some() {
                return false;
            }
            if is_cancel {
                self.inner.cancelled.store(true, Ordering::SeqCst);
            }
            let resolution = Arc::new(resolution);
            slot.resolution = Some(Arc::clone(&resolution));
            (resolution, slot.callback.take())
        };

        self.inner.resolved.send_replace(true);
        // Outside the lock so the callback may use this future
        if let Some(callback) = callback {
            fire(callback, &resolution);
        }
        true
    }
}

fn fire<T, F>(callback: F, resolution: &Resolution<T>)
where
    F: FnOnce(&Resolution<T>),
{
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(resolution))) {
        warn!(
            "Future callback panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

impl<T: Clone> FutureResult<T> {
    /// Wait for the resolution. Safe to call repeatedly; every call after
    /// resolution returns the same outcome.
    pub async fn get(&self) -> Result<T, FutureError> {
        let mut resolved = self.inner.resolved.subscribe();
        // The sender lives in `self`, so this only returns once resolved
        let _ = resolved.wait_for(|done| *done).await;
        self.try_get().unwrap_or(Err(FutureError::Cancelled))
    }

    /// The outcome if resolved, `None` while pending
    pub fn try_get(&self) -> Option<Result<T, FutureError>> {
        self.inner
            .slot
            .lock()
            .resolution
            .as_ref()
            .map(|resolution| resolution.to_result())
    }
}
