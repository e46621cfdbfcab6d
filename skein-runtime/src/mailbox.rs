//! Bounded FIFO mailbox
//!
//! The receiving half sits behind an async mutex so several consumers (the
//! workers of a pool) can drain the same mailbox. Whoever holds the lock is
//! the one waiting for the next letter; the others queue up behind it.

use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

/// Default number of letters a mailbox holds before senders are pushed back
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// What travels through a mailbox: a message or the shutdown sentinel
#[derive(Debug)]
pub(crate) enum Letter<M> {
    Message(M),
    Shutdown,
}

pub(crate) struct Mailbox<M> {
    tx: mpsc::Sender<Letter<M>>,
    rx: Mutex<mpsc::Receiver<Letter<M>>>,
    capacity: usize,
}

impl<M: Send> Mailbox<M> {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    /// Enqueue, waiting for space if the mailbox is full
    pub(crate) async fn put(&self, letter: Letter<M>) {
        // The receiver lives as long as `self`, so the channel cannot be closed here
        let _ = self.tx.send(letter).await;
    }

    /// Enqueue without waiting; `false` when the mailbox is full
    pub(crate) fn try_put(&self, letter: Letter<M>) -> bool {
        match self.tx.try_send(letter) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }

    pub(crate) async fn take(&self) -> Option<Letter<M>> {
        self.rx.lock().await.recv().await
    }

    /// Dequeue, giving up once `timeout` has elapsed
    pub(crate) async fn take_timeout(&self, timeout: Duration) -> Option<Letter<M>> {
        tokio::time::timeout(timeout, self.take()).await.ok().flatten()
    }

    /// Dequeue without waiting. A mailbox another consumer is currently
    /// blocked on counts as empty.
    pub(crate) fn try_take(&self) -> Option<Letter<M>> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Number of letters currently queued
    pub(crate) fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_put_reports_full() {
        let mailbox: Mailbox<u32> = Mailbox::new(4);

        for n in 0..4 {
            assert!(mailbox.try_put(Letter::Message(n)));
        }
        assert!(!mailbox.try_put(Letter::Message(99)));
        assert_eq!(mailbox.depth(), 4);

        match mailbox.take().await {
            Some(Letter::Message(0)) => {}
            other => panic!("unexpected letter: {:?}", other),
        }
        assert_eq!(mailbox.depth(), 3);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let mailbox: Mailbox<&str> = Mailbox::new(8);
        mailbox.put(Letter::Message("a")).await;
        mailbox.put(Letter::Message("b")).await;
        mailbox.put(Letter::Shutdown).await;

        assert!(matches!(mailbox.try_take(), Some(Letter::Message("a"))));
        assert!(matches!(mailbox.try_take(), Some(Letter::Message("b"))));
        assert!(matches!(mailbox.try_take(), Some(Letter::Shutdown)));
        assert!(mailbox.try_take().is_none());
    }

    #[tokio::test]
    async fn test_take_timeout_expires() {
        let mailbox: Mailbox<u8> = Mailbox::new(1);
        assert!(mailbox
            .take_timeout(Duration::from_millis(20))
            .await
            .is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mailbox: Mailbox<u8> = Mailbox::new(0);
        assert!(mailbox.try_put(Letter::Message(1)));
        assert!(!mailbox.try_put(Letter::Message(2)));
        assert_eq!(mailbox.depth(), 1);
    }
}
