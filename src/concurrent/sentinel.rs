//! Sentinel bookkeeping for the partition queue

use super::types::QueueItem;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Owns the completion protocol of one concurrent read
///
/// Once generation succeeds exactly one sentinel per consumer is enqueued;
/// each consumer exits on the first sentinel it receives. The first error
/// raised by any task is kept and later ones are dropped.
#[derive(Debug)]
pub struct SentinelCoordinator {
    consumers: usize,
    enqueued: AtomicUsize,
    terminated: AtomicUsize,
    first_error: Mutex<Option<Error>>,
}

impl SentinelCoordinator {
    /// Coordinator for `consumers` workers
    pub fn new(consumers: usize) -> Self {
        Self {
            consumers,
            enqueued: AtomicUsize::new(0),
            terminated: AtomicUsize::new(0),
            first_error: Mutex::new(None),
        }
    }

    /// Number of consumers
    pub fn consumers(&self) -> usize {
        self.consumers
    }

    /// Put one sentinel per consumer on the queue
    ///
    /// Fails if called twice, since a second batch would outnumber the workers.
    pub async fn enqueue_sentinels(&self, queue: &mpsc::Sender<QueueItem>) -> Result<()> {
        if self.enqueued.load(Ordering::SeqCst) > 0 {
            return Err(Error::system(
                "SentinelCoordinator",
                "sentinels already enqueued",
            ));
        }
        for _ in 0..self.consumers {
            queue.send(QueueItem::Sentinel).await.map_err(|_| {
                Error::system("SentinelCoordinator", "partition queue closed")
            })?;
            self.enqueued.fetch_add(1, Ordering::SeqCst);
        }
        debug!(sentinels = self.consumers, "Partition generation complete");
        Ok(())
    }

    /// A consumer exited on its sentinel
    pub fn worker_terminated(&self) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }

    /// Sentinels enqueued so far
    pub fn sentinels_enqueued(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    /// Consumers that exited on a sentinel
    pub fn workers_terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Keep `error` if it is the first one; returns whether it was kept
    pub fn record_error(&self, error: Error) -> bool {
        let Ok(mut slot) = self.first_error.lock() else {
            return false;
        };
        if slot.is_some() {
            debug!(error = %error, "Dropping error raised after the first failure");
            return false;
        }
        *slot = Some(error);
        true
    }

    /// Take the first error
    pub fn take_error(&self) -> Option<Error> {
        self.first_error.lock().ok().and_then(|mut slot| slot.take())
    }
}
