//! Concurrent read types

use crate::error::{Error, Result};
use crate::types::StreamSlice;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default number of workers
pub const DEFAULT_MAX_WORKERS: usize = 4;

// ============================================================================
// Concurrency Config
// ============================================================================

/// Sizing of a concurrent read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    /// Worker budget; half of it (at least one) reads partitions
    pub max_workers: usize,
    /// Capacity of the partition queue
    pub queue_capacity: usize,
    /// Abort the read after this long
    pub deadline: Option<Duration>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            queue_capacity: DEFAULT_MAX_WORKERS,
            deadline: None,
        }
    }
}

impl ConcurrencyConfig {
    /// Config with `max_workers` workers and a queue of the same capacity
    pub fn new(max_workers: usize) -> Result<Self> {
        if max_workers == 0 {
            return Err(Error::invalid_value("max_workers", "must be at least 1"));
        }
        Ok(Self {
            max_workers,
            queue_capacity: max_workers,
            deadline: None,
        })
    }

    /// Set the queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid_value("queue_capacity", "must be at least 1"));
        }
        self.queue_capacity = capacity;
        Ok(self)
    }

    /// Set a deadline for the whole read
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Number of partition readers
    pub fn consumers(&self) -> usize {
        (self.max_workers / 2).max(1)
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Item on the partition queue
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    /// A partition to read
    Partition(StreamSlice),
    /// Generation is complete; the receiving worker exits
    Sentinel,
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation shared between a caller and a read
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Create an uncancelled token
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel every read holding this token
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

// ============================================================================
// Report
// ============================================================================

/// Counters of a finished concurrent read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadReport {
    /// Records forwarded to the output
    pub records: usize,
    /// Partitions produced by the generator
    pub partitions_generated: usize,
    /// Partitions fully read
    pub partitions_read: usize,
    /// Sentinels put on the queue
    pub sentinels_enqueued: usize,
    /// Workers that exited on a sentinel
    pub workers_terminated: usize,
}
