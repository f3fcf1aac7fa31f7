//! Concurrent stream reading
//!
//! Partitions of a stream are generated by one task and read by a bounded
//! pool of workers sharing a queue:
//!
//! ```text
//! stream_slices() ──► [ Partition | Partition | … | Sentinel × N ] ──► N workers ──► records
//! ```
//!
//! - [`ConcurrentStreamReader`] - spawns and supervises the tasks
//! - [`SentinelCoordinator`] - sentinel count and first error
//! - [`CancellationToken`] - caller-side abort

mod reader;
mod sentinel;
mod types;

pub use reader::ConcurrentStreamReader;
pub use sentinel::SentinelCoordinator;
pub use types::{
    CancellationToken, ConcurrencyConfig, QueueItem, ReadReport, DEFAULT_MAX_WORKERS,
};
