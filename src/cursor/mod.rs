//! Incremental sync cursors
//!
//! A cursor tracks the high-water mark of synced data for one stream and
//! emits state checkpoints through a [`StateSink`].
//!
//! Lifecycle: `Uninitialized` → [`Cursor::set_initial_state`] → `Active` →
//! [`Cursor::ensure_at_least_one_state_emitted`] → `Closed`. Observing or
//! closing partitions outside `Active` is a system error.
//!
//! - [`ConcurrentCursor`]: datetime, integer or string cursor field, global
//!   or per partition; safe to share between concurrent readers
//! - [`ClientSideIncrementalFilter`]: drops already-synced records locally
//! - [`FileBasedCursor`]: bounded history of synced files

mod concurrent;
mod file_based;
mod filter;
mod types;

pub use concurrent::ConcurrentCursor;
pub use file_based::{
    FileBasedCursor, FileBasedState, RemoteFile, DEFAULT_DAYS_TO_SYNC_IF_HISTORY_IS_FULL,
    DEFAULT_MAX_HISTORY_SIZE, FILE_CURSOR_FIELD, FILE_DATETIME_FORMAT, FILE_URL_FIELD,
};
pub use filter::ClientSideIncrementalFilter;
pub use types::{
    CollectingStateSink, Cursor, CursorPhase, CursorValue, CursorValueType, StateSink,
};
