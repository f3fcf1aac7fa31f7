//! Partition routing module
//!
//! Supports: single slice, static lists, datetime windows, parent streams
//! and cartesian products of the above.
//!
//! # Overview
//!
//! Partitions split a stream into independent units of work. Each is a
//! [`StreamSlice`](crate::types::StreamSlice) whose partition part
//! identifies it for per-partition state and whose cursor part carries a
//! datetime window. This is useful for:
//! - Child resources that require a parent ID
//! - Date range slicing for large datasets
//! - Static list of values (e.g., regions, accounts)

mod routers;
mod substream;
mod types;

pub use routers::{
    CartesianRouter, DatetimeRouter, ListRouter, DEFAULT_END_FIELD, DEFAULT_START_FIELD,
};
pub use substream::{ParentStreamConfig, SubstreamRouter, PARENT_RECORD_FIELD, PARENT_SLICE_FIELD};
pub use types::{PartitionRouter, SinglePartition};

#[cfg(test)]
mod tests;
