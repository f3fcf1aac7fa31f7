//! Retriever trait

use crate::error::Result;
use crate::types::{Record, StreamSlice};
use async_trait::async_trait;
use std::fmt::Debug;

/// Reads the records of one logical stream
///
/// `stream_slices` is called once per sync, before any `read_records`.
/// `read_records` may be called concurrently for different slices.
#[async_trait]
pub trait Retriever: Debug + Send + Sync {
    /// Stream name
    fn name(&self) -> &str;

    /// Units of work for this sync
    async fn stream_slices(&self) -> Result<Vec<StreamSlice>>;

    /// All records of one slice, in page order and in-page order
    async fn read_records(&self, slice: &StreamSlice) -> Result<Vec<Record>>;
}
