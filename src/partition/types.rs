//! Partition router trait

use crate::error::Result;
use crate::request::RequestOptions;
use crate::template::TemplateContext;
use crate::types::StreamSlice;
use async_trait::async_trait;
use std::fmt::Debug;

/// Produces the slices a retriever must read
///
/// Slices are fully built before the first record request is issued and
/// are never mutated afterwards.
#[async_trait]
pub trait PartitionRouter: Debug + Send + Sync {
    /// Generate all slices for one sync
    async fn stream_slices(&self) -> Result<Vec<StreamSlice>>;

    /// Options injected into every request made for `slice`
    fn request_options(
        &self,
        _slice: &StreamSlice,
        _ctx: &TemplateContext,
    ) -> Result<RequestOptions> {
        Ok(RequestOptions::new())
    }
}

/// A stream with exactly one, empty, slice
#[derive(Debug, Clone, Copy, Default)]
pub struct SinglePartition;

#[async_trait]
impl PartitionRouter for SinglePartition {
    async fn stream_slices(&self) -> Result<Vec<StreamSlice>> {
        Ok(vec![StreamSlice::new()])
    }
}
