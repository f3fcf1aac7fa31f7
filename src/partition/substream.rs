//! Parent stream-based partition router

use super::types::PartitionRouter;
use crate::error::{Error, Result};
use crate::request::{RequestOption, RequestOptions};
use crate::retriever::Retriever;
use crate::template::{value_to_string, TemplateContext};
use crate::types::StreamSlice;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extra field carrying the parent record
pub const PARENT_RECORD_FIELD: &str = "parent";

/// Partition key carrying the parent's own partition
pub const PARENT_SLICE_FIELD: &str = "parent_slice";

/// One parent stream feeding a [`SubstreamRouter`]
#[derive(Debug, Clone)]
pub struct ParentStreamConfig {
    stream: Arc<dyn Retriever>,
    parent_key: String,
    partition_field: String,
    request_option: Option<RequestOption>,
}

impl ParentStreamConfig {
    /// Read `parent_key` (dot path) from each parent record into `partition_field`
    pub fn new(
        stream: Arc<dyn Retriever>,
        parent_key: impl Into<String>,
        partition_field: impl Into<String>,
    ) -> Result<Self> {
        let parent_key = parent_key.into();
        let partition_field = partition_field.into();
        if parent_key.trim().is_empty() {
            return Err(Error::missing_field("parent_key"));
        }
        if partition_field.trim().is_empty() {
            return Err(Error::missing_field("partition_field"));
        }
        Ok(Self {
            stream,
            parent_key,
            partition_field,
            request_option: None,
        })
    }

    /// Inject the parent key into child requests
    #[must_use]
    pub fn with_request_option(mut self, option: RequestOption) -> Self {
        self.request_option = Some(option);
        self
    }

    /// Name of the parent stream
    pub fn stream_name(&self) -> &str {
        self.stream.name()
    }
}

/// Creates one partition per distinct parent key
///
/// Parent records are read in full (every parent slice, every page) before
/// the first child slice is produced. The parent record is kept in the
/// slice's extra fields under `parent`.
#[derive(Debug, Clone)]
pub struct SubstreamRouter {
    parents: Vec<ParentStreamConfig>,
}

impl SubstreamRouter {
    /// Create a router over one or more parents
    pub fn new(parents: Vec<ParentStreamConfig>) -> Result<Self> {
        if parents.is_empty() {
            return Err(Error::config("substream router needs at least one parent stream"));
        }
        Ok(Self { parents })
    }

    async fn parent_slices(&self, parent: &ParentStreamConfig) -> Result<Vec<StreamSlice>> {
        let mut slices = Vec::new();
        let mut seen = HashSet::new();

        for parent_slice in parent.stream.stream_slices().await? {
            let records = parent.stream.read_records(&parent_slice).await?;
            debug!(
                parent = %parent.stream_name(),
                records = records.len(),
                "Read parent records"
            );

            for record in records {
                let Some(key) = record.get_path(&parent.parent_key).filter(|v| !v.is_null()) else {
                    warn!(
                        parent = %parent.stream_name(),
                        parent_key = %parent.parent_key,
                        "Parent record has no key, skipping"
                    );
                    continue;
                };

                // Deduplicate
                if !seen.insert(value_to_string(key)) {
                    continue;
                }

                let mut slice = StreamSlice::new()
                    .with_partition_value(parent.partition_field.clone(), key.clone());
                if !parent_slice.is_unpartitioned() {
                    slice = slice.with_partition_value(
                        PARENT_SLICE_FIELD,
                        Value::Object(parent_slice.partition().clone()),
                    );
                }
                slices.push(slice.with_extra_field(PARENT_RECORD_FIELD, record.to_value()));
            }
        }

        Ok(slices)
    }
}

#[async_trait]
impl PartitionRouter for SubstreamRouter {
    async fn stream_slices(&self) -> Result<Vec<StreamSlice>> {
        let mut slices = Vec::new();
        for parent in &self.parents {
            slices.extend(self.parent_slices(parent).await?);
        }
        Ok(slices)
    }

    fn request_options(
        &self,
        slice: &StreamSlice,
        ctx: &TemplateContext,
    ) -> Result<RequestOptions> {
        let mut options = RequestOptions::new();
        for parent in &self.parents {
            if let (Some(option), Some(value)) = (
                &parent.request_option,
                slice.partition().get(&parent.partition_field),
            ) {
                options.merge(option.to_options(value, ctx)?)?;
            }
        }
        Ok(options)
    }
}
