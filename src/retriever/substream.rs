//! Child stream read per parent record

use super::simple::SimpleRetriever;
use super::types::Retriever;
use crate::error::{Error, Result};
use crate::extract::{DpathExtractor, RecordExtractor, RecordSelector};
use crate::http::HttpResponse;
use crate::partition::{PartitionRouter, SubstreamRouter, PARENT_RECORD_FIELD};
use crate::template::{get_nested_value, TemplateContext};
use crate::types::{Record, StreamSlice};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Retriever for records nested in, or addressed by, parent records
///
/// Slices come from a [`SubstreamRouter`], so every parent record is read
/// before the first child record. For each slice:
/// - when `nested_field` is set, the parent's sub-document at that dot path
///   goes through the extractor as if it were a response body;
/// - when a child retriever is set, its normal pagination loop runs with the
///   parent record available as `stream_slice.parent`.
///
/// Full refresh only.
#[derive(Debug, Clone)]
pub struct SubstreamRetriever {
    name: String,
    router: SubstreamRouter,
    nested_field: Option<String>,
    selector: RecordSelector,
    child: Option<SimpleRetriever>,
}

impl SubstreamRetriever {
    /// Create a retriever; at least one of `nested_field` and `child` is required
    pub fn new(
        name: impl Into<String>,
        router: SubstreamRouter,
        nested_field: Option<String>,
        child: Option<SimpleRetriever>,
    ) -> Result<Self> {
        let name = name.into();
        if nested_field.is_none() && child.is_none() {
            return Err(Error::config(format!(
                "substream '{name}' needs a nested field or a child requester"
            )));
        }
        let selector = RecordSelector::new(
            name.clone(),
            Arc::new(DpathExtractor::new(Vec::<String>::new())),
        );
        Ok(Self {
            name,
            router,
            nested_field,
            selector,
            child,
        })
    }

    /// Extractor applied to the nested sub-document
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn RecordExtractor>) -> Self {
        self.selector = RecordSelector::new(self.name.clone(), extractor);
        self
    }

    fn nested_records(&self, field: &str, slice: &StreamSlice) -> Result<Vec<Record>> {
        let path: Vec<&str> = field.split('.').collect();
        let Some(sub) = slice
            .extra_fields()
            .get(PARENT_RECORD_FIELD)
            .and_then(|parent| get_nested_value(parent, &path))
        else {
            return Ok(Vec::new());
        };

        let response = HttpResponse::from_json(sub);
        let ctx = TemplateContext::new().with_stream_slice(slice);
        let (_, records) = self.selector.select(&response, &ctx, slice)?;
        Ok(records)
    }
}

#[async_trait]
impl Retriever for SubstreamRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_slices(&self) -> Result<Vec<StreamSlice>> {
        self.router.stream_slices().await
    }

    async fn read_records(&self, slice: &StreamSlice) -> Result<Vec<Record>> {
        let mut records = match &self.nested_field {
            Some(field) => self.nested_records(field, slice)?,
            None => Vec::new(),
        };
        if let Some(child) = &self.child {
            records.extend(child.read_records(slice).await?);
        }

        debug!(
            stream = %self.name,
            slice = %slice,
            records = records.len(),
            "Read substream slice"
        );
        Ok(records)
    }
}
