//! Record selection: extraction, filtering and stream tagging

use super::extractors::RecordExtractor;
use crate::error::{Error, Result};
use crate::http::HttpResponse;
use crate::template::{evaluate_condition, TemplateContext};
use crate::types::{Record, StreamSlice};
use std::sync::Arc;

/// Keeps records for which an interpolated condition is truthy
///
/// The condition sees `record` plus whatever the caller put in the context
/// (`config`, `stream_state`, `stream_slice`, `next_page_token`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    condition: String,
}

impl RecordFilter {
    /// Create a filter
    pub fn new(condition: impl Into<String>) -> Result<Self> {
        let condition = condition.into();
        if condition.trim().is_empty() {
            return Err(Error::config("record filter condition cannot be empty"));
        }
        Ok(Self { condition })
    }

    /// The raw condition
    pub fn condition(&self) -> &str {
        &self.condition
    }

    /// Whether the record passes
    pub fn matches(&self, record: &serde_json::Value, ctx: &TemplateContext) -> Result<bool> {
        let ctx = ctx.clone().with_record(record.clone());
        evaluate_condition(&self.condition, &ctx)
    }
}

/// Extractor plus optional filter, producing stream-tagged records
#[derive(Debug, Clone)]
pub struct RecordSelector {
    stream: String,
    extractor: Arc<dyn RecordExtractor>,
    filter: Option<RecordFilter>,
}

impl RecordSelector {
    /// Create a selector for a stream
    pub fn new(stream: impl Into<String>, extractor: Arc<dyn RecordExtractor>) -> Self {
        Self {
            stream: stream.into(),
            extractor,
            filter: None,
        }
    }

    /// Attach a filter
    #[must_use]
    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Stream name
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Extract, filter and tag the records of a response
    ///
    /// Returns the number of raw records extracted (before filtering)
    /// alongside the selected records; pagination decisions use the raw
    /// count.
    pub fn select(
        &self,
        response: &HttpResponse,
        ctx: &TemplateContext,
        slice: &StreamSlice,
    ) -> Result<(usize, Vec<Record>)> {
        let raw = self.extractor.extract_records(response)?;
        let extracted = raw.len();

        let mut records = Vec::with_capacity(extracted);
        for value in raw {
            if let Some(filter) = &self.filter {
                if !filter.matches(&value, ctx)? {
                    continue;
                }
            }
            records.push(Record::from_value(self.stream.clone(), value).with_partition(slice));
        }

        Ok((extracted, records))
    }
}
