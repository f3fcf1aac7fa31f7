//! Request / paginate / extract loop for one stream

use super::types::Retriever;
use crate::auth::Authenticator;
use crate::cursor::{ClientSideIncrementalFilter, Cursor};
use crate::error::Result;
use crate::extract::{DpathExtractor, RecordSelector};
use crate::http::{HttpRequest, Requester};
use crate::pagination::{NoPagination, Paginator};
use crate::partition::{PartitionRouter, SinglePartition};
use crate::request::{InterpolatedRequestOptionsProvider, RequestOptions};
use crate::template::{render, TemplateContext};
use crate::types::{Method, Record, StreamSlice};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Retriever for a declaratively described REST stream
///
/// For each slice the paginator is reset, then requests are issued until
/// the paginator returns no token. The request for a page merges options
/// from the request-options provider, the partition router, the paginator
/// and the authenticator; any key set twice is a configuration error.
#[derive(Debug, Clone)]
pub struct SimpleRetriever {
    name: String,
    requester: Arc<dyn Requester>,
    method: Method,
    url_base: String,
    path: String,
    request_options: InterpolatedRequestOptionsProvider,
    authenticator: Authenticator,
    paginator: Box<dyn Paginator>,
    selector: RecordSelector,
    router: Arc<dyn PartitionRouter>,
    cursor: Option<Arc<dyn Cursor>>,
    client_filter: Option<ClientSideIncrementalFilter>,
    config: Value,
    parameters: Value,
    max_records: Option<usize>,
}

/// Records read for one slice
struct SliceRead {
    records: Vec<Record>,
    requests: usize,
    truncated: bool,
}

impl SimpleRetriever {
    /// Single-slice, single-page GET retriever extracting the response root
    pub fn new(
        name: impl Into<String>,
        requester: Arc<dyn Requester>,
        url_base: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let selector = RecordSelector::new(
            name.clone(),
            Arc::new(DpathExtractor::new(Vec::<String>::new())),
        );
        Self {
            name,
            requester,
            method: Method::GET,
            url_base: url_base.into(),
            path: path.into(),
            request_options: InterpolatedRequestOptionsProvider::default(),
            authenticator: Authenticator::none(),
            paginator: Box::new(NoPagination),
            selector,
            router: Arc::new(SinglePartition),
            cursor: None,
            client_filter: None,
            config: Value::Object(serde_json::Map::new()),
            parameters: Value::Object(serde_json::Map::new()),
            max_records: None,
        }
    }

    /// Set the HTTP method
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the static request options
    #[must_use]
    pub fn with_request_options(mut self, provider: InterpolatedRequestOptionsProvider) -> Self {
        self.request_options = provider;
        self
    }

    /// Set the authenticator
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Set the paginator (cloned and reset for every slice)
    #[must_use]
    pub fn with_paginator(mut self, paginator: Box<dyn Paginator>) -> Self {
        self.paginator = paginator;
        self
    }

    /// Set the record selector
    #[must_use]
    pub fn with_selector(mut self, selector: RecordSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Set the partition router
    #[must_use]
    pub fn with_partition_router(mut self, router: Arc<dyn PartitionRouter>) -> Self {
        self.router = router;
        self
    }

    /// Track incremental state with `cursor`
    #[must_use]
    pub fn with_cursor(mut self, cursor: Arc<dyn Cursor>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Drop already-synced records locally
    #[must_use]
    pub fn with_client_filter(mut self, filter: ClientSideIncrementalFilter) -> Self {
        self.client_filter = Some(filter);
        self
    }

    /// Set the runtime config used for interpolation
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Set `parameters` used for interpolation
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Stop reading a slice once this many records were emitted
    #[must_use]
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Incremental cursor, if any
    pub fn cursor(&self) -> Option<&Arc<dyn Cursor>> {
        self.cursor.as_ref()
    }

    /// Read every slice in order
    pub async fn read_all(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for slice in self.stream_slices().await? {
            records.extend(self.read_records(&slice).await?);
        }
        Ok(records)
    }

    fn base_context(&self, slice: &StreamSlice) -> TemplateContext {
        let stream_state = self.cursor.as_ref().map_or(Value::Null, |c| c.get_state());
        TemplateContext::with_config(self.config.clone())
            .with_parameters(self.parameters.clone())
            .with_stream_slice(slice)
            .with_stream_state(stream_state)
    }

    async fn build_request(
        &self,
        paginator: &dyn Paginator,
        slice: &StreamSlice,
        ctx: &TemplateContext,
    ) -> Result<HttpRequest> {
        let url_base = render(&self.url_base, ctx)?;
        let path = match paginator.path() {
            Some(path) => path,
            None => render(&self.path, ctx)?,
        };

        let options = RequestOptions::merge_all([
            self.request_options.request_options(ctx)?,
            self.router.request_options(slice, ctx)?,
            paginator.request_options(ctx)?,
            self.authenticator.request_options().await?,
        ])?;

        Ok(HttpRequest::new(self.method, url_base, path).with_options(options))
    }

    fn should_emit(&self, record: &Record) -> bool {
        if let Some(filter) = &self.client_filter {
            if !filter.should_keep(record) {
                return false;
            }
        }
        self.cursor.as_ref().map_or(true, |c| c.should_be_synced(record))
    }

    async fn read_slice(&self, slice: &StreamSlice) -> Result<SliceRead> {
        let base_ctx = self.base_context(slice);
        let mut paginator = self.paginator.clone();
        paginator.reset();

        let mut read = SliceRead {
            records: Vec::new(),
            requests: 0,
            truncated: false,
        };

        loop {
            let ctx = match paginator.current_token() {
                Some(token) => base_ctx
                    .clone()
                    .with_next_page_token(json!({ "next_page_token": token.to_value() })),
                None => base_ctx.clone(),
            };

            let request = self.build_request(&*paginator, slice, &ctx).await?;
            let response = self.requester.send(&request).await?;
            read.requests += 1;

            let (extracted, page) = self.selector.select(&response, &ctx, slice)?;
            let last_record = page.last().map(Record::to_value);

            for record in page {
                if !self.should_emit(&record) {
                    continue;
                }
                if let Some(cursor) = &self.cursor {
                    cursor.observe(&record)?;
                }
                read.records.push(record);

                if self.max_records.is_some_and(|max| read.records.len() >= max) {
                    read.truncated = true;
                    break;
                }
            }
            if read.truncated {
                break;
            }

            match paginator.next_page_token(&response, extracted, last_record.as_ref())? {
                Some(token) => paginator.advance(token),
                None => break,
            }
        }

        Ok(read)
    }
}

#[async_trait]
impl Retriever for SimpleRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_slices(&self) -> Result<Vec<StreamSlice>> {
        self.router.stream_slices().await
    }

    async fn read_records(&self, slice: &StreamSlice) -> Result<Vec<Record>> {
        let read = self.read_slice(slice).await?;
        debug!(
            stream = %self.name,
            slice = %slice,
            records = read.records.len(),
            requests = read.requests,
            "Read slice"
        );

        if read.truncated {
            // Partially read slices are not checkpointed
            warn!(
                stream = %self.name,
                max_records = ?self.max_records,
                "Record limit reached, slice not checkpointed"
            );
        } else if let Some(cursor) = &self.cursor {
            cursor.close_partition(slice)?;
        }

        Ok(read.records)
    }
}
