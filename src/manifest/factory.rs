//! Component factory
//!
//! Turns manifest definitions into runtime components. Every component is
//! built once per stream from an immutable [`FactoryContext`]; invalid
//! arguments surface here as configuration errors before any request is made.

use super::types::{
    parse_method, AsyncJobDefinition, AuthDefinition, DecoderDefinition, ExtractorDefinition,
    HttpDefinition, IncrementalDefinition, ManifestDefinition, PageTokenOptionDefinition,
    PaginationStrategyDefinition, PaginatorDefinition, ParentStreamDefinition,
    PartitionRouterDefinition, RequesterDefinition, RetrieverDefinition, SelectorDefinition,
    StreamDefinition,
};
use crate::auth::{AuthConfig, Authenticator, OAuth2Config};
use crate::concurrent::ConcurrencyConfig;
use crate::cursor::{
    ClientSideIncrementalFilter, CollectingStateSink, ConcurrentCursor, Cursor, CursorValue,
    StateSink,
};
use crate::datetime;
use crate::error::{Error, Result};
use crate::extract::{
    CombinedExtractor, Decoder, DpathExtractor, JsonDecoder, JsonlDecoder, KeyValueExtractor,
    RecordExtractor, RecordFilter, RecordSelector,
};
use crate::http::{
    HttpClient, HttpClientConfig, HttpRequester, RateLimiterConfig, Requester, RetryPolicy,
};
use crate::pagination::{
    resolve_page_size, CursorPagination, DefaultPaginator, OffsetIncrement, PageIncrement,
    PageTokenOption, PaginationStrategy, Paginator, RecordFieldIncrement,
};
use crate::partition::{
    CartesianRouter, DatetimeRouter, ListRouter, ParentStreamConfig, PartitionRouter,
    SinglePartition, SubstreamRouter,
};
use crate::request::{InterpolatedRequestOptionsProvider, RequestOption};
use crate::retriever::{
    AsyncJobConfig, AsyncRetriever, HttpJobOrchestrator, Retriever, SimpleRetriever,
    SubstreamRetriever,
};
use crate::state::State;
use crate::template::{render, render_to_value, TemplateContext};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Factory Context
// ============================================================================

/// Read-only inputs shared by every component of a stream
#[derive(Debug, Clone, Default)]
pub struct FactoryContext {
    config: Value,
    parameters: Value,
}

impl FactoryContext {
    /// Context over the runtime config
    pub fn new(config: Value) -> Self {
        Self {
            config,
            parameters: Value::Object(Map::new()),
        }
    }

    /// Replace `parameters`
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Runtime config
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// `parameters`
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Template context exposing `config` and `parameters`
    pub fn template_context(&self) -> TemplateContext {
        TemplateContext::with_config(self.config.clone()).with_parameters(self.parameters.clone())
    }
}

// ============================================================================
// Declarative Stream
// ============================================================================

/// A fully built stream
#[derive(Debug, Clone)]
pub struct DeclarativeStream {
    name: String,
    primary_key: Vec<String>,
    schema: Option<Value>,
    retriever: Arc<dyn Retriever>,
    cursor: Option<Arc<dyn Cursor>>,
    cursor_field: Option<String>,
}

impl DeclarativeStream {
    /// Stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary key fields
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Retriever
    pub fn retriever(&self) -> Arc<dyn Retriever> {
        self.retriever.clone()
    }

    /// Incremental cursor
    pub fn cursor(&self) -> Option<&Arc<dyn Cursor>> {
        self.cursor.as_ref()
    }

    /// Cursor field, when incremental
    pub fn cursor_field(&self) -> Option<&str> {
        self.cursor_field.as_deref()
    }

    /// Whether the stream supports incremental sync
    pub fn is_incremental(&self) -> bool {
        self.cursor.is_some()
    }

    /// Declared JSON schema, or an open object schema
    pub fn json_schema(&self) -> Value {
        self.schema.clone().unwrap_or_else(|| {
            json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "additionalProperties": true
            })
        })
    }
}

// ============================================================================
// Component Factory
// ============================================================================

/// Builds [`DeclarativeStream`]s from a manifest
#[derive(Debug, Clone)]
pub struct ComponentFactory {
    manifest: ManifestDefinition,
    ctx: FactoryContext,
    requester: Arc<dyn Requester>,
    authenticator: Authenticator,
    sink: Arc<dyn StateSink>,
    state: State,
}

impl ComponentFactory {
    /// Create a factory sending requests through a reqwest client
    pub fn new(manifest: ManifestDefinition, config: Value) -> Result<Self> {
        let client = HttpClient::with_config(http_client_config(&manifest.http))?;
        Self::with_requester(manifest, config, Arc::new(HttpRequester::new(Arc::new(client))))
    }

    /// Create a factory sending requests through `requester`
    pub fn with_requester(
        manifest: ManifestDefinition,
        config: Value,
        requester: Arc<dyn Requester>,
    ) -> Result<Self> {
        let parameters = Value::Object(manifest.parameters.clone().into_iter().collect());
        let ctx = FactoryContext::new(config).with_parameters(parameters);
        let authenticator = match &manifest.auth {
            Some(auth) => Authenticator::new(build_auth(auth, &ctx.template_context())?),
            None => Authenticator::none(),
        };

        Ok(Self {
            manifest,
            ctx,
            requester,
            authenticator,
            sink: Arc::new(CollectingStateSink::new()),
            state: State::new(),
        })
    }

    /// Where cursors emit state
    #[must_use]
    pub fn with_state_sink(mut self, sink: Arc<dyn StateSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Persisted state loaded into cursors
    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// The manifest
    pub fn manifest(&self) -> &ManifestDefinition {
        &self.manifest
    }

    /// The factory context
    pub fn context(&self) -> &FactoryContext {
        &self.ctx
    }

    /// Authenticator shared by all streams
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Concurrent read settings
    pub fn concurrency(&self) -> Result<Option<ConcurrencyConfig>> {
        let Some(def) = &self.manifest.concurrency else {
            return Ok(None);
        };
        let mut config = ConcurrencyConfig::new(def.max_workers)?;
        if let Some(capacity) = def.queue_capacity {
            config = config.with_queue_capacity(capacity)?;
        }
        if let Some(secs) = def.deadline_secs {
            config = config.with_deadline(Duration::from_secs(secs));
        }
        Ok(Some(config))
    }

    /// Build every stream in manifest order
    pub fn build_streams(&self) -> Result<Vec<DeclarativeStream>> {
        self.manifest
            .streams
            .iter()
            .map(|s| self.build_stream(&s.name))
            .collect()
    }

    /// Build one stream, loading its persisted state
    pub fn build_stream(&self, name: &str) -> Result<DeclarativeStream> {
        let def = self.stream_definition(name)?;
        let ctx = self.stream_context(def);
        let tctx = ctx.template_context();
        let state = self.state.get_stream(name);

        let (cursor, filter) = match &def.incremental_sync {
            Some(incremental) => {
                if matches!(def.retriever, RetrieverDefinition::Substream { .. }) {
                    return Err(Error::config(format!(
                        "Stream '{name}' substream retrievers are full refresh only"
                    )));
                }
                let (cursor, filter) =
                    self.build_cursor(name, incremental, state, &tctx)?;
                (Some(cursor), filter)
            }
            None => (None, None),
        };

        let lower_bound = match (&cursor, state) {
            (Some(cursor), Some(_)) => cursor_lower_bound(def, cursor.get_state()),
            _ => None,
        };
        let retriever = self.build_retriever(
            def,
            &ctx,
            cursor.clone(),
            filter,
            lower_bound,
        )?;

        debug!(stream = %name, incremental = cursor.is_some(), "Built stream");
        Ok(DeclarativeStream {
            name: def.name.clone(),
            primary_key: def.primary_key.clone(),
            schema: def.schema.clone(),
            retriever,
            cursor,
            cursor_field: def.incremental_sync.as_ref().map(|i| i.cursor_field.clone()),
        })
    }

    fn stream_definition(&self, name: &str) -> Result<&StreamDefinition> {
        self.manifest
            .stream(name)
            .ok_or_else(|| Error::StreamNotFound {
                stream: name.to_string(),
            })
    }

    /// Manifest parameters overlaid with the stream's, plus `name`
    fn stream_context(&self, def: &StreamDefinition) -> FactoryContext {
        let mut parameters = match self.ctx.parameters() {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        for (key, value) in &def.parameters {
            parameters.insert(key.clone(), value.clone());
        }
        parameters.insert("name".to_string(), Value::String(def.name.clone()));
        self.ctx.clone().with_parameters(Value::Object(parameters))
    }

    fn build_cursor(
        &self,
        name: &str,
        def: &IncrementalDefinition,
        state: Option<&Value>,
        tctx: &TemplateContext,
    ) -> Result<(Arc<dyn Cursor>, Option<ClientSideIncrementalFilter>)> {
        let start = match &def.start_value {
            Some(template) => Some(render_to_value(template, tctx)).filter(|v| !v.is_null()),
            None => None,
        };

        let mut cursor = ConcurrentCursor::new(
            name,
            def.cursor_field.clone(),
            def.cursor_type.clone(),
            self.sink.clone(),
        )?;
        if let Some(start) = &start {
            cursor = cursor.with_start(start)?;
        }
        if def.per_partition {
            cursor = cursor.per_partition();
        }
        cursor.set_initial_state(state)?;

        let filter = if def.client_side_filter {
            let mut filter =
                ClientSideIncrementalFilter::new(def.cursor_field.clone(), def.cursor_type.clone());
            if let Some(start) = &start {
                filter = filter.with_start(start)?;
            }
            if let Some(state) = state {
                filter = filter.with_state(state)?;
            }
            Some(filter)
        } else {
            None
        };

        Ok((Arc::new(cursor), filter))
    }

    fn build_retriever(
        &self,
        def: &StreamDefinition,
        ctx: &FactoryContext,
        cursor: Option<Arc<dyn Cursor>>,
        filter: Option<ClientSideIncrementalFilter>,
        lower_bound: Option<chrono::DateTime<chrono::FixedOffset>>,
    ) -> Result<Arc<dyn Retriever>> {
        let tctx = ctx.template_context();

        match &def.retriever {
            RetrieverDefinition::Simple {
                requester,
                record_selector,
                paginator,
                partition_router,
                max_records,
            } => {
                let router = match partition_router {
                    Some(router) => self.build_router(router, &tctx, lower_bound)?,
                    None => Arc::new(SinglePartition),
                };
                let mut retriever = self
                    .build_simple(&def.name, requester, record_selector, paginator.as_ref(), ctx)?
                    .with_partition_router(router);
                if let Some(cursor) = cursor {
                    retriever = retriever.with_cursor(cursor);
                }
                if let Some(filter) = filter {
                    retriever = retriever.with_client_filter(filter);
                }
                if let Some(max) = max_records {
                    retriever = retriever.with_max_records(*max);
                }
                Ok(Arc::new(retriever))
            }
            RetrieverDefinition::Substream {
                parent_stream_configs,
                nested_field,
                requester,
                record_selector,
                paginator,
            } => {
                let router = self.build_substream_router(parent_stream_configs)?;
                let child = match requester {
                    Some(requester) => Some(
                        self.build_simple(
                            &def.name,
                            requester,
                            record_selector,
                            paginator.as_ref(),
                            ctx,
                        )?
                        // Injects the parent key into child requests
                        .with_partition_router(Arc::new(router.clone())),
                    ),
                    None => None,
                };
                let extractor = build_extractor(&record_selector.extractor, &tctx)?;
                let retriever =
                    SubstreamRetriever::new(def.name.clone(), router, nested_field.clone(), child)?
                        .with_extractor(extractor);
                Ok(Arc::new(retriever))
            }
            RetrieverDefinition::Async {
                partition_router,
                job,
            } => {
                let router = match partition_router {
                    Some(router) => self.build_router(router, &tctx, lower_bound)?,
                    None => Arc::new(SinglePartition),
                };
                let orchestrator = HttpJobOrchestrator::new(
                    self.requester.clone(),
                    self.manifest.url_base.clone(),
                    build_job_config(job)?,
                )?
                .with_authenticator(self.authenticator.clone())
                .with_config(ctx.config().clone());

                let mut retriever =
                    AsyncRetriever::new(def.name.clone(), router, Arc::new(orchestrator));
                if let Some(cursor) = cursor {
                    retriever = retriever.with_cursor(cursor);
                }
                Ok(Arc::new(retriever))
            }
        }
    }

    fn build_simple(
        &self,
        name: &str,
        requester: &RequesterDefinition,
        selector: &SelectorDefinition,
        paginator: Option<&PaginatorDefinition>,
        ctx: &FactoryContext,
    ) -> Result<SimpleRetriever> {
        let tctx = ctx.template_context();
        let method = requester.method().ok_or_else(|| {
            Error::invalid_value("http_method", requester.http_method.clone())
        })?;
        let url_base = requester
            .url_base
            .clone()
            .unwrap_or_else(|| self.manifest.url_base.clone());

        let provider = InterpolatedRequestOptionsProvider::new(
            requester.request_parameters.clone(),
            requester.request_headers.clone(),
            requester.request_body_data.clone(),
            requester.request_body_json.clone(),
        )?;

        let mut retriever =
            SimpleRetriever::new(
                name,
                self.requester.clone(),
                url_base.clone(),
                requester.path.clone(),
            )
                .with_method(method)
                .with_request_options(provider)
                .with_authenticator(self.authenticator.clone())
                .with_selector(build_selector(name, selector, &tctx)?)
                .with_config(ctx.config().clone())
                .with_parameters(ctx.parameters().clone());

        if let Some(paginator) = paginator {
            let rendered_base = render(&url_base, &tctx)?;
            retriever = retriever.with_paginator(build_paginator(paginator, &rendered_base, ctx)?);
        }
        Ok(retriever)
    }

    fn build_router(
        &self,
        def: &PartitionRouterDefinition,
        tctx: &TemplateContext,
        lower_bound: Option<chrono::DateTime<chrono::FixedOffset>>,
    ) -> Result<Arc<dyn PartitionRouter>> {
        Ok(match def {
            PartitionRouterDefinition::List {
                values,
                cursor_field,
                request_option,
            } => {
                let mut router = ListRouter::from_config(values, cursor_field.clone(), tctx)?;
                if let Some(option) = request_option {
                    router = router.with_request_option(validated_option(option)?);
                }
                Arc::new(router)
            }
            PartitionRouterDefinition::Datetime {
                start_datetime,
                end_datetime,
                step,
                datetime_format,
                cursor_granularity,
                start_field,
                end_field,
                start_time_option,
                end_time_option,
            } => {
                let mut router = DatetimeRouter::from_config(
                    start_datetime,
                    end_datetime.as_deref(),
                    step,
                    datetime_format.clone(),
                    tctx,
                )?
                .with_field_names(start_field.clone(), end_field.clone())
                .with_lower_bound(lower_bound);
                if let Some(granularity) = cursor_granularity {
                    router = router
                        .with_cursor_granularity(datetime::parse_duration(granularity)?)?;
                }
                if let Some(option) = start_time_option {
                    router = router.with_start_option(validated_option(option)?);
                }
                if let Some(option) = end_time_option {
                    router = router.with_end_option(validated_option(option)?);
                }
                Arc::new(router)
            }
            PartitionRouterDefinition::Substream {
                parent_stream_configs,
            } => Arc::new(self.build_substream_router(parent_stream_configs)?),
            PartitionRouterDefinition::Cartesian { routers } => {
                let routers = routers
                    .iter()
                    .map(|r| self.build_router(r, tctx, lower_bound))
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(CartesianRouter::new(routers)?)
            }
        })
    }

    fn build_substream_router(
        &self,
        parents: &[ParentStreamDefinition],
    ) -> Result<SubstreamRouter> {
        let configs = parents
            .iter()
            .map(|parent| {
                let mut config = ParentStreamConfig::new(
                    self.build_parent(&parent.stream)?,
                    parent.parent_key.clone(),
                    parent.partition_field.clone(),
                )?;
                if let Some(option) = &parent.request_option {
                    config = config.with_request_option(validated_option(option)?);
                }
                Ok(config)
            })
            .collect::<Result<Vec<_>>>()?;
        SubstreamRouter::new(configs)
    }

    /// Parents are read in full without touching their own state
    fn build_parent(&self, name: &str) -> Result<Arc<dyn Retriever>> {
        let def = self.stream_definition(name)?;
        let ctx = self.stream_context(def);
        self.build_retriever(def, &ctx, None, None, None)
    }
}

// ============================================================================
// Leaf builders
// ============================================================================

/// HTTP client settings from the manifest
pub fn http_client_config(def: &HttpDefinition) -> HttpClientConfig {
    let defaults = RetryPolicy::default();
    let retry = RetryPolicy::default()
        .with_max_retries(def.max_retries)
        .with_backoff(def.backoff, defaults.base_delay, defaults.max_delay);
    let mut config = HttpClientConfig::default()
        .with_timeout(Duration::from_secs(def.timeout_secs))
        .with_retry(retry);
    if let Some(rps) = def.rate_limit_rps {
        config = config.with_rate_limit(RateLimiterConfig::per_second(rps));
    }
    if let Some(agent) = &def.user_agent {
        config = config.with_user_agent(agent.clone());
    }
    config
}

/// Render an auth definition against the config
pub fn build_auth(def: &AuthDefinition, ctx: &TemplateContext) -> Result<AuthConfig> {
    let r = |template: &str| render(template, ctx);
    Ok(match def {
        AuthDefinition::ApiKey {
            field_name,
            value,
            location,
            prefix,
        } => AuthConfig::ApiKey {
            location: *location,
            field_name: r(field_name)?,
            prefix: prefix.clone(),
            value: r(value)?,
        },
        AuthDefinition::Bearer { token } => AuthConfig::Bearer { token: r(token)? },
        AuthDefinition::Basic { username, password } => AuthConfig::Basic {
            username: r(username)?,
            password: r(password)?,
        },
        AuthDefinition::OAuth2ClientCredentials {
            token_url,
            client_id,
            client_secret,
            scopes,
            access_token_name,
            expires_in_name,
            refresh_request_body,
        } => {
            let oauth = OAuth2Config::client_credentials(
                r(token_url)?,
                r(client_id)?,
                r(client_secret)?,
            )
            .with_scopes(scopes.clone());
            AuthConfig::OAuth2(oauth_token_exchange(
                oauth,
                access_token_name.as_deref(),
                expires_in_name.as_deref(),
                refresh_request_body,
                ctx,
            )?)
        }
        AuthDefinition::OAuth2RefreshToken {
            token_url,
            client_id,
            client_secret,
            refresh_token,
            access_token_name,
            expires_in_name,
            refresh_request_body,
        } => {
            let oauth = OAuth2Config::refresh_token(
                r(token_url)?,
                r(client_id)?,
                r(client_secret)?,
                r(refresh_token)?,
            );
            AuthConfig::OAuth2(oauth_token_exchange(
                oauth,
                access_token_name.as_deref(),
                expires_in_name.as_deref(),
                refresh_request_body,
                ctx,
            )?)
        }
        AuthDefinition::None => AuthConfig::None,
    })
}

fn oauth_token_exchange(
    mut oauth: OAuth2Config,
    access_token_name: Option<&str>,
    expires_in_name: Option<&str>,
    body: &BTreeMap<String, String>,
    ctx: &TemplateContext,
) -> Result<OAuth2Config> {
    if let Some(name) = access_token_name {
        oauth.access_token_name = name.to_string();
    }
    if let Some(name) = expires_in_name {
        oauth.expires_in_name = name.to_string();
    }
    for (key, value) in body {
        oauth = oauth.with_body_param(key, render(value, ctx)?);
    }
    Ok(oauth)
}

fn validated_option(option: &RequestOption) -> Result<RequestOption> {
    RequestOption::new(option.field_name.clone(), option.inject_into)
}

fn build_decoder(def: DecoderDefinition) -> Arc<dyn Decoder> {
    match def {
        DecoderDefinition::Json => Arc::new(JsonDecoder),
        DecoderDefinition::Jsonl => Arc::new(JsonlDecoder),
    }
}

/// Build an extractor
pub fn build_extractor(
    def: &ExtractorDefinition,
    ctx: &TemplateContext,
) -> Result<Arc<dyn RecordExtractor>> {
    Ok(match def {
        ExtractorDefinition::Dpath {
            field_path,
            decoder,
        } => Arc::new(
            DpathExtractor::interpolated(field_path, ctx)?.with_decoder(build_decoder(*decoder)),
        ),
        ExtractorDefinition::Combined { extractors } => Arc::new(CombinedExtractor::new(
            extractors
                .iter()
                .map(|e| build_extractor(e, ctx))
                .collect::<Result<Vec<_>>>()?,
        )?),
        ExtractorDefinition::KeyValue { keys, values } => Arc::new(KeyValueExtractor::new(
            build_extractor(keys, ctx)?,
            build_extractor(values, ctx)?,
        )),
    })
}

fn build_selector(
    stream: &str,
    def: &SelectorDefinition,
    ctx: &TemplateContext,
) -> Result<RecordSelector> {
    let mut selector = RecordSelector::new(stream, build_extractor(&def.extractor, ctx)?);
    if let Some(condition) = &def.record_filter {
        selector = selector.with_filter(RecordFilter::new(condition.clone())?);
    }
    Ok(selector)
}

/// Build a paginator
pub fn build_paginator(
    def: &PaginatorDefinition,
    url_base: &str,
    ctx: &FactoryContext,
) -> Result<Box<dyn Paginator>> {
    let tctx = ctx.template_context();
    let page_size = |value: &Option<Value>| -> Result<Option<i64>> {
        value.as_ref().map(|v| resolve_page_size(v, &tctx)).transpose()
    };

    let strategy: Box<dyn PaginationStrategy> = match &def.pagination_strategy {
        PaginationStrategyDefinition::OffsetIncrement {
            page_size: size,
            inject_on_first_request,
        } => Box::new(OffsetIncrement::new(page_size(size)?, *inject_on_first_request)?),
        PaginationStrategyDefinition::PageIncrement {
            page_size: size,
            start_from_page,
            inject_on_first_request,
        } => Box::new(PageIncrement::new(
            page_size(size)?,
            *start_from_page,
            *inject_on_first_request,
        )?),
        PaginationStrategyDefinition::RecordFieldIncrement {
            field_path,
            page_size: size,
        } => Box::new(RecordFieldIncrement::new(field_path.clone(), page_size(size)?)?),
        PaginationStrategyDefinition::CursorPagination {
            cursor_value,
            stop_condition,
            page_size: size,
        } => {
            let mut strategy = CursorPagination::new(cursor_value.clone(), ctx.config().clone())?;
            if let Some(condition) = stop_condition {
                strategy = strategy.with_stop_condition(condition.clone());
            }
            if let Some(size) = page_size(size)? {
                strategy = strategy.with_page_size(size)?;
            }
            Box::new(strategy)
        }
    };

    let token_option = match &def.page_token_option {
        PageTokenOptionDefinition::RequestOption(option) => {
            PageTokenOption::Request(validated_option(option)?)
        }
        PageTokenOptionDefinition::RequestPath => PageTokenOption::Path,
    };
    let size_option = def
        .page_size_option
        .as_ref()
        .map(validated_option)
        .transpose()?
        .map(PageTokenOption::Request);

    Ok(Box::new(DefaultPaginator::new(
        strategy,
        token_option,
        size_option,
        url_base,
    )?))
}

fn build_job_config(def: &AsyncJobDefinition) -> Result<AsyncJobConfig> {
    let method = parse_method(&def.create.http_method).ok_or_else(|| {
        Error::invalid_value("http_method", def.create.http_method.clone())
    })?;
    let failed: Vec<&str> = def.poll.failed_values.iter().map(String::as_str).collect();

    Ok(AsyncJobConfig::new()
        .with_create(method, &def.create.path, def.create.body.clone())
        .with_job_id_path(&def.create.job_id_path)
        .with_poll(
            &def.poll.path,
            Duration::from_secs(def.poll.interval_secs),
            def.poll.max_attempts,
        )
        .with_status(&def.poll.status_path, &def.poll.completed_value, failed)
        .with_download(&def.download.path, def.download.records_path.clone()))
}

/// Resume datetime slicing from the global checkpoint
fn cursor_lower_bound(
    def: &StreamDefinition,
    state: Value,
) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let incremental = def.incremental_sync.as_ref()?;
    let raw = state.get(&incremental.cursor_field)?;
    match incremental.cursor_type.parse(raw).ok()? {
        CursorValue::Datetime(dt) => Some(dt),
        _ => None,
    }
}
