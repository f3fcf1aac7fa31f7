//! Asynchronous job-based retrieval
//!
//! For APIs that follow a create → poll → download pattern (bulk exports,
//! report endpoints). Job orchestration sits behind [`JobOrchestrator`] so
//! the retriever never issues record requests itself.

use super::types::Retriever;
use crate::auth::Authenticator;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::extract::{DpathExtractor, RecordExtractor};
use crate::http::{HttpRequest, HttpResponse, Requester};
use crate::partition::PartitionRouter;
use crate::request::RequestOptions;
use crate::template::{get_nested_value, render, render_value, value_to_string, TemplateContext};
use crate::types::{JsonObject, Method, Record, StreamSlice};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{json, Value};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Partition key holding the job descriptor
pub const ASYNC_PARTITION_FIELD: &str = "partition";

// ============================================================================
// Jobs
// ============================================================================

/// A submitted job and the slice it exports
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncPartition {
    /// Job ID from the API
    pub job_id: String,
    /// Slice the job was created for
    pub slice: StreamSlice,
}

impl AsyncPartition {
    /// Create a job partition
    pub fn new(job_id: impl Into<String>, slice: StreamSlice) -> Self {
        Self {
            job_id: job_id.into(),
            slice,
        }
    }

    /// Slice handed out by [`AsyncRetriever::stream_slices`]
    ///
    /// The partition is `{"partition": {"job_id": ..., "slice": {...}}}`; the
    /// original cursor part is carried over.
    pub fn to_slice(&self) -> StreamSlice {
        StreamSlice::new()
            .with_partition_value(
                ASYNC_PARTITION_FIELD,
                json!({
                    "job_id": self.job_id,
                    "slice": self.slice.partition(),
                }),
            )
            .with_cursor_slice(self.slice.cursor_slice().clone())
    }

    /// Recover the job from a slice
    pub fn from_slice(slice: &StreamSlice) -> Option<Self> {
        let descriptor = slice.partition().get(ASYNC_PARTITION_FIELD)?;
        let job_id = descriptor.get("job_id")?.as_str()?;
        let partition = descriptor
            .get("slice")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Some(Self::new(
            job_id,
            StreamSlice::new()
                .with_partition(partition)
                .with_cursor_slice(slice.cursor_slice().clone()),
        ))
    }
}

/// Jobs created by one [`JobOrchestrator::submit`] call
#[derive(Debug, Clone, Default)]
pub struct JobHandle {
    jobs: Vec<AsyncPartition>,
}

impl JobHandle {
    /// Wrap submitted jobs
    pub fn new(jobs: Vec<AsyncPartition>) -> Self {
        Self { jobs }
    }

    /// Submitted jobs
    pub fn jobs(&self) -> &[AsyncPartition] {
        &self.jobs
    }

    /// Number of jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether nothing was submitted
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Creates jobs, waits for them and downloads their results
#[async_trait]
pub trait JobOrchestrator: Debug + Send + Sync {
    /// Create one job per slice
    async fn submit(&self, slices: Vec<StreamSlice>) -> Result<JobHandle>;

    /// Wait for the jobs of `handle`; a failed job fails the whole call
    async fn completed_partitions(&self, handle: &JobHandle) -> Result<Vec<AsyncPartition>>;

    /// Download the records of a completed job
    async fn fetch_records(&self, partition: &AsyncPartition) -> Result<Vec<Value>>;
}

// ============================================================================
// Async Retriever
// ============================================================================

/// Retriever whose slices are completed jobs
///
/// `stream_slices` must be called before `read_records`; the retriever
/// remembers the submitted [`JobHandle`].
#[derive(Debug)]
pub struct AsyncRetriever {
    name: String,
    router: Arc<dyn PartitionRouter>,
    orchestrator: Arc<dyn JobOrchestrator>,
    cursor: Option<Arc<dyn Cursor>>,
    handle: Mutex<Option<JobHandle>>,
}

impl AsyncRetriever {
    /// Create a retriever
    pub fn new(
        name: impl Into<String>,
        router: Arc<dyn PartitionRouter>,
        orchestrator: Arc<dyn JobOrchestrator>,
    ) -> Self {
        Self {
            name: name.into(),
            router,
            orchestrator,
            cursor: None,
            handle: Mutex::new(None),
        }
    }

    /// Track incremental state with `cursor`
    #[must_use]
    pub fn with_cursor(mut self, cursor: Arc<dyn Cursor>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Handle of the last submission
    pub fn job_handle(&self) -> Option<JobHandle> {
        self.handle.lock().ok().and_then(|h| h.clone())
    }
}

#[async_trait]
impl Retriever for AsyncRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_slices(&self) -> Result<Vec<StreamSlice>> {
        let slices = self.router.stream_slices().await?;
        let handle = self.orchestrator.submit(slices).await?;
        info!(stream = %self.name, jobs = handle.len(), "Submitted async jobs");

        let completed = self.orchestrator.completed_partitions(&handle).await?;
        let mut slot = self
            .handle
            .lock()
            .map_err(|_| Error::system("AsyncRetriever", "job handle lock poisoned"))?;
        *slot = Some(handle);
        drop(slot);

        Ok(completed.iter().map(AsyncPartition::to_slice).collect())
    }

    async fn read_records(&self, slice: &StreamSlice) -> Result<Vec<Record>> {
        let submitted = self
            .handle
            .lock()
            .map_err(|_| Error::system("AsyncRetriever", "job handle lock poisoned"))?
            .is_some();
        if !submitted {
            return Err(Error::system(
                "AsyncRetriever",
                "stream_slices() must be called first",
            ));
        }

        let partition = AsyncPartition::from_slice(slice).ok_or_else(|| {
            Error::system(
                "AsyncRetriever",
                format!("read_records() requires a '{ASYNC_PARTITION_FIELD}' key in the slice"),
            )
        })?;

        let values = self.orchestrator.fetch_records(&partition).await?;
        debug!(
            stream = %self.name,
            job_id = %partition.job_id,
            records = values.len(),
            "Fetched job results"
        );

        let mut records = Vec::with_capacity(values.len());
        for value in values {
            let record = Record::from_value(self.name.clone(), value).with_partition(slice);
            if let Some(cursor) = &self.cursor {
                if !cursor.should_be_synced(&record) {
                    continue;
                }
                cursor.observe(&record)?;
            }
            records.push(record);
        }

        if let Some(cursor) = &self.cursor {
            cursor.close_partition(slice)?;
        }
        Ok(records)
    }
}

// ============================================================================
// HTTP Job Orchestrator
// ============================================================================

/// Configuration for HTTP create → poll → download jobs
#[derive(Debug, Clone)]
pub struct AsyncJobConfig {
    /// HTTP method for job creation (POST, PUT)
    pub create_method: Method,
    /// Endpoint path for job creation (can include templates)
    pub create_path: String,
    /// Request body for job creation (JSON template)
    pub create_body: Option<Value>,
    /// Dot path to the job ID in the creation response
    pub job_id_path: String,

    /// Endpoint path for polling job status (`{{ job_id }}` is available)
    pub poll_path: String,
    /// Delay between polls
    pub poll_interval: Duration,
    /// Maximum poll attempts before giving up
    pub poll_max_attempts: u32,
    /// Dot path to the job status in the poll response
    pub status_path: String,
    /// Value that indicates job completion
    pub completed_value: String,
    /// Values that indicate job failure
    pub failed_values: Vec<String>,

    /// Endpoint path for downloading results (`{{ job_id }}` is available)
    pub download_path: String,
    /// Field path to the records in the download response
    pub records_path: Vec<String>,
}

impl Default for AsyncJobConfig {
    fn default() -> Self {
        Self {
            create_method: Method::POST,
            create_path: String::new(),
            create_body: None,
            job_id_path: "id".to_string(),
            poll_path: String::new(),
            poll_interval: Duration::from_secs(5),
            poll_max_attempts: 120, // 10 minutes at 5 second intervals
            status_path: "state".to_string(),
            completed_value: "JobComplete".to_string(),
            failed_values: vec!["Failed".to_string(), "Aborted".to_string()],
            download_path: String::new(),
            records_path: Vec::new(),
        }
    }
}

impl AsyncJobConfig {
    /// Create a config with default polling and status values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set job creation config
    #[must_use]
    pub fn with_create(mut self, method: Method, path: &str, body: Option<Value>) -> Self {
        self.create_method = method;
        self.create_path = path.to_string();
        self.create_body = body;
        self
    }

    /// Set job ID extraction path
    #[must_use]
    pub fn with_job_id_path(mut self, path: &str) -> Self {
        self.job_id_path = path.to_string();
        self
    }

    /// Set polling config
    #[must_use]
    pub fn with_poll(mut self, path: &str, interval: Duration, max_attempts: u32) -> Self {
        self.poll_path = path.to_string();
        self.poll_interval = interval;
        self.poll_max_attempts = max_attempts;
        self
    }

    /// Set status checking config
    #[must_use]
    pub fn with_status(mut self, path: &str, completed: &str, failed: Vec<&str>) -> Self {
        self.status_path = path.to_string();
        self.completed_value = completed.to_string();
        self.failed_values = failed.into_iter().map(String::from).collect();
        self
    }

    /// Set download config
    #[must_use]
    pub fn with_download(mut self, path: &str, records_path: Vec<String>) -> Self {
        self.download_path = path.to_string();
        self.records_path = records_path;
        self
    }

    /// Check the paths needed to run a job
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("create_path", &self.create_path),
            ("poll_path", &self.poll_path),
            ("download_path", &self.download_path),
        ] {
            if value.trim().is_empty() {
                return Err(Error::missing_field(field));
            }
        }
        if self.poll_max_attempts == 0 {
            return Err(Error::invalid_value("poll_max_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

/// State of an async job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncJobState {
    /// Job is running/in progress
    InProgress,
    /// Job completed successfully
    Completed,
    /// Job failed
    Failed(String),
    /// No status in the poll response
    Unknown,
}

impl AsyncJobState {
    /// Classify a status value
    pub fn from_status(config: &AsyncJobConfig, status: &str) -> Self {
        if status.is_empty() {
            Self::Unknown
        } else if status == config.completed_value {
            Self::Completed
        } else if config.failed_values.iter().any(|f| f == status) {
            Self::Failed(status.to_string())
        } else {
            Self::InProgress
        }
    }

    /// Check if job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// Lookup by dot path; a leading `$.` is ignored
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    if path.is_empty() {
        return Some(value);
    }
    let parts: Vec<&str> = path.split('.').collect();
    get_nested_value(value, &parts).filter(|v| !v.is_null())
}

/// [`JobOrchestrator`] speaking HTTP through a [`Requester`]
#[derive(Debug, Clone)]
pub struct HttpJobOrchestrator {
    requester: Arc<dyn Requester>,
    url_base: String,
    authenticator: Authenticator,
    job: AsyncJobConfig,
    config: Value,
}

impl HttpJobOrchestrator {
    /// Create an orchestrator
    pub fn new(
        requester: Arc<dyn Requester>,
        url_base: impl Into<String>,
        job: AsyncJobConfig,
    ) -> Result<Self> {
        job.validate()?;
        Ok(Self {
            requester,
            url_base: url_base.into(),
            authenticator: Authenticator::none(),
            job,
            config: Value::Object(JsonObject::new()),
        })
    }

    /// Set the authenticator
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Set the runtime config used for interpolation
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    fn context(&self, slice: &StreamSlice, job_id: Option<&str>) -> TemplateContext {
        let ctx = TemplateContext::with_config(self.config.clone()).with_stream_slice(slice);
        match job_id {
            Some(id) => ctx.with_root("job_id", Value::String(id.to_string())),
            None => ctx,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        ctx: &TemplateContext,
        body: Option<JsonObject>,
    ) -> Result<HttpResponse> {
        let mut options = self.authenticator.request_options().await?;
        if let Some(body) = body {
            options.merge(RequestOptions {
                body_json: body,
                ..RequestOptions::default()
            })?;
        }
        let request = HttpRequest::new(method, render(&self.url_base, ctx)?, render(path, ctx)?)
            .with_options(options);
        self.requester.send(&request).await
    }

    async fn create(&self, slice: StreamSlice) -> Result<AsyncPartition> {
        let ctx = self.context(&slice, None);
        let body = match &self.job.create_body {
            Some(template) => match render_value(template, &ctx)? {
                Value::Object(map) => Some(map),
                _ => return Err(Error::config("async job create body must be an object")),
            },
            None => None,
        };

        let response = self
            .send(self.job.create_method, &self.job.create_path, &ctx, body)
            .await?;
        let body = response.json()?;
        let job_id = lookup(&body, &self.job.job_id_path)
            .map(value_to_string)
            .ok_or_else(|| Error::RecordExtraction {
                path: self.job.job_id_path.clone(),
                message: "job id not found in create response".to_string(),
            })?;

        info!(job_id = %job_id, slice = %slice, "Created async job");
        Ok(AsyncPartition::new(job_id, slice))
    }

    async fn wait(&self, partition: &AsyncPartition) -> Result<()> {
        let ctx = self.context(&partition.slice, Some(&partition.job_id));

        for attempt in 1..=self.job.poll_max_attempts {
            let response = self.send(Method::GET, &self.job.poll_path, &ctx, None).await?;
            let body = response.json()?;
            let status = lookup(&body, &self.job.status_path)
                .map(value_to_string)
                .unwrap_or_default();

            match AsyncJobState::from_status(&self.job, &status) {
                AsyncJobState::Completed => {
                    debug!(job_id = %partition.job_id, attempt, "Async job completed");
                    return Ok(());
                }
                AsyncJobState::Failed(status) => {
                    return Err(Error::AsyncJobFailed {
                        job_id: partition.job_id.clone(),
                        status,
                    })
                }
                state => {
                    debug!(
                        job_id = %partition.job_id,
                        attempt,
                        state = ?state,
                        "Async job not ready"
                    );
                    if attempt < self.job.poll_max_attempts {
                        tokio::time::sleep(self.job.poll_interval).await;
                    }
                }
            }
        }

        Err(Error::AsyncJobFailed {
            job_id: partition.job_id.clone(),
            status: format!("not complete after {} polls", self.job.poll_max_attempts),
        })
    }
}

#[async_trait]
impl JobOrchestrator for HttpJobOrchestrator {
    async fn submit(&self, slices: Vec<StreamSlice>) -> Result<JobHandle> {
        let mut jobs = Vec::with_capacity(slices.len());
        for slice in slices {
            jobs.push(self.create(slice).await?);
        }
        Ok(JobHandle::new(jobs))
    }

    async fn completed_partitions(&self, handle: &JobHandle) -> Result<Vec<AsyncPartition>> {
        try_join_all(handle.jobs().iter().map(|job| self.wait(job))).await?;
        Ok(handle.jobs().to_vec())
    }

    async fn fetch_records(&self, partition: &AsyncPartition) -> Result<Vec<Value>> {
        let ctx = self.context(&partition.slice, Some(&partition.job_id));
        let response = self
            .send(Method::GET, &self.job.download_path, &ctx, None)
            .await?;
        DpathExtractor::new(self.job.records_path.clone()).extract_records(&response)
    }
}
