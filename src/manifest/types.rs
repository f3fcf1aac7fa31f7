//! Manifest types
//!
//! Declarative stream definitions for YAML parsing. Component kinds are
//! internally tagged enums (`type: ...`) resolved by the component factory.

use crate::cursor::CursorValueType;
use crate::request::RequestOption;
use crate::types::{BackoffType, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Manifest
// ============================================================================

/// Top-level manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ManifestDefinition {
    /// Source name
    pub name: String,
    /// Manifest version
    #[serde(default = "default_version")]
    pub version: String,
    /// Base URL shared by every stream
    pub url_base: String,
    /// Authentication
    #[serde(default)]
    pub auth: Option<AuthDefinition>,
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpDefinition,
    /// Connection check
    #[serde(default)]
    pub check: Option<CheckDefinition>,
    /// Concurrent read settings; streams are read sequentially without it
    #[serde(default)]
    pub concurrency: Option<ConcurrencyDefinition>,
    /// Values available to every template as `parameters`
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Streams
    pub streams: Vec<StreamDefinition>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl ManifestDefinition {
    /// Find a stream by name
    pub fn stream(&self, name: &str) -> Option<&StreamDefinition> {
        self.streams.iter().find(|s| s.name == name)
    }

    /// Stream names in manifest order
    pub fn stream_names(&self) -> Vec<&str> {
        self.streams.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Connection check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CheckDefinition {
    /// Streams whose first slice is read to verify the connection
    pub stream_names: Vec<String>,
}

// ============================================================================
// Auth Definition
// ============================================================================

/// Authentication definition; values are templates rendered against config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthDefinition {
    /// API key in a header or query parameter
    ApiKey {
        /// Header or query parameter name
        #[serde(alias = "key")]
        field_name: String,
        /// Key value
        value: String,
        /// `header` or `query`
        #[serde(default)]
        location: crate::auth::Location,
        /// Prefix before the value
        #[serde(default)]
        prefix: Option<String>,
    },
    /// Bearer token
    Bearer {
        /// Token
        token: String,
    },
    /// HTTP basic
    Basic {
        /// Username
        username: String,
        /// Password
        #[serde(default)]
        password: String,
    },
    /// OAuth2 client credentials
    #[serde(rename = "oauth2_client_credentials")]
    OAuth2ClientCredentials {
        /// Token endpoint
        token_url: String,
        /// Client ID
        client_id: String,
        /// Client secret
        client_secret: String,
        /// Scopes
        #[serde(default)]
        scopes: Vec<String>,
        /// Dotted path of the access token in the response
        #[serde(default)]
        access_token_name: Option<String>,
        /// Dotted path of the lifetime in the response
        #[serde(default)]
        expires_in_name: Option<String>,
        /// Extra form fields (templates)
        #[serde(default)]
        refresh_request_body: BTreeMap<String, String>,
    },
    /// OAuth2 refresh token
    #[serde(rename = "oauth2_refresh_token")]
    OAuth2RefreshToken {
        /// Token endpoint
        token_url: String,
        /// Client ID
        client_id: String,
        /// Client secret
        client_secret: String,
        /// Initial refresh token
        refresh_token: String,
        /// Dotted path of the access token in the response
        #[serde(default)]
        access_token_name: Option<String>,
        /// Dotted path of the lifetime in the response
        #[serde(default)]
        expires_in_name: Option<String>,
        /// Extra form fields (templates)
        #[serde(default)]
        refresh_request_body: BTreeMap<String, String>,
    },
    /// No authentication
    None,
}

// ============================================================================
// HTTP Definition
// ============================================================================

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpDefinition {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retries
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Backoff between retries
    #[serde(default)]
    pub backoff: BackoffType,
    /// Requests per second
    #[serde(default)]
    pub rate_limit_rps: Option<u32>,
    /// User agent
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for HttpDefinition {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            backoff: BackoffType::default(),
            rate_limit_rps: None,
            user_agent: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

/// Concurrent read settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConcurrencyDefinition {
    /// Worker budget
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Partition queue capacity (defaults to `max_workers`)
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    /// Deadline for one stream read, in seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

fn default_max_workers() -> usize {
    crate::concurrent::DEFAULT_MAX_WORKERS
}

// ============================================================================
// Stream Definition
// ============================================================================

/// Stream definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StreamDefinition {
    /// Stream name
    pub name: String,
    /// Primary key fields
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// How records are retrieved
    pub retriever: RetrieverDefinition,
    /// Incremental sync; full refresh without it
    #[serde(default)]
    pub incremental_sync: Option<IncrementalDefinition>,
    /// JSON schema reported by discover
    #[serde(default)]
    pub schema: Option<Value>,
    /// Stream-level `parameters`, layered over the manifest's
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

// ============================================================================
// Retriever Definition
// ============================================================================

/// Retriever kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetrieverDefinition {
    /// Request / paginate / extract per slice
    Simple {
        /// Request description
        requester: RequesterDefinition,
        /// Extraction
        #[serde(default)]
        record_selector: SelectorDefinition,
        /// Pagination; one page per slice without it
        #[serde(default)]
        paginator: Option<PaginatorDefinition>,
        /// Slicing; one slice without it
        #[serde(default)]
        partition_router: Option<PartitionRouterDefinition>,
        /// Record limit per slice
        #[serde(default)]
        max_records: Option<usize>,
    },
    /// Records addressed by, or nested in, parent stream records
    Substream {
        /// Parent streams
        parent_stream_configs: Vec<ParentStreamDefinition>,
        /// Dot path of the records inside each parent record
        #[serde(default)]
        nested_field: Option<String>,
        /// Request issued per parent record
        #[serde(default)]
        requester: Option<RequesterDefinition>,
        /// Extraction
        #[serde(default)]
        record_selector: SelectorDefinition,
        /// Pagination of the child request
        #[serde(default)]
        paginator: Option<PaginatorDefinition>,
    },
    /// Records produced by asynchronous export jobs
    Async {
        /// One job per slice
        #[serde(default)]
        partition_router: Option<PartitionRouterDefinition>,
        /// Job lifecycle
        job: AsyncJobDefinition,
    },
}

impl RetrieverDefinition {
    /// Names of the streams this retriever reads from
    pub fn parent_streams(&self) -> Vec<&str> {
        let mut parents = Vec::new();
        match self {
            Self::Simple {
                partition_router: Some(router),
                ..
            }
            | Self::Async {
                partition_router: Some(router),
                ..
            } => router.collect_parents(&mut parents),
            Self::Substream {
                parent_stream_configs,
                ..
            } => parents.extend(parent_stream_configs.iter().map(|p| p.stream.as_str())),
            _ => {}
        }
        parents
    }
}

/// Request description
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RequesterDefinition {
    /// Overrides the manifest `url_base`
    #[serde(default)]
    pub url_base: Option<String>,
    /// Path template
    pub path: String,
    /// HTTP method
    #[serde(default = "default_method")]
    pub http_method: String,
    /// Query parameters
    #[serde(default)]
    pub request_parameters: BTreeMap<String, String>,
    /// Headers
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
    /// Form body
    #[serde(default)]
    pub request_body_data: BTreeMap<String, String>,
    /// JSON body
    #[serde(default)]
    pub request_body_json: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RequesterDefinition {
    /// Parse the HTTP method
    pub fn method(&self) -> Option<Method> {
        parse_method(&self.http_method)
    }
}

/// Parse an HTTP method name, case-insensitively
pub fn parse_method(name: &str) -> Option<Method> {
    match name.to_uppercase().as_str() {
        "GET" => Some(Method::GET),
        "POST" => Some(Method::POST),
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        _ => None,
    }
}

// ============================================================================
// Selector Definition
// ============================================================================

/// Extraction and filtering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SelectorDefinition {
    /// Extractor
    #[serde(default)]
    pub extractor: ExtractorDefinition,
    /// Keep records for which this condition is truthy
    #[serde(default)]
    pub record_filter: Option<String>,
}

/// Extractor kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorDefinition {
    /// Records at a path (`*` expands arrays)
    Dpath {
        /// Path segments; empty means the whole body
        #[serde(default)]
        field_path: Vec<String>,
        /// Body decoder
        #[serde(default)]
        decoder: DecoderDefinition,
    },
    /// Records zipped from several extractors
    Combined {
        /// Extractors whose records are merged positionally
        extractors: Vec<ExtractorDefinition>,
    },
    /// Records built from parallel key and value lists
    KeyValue {
        /// Extractor yielding keys
        keys: Box<ExtractorDefinition>,
        /// Extractor yielding values
        values: Box<ExtractorDefinition>,
    },
}

impl Default for ExtractorDefinition {
    fn default() -> Self {
        Self::Dpath {
            field_path: Vec::new(),
            decoder: DecoderDefinition::default(),
        }
    }
}

/// Response body decoders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderDefinition {
    /// Single JSON document
    #[default]
    Json,
    /// Newline-delimited JSON
    Jsonl,
}

// ============================================================================
// Pagination Definition
// ============================================================================

/// Paginator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PaginatorDefinition {
    /// Token strategy
    pub pagination_strategy: PaginationStrategyDefinition,
    /// Where the token goes
    pub page_token_option: PageTokenOptionDefinition,
    /// Where the page size goes
    #[serde(default)]
    pub page_size_option: Option<RequestOption>,
}

/// Pagination strategies
///
/// `page_size` is an integer or a template such as `{{ config.page_size }}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginationStrategyDefinition {
    /// Offset advanced by the page size
    OffsetIncrement {
        /// Page size
        #[serde(default)]
        page_size: Option<Value>,
        /// Send offset 0 on the first request
        #[serde(default)]
        inject_on_first_request: bool,
    },
    /// Page number advanced by one
    PageIncrement {
        /// Page size
        #[serde(default)]
        page_size: Option<Value>,
        /// First page number
        #[serde(default)]
        start_from_page: i64,
        /// Send the first page number on the first request
        #[serde(default)]
        inject_on_first_request: bool,
    },
    /// Token taken from a field of the last record
    RecordFieldIncrement {
        /// Dot path in the last record
        field_path: String,
        /// Page size
        #[serde(default)]
        page_size: Option<Value>,
    },
    /// Token rendered from the response
    CursorPagination {
        /// Token template
        cursor_value: String,
        /// Stop when this condition is truthy
        #[serde(default)]
        stop_condition: Option<String>,
        /// Page size
        #[serde(default)]
        page_size: Option<Value>,
    },
}

/// Token injection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageTokenOptionDefinition {
    /// Query, header or body field
    RequestOption(RequestOption),
    /// The token is the next request's path or URL
    RequestPath,
}

// ============================================================================
// Partition Router Definition
// ============================================================================

/// Partition routers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionRouterDefinition {
    /// One slice per value
    List {
        /// Array, or a template yielding an array or comma-separated list
        values: Value,
        /// Partition key
        cursor_field: String,
        /// Injection of the value
        #[serde(default)]
        request_option: Option<RequestOption>,
    },
    /// Fixed-step datetime windows
    Datetime {
        /// Start template
        start_datetime: String,
        /// End template; now when absent
        #[serde(default)]
        end_datetime: Option<String>,
        /// ISO-8601 or shorthand (`1d`, `12h`) step
        step: String,
        /// Format of the slice boundaries
        #[serde(default = "default_datetime_format")]
        datetime_format: String,
        /// Gap between a window's end and the next start
        #[serde(default)]
        cursor_granularity: Option<String>,
        /// Slice key of the window start
        #[serde(default = "default_start_field")]
        start_field: String,
        /// Slice key of the window end
        #[serde(default = "default_end_field")]
        end_field: String,
        /// Injection of the window start
        #[serde(default)]
        start_time_option: Option<RequestOption>,
        /// Injection of the window end
        #[serde(default)]
        end_time_option: Option<RequestOption>,
    },
    /// One slice per parent record
    Substream {
        /// Parent streams
        parent_stream_configs: Vec<ParentStreamDefinition>,
    },
    /// Cartesian product of routers
    Cartesian {
        /// Combined routers
        routers: Vec<PartitionRouterDefinition>,
    },
}

fn default_datetime_format() -> String {
    "%Y-%m-%dT%H:%M:%SZ".to_string()
}

fn default_start_field() -> String {
    crate::partition::DEFAULT_START_FIELD.to_string()
}

fn default_end_field() -> String {
    crate::partition::DEFAULT_END_FIELD.to_string()
}

impl PartitionRouterDefinition {
    fn collect_parents<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Substream {
                parent_stream_configs,
            } => out.extend(parent_stream_configs.iter().map(|p| p.stream.as_str())),
            Self::Cartesian { routers } => {
                for router in routers {
                    router.collect_parents(out);
                }
            }
            Self::List { .. } | Self::Datetime { .. } => {}
        }
    }
}

/// Parent stream reference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ParentStreamDefinition {
    /// Name of the parent stream in this manifest
    pub stream: String,
    /// Dot path of the key in parent records
    pub parent_key: String,
    /// Partition key the value is stored under
    pub partition_field: String,
    /// Injection of the key
    #[serde(default)]
    pub request_option: Option<RequestOption>,
}

// ============================================================================
// Incremental Definition
// ============================================================================

/// Incremental sync
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IncrementalDefinition {
    /// Dot path of the cursor in records
    pub cursor_field: String,
    /// How cursor values compare
    #[serde(default)]
    pub cursor_type: CursorValueType,
    /// Lower bound template used when there is no state
    #[serde(default)]
    pub start_value: Option<String>,
    /// Keep one checkpoint per partition
    #[serde(default)]
    pub per_partition: bool,
    /// Drop already-synced records locally
    #[serde(default)]
    pub client_side_filter: bool,
}

// ============================================================================
// Async Job Definition
// ============================================================================

/// Asynchronous export job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AsyncJobDefinition {
    /// Job creation
    pub create: AsyncJobCreateDefinition,
    /// Status polling
    pub poll: AsyncJobPollDefinition,
    /// Result download
    pub download: AsyncJobDownloadDefinition,
}

/// Job creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AsyncJobCreateDefinition {
    /// Path template
    pub path: String,
    /// HTTP method
    #[serde(default = "default_create_method")]
    pub http_method: String,
    /// JSON body template
    #[serde(default)]
    pub body: Option<Value>,
    /// Dot path of the job id in the response
    #[serde(default = "default_job_id_path")]
    pub job_id_path: String,
}

fn default_create_method() -> String {
    "POST".to_string()
}

fn default_job_id_path() -> String {
    "id".to_string()
}

/// Job status polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AsyncJobPollDefinition {
    /// Path template; `{{ job_id }}` is available
    pub path: String,
    /// Seconds between polls
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Polls before giving up
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
    /// Dot path of the status
    #[serde(default = "default_status_path")]
    pub status_path: String,
    /// Status of a finished job
    #[serde(default = "default_completed_value")]
    pub completed_value: String,
    /// Statuses of a failed job
    #[serde(default = "default_failed_values")]
    pub failed_values: Vec<String>,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_poll_attempts() -> u32 {
    120
}

fn default_status_path() -> String {
    "state".to_string()
}

fn default_completed_value() -> String {
    "JobComplete".to_string()
}

fn default_failed_values() -> Vec<String> {
    vec!["Failed".to_string(), "Aborted".to_string()]
}

/// Job result download
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AsyncJobDownloadDefinition {
    /// Path template; `{{ job_id }}` is available
    pub path: String,
    /// Path of the records in the download body
    #[serde(default)]
    pub records_path: Vec<String>,
}
