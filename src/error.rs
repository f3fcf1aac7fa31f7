//! Crate-wide error type
//!
//! Errors fall into four families (see [`ErrorKind`]):
//! - configuration errors, raised while components are constructed
//! - transient errors, retried by the HTTP client
//! - system errors, raised when a call-order precondition is violated
//! - data errors, raised while decoding or extracting records

use thiserror::Error;

/// Every failure the engine can report
#[derive(Error, Debug)]
pub enum Error {
    // Raised while components are built from a manifest
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Invalid manifest YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Template error: {message}")]
    Template { message: String },

    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // Transport
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // Response handling
    #[error("JSONPath error: {message}")]
    JsonPath { message: String },

    #[error("Cannot extract records at '{path}': {message}")]
    RecordExtraction { path: String, message: String },

    #[error("Cannot decode response: {message}")]
    Decode { message: String },

    #[error("Cannot parse datetime '{value}' with format '{format}'")]
    DatetimeParse { value: String, format: String },

    #[error("State error: {message}")]
    State { message: String },

    #[error("Stream '{stream}' not found")]
    StreamNotFound { stream: String },

    #[error("Partition error for stream '{stream}': {message}")]
    Partition { stream: String, message: String },

    #[error("Async job {job_id} ended with status '{status}'")]
    AsyncJobFailed { job_id: String, status: String },

    // Engine invariants and worker pool
    #[error("System error in {component}: {precondition}")]
    System {
        component: String,
        precondition: String,
    },

    #[error("Read cancelled")]
    Cancelled,

    #[error("Read exceeded deadline of {deadline_ms}ms")]
    DeadlineExceeded { deadline_ms: u64 },

    #[error("Worker task failed: {message}")]
    WorkerFailed { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid component configuration, surfaced before any request is made
    Config,
    /// Network failures and retryable statuses
    Transient,
    /// Violated call-order precondition or worker-pool failure inside the engine
    System,
    /// Everything else: decoding, extraction, non-retryable HTTP statuses
    Data,
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Rejected argument of a component, e.g. a zero page size
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn datetime(value: impl Into<String>, format: impl Into<String>) -> Self {
        Self::DatetimeParse {
            value: value.into(),
            format: format.into(),
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    pub fn partition(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Partition {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// A component was driven out of order, e.g. reading before slicing
    pub fn system(component: impl Into<String>, precondition: impl Into<String>) -> Self {
        Self::System {
            component: component.into(),
            precondition: precondition.into(),
        }
    }

    pub fn worker(message: impl Into<String>) -> Self {
        Self::WorkerFailed {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config { .. }
            | Error::MissingConfigField { .. }
            | Error::InvalidConfigValue { .. }
            | Error::YamlParse(_)
            | Error::Template { .. }
            | Error::UndefinedVariable { .. } => ErrorKind::Config,
            Error::System { .. }
            | Error::Cancelled
            | Error::DeadlineExceeded { .. }
            | Error::WorkerFailed { .. } => ErrorKind::System,
            _ if self.is_retryable() => ErrorKind::Transient,
            _ => ErrorKind::Data,
        }
    }

    pub fn is_config(&self) -> bool {
        self.kind() == ErrorKind::Config
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimited { .. } | Error::Timeout { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for the retrieval engine
pub type Result<T> = std::result::Result<T, Error>;

/// Prefix an error with what was being attempted
pub trait ResultExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other(format!("{}: {}", message.into(), e.into())))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::Other(format!("{}: {}", f(), e.into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::missing_field("api_key");
        assert_eq!(err.to_string(), "Missing required config field: api_key");

        let err = Error::http_status(404, "Not found");
        assert_eq!(err.to_string(), "HTTP 404: Not found");

        let err = Error::system("AsyncRetriever", "stream_slices() must be called first");
        assert_eq!(
            err.to_string(),
            "System error in AsyncRetriever: stream_slices() must be called first"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::RateLimited {
            retry_after_seconds: 60
        }
        .is_retryable());
        assert!(Error::Timeout { timeout_ms: 1000 }.is_retryable());
        assert!(Error::http_status(429, "").is_retryable());
        assert!(Error::http_status(500, "").is_retryable());
        assert!(Error::http_status(503, "").is_retryable());

        assert!(!Error::http_status(400, "").is_retryable());
        assert!(!Error::http_status(401, "").is_retryable());
        assert!(!Error::http_status(404, "").is_retryable());
        assert!(!Error::config("test").is_retryable());
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::config("x").kind(), ErrorKind::Config);
        assert_eq!(Error::invalid_value("page_size", "x").kind(), ErrorKind::Config);
        assert_eq!(Error::system("a", "b").kind(), ErrorKind::System);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::System);
        assert_eq!(Error::http_status(503, "").kind(), ErrorKind::Transient);
        assert_eq!(Error::http_status(404, "").kind(), ErrorKind::Data);
        assert_eq!(Error::decode("bad").kind(), ErrorKind::Data);
        assert!(Error::config("x").is_config());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }

    #[test]
    fn test_foreign_errors_convert() {
        let io: Result<String> = std::fs::read_to_string("/nonexistent/state.json")
            .with_context(|| "Failed to read state".to_string());
        assert!(io.unwrap_err().to_string().starts_with("Failed to read state: IO error"));

        let err: Error = anyhow::anyhow!("upstream broke").into();
        assert_eq!(err.to_string(), "upstream broke");
        assert_eq!(err.kind(), ErrorKind::Data);
    }
}
