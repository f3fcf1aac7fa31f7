//! Messages, run options and run statistics of the sync engine

use crate::concurrent::ConcurrencyConfig;
use serde::Serialize;
use serde_json::Value;

/// Output of a read, serialized one JSON object per line
///
/// ```json
/// {"type":"RECORD","stream":"users","data":{"id":1}}
/// {"type":"STATE","stream":"users","data":{"updated_at":"2024-01-02"}}
/// {"type":"LOG","level":"warn","message":"..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Record { stream: String, data: Value },
    /// Checkpoint; `data` is whatever the stream's cursor persists
    State { stream: String, data: Value },
    Log { level: LogLevel, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl Message {
    pub fn record(stream: impl Into<String>, data: Value) -> Self {
        Self::Record {
            stream: stream.into(),
            data,
        }
    }

    pub fn state(stream: impl Into<String>, data: Value) -> Self {
        Self::State {
            stream: stream.into(),
            data,
        }
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }

    /// Stream a record or checkpoint belongs to
    pub fn stream(&self) -> Option<&str> {
        match self {
            Self::Record { stream, .. } | Self::State { stream, .. } => Some(stream),
            Self::Log { .. } => None,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log { .. })
    }

    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Options of one `read` run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Empty selects every stream
    pub streams: Vec<String>,
    /// Per-stream record budget, 0 for none; checked between slices
    pub max_records: usize,
    /// Abort the run on the first failing stream
    pub fail_fast: bool,
    /// Takes precedence over the manifest's `concurrency` block
    pub concurrency: Option<ConcurrencyConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            streams: Vec::new(),
            max_records: 0,
            fail_fast: true,
            concurrency: None,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_streams(mut self, streams: Vec<String>) -> Self {
        self.streams = streams;
        self
    }

    #[must_use]
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max;
        self
    }

    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: ConcurrencyConfig) -> Self {
        self.concurrency = Some(concurrency);
        self
    }
}

/// Counters of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    pub records_synced: usize,
    pub streams_synced: usize,
    pub partitions_synced: usize,
    pub states_emitted: usize,
    /// Streams that failed without aborting the run
    pub errors: usize,
    pub duration_ms: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_records(&mut self, count: usize) {
        self.records_synced += count;
    }

    pub fn add_stream(&mut self) {
        self.streams_synced += 1;
    }

    pub fn add_partitions(&mut self, count: usize) {
        self.partitions_synced += count;
    }

    pub fn add_state(&mut self) {
        self.states_emitted += 1;
    }

    pub fn add_error(&mut self) {
        self.errors += 1;
    }

    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}

/// Outcome of `check`; failures are reported, not raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectionStatus {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Catalog entry produced by `discover`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamDescriptor {
    pub name: String,
    /// Declared schema, or a permissive object schema
    pub json_schema: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    pub supports_incremental: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_field: Option<String>,
}
