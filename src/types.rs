//! Common types used throughout the retrieval engine
//!
//! This module contains shared type definitions: the immutable [`Record`],
//! the [`StreamSlice`] partition descriptor and the [`NextPageToken`]
//! produced by pagination strategies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// Generic key-value map with string keys and values
pub type StringMap = HashMap<String, String>;

// ============================================================================
// HTTP Types
// ============================================================================

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PUT => reqwest::Method::PUT,
            Method::PATCH => reqwest::Method::PATCH,
            Method::DELETE => reqwest::Method::DELETE,
        }
    }
}

// ============================================================================
// Sync Mode
// ============================================================================

/// Synchronization mode for streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full refresh - fetch all data every time
    #[default]
    FullRefresh,
    /// Incremental - only fetch new/updated data
    Incremental,
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}

// ============================================================================
// Record
// ============================================================================

/// A single record extracted from a response
///
/// Records are immutable once produced. The owning stream name is attached
/// by the record selector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    stream: String,
    data: JsonObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition_key: Option<String>,
    #[serde(skip)]
    slice_key: Option<String>,
}

impl Record {
    /// Create a record for the given stream
    pub fn new(stream: impl Into<String>, data: JsonObject) -> Self {
        Self {
            stream: stream.into(),
            data,
            partition_key: None,
            slice_key: None,
        }
    }

    /// Create a record from an arbitrary JSON value
    ///
    /// Non-object values are wrapped as `{"data": value}`.
    pub fn from_value(stream: impl Into<String>, value: Value) -> Self {
        let data = match value {
            Value::Object(map) => map,
            other => {
                let mut map = JsonObject::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        Self::new(stream, data)
    }

    /// Tag the record with the partition it was read from
    #[must_use]
    pub fn with_partition(mut self, slice: &StreamSlice) -> Self {
        self.partition_key = Some(slice.key());
        self.slice_key = Some(slice.slice_key());
        self
    }

    /// Stream this record belongs to
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Record payload
    pub fn data(&self) -> &JsonObject {
        &self.data
    }

    /// Canonical key of the partition the record was read from
    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }

    /// Canonical key of the exact slice, cursor window included
    pub fn slice_key(&self) -> Option<&str> {
        self.slice_key.as_deref()
    }

    /// Get a top-level field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Get a field by dot-separated path
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.data.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Consume the record, returning its payload
    pub fn into_data(self) -> JsonObject {
        self.data
    }

    /// Payload as a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

// ============================================================================
// Stream Slice
// ============================================================================

/// A partition of a stream's data
///
/// Created by a partition router before any request is issued. Builder
/// methods consume `self`; there is no way to mutate a slice once it has
/// been handed to a retriever.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSlice {
    #[serde(default)]
    partition: JsonObject,
    #[serde(default)]
    cursor_slice: JsonObject,
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    extra_fields: JsonObject,
}

impl StreamSlice {
    /// Create an empty slice (the single partition of an unpartitioned stream)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a partition value
    #[must_use]
    pub fn with_partition_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.partition.insert(key.into(), value);
        self
    }

    /// Replace the partition map
    #[must_use]
    pub fn with_partition(mut self, partition: JsonObject) -> Self {
        self.partition = partition;
        self
    }

    /// Set a cursor slice value (e.g. `start_time`, `end_time`)
    #[must_use]
    pub fn with_cursor_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.cursor_slice.insert(key.into(), value);
        self
    }

    /// Replace the cursor slice map
    #[must_use]
    pub fn with_cursor_slice(mut self, cursor_slice: JsonObject) -> Self {
        self.cursor_slice = cursor_slice;
        self
    }

    /// Attach an extra field that is not part of the partition identity
    #[must_use]
    pub fn with_extra_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_fields.insert(key.into(), value);
        self
    }

    /// Partition values
    pub fn partition(&self) -> &JsonObject {
        &self.partition
    }

    /// Cursor slice values
    pub fn cursor_slice(&self) -> &JsonObject {
        &self.cursor_slice
    }

    /// Extra fields
    pub fn extra_fields(&self) -> &JsonObject {
        &self.extra_fields
    }

    /// Look up a value in partition, then cursor slice, then extra fields
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.partition
            .get(key)
            .or_else(|| self.cursor_slice.get(key))
            .or_else(|| self.extra_fields.get(key))
    }

    /// Merge two slices (used by the cartesian router)
    ///
    /// Keys from `other` win on conflict.
    #[must_use]
    pub fn merge(mut self, other: &StreamSlice) -> Self {
        for (k, v) in &other.partition {
            self.partition.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.cursor_slice {
            self.cursor_slice.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.extra_fields {
            self.extra_fields.insert(k.clone(), v.clone());
        }
        self
    }

    /// Stable identity of the partition
    ///
    /// `serde_json::Map` is ordered by key unless `preserve_order` is enabled,
    /// so serializing it gives a canonical form.
    pub fn key(&self) -> String {
        serde_json::to_string(&self.partition).unwrap_or_default()
    }

    /// Identity of the slice: partition plus cursor window
    ///
    /// Two datetime windows of the same partition have the same
    /// [`key`](Self::key) but different slice keys.
    pub fn slice_key(&self) -> String {
        serde_json::json!([self.partition, self.cursor_slice]).to_string()
    }

    /// Whether this slice carries no partition values
    pub fn is_unpartitioned(&self) -> bool {
        self.partition.is_empty()
    }

    /// Flattened view used for template interpolation
    ///
    /// Partition and cursor slice keys are merged at the top level; the
    /// original maps remain reachable as `partition` and `cursor_slice`.
    pub fn to_template_value(&self) -> Value {
        let mut merged = JsonObject::new();
        for (k, v) in self.extra_fields.iter() {
            merged.insert(k.clone(), v.clone());
        }
        for (k, v) in self.cursor_slice.iter().chain(self.partition.iter()) {
            merged.insert(k.clone(), v.clone());
        }
        merged.insert("partition".to_string(), Value::Object(self.partition.clone()));
        merged.insert(
            "cursor_slice".to_string(),
            Value::Object(self.cursor_slice.clone()),
        );
        Value::Object(merged)
    }
}

impl fmt::Display for StreamSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string(&self).unwrap_or_else(|_| "{}".to_string())
        )
    }
}

// ============================================================================
// Next Page Token
// ============================================================================

/// Token identifying the next page to request
///
/// `Option<NextPageToken>::None` means there are no further pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NextPageToken {
    Int(i64),
    Str(String),
    Map(JsonObject),
}

impl NextPageToken {
    /// Convert a JSON value into a token
    ///
    /// Returns `None` for null, empty strings and values without a
    /// representation (arrays, booleans).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(NextPageToken::Int)
                .or_else(|| Some(NextPageToken::Str(n.to_string()))),
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(NextPageToken::Str(s.clone())),
            Value::Object(map) => Some(NextPageToken::Map(map.clone())),
            _ => None,
        }
    }

    /// Integer value, parsing strings if necessary
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NextPageToken::Int(i) => Some(*i),
            NextPageToken::Str(s) => s.parse().ok(),
            NextPageToken::Map(_) => None,
        }
    }

    /// JSON representation
    pub fn to_value(&self) -> Value {
        match self {
            NextPageToken::Int(i) => Value::from(*i),
            NextPageToken::Str(s) => Value::String(s.clone()),
            NextPageToken::Map(m) => Value::Object(m.clone()),
        }
    }

    /// Value used when injecting the token into a request
    ///
    /// Map tokens inject their `next_page_token` entry when present.
    pub fn to_request_string(&self) -> String {
        match self {
            NextPageToken::Int(i) => i.to_string(),
            NextPageToken::Str(s) => s.clone(),
            NextPageToken::Map(m) => match m.get("next_page_token") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => Value::Object(m.clone()).to_string(),
            },
        }
    }
}

impl fmt::Display for NextPageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_request_string())
    }
}
