//! Cursor traits and shared types

use crate::datetime;
use crate::error::{Error, Result};
use crate::types::{Record, StreamSlice};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Mutex;

/// Lifecycle of a cursor within one sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPhase {
    /// Created, no state loaded yet
    Uninitialized,
    /// State loaded, records may be observed
    Active,
    /// Final state taken; no further mutation
    Closed,
}

/// Tracks how far a stream has been synced
///
/// Implementations use interior mutability so a single cursor can be shared
/// by concurrent partition readers.
pub trait Cursor: Debug + Send + Sync {
    /// Load persisted state (`None` when the stream was never synced)
    fn set_initial_state(&self, state: Option<&Value>) -> Result<()>;

    /// Note a record that was emitted downstream
    fn observe(&self, record: &Record) -> Result<()>;

    /// All records of `slice` have been emitted; checkpoint and emit state
    fn close_partition(&self, slice: &StreamSlice) -> Result<()>;

    /// State to persist
    fn get_state(&self) -> Value;

    /// Emit the current state if nothing was emitted this sync, then close
    fn ensure_at_least_one_state_emitted(&self) -> Result<()>;

    /// Whether a record falls inside the sync boundaries
    fn should_be_synced(&self, record: &Record) -> bool;

    /// Current phase
    fn phase(&self) -> CursorPhase;
}

// ============================================================================
// State Sink
// ============================================================================

/// Receives state checkpoints
pub trait StateSink: Debug + Send + Sync {
    /// Emit a state checkpoint for a stream
    fn emit_state(&self, stream: &str, state: &Value);
}

/// Sink that keeps every checkpoint in memory
#[derive(Debug, Default)]
pub struct CollectingStateSink {
    messages: Mutex<Vec<(String, Value)>>,
}

impl CollectingStateSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All checkpoints emitted so far
    pub fn messages(&self) -> Vec<(String, Value)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Take the checkpoints emitted so far
    pub fn drain(&self) -> Vec<(String, Value)> {
        self.messages
            .lock()
            .map(|mut m| std::mem::take(&mut *m))
            .unwrap_or_default()
    }

    /// Number of checkpoints emitted so far
    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether nothing was emitted
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateSink for CollectingStateSink {
    fn emit_state(&self, stream: &str, state: &Value) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((stream.to_string(), state.clone()));
        }
    }
}

// ============================================================================
// Cursor Values
// ============================================================================

/// How cursor field values are interpreted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CursorValueType {
    /// Date-time parsed and formatted with `format`
    Datetime {
        /// Datetime format (`%s`, `%ms`, `%s_as_float` or strftime)
        format: String,
    },
    /// Integer (ids, sequence numbers)
    Integer,
    /// Lexicographically ordered string
    String,
}

impl Default for CursorValueType {
    fn default() -> Self {
        Self::Datetime {
            format: "%Y-%m-%dT%H:%M:%SZ".to_string(),
        }
    }
}

impl CursorValueType {
    /// Parse a JSON value into a cursor value
    pub fn parse(&self, value: &Value) -> Result<CursorValue> {
        match self {
            Self::Datetime { format } => {
                let raw = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    other => return Err(Error::datetime(other.to_string(), format.clone())),
                };
                datetime::parse(&raw, format)
                    .or_else(|_| datetime::parse_flexible(&raw))
                    .map(CursorValue::Datetime)
            }
            Self::Integer => match value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
            .map(CursorValue::Int)
            .ok_or_else(|| Error::decode(format!("cursor value {value} is not an integer"))),
            Self::String => match value {
                Value::String(s) => Ok(CursorValue::Str(s.clone())),
                Value::Null => Err(Error::decode("cursor value is null")),
                other => Ok(CursorValue::Str(other.to_string())),
            },
        }
    }

    /// Serialize a cursor value for state
    pub fn format(&self, value: &CursorValue) -> Value {
        match (self, value) {
            (Self::Datetime { format }, CursorValue::Datetime(dt)) => {
                Value::String(datetime::format(dt, format))
            }
            (_, CursorValue::Int(i)) => Value::from(*i),
            (_, CursorValue::Str(s)) => Value::String(s.clone()),
            (_, CursorValue::Datetime(dt)) => Value::String(dt.to_rfc3339()),
        }
    }

    /// Value a cursor starts from when there is no state and no start
    pub fn minimum(&self) -> CursorValue {
        match self {
            Self::Datetime { .. } => {
                CursorValue::Datetime(DateTime::<Utc>::UNIX_EPOCH.fixed_offset())
            }
            Self::Integer => CursorValue::Int(0),
            Self::String => CursorValue::Str(String::new()),
        }
    }
}

/// An ordered cursor value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CursorValue {
    /// Integer cursor
    Int(i64),
    /// Date-time cursor
    Datetime(DateTime<FixedOffset>),
    /// String cursor
    Str(String),
}

impl CursorValue {
    /// Keep the greater of two values
    #[must_use]
    pub fn max_with(self, other: Option<&CursorValue>) -> Self {
        match other {
            Some(other) if *other > self => other.clone(),
            _ => self,
        }
    }
}
