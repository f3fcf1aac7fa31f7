//! Cursor shared by concurrent partition readers

use super::types::{Cursor, CursorPhase, CursorValue, CursorValueType, StateSink};
use crate::error::{Error, Result};
use crate::types::{JsonObject, Record, StreamSlice};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Tracks a cursor field for one stream, globally or per partition
///
/// `observe` raises an in-memory high-water mark for the record's slice;
/// `close_partition` promotes that slice's mark to the checkpoint and emits
/// state. Marks of slices still being read stay out of the checkpoint, which
/// never moves backwards.
///
/// Global state: `{"<cursor_field>": value}`.
/// Per-partition state:
/// `{"states": [{"partition": {...}, "cursor": {"<cursor_field>": value}}]}`.
#[derive(Debug)]
pub struct ConcurrentCursor {
    stream: String,
    cursor_field: String,
    value_type: CursorValueType,
    start: Option<CursorValue>,
    per_partition: bool,
    sink: Arc<dyn StateSink>,
    inner: Mutex<CursorInner>,
}

#[derive(Debug)]
struct CursorInner {
    phase: CursorPhase,
    checkpoint: CursorValue,
    /// Observed but not yet closed, by slice key
    most_recent: HashMap<String, CursorValue>,
    /// Per-partition checkpoints, by partition key
    partitions: BTreeMap<String, (JsonObject, CursorValue)>,
    emitted: usize,
}

impl ConcurrentCursor {
    /// Create a cursor for `stream` tracking `cursor_field` (dot path)
    pub fn new(
        stream: impl Into<String>,
        cursor_field: impl Into<String>,
        value_type: CursorValueType,
        sink: Arc<dyn StateSink>,
    ) -> Result<Self> {
        let cursor_field = cursor_field.into();
        if cursor_field.trim().is_empty() {
            return Err(Error::missing_field("cursor_field"));
        }
        let checkpoint = value_type.minimum();
        Ok(Self {
            stream: stream.into(),
            cursor_field,
            value_type,
            start: None,
            per_partition: false,
            sink,
            inner: Mutex::new(CursorInner {
                phase: CursorPhase::Uninitialized,
                checkpoint,
                most_recent: HashMap::new(),
                partitions: BTreeMap::new(),
                emitted: 0,
            }),
        })
    }

    /// Lower bound used when there is no state
    pub fn with_start(mut self, start: &Value) -> Result<Self> {
        self.start = Some(self.value_type.parse(start)?);
        Ok(self)
    }

    /// Keep one checkpoint per partition
    #[must_use]
    pub fn per_partition(mut self) -> Self {
        self.per_partition = true;
        self
    }

    /// Cursor field path
    pub fn cursor_field(&self) -> &str {
        &self.cursor_field
    }

    /// Stream name
    pub fn stream(&self) -> &str {
        &self.stream
    }

    fn lock(&self) -> Result<MutexGuard<'_, CursorInner>> {
        self.inner
            .lock()
            .map_err(|_| Error::system("ConcurrentCursor", "cursor lock poisoned"))
    }

    fn require_active(&self, inner: &CursorInner, operation: &str) -> Result<()> {
        match inner.phase {
            CursorPhase::Active => Ok(()),
            CursorPhase::Uninitialized => Err(Error::system(
                "ConcurrentCursor",
                format!(
                    "{operation}() called before set_initial_state() on stream '{}'",
                    self.stream
                ),
            )),
            CursorPhase::Closed => Err(Error::system(
                "ConcurrentCursor",
                format!(
                    "{operation}() called after the cursor was closed on stream '{}'",
                    self.stream
                ),
            )),
        }
    }

    fn record_value(&self, record: &Record) -> Option<CursorValue> {
        let raw = record.get_path(&self.cursor_field)?;
        match self.value_type.parse(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    stream = %self.stream,
                    field = %self.cursor_field,
                    error = %e,
                    "Skipping unparseable cursor value"
                );
                None
            }
        }
    }

    fn cursor_object(&self, value: &CursorValue) -> Value {
        let mut map = JsonObject::new();
        map.insert(self.cursor_field.clone(), self.value_type.format(value));
        Value::Object(map)
    }

    fn state_of(&self, inner: &CursorInner) -> Value {
        if !self.per_partition {
            return self.cursor_object(&inner.checkpoint);
        }

        let states: Vec<Value> = inner
            .partitions
            .values()
            .map(|(partition, value)| {
                json!({
                    "partition": partition,
                    "cursor": self.cursor_object(value),
                })
            })
            .collect();
        json!({ "states": states })
    }

    fn emit(&self, inner: &mut CursorInner) {
        let state = self.state_of(inner);
        inner.emitted += 1;
        self.sink.emit_state(&self.stream, &state);
    }

    fn load_state(&self, inner: &mut CursorInner, state: &Value) -> Result<()> {
        if self.per_partition {
            let entries = state
                .get("states")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for entry in entries {
                let partition = entry
                    .get("partition")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let Some(raw) = entry.get("cursor").and_then(|c| c.get(&self.cursor_field)) else {
                    continue;
                };
                let value = self.value_type.parse(raw)?;
                let key = StreamSlice::new().with_partition(partition.clone()).key();
                inner.partitions.insert(key, (partition, value));
            }
        } else if let Some(raw) = state.get(&self.cursor_field) {
            inner.checkpoint = self.value_type.parse(raw)?;
        }
        Ok(())
    }
}

impl Cursor for ConcurrentCursor {
    fn set_initial_state(&self, state: Option<&Value>) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.phase != CursorPhase::Uninitialized {
            return Err(Error::system(
                "ConcurrentCursor",
                format!("set_initial_state() called twice on stream '{}'", self.stream),
            ));
        }

        if let Some(start) = &self.start {
            inner.checkpoint = start.clone();
        }

        match state {
            Some(state) if !state.is_null() => self.load_state(&mut inner, state)?,
            _ => debug!(stream = %self.stream, "No persisted state, starting from minimum"),
        }

        inner.phase = CursorPhase::Active;
        Ok(())
    }

    fn observe(&self, record: &Record) -> Result<()> {
        let mut inner = self.lock()?;
        self.require_active(&inner, "observe")?;

        let Some(value) = self.record_value(record) else {
            return Ok(());
        };
        let key = record
            .slice_key()
            .map(str::to_string)
            .unwrap_or_else(|| StreamSlice::new().slice_key());

        let updated = value.max_with(inner.most_recent.get(&key));
        inner.most_recent.insert(key, updated);
        Ok(())
    }

    fn close_partition(&self, slice: &StreamSlice) -> Result<()> {
        let mut inner = self.lock()?;
        self.require_active(&inner, "close_partition")?;

        let observed = inner.most_recent.remove(&slice.slice_key());
        let key = slice.key();

        if self.per_partition {
            let base = inner
                .partitions
                .get(&key)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| inner.checkpoint.clone());
            let value = match observed {
                Some(observed) => observed.max_with(Some(&base)),
                None => base,
            };
            inner
                .partitions
                .insert(key, (slice.partition().clone(), value));
        } else if let Some(observed) = observed {
            let current = inner.checkpoint.clone();
            inner.checkpoint = observed.max_with(Some(&current));
        }

        self.emit(&mut inner);
        Ok(())
    }

    fn get_state(&self) -> Value {
        match self.inner.lock() {
            Ok(inner) => self.state_of(&inner),
            Err(_) => Value::Null,
        }
    }

    fn ensure_at_least_one_state_emitted(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.phase == CursorPhase::Uninitialized {
            return Err(Error::system(
                "ConcurrentCursor",
                format!(
                    "ensure_at_least_one_state_emitted() called before set_initial_state() on stream '{}'",
                    self.stream
                ),
            ));
        }
        if inner.emitted == 0 {
            self.emit(&mut inner);
        }
        inner.phase = CursorPhase::Closed;
        Ok(())
    }

    fn should_be_synced(&self, record: &Record) -> bool {
        let Some(start) = &self.start else {
            return true;
        };
        match self.record_value(record) {
            Some(value) => value >= *start,
            None => true,
        }
    }

    fn phase(&self) -> CursorPhase {
        self.inner
            .lock()
            .map(|inner| inner.phase)
            .unwrap_or(CursorPhase::Closed)
    }
}
