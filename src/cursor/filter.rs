//! Client-side incremental filtering
//!
//! For APIs that cannot filter by cursor server-side: every record is
//! fetched and the ones at or below the persisted high-water mark are
//! dropped locally.

use super::types::{CursorValue, CursorValueType};
use crate::error::Result;
use crate::types::{Record, StreamSlice};
use serde_json::Value;
use std::collections::HashMap;

/// Drops records older than the persisted state or the configured start
#[derive(Debug, Clone)]
pub struct ClientSideIncrementalFilter {
    cursor_field: String,
    value_type: CursorValueType,
    start: Option<CursorValue>,
    global: Option<CursorValue>,
    partitions: HashMap<String, CursorValue>,
}

impl ClientSideIncrementalFilter {
    /// Create a filter on `cursor_field`
    pub fn new(cursor_field: impl Into<String>, value_type: CursorValueType) -> Self {
        Self {
            cursor_field: cursor_field.into(),
            value_type,
            start: None,
            global: None,
            partitions: HashMap::new(),
        }
    }

    /// Configured lower bound
    pub fn with_start(mut self, start: &Value) -> Result<Self> {
        self.start = Some(self.value_type.parse(start)?);
        Ok(self)
    }

    /// Persisted stream state, global or per partition
    pub fn with_state(mut self, state: &Value) -> Result<Self> {
        if let Some(raw) = state.get(&self.cursor_field) {
            self.global = Some(self.value_type.parse(raw)?);
        }
        if let Some(entries) = state.get("states").and_then(Value::as_array) {
            for entry in entries {
                let (Some(partition), Some(raw)) = (
                    entry.get("partition").and_then(Value::as_object),
                    entry.get("cursor").and_then(|c| c.get(&self.cursor_field)),
                ) else {
                    continue;
                };
                let key = StreamSlice::new().with_partition(partition.clone()).key();
                self.partitions.insert(key, self.value_type.parse(raw)?);
            }
        }
        Ok(self)
    }

    fn threshold(&self, record: &Record) -> Option<&CursorValue> {
        let state = record
            .partition_key()
            .and_then(|key| self.partitions.get(key))
            .or(self.global.as_ref());

        match (state, self.start.as_ref()) {
            (Some(state), Some(start)) => Some(state.max(start)),
            (state, start) => state.or(start),
        }
    }

    /// Whether the record is at or after the high-water mark
    ///
    /// Equality is kept: records sharing the persisted value may not all
    /// have been emitted. Records without a parseable cursor value are kept.
    pub fn should_keep(&self, record: &Record) -> bool {
        let Some(raw) = record.get_path(&self.cursor_field) else {
            return true;
        };
        let Ok(value) = self.value_type.parse(raw) else {
            return true;
        };
        self.threshold(record).map_or(true, |threshold| value >= *threshold)
    }

    /// Keep the records that should be synced
    pub fn filter(&self, records: Vec<Record>) -> Vec<Record> {
        records.into_iter().filter(|r| self.should_keep(r)).collect()
    }
}
