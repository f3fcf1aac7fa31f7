//! State types for tracking sync progress
//!
//! These types are serialized to JSON and persisted between runs. The
//! per-stream value is owned by the stream's cursor: `{"<field>": value}`
//! for a global cursor, `{"states": [...]}` per partition, or the file
//! history shape for file-based streams.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Complete state for a source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Per-stream state
    #[serde(default)]
    pub streams: BTreeMap<String, Value>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for a stream
    pub fn get_stream(&self, stream: &str) -> Option<&Value> {
        self.streams.get(stream).filter(|v| !v.is_null())
    }

    /// Replace state for a stream
    pub fn set_stream(&mut self, stream: impl Into<String>, state: Value) {
        self.streams.insert(stream.into(), state);
    }

    /// Drop state for a stream
    pub fn remove_stream(&mut self, stream: &str) -> Option<Value> {
        self.streams.remove(stream)
    }

    /// Whether no stream has state
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_default() {
        let state = State::new();
        assert!(state.is_empty());
    }

    #[test]
    fn test_state_stream() {
        let mut state = State::new();
        assert!(state.get_stream("users").is_none());

        state.set_stream("users", json!({"updated_at": "2024-01-01"}));
        assert_eq!(
            state.get_stream("users"),
            Some(&json!({"updated_at": "2024-01-01"}))
        );

        state.set_stream("nulled", Value::Null);
        assert!(state.get_stream("nulled").is_none());
    }

    #[test]
    fn test_state_serialization() {
        let mut state = State::new();
        state.set_stream(
            "users",
            json!({"states": [{"partition": {"org": "a"}, "cursor": {"id": 3}}]}),
        );

        let json = serde_json::to_string(&state).unwrap();
        let restored: State = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);

        let empty: State = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }
}
