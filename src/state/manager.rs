//! State persistence
//!
//! A [`StateManager`] keeps the latest state of every stream and, when backed
//! by a file, writes it through a temp file and rename.

use super::types::State;
use crate::error::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Where state lives between runs
#[derive(Debug, Clone)]
enum Backing {
    Memory,
    File { path: PathBuf, auto_save: bool },
}

/// Shared handle to the state of a sync; clones see the same state
#[derive(Debug, Clone)]
pub struct StateManager {
    backing: Backing,
    state: Arc<RwLock<State>>,
}

impl StateManager {
    fn with_state(backing: Backing, state: State) -> Self {
        Self {
            backing,
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// State that is never persisted
    pub fn in_memory() -> Self {
        Self::with_state(Backing::Memory, State::new())
    }

    /// In-memory state seeded from JSON
    ///
    /// Accepts a `{"streams": {...}}` document or an array of emitted
    /// `STATE` messages, where the last message per stream wins.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::with_state(Backing::Memory, parse_state(json, "JSON")?))
    }

    /// File-backed state, loaded if the file exists
    ///
    /// Every update is written through unless auto-save is turned off.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => parse_state(&contents, "file")?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::new(),
            Err(e) => {
                return Err(Error::state(format!(
                    "Failed to read state file '{}': {e}",
                    path.display()
                )))
            }
        };
        Ok(Self::with_state(
            Backing::File {
                path,
                auto_save: true,
            },
            state,
        ))
    }

    /// Toggle write-through for file-backed state
    #[must_use]
    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        if let Backing::File { auto_save, .. } = &mut self.backing {
            *auto_save = enabled;
        }
        self
    }

    /// Path of the backing file
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Memory => None,
            Backing::File { path, .. } => Some(path),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self.backing, Backing::Memory)
    }

    pub async fn snapshot(&self) -> State {
        self.state.read().await.clone()
    }

    pub async fn get_stream_state(&self, stream: &str) -> Option<Value> {
        self.state.read().await.get_stream(stream).cloned()
    }

    /// Replace the state of one stream
    pub async fn set_stream_state(&self, stream: &str, value: Value) -> Result<()> {
        self.state.write().await.set_stream(stream, value);
        self.write_through().await
    }

    /// Forget the state of one stream so its next read starts over
    pub async fn clear_stream(&self, stream: &str) -> Result<()> {
        self.state.write().await.remove_stream(stream);
        self.write_through().await
    }

    /// Write the current state to the backing file, if any
    pub async fn save(&self) -> Result<()> {
        match &self.backing {
            Backing::Memory => Ok(()),
            Backing::File { path, .. } => {
                let state = self.state.read().await;
                write_atomic(path, &state).await
            }
        }
    }

    /// Compact JSON document of the current state
    pub async fn to_json(&self) -> Result<String> {
        let state = self.state.read().await;
        serde_json::to_string(&*state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    async fn write_through(&self) -> Result<()> {
        match self.backing {
            Backing::File {
                auto_save: true, ..
            } => self.save().await,
            _ => Ok(()),
        }
    }
}

fn parse_state(contents: &str, origin: &str) -> Result<State> {
    if contents.trim().is_empty() {
        return Ok(State::new());
    }
    let invalid = |e: String| Error::state(format!("Failed to parse state {origin}: {e}"));
    let value: Value = serde_json::from_str(contents).map_err(|e| invalid(e.to_string()))?;

    match value {
        Value::Array(messages) => {
            let mut state = State::new();
            for message in messages {
                let stream = message
                    .get("stream")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("state message without a stream name".into()))?;
                let data = message.get("data").cloned().unwrap_or(Value::Null);
                state.set_stream(stream, data);
            }
            Ok(state)
        }
        other => serde_json::from_value(other).map_err(|e| invalid(e.to_string())),
    }
}

async fn write_atomic(path: &Path, state: &State) -> Result<()> {
    let contents = serde_json::to_string_pretty(state)
        .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))?;

    let staging = path.with_extension("tmp");
    tokio::fs::write(&staging, contents)
        .await
        .map_err(|e| Error::state(format!("Failed to write '{}': {e}", staging.display())))?;
    tokio::fs::rename(&staging, path)
        .await
        .map_err(|e| Error::state(format!("Failed to replace '{}': {e}", path.display())))?;

    debug!(path = %path.display(), streams = state.streams.len(), "State saved");
    Ok(())
}
