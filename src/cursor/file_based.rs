//! File-based incremental state
//!
//! Keeps a bounded history of synced file URIs and their modification
//! times. When the history overflows the oldest entry is evicted and the
//! state is marked incomplete; from then on files older than the sync
//! window may be skipped even if they were never seen.

use super::types::{Cursor, CursorPhase, StateSink};
use crate::datetime;
use crate::error::{Error, Result};
use crate::types::{Record, StreamSlice};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Timestamp format used in state
pub const FILE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Cursor field written to state
pub const FILE_CURSOR_FIELD: &str = "_ab_source_file_last_modified";

/// Record field carrying the file URI
pub const FILE_URL_FIELD: &str = "_ab_source_file_url";

/// Default bound on the history
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 10_000;

/// Default look-back window once the history is incomplete
pub const DEFAULT_DAYS_TO_SYNC_IF_HISTORY_IS_FULL: i64 = 3;

/// A file in remote storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File URI
    pub uri: String,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
}

impl RemoteFile {
    /// Create a file descriptor
    pub fn new(uri: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            uri: uri.into(),
            last_modified,
        }
    }
}

/// Bounded history of synced files
#[derive(Debug, Clone)]
pub struct FileBasedState {
    history: BTreeMap<String, DateTime<Utc>>,
    max_history_size: usize,
    time_window_if_history_is_full: Duration,
    incomplete_history: bool,
    /// Earliest remembered file when the sync started
    initial_earliest: Option<(DateTime<Utc>, String)>,
    evicted_this_sync: bool,
}

impl Default for FileBasedState {
    fn default() -> Self {
        Self {
            history: BTreeMap::new(),
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            time_window_if_history_is_full: Duration::days(DEFAULT_DAYS_TO_SYNC_IF_HISTORY_IS_FULL),
            incomplete_history: false,
            initial_earliest: None,
            evicted_this_sync: false,
        }
    }
}

impl FileBasedState {
    /// Create an empty state
    pub fn new(max_history_size: usize, time_window_if_history_is_full: Duration) -> Result<Self> {
        if max_history_size == 0 {
            return Err(Error::invalid_value(
                "max_history_size",
                "must be at least 1",
            ));
        }
        Ok(Self {
            history: BTreeMap::new(),
            max_history_size,
            time_window_if_history_is_full,
            incomplete_history: false,
            initial_earliest: None,
            evicted_this_sync: false,
        })
    }

    /// Load persisted state
    ///
    /// Marks the start of a sync: the earliest remembered file is captured
    /// here and used by [`get_files_to_sync`](Self::get_files_to_sync).
    pub fn load(&mut self, state: &Value) -> Result<()> {
        self.history.clear();
        if let Some(history) = state.get("history").and_then(Value::as_object) {
            for (uri, ts) in history {
                let raw = ts.as_str().unwrap_or_default();
                let parsed = NaiveDateTime::parse_from_str(raw, FILE_DATETIME_FORMAT)
                    .map(|naive| naive.and_utc())
                    .or_else(|_| datetime::parse_flexible(raw).map(|dt| dt.with_timezone(&Utc)))
                    .map_err(|_| Error::datetime(raw, FILE_DATETIME_FORMAT))?;
                self.history.insert(uri.clone(), parsed);
            }
        }
        self.incomplete_history = state
            .get("incomplete_history")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.start_sync();
        Ok(())
    }

    /// Reset per-sync bookkeeping
    pub fn start_sync(&mut self) {
        self.initial_earliest = self.earliest();
        self.evicted_this_sync = false;
    }

    /// Remembered files
    pub fn history(&self) -> &BTreeMap<String, DateTime<Utc>> {
        &self.history
    }

    /// Whether files may have been forgotten
    pub fn incomplete_history(&self) -> bool {
        self.incomplete_history
    }

    /// Whether the history is at capacity or has lost entries
    pub fn is_history_full(&self) -> bool {
        self.history.len() >= self.max_history_size || self.incomplete_history
    }

    fn earliest(&self) -> Option<(DateTime<Utc>, String)> {
        self.history
            .iter()
            .map(|(uri, ts)| (*ts, uri.clone()))
            .min()
    }

    /// Remember a synced file, evicting the oldest entry when over capacity
    pub fn add_file(&mut self, file: &RemoteFile) {
        self.history.insert(file.uri.clone(), file.last_modified);

        if self.history.len() > self.max_history_size {
            if let Some((_, uri)) = self.earliest() {
                debug!(uri = %uri, "Evicting oldest file from history");
                self.history.remove(&uri);
                self.incomplete_history = true;
                self.evicted_this_sync = true;
            }
        }
    }

    /// Earliest modification time still worth listing
    ///
    /// Minimum when nothing is remembered; otherwise the oldest remembered
    /// timestamp, pulled back to `now - window` when the history is full.
    pub fn get_start_time(&self) -> DateTime<Utc> {
        let Some((oldest, _)) = self.earliest() else {
            return datetime::min_datetime().with_timezone(&Utc);
        };
        if self.is_history_full() {
            oldest.min(Utc::now() - self.time_window_if_history_is_full)
        } else {
            oldest
        }
    }

    fn should_sync_file(&self, file: &RemoteFile) -> bool {
        if let Some(synced_at) = self.history.get(&file.uri) {
            if file.last_modified < *synced_at {
                warn!(
                    uri = %file.uri,
                    "File last modified time is older than the synced time in history"
                );
            }
            return file.last_modified > *synced_at;
        }

        if !self.is_history_full() {
            return true;
        }

        match &self.initial_earliest {
            None => true,
            Some((ts, uri)) => (file.last_modified, &file.uri) > (*ts, uri),
        }
    }

    /// Files that still need syncing
    pub fn get_files_to_sync(&self, files: Vec<RemoteFile>) -> Vec<RemoteFile> {
        if self.is_history_full() {
            warn!(
                max_history_size = self.max_history_size,
                "File history is full, files older than the sync window may be skipped"
            );
        }
        files
            .into_iter()
            .filter(|f| self.should_sync_file(f))
            .collect()
    }

    /// Finish a sync
    ///
    /// Clears `incomplete_history` when nothing was evicted and every file
    /// of this sync fit in the history.
    pub fn close_sync(&mut self, files_to_sync_count: usize) {
        if !self.evicted_this_sync && files_to_sync_count <= self.max_history_size {
            self.incomplete_history = false;
        }
    }

    /// `"<timestamp>_<uri>"` of the newest file
    pub fn cursor_value(&self) -> Option<String> {
        self.history
            .iter()
            .map(|(uri, ts)| (*ts, uri))
            .max()
            .map(|(ts, uri)| format!("{}_{uri}", ts.format(FILE_DATETIME_FORMAT)))
    }

    /// Persistable form
    pub fn to_value(&self) -> Value {
        let history: Map<String, Value> = self
            .history
            .iter()
            .map(|(uri, ts)| {
                (
                    uri.clone(),
                    Value::String(ts.format(FILE_DATETIME_FORMAT).to_string()),
                )
            })
            .collect();

        json!({
            "history": history,
            FILE_CURSOR_FIELD: self.cursor_value(),
            "incomplete_history": self.incomplete_history,
        })
    }
}

// ============================================================================
// File Based Cursor
// ============================================================================

/// [`Cursor`] over a [`FileBasedState`]
///
/// Observed records must carry `_ab_source_file_url` and
/// `_ab_source_file_last_modified`.
#[derive(Debug)]
pub struct FileBasedCursor {
    stream: String,
    sink: Arc<dyn StateSink>,
    inner: Mutex<FileCursorInner>,
}

#[derive(Debug)]
struct FileCursorInner {
    phase: CursorPhase,
    state: FileBasedState,
    emitted: usize,
}

impl FileBasedCursor {
    /// Create a cursor
    pub fn new(stream: impl Into<String>, state: FileBasedState, sink: Arc<dyn StateSink>) -> Self {
        Self {
            stream: stream.into(),
            sink,
            inner: Mutex::new(FileCursorInner {
                phase: CursorPhase::Uninitialized,
                state,
                emitted: 0,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, FileCursorInner>> {
        self.inner
            .lock()
            .map_err(|_| Error::system("FileBasedCursor", "cursor lock poisoned"))
    }

    fn require_active(&self, phase: CursorPhase, operation: &str) -> Result<()> {
        if phase == CursorPhase::Active {
            return Ok(());
        }
        Err(Error::system(
            "FileBasedCursor",
            format!(
                "{operation}() called while cursor is {phase:?} on stream '{}'",
                self.stream
            ),
        ))
    }

    /// Files that still need syncing
    pub fn get_files_to_sync(&self, files: Vec<RemoteFile>) -> Result<Vec<RemoteFile>> {
        let inner = self.lock()?;
        self.require_active(inner.phase, "get_files_to_sync")?;
        Ok(inner.state.get_files_to_sync(files))
    }

    /// Earliest modification time still worth listing
    pub fn get_start_time(&self) -> Result<DateTime<Utc>> {
        Ok(self.lock()?.state.get_start_time())
    }

    /// Finish the sync (see [`FileBasedState::close_sync`])
    pub fn close_sync(&self, files_to_sync_count: usize) -> Result<()> {
        self.lock()?.state.close_sync(files_to_sync_count);
        Ok(())
    }

    fn emit(&self, inner: &mut FileCursorInner) {
        let state = inner.state.to_value();
        inner.emitted += 1;
        self.sink.emit_state(&self.stream, &state);
    }
}

fn file_from_record(record: &Record) -> Option<RemoteFile> {
    let uri = record.get(FILE_URL_FIELD)?.as_str()?;
    let raw = record.get(FILE_CURSOR_FIELD)?.as_str()?;
    let last_modified = NaiveDateTime::parse_from_str(raw, FILE_DATETIME_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| datetime::parse_flexible(raw).map(|dt| dt.with_timezone(&Utc)))
        .ok()?;
    Some(RemoteFile::new(uri, last_modified))
}

impl Cursor for FileBasedCursor {
    fn set_initial_state(&self, state: Option<&Value>) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.phase != CursorPhase::Uninitialized {
            return Err(Error::system(
                "FileBasedCursor",
                format!("set_initial_state() called twice on stream '{}'", self.stream),
            ));
        }
        match state {
            Some(state) if !state.is_null() => inner.state.load(state)?,
            _ => inner.state.start_sync(),
        }
        inner.phase = CursorPhase::Active;
        Ok(())
    }

    fn observe(&self, record: &Record) -> Result<()> {
        let mut inner = self.lock()?;
        self.require_active(inner.phase, "observe")?;
        match file_from_record(record) {
            Some(file) => inner.state.add_file(&file),
            None => warn!(stream = %self.stream, "Record has no file uri or modification time"),
        }
        Ok(())
    }

    fn close_partition(&self, _slice: &StreamSlice) -> Result<()> {
        let mut inner = self.lock()?;
        self.require_active(inner.phase, "close_partition")?;
        self.emit(&mut inner);
        Ok(())
    }

    fn get_state(&self) -> Value {
        self.inner
            .lock()
            .map(|inner| inner.state.to_value())
            .unwrap_or(Value::Null)
    }

    fn ensure_at_least_one_state_emitted(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.phase == CursorPhase::Uninitialized {
            return Err(Error::system(
                "FileBasedCursor",
                "ensure_at_least_one_state_emitted() called before set_initial_state()",
            ));
        }
        if inner.emitted == 0 {
            self.emit(&mut inner);
        }
        inner.phase = CursorPhase::Closed;
        Ok(())
    }

    fn should_be_synced(&self, _record: &Record) -> bool {
        true
    }

    fn phase(&self) -> CursorPhase {
        self.inner
            .lock()
            .map(|inner| inner.phase)
            .unwrap_or(CursorPhase::Closed)
    }
}
