//! Execution engine module
//!
//! Main read loop and stream orchestration.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - Orchestrates check, discover and read with state management
//! - `SyncConfig` - Configuration for sync operations
//! - Message types for output (Record, State, Log)

mod types;

pub use types::{
    ConnectionStatus, LogLevel, Message, StreamDescriptor, SyncConfig, SyncStats,
};

use crate::concurrent::{ConcurrencyConfig, ConcurrentStreamReader};
use crate::cursor::CollectingStateSink;
use crate::error::{Error, Result};
use crate::manifest::{ComponentFactory, DeclarativeStream};
use crate::state::StateManager;
use crate::types::Record;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sync engine for orchestrating data extraction
#[derive(Debug)]
pub struct SyncEngine {
    /// Builds streams from the manifest
    factory: ComponentFactory,
    /// State manager
    state: StateManager,
    /// Collects checkpoints emitted by cursors
    sink: Arc<CollectingStateSink>,
    /// Sync configuration
    config: SyncConfig,
    /// Statistics
    stats: SyncStats,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(factory: ComponentFactory, state: StateManager) -> Self {
        Self {
            factory,
            state,
            sink: Arc::new(CollectingStateSink::new()),
            config: SyncConfig::default(),
            stats: SyncStats::default(),
        }
    }

    /// Set sync configuration
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the state manager
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Get statistics
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Verify that the source is reachable
    ///
    /// Reads the first slice of each check stream (the first stream when
    /// the manifest names none). Failures are reported, not returned.
    pub async fn check(&self) -> ConnectionStatus {
        let manifest = self.factory.manifest();
        let names: Vec<String> = match &manifest.check {
            Some(check) if !check.stream_names.is_empty() => check.stream_names.clone(),
            _ => manifest.streams.iter().take(1).map(|s| s.name.clone()).collect(),
        };

        for name in &names {
            if let Err(e) = self.check_stream(name).await {
                warn!(stream = %name, error = %e, "Check failed");
                return ConnectionStatus::failed(format!("Stream '{name}': {e}"));
            }
        }
        ConnectionStatus::succeeded()
    }

    async fn check_stream(&self, name: &str) -> Result<()> {
        // Checks never touch persisted state
        let factory = self
            .factory
            .clone()
            .with_state_sink(Arc::new(CollectingStateSink::new()));
        let retriever = factory.build_stream(name)?.retriever();
        let slices = retriever.stream_slices().await?;
        if let Some(slice) = slices.first() {
            let records = retriever.read_records(slice).await?;
            debug!(stream = %name, records = records.len(), "Check read first slice");
        }
        Ok(())
    }

    /// Describe every stream of the manifest
    pub fn discover(&self) -> Result<Vec<StreamDescriptor>> {
        let streams = self.factory.build_streams()?;
        Ok(streams
            .iter()
            .map(|stream| StreamDescriptor {
                name: stream.name().to_string(),
                json_schema: stream.json_schema(),
                primary_key: stream.primary_key().to_vec(),
                supports_incremental: stream.is_incremental(),
                cursor_field: stream.cursor_field().map(str::to_string),
            })
            .collect())
    }

    /// Read all selected streams
    pub async fn read(&mut self) -> Result<Vec<Message>> {
        let start = Instant::now();
        let names = self.selected_streams()?;
        let mut messages = Vec::new();

        for name in &names {
            match self.read_stream_into(name, &mut messages).await {
                Ok(()) => {}
                Err(e) if !self.config.fail_fast => {
                    warn!(stream = %name, error = %e, "Stream failed, continuing");
                    self.stats.add_error();
                    messages.push(Message::error(format!("Stream '{name}' failed: {e}")));
                }
                Err(e) => return Err(e),
            }
        }

        self.stats.set_duration(start.elapsed().as_millis() as u64);
        info!(
            streams = self.stats.streams_synced,
            records = self.stats.records_synced,
            duration_ms = self.stats.duration_ms,
            "Sync complete"
        );
        Ok(messages)
    }

    /// Read one stream, resuming from its persisted state
    pub async fn read_stream(&mut self, name: &str) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        self.read_stream_into(name, &mut messages).await?;
        Ok(messages)
    }

    /// Append one stream's output to `messages`
    ///
    /// On failure, messages of slices already checkpointed stay in
    /// `messages`; checkpoints whose records were not emitted are dropped.
    async fn read_stream_into(&mut self, name: &str, messages: &mut Vec<Message>) -> Result<()> {
        let result = self.try_read_stream(name, messages).await;
        if result.is_err() {
            self.discard_pending_state(name);
        }
        result
    }

    async fn try_read_stream(&mut self, name: &str, messages: &mut Vec<Message>) -> Result<()> {
        let snapshot = self.state.snapshot().await;
        let stream = self
            .factory
            .clone()
            .with_state(snapshot)
            .with_state_sink(self.sink.clone())
            .build_stream(name)?;

        messages.push(Message::info(format!("Starting sync for stream: {name}")));
        info!(stream = %name, incremental = stream.is_incremental(), "Reading stream");

        match self.concurrency()? {
            Some(concurrency) if self.config.max_records == 0 => {
                let reader = ConcurrentStreamReader::new(concurrency);
                let (records, report) = reader.read_all(stream.retriever()).await?;
                self.stats.add_partitions(report.partitions_read);
                self.push_records(&stream, records, messages);
                self.flush_state(messages).await?;
            }
            concurrency => {
                if concurrency.is_some() {
                    debug!(stream = %name, "Record limit set, reading partitions sequentially");
                }
                self.read_sequential(&stream, messages).await?;
            }
        }

        if let Some(cursor) = stream.cursor() {
            cursor.ensure_at_least_one_state_emitted()?;
        }
        self.flush_state(messages).await?;
        self.stats.add_stream();
        Ok(())
    }

    /// Slices are read in order; the record limit is checked between slices
    /// so every emitted checkpoint covers only emitted records.
    async fn read_sequential(
        &mut self,
        stream: &DeclarativeStream,
        messages: &mut Vec<Message>,
    ) -> Result<()> {
        let retriever = stream.retriever();
        let slices = retriever.stream_slices().await?;
        let mut emitted = 0;

        for slice in &slices {
            let records = retriever.read_records(slice).await?;
            emitted += records.len();
            self.stats.add_partitions(1);
            self.push_records(stream, records, messages);
            self.flush_state(messages).await?;

            if self.config.max_records > 0 && emitted >= self.config.max_records {
                debug!(stream = %stream.name(), emitted, "Reached max records");
                break;
            }
        }
        Ok(())
    }

    fn push_records(
        &mut self,
        stream: &DeclarativeStream,
        records: Vec<Record>,
        messages: &mut Vec<Message>,
    ) {
        self.stats.add_records(records.len());
        messages.extend(
            records
                .into_iter()
                .map(|record| Message::record(stream.name(), record.to_value())),
        );
    }

    /// Move collected checkpoints into the state manager and the output
    async fn flush_state(&mut self, messages: &mut Vec<Message>) -> Result<()> {
        for (stream, data) in self.sink.drain() {
            self.state.set_stream_state(&stream, data.clone()).await?;
            self.stats.add_state();
            messages.push(Message::state(stream, data));
        }
        Ok(())
    }

    fn discard_pending_state(&self, name: &str) {
        let discarded = self.sink.drain().len();
        if discarded > 0 {
            warn!(stream = %name, discarded, "Dropped checkpoints of a failed read");
        }
    }

    fn concurrency(&self) -> Result<Option<ConcurrencyConfig>> {
        match &self.config.concurrency {
            Some(config) => Ok(Some(config.clone())),
            None => self.factory.concurrency(),
        }
    }

    fn selected_streams(&self) -> Result<Vec<String>> {
        let manifest = self.factory.manifest();
        if self.config.streams.is_empty() {
            return Ok(manifest.stream_names().into_iter().map(String::from).collect());
        }
        for name in &self.config.streams {
            if manifest.stream(name).is_none() {
                return Err(Error::StreamNotFound {
                    stream: name.clone(),
                });
            }
        }
        Ok(self.config.streams.clone())
    }
}
