//! CLI runner - executes commands

use crate::cli::commands::{parse_stream_list, Cli, Commands, OutputFormat};
use crate::concurrent::ConcurrencyConfig;
use crate::engine::{Message, SyncConfig, SyncEngine};
use crate::error::{Error, Result, ResultExt};
use crate::manifest::{load_manifest, ComponentFactory, ManifestDefinition};
use crate::state::StateManager;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use tracing::info;

/// CLI runner
#[derive(Debug)]
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Check => self.check().await,
            Commands::Discover => self.discover(),
            Commands::Read {
                streams,
                max_records,
                workers,
                continue_on_error,
            } => {
                let mut config = SyncConfig::new()
                    .with_streams(parse_stream_list(streams.as_deref()))
                    .with_max_records(max_records.unwrap_or(0))
                    .with_fail_fast(!continue_on_error);
                if let Some(workers) = workers {
                    config = config.with_concurrency(ConcurrencyConfig::new(*workers)?);
                }
                self.read(config).await
            }
            Commands::Validate => self.validate(),
        }
    }

    /// Load manifest
    fn load_manifest(&self) -> Result<ManifestDefinition> {
        let path = self
            .cli
            .manifest
            .as_ref()
            .ok_or_else(|| Error::config("No manifest specified. Use --manifest <FILE>"))?;
        load_manifest(path)
    }

    /// Load config (inline JSON wins over the config file)
    fn load_config(&self) -> Result<Value> {
        if let Some(json_str) = &self.cli.config_json {
            return serde_json::from_str(json_str)
                .map_err(|e| Error::config(format!("Invalid config JSON: {e}")));
        }

        if let Some(path) = &self.cli.config {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
            return serde_json::from_str(&content)
                .map_err(|e| Error::config(format!("Invalid config JSON: {e}")));
        }

        Ok(json!({}))
    }

    /// Load state
    fn load_state(&self) -> Result<StateManager> {
        if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)
        } else if let Some(path) = &self.cli.state {
            StateManager::from_file(path)
        } else {
            Ok(StateManager::in_memory())
        }
    }

    fn engine(&self) -> Result<SyncEngine> {
        let factory = ComponentFactory::new(self.load_manifest()?, self.load_config()?)?;
        Ok(SyncEngine::new(factory, self.load_state()?))
    }

    /// Check connection
    async fn check(&self) -> Result<()> {
        let engine = self.engine()?;
        let status = engine.check().await;
        self.output(&json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": status,
        }));
        Ok(())
    }

    /// Discover streams
    fn discover(&self) -> Result<()> {
        let catalog = self.engine()?.discover()?;
        self.output(&json!({
            "type": "CATALOG",
            "catalog": { "streams": catalog },
        }));
        Ok(())
    }

    /// Read streams and print messages
    async fn read(&self, config: SyncConfig) -> Result<()> {
        let mut engine = self.engine()?.with_config(config);
        let messages = engine.read().await?;
        for message in &messages {
            self.output(message);
        }

        // Checkpoints are saved as they arrive; this covers reads that emitted none
        engine.state().save().await?;

        let stats = engine.stats();
        info!(
            records = stats.records_synced,
            streams = stats.streams_synced,
            states = stats.states_emitted,
            errors = stats.errors,
            duration_ms = stats.duration_ms,
            "Read finished"
        );
        Ok(())
    }

    /// Validate the manifest and build its components
    fn validate(&self) -> Result<()> {
        let manifest = self.load_manifest()?;
        let streams = manifest.streams.len();
        let factory = ComponentFactory::new(manifest.clone(), self.load_config()?)?;
        factory.build_streams()?;

        self.output(&Message::info(format!(
            "Manifest '{}' v{} is valid with {streams} streams",
            manifest.name, manifest.version
        )));
        Ok(())
    }

    /// Output a message
    fn output<T: Serialize + ?Sized>(&self, msg: &T) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}
