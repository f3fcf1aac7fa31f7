//! CLI module
//!
//! Command-line interface for running manifests.
//!
//! # Commands
//!
//! - `check` - Test connection to the API
//! - `discover` - Describe available streams
//! - `read` - Extract data from streams
//! - `validate` - Validate the manifest

mod commands;
mod runner;

pub use commands::{parse_stream_list, Cli, Commands, OutputFormat};
pub use runner::Runner;
