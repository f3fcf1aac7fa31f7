// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Low-Code
//!
//! A declarative, manifest-driven engine for reading records from HTTP APIs.
//! Streams are described in YAML and assembled from small components.
//!
//! ## Features
//!
//! - **Pagination**: Offset, page number, record field and cursor strategies
//! - **Partitioning**: List, datetime window, parent stream and cartesian routers
//! - **Incremental Sync**: Concurrent-safe cursors with checkpointed state
//! - **Retrievers**: Simple, substream and asynchronous job retrievers
//! - **Concurrency**: Partitions read by a bounded worker pool with sentinel shutdown
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_lowcode::engine::SyncEngine;
//! use solidafy_lowcode::manifest::{load_manifest, ComponentFactory};
//! use solidafy_lowcode::state::StateManager;
//!
//! #[tokio::main]
//! async fn main() -> solidafy_lowcode::Result<()> {
//!     let manifest = load_manifest("manifests/shop.yaml")?;
//!     let config = serde_json::json!({ "api_key": "sk_test_..." });
//!     let factory = ComponentFactory::new(manifest, config)?;
//!
//!     let mut engine = SyncEngine::new(factory, StateManager::from_file("state.json")?);
//!     for message in engine.read().await? {
//!         println!("{}", message.to_json_line());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SyncEngine                               │
//! │  check() → ConnectionStatus   discover() → Catalog              │
//! │  read(state) → Vec<Message>                                     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                  ComponentFactory (manifest → streams)
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │ Retriever│ Paginator │   Partition   │  Cursor   │ Concurrent  │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ Simple   │ Offset    │ List          │ Global    │ Worker pool │
//! │ Substream│ Page      │ Datetime      │ Partition │ Sentinels   │
//! │ Async job│ Cursor    │ Parent stream │ File      │ Cancellation│
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Template interpolation
pub mod template;

/// Datetime parsing and formatting
pub mod datetime;

/// Authentication implementations
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Request options and injection
pub mod request;

/// Pagination strategies
pub mod pagination;

/// Record extraction and filtering
pub mod extract;

/// Incremental sync cursors
pub mod cursor;

/// Partition routing
pub mod partition;

/// Record retrievers
pub mod retriever;

/// Concurrent partition reading
pub mod concurrent;

/// State management and checkpointing
pub mod state;

/// Manifest parsing and component factory
pub mod manifest;

/// Main execution engine
pub mod engine;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use manifest::{load_manifest, load_manifest_from_str, ManifestDefinition};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
