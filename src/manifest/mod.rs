//! Manifest module
//!
//! Parse declarative stream manifests from YAML and build runtime components.
//!
//! # Overview
//!
//! The manifest module provides:
//! - `ManifestDefinition` - Declarative source description
//! - `StreamDefinition` - Stream configuration with tagged component kinds
//! - `ComponentFactory` - Builds `DeclarativeStream`s from an immutable `FactoryContext`
//! - YAML parsing with validation

mod factory;
mod parser;
mod types;

pub use factory::{
    build_auth, build_extractor, build_paginator, http_client_config, ComponentFactory,
    DeclarativeStream, FactoryContext,
};
pub use parser::{load_manifest, load_manifest_from_str, validate_manifest};
pub use types::{
    parse_method, AsyncJobCreateDefinition, AsyncJobDefinition, AsyncJobDownloadDefinition,
    AsyncJobPollDefinition, AuthDefinition, CheckDefinition, ConcurrencyDefinition,
    DecoderDefinition, ExtractorDefinition, HttpDefinition, IncrementalDefinition,
    ManifestDefinition, PageTokenOptionDefinition, PaginationStrategyDefinition,
    PaginatorDefinition, ParentStreamDefinition, PartitionRouterDefinition, RequesterDefinition,
    RetrieverDefinition, SelectorDefinition, StreamDefinition,
};

#[cfg(test)]
mod tests;
