//! State management module
//!
//! Persists per-stream cursor state between sync runs to enable
//! incremental syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - `State` - stream name to cursor-owned state value
//! - `StateManager` - file or inline-JSON persistence with atomic writes

mod manager;
mod types;

pub use manager::StateManager;
pub use types::State;

#[cfg(test)]
mod manager_tests;
