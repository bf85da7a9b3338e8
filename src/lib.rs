//! Task Versioning Library
//!
//! Auditable history, branching, diffing and merging for a task list.
//! This module exports the core components for testing and integration.

pub mod branch;
pub mod cli;
pub mod commits;
pub mod config;
pub mod diff;
pub mod error;
pub mod format;
pub mod graph;
pub mod logging;
pub mod merge;
mod persist;
pub mod store;
pub mod types;
