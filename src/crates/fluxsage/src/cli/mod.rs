//! CLI command implementations
//!
//! Provides command handlers for the fluxsage CLI binary. Handlers print
//! results to stdout and return whether the request succeeded so the binary
//! can set its exit code.

pub mod config;
pub mod context;
pub mod logs;
pub mod query;
pub mod report;

pub use context::{build_model, build_query_log, build_service, build_store};

use clap::ValueEnum;

/// How handlers print their results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with tables
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}
