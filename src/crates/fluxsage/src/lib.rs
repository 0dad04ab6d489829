//! # fluxsage - natural-language queries over test execution data
//!
//! Turns a question such as "show me failed tests in build 3573" into a
//! Flux query against the `testmethod` measurement, checks it, runs it and
//! summarizes the rows.
//!
//! ## Pipeline
//!
//! - **Synthesis** - a chat model writes Flux from a schema-constrained prompt
//! - **Validation** - a static schema lint, then a dry run against the store
//! - **Correction** - rejected queries go back to the model with the error,
//!   up to an attempt budget
//! - **Execution** - the accepted query runs against InfluxDB
//! - **Summary** - the model summarizes a sample of the rows in markdown
//!
//! Common questions (build summaries, flaky tests, build comparisons) are
//! answered by fixed [`reports`] without a model call.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fluxsage::{QueryRequest, QueryService, SchemaReference, ServiceOptions};
//! use influx::{InfluxClient, InfluxConfig};
//! use llm::remote::OpenAiClient;
//! use llm::RemoteLlmConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let model = OpenAiClient::new(RemoteLlmConfig::from_env(
//!     "OPENAI_API_KEY",
//!     "https://api.openai.com/v1",
//!     "gpt-4o-mini",
//! )?);
//! let store = InfluxClient::new(InfluxConfig::new("http://localhost:8086", "token", "myorg"))?;
//!
//! let service = QueryService::new(
//!     Arc::new(model),
//!     Arc::new(store),
//!     Arc::new(SchemaReference::default()),
//!     ServiceOptions::default(),
//! );
//!
//! let request = QueryRequest::new("show me failed tests in build 3573", 3);
//! let result = service.generate_query_with_summary(&request).await;
//! println!("{}", result.summary.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod cli;
pub mod config;
pub mod executor;
pub mod failure;
pub mod models;
pub mod prompts;
pub mod query_log;
pub mod reports;
pub mod retry;
pub mod schema;
pub mod service;
pub mod summary;
pub mod synthesizer;
pub mod validator;

// Error types and utilities
mod error;

// Re-export key types for convenience
pub use executor::QueryExecutor;
pub use failure::FailureCategory;
pub use models::{LegacyQueryResult, QueryRequest, QueryWithSummary, SynthesizedQuery};
pub use query_log::{QueryLog, QueryLogEntry, QueryStatistics};
pub use reports::{detect_report, Report, ReportRequest, ReportService};
pub use schema::SchemaReference;
pub use service::{QueryService, ServiceOptions};
pub use summary::SummarySynthesizer;
pub use synthesizer::QuerySynthesizer;
pub use validator::{QueryValidator, SchemaLint, StoreValidator};

// Error types
pub use error::{PipelineError, Result};
