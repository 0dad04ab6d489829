//! Error types for fluxsage
//!
//! One variant per pipeline stage so callers can tell a failed synthesis
//! from a failed execution or summary.

use thiserror::Error;

/// Result type alias for fluxsage operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The model call failed or returned unusable text
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    /// The candidate query was rejected by a validator
    #[error("{0}")]
    Validation(String),

    /// The store rejected or failed to run the query text
    #[error("{0}")]
    Execution(String),

    /// The store could not be used at all (credentials, transport)
    #[error("{0}")]
    Store(String),

    /// A report found nothing to work on
    #[error("{0}")]
    NoData(String),

    /// The model call for the summary failed
    #[error("Summary generation failed: {0}")]
    Summary(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether feeding this error back to the model may produce a better query.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Synthesis(_) | Self::Validation(_))
    }
}
