//! Error types for the Flux store client.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors returned while running a Flux query.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure (connection refused, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Token rejected by the server.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The server rejected or failed to run the query.
    ///
    /// Covers compile errors, runtime errors and in-band error tables.
    #[error("{0}")]
    Query(String),

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Client misconfiguration (missing URL, token or org).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the error came from the query text itself rather than the
    /// transport or credentials.
    pub fn is_query_error(&self) -> bool {
        matches!(self, StoreError::Query(_))
    }
}

/// Reduce a verbose Flux error to its `runtime error` line when present.
///
/// Flux runtime failures arrive wrapped in several lines of context; only the
/// line naming the failure is useful to a model asked to fix the query.
pub fn reduce_error_message(message: &str) -> String {
    message
        .lines()
        .find(|line| line.to_lowercase().contains("runtime error"))
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| message.trim().to_string())
}
