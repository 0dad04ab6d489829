//! Request and result records exchanged through the facade.

use influx::ResultRow;
use serde::{Deserialize, Serialize};

/// A natural-language request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub user_query: String,
    /// Build/execution identifier; substituted for `${execution_number}`.
    pub execution_number: Option<String>,
    /// Maximum synthesis attempts, clamped to at least 1.
    pub max_attempts: usize,
}

impl QueryRequest {
    pub fn new(user_query: impl Into<String>, max_attempts: usize) -> Self {
        Self {
            user_query: user_query.into(),
            execution_number: None,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_execution_number(mut self, execution_number: impl Into<String>) -> Self {
        self.execution_number = Some(execution_number.into());
        self
    }
}

/// Outcome of the generate-and-validate loop.
///
/// Constructed only through [`SynthesizedQuery::succeeded`] and
/// [`SynthesizedQuery::failed`]: success carries a non-empty query and no
/// error, failure carries a non-empty error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedQuery {
    pub query: String,
    pub success: bool,
    pub error: Option<String>,
    pub attempts: usize,
}

impl SynthesizedQuery {
    pub fn succeeded(query: impl Into<String>, attempts: usize) -> Self {
        Self {
            query: query.into(),
            success: true,
            error: None,
            attempts,
        }
    }

    pub fn failed(query: impl Into<String>, error: impl Into<String>, attempts: usize) -> Self {
        let error = error.into();
        Self {
            query: query.into(),
            success: false,
            error: Some(if error.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                error
            }),
            attempts,
        }
    }
}

/// Aggregate result of `generate_query_with_summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryWithSummary {
    pub query: String,
    pub success: bool,
    pub data: Option<Vec<ResultRow>>,
    pub summary: Option<String>,
    /// Set when rows were returned but the summary model call failed.
    pub summary_error: Option<String>,
    pub error: Option<String>,
    pub attempts: usize,
    pub row_count: usize,
}

impl QueryWithSummary {
    pub(crate) fn failed(query: String, error: Option<String>, attempts: usize) -> Self {
        Self {
            query,
            success: false,
            data: None,
            summary: None,
            summary_error: None,
            error,
            attempts,
            row_count: 0,
        }
    }
}

/// Result of the legacy `generate_flux_with_validation`: the recommended
/// result without the summary keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyQueryResult {
    pub query: String,
    pub success: bool,
    pub data: Option<Vec<ResultRow>>,
    pub error: Option<String>,
    pub attempts: usize,
    pub row_count: usize,
}

impl From<QueryWithSummary> for LegacyQueryResult {
    fn from(full: QueryWithSummary) -> Self {
        Self {
            query: full.query,
            success: full.success,
            data: full.data,
            error: full.error,
            attempts: full.attempts,
            row_count: full.row_count,
        }
    }
}
