//! Hands validated queries to the store.

use crate::error::{PipelineError, Result};
use influx::{FluxStore, ResultRow};
use std::sync::Arc;
use tracing::{debug, warn};

/// Placeholder a query may carry in place of a concrete execution number.
pub const EXECUTION_PLACEHOLDER: &str = "${execution_number}";

/// Runs Flux text against a [`FluxStore`] after placeholder substitution.
#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn FluxStore>,
    default_execution_number: String,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn FluxStore>, default_execution_number: impl Into<String>) -> Self {
        Self {
            store,
            default_execution_number: default_execution_number.into(),
        }
    }

    /// Substitute the execution placeholder, falling back to the configured
    /// default number.
    pub fn prepare(&self, query: &str, execution_number: Option<&str>) -> String {
        let number = execution_number.unwrap_or(&self.default_execution_number);
        query.replace(EXECUTION_PLACEHOLDER, number)
    }

    /// Execute and return rows in store order.
    pub async fn execute(
        &self,
        query: &str,
        execution_number: Option<&str>,
    ) -> Result<Vec<ResultRow>> {
        let prepared = self.prepare(query, execution_number);

        match self.store.query(&prepared).await {
            Ok(rows) => {
                debug!(rows = rows.len(), "Query executed");
                Ok(rows)
            }
            Err(e) if e.is_query_error() => {
                warn!(error = %e, "Query execution failed");
                Err(PipelineError::Execution(e.to_string()))
            }
            Err(e) => {
                warn!(error = %e, "Store unavailable");
                Err(PipelineError::Store(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use influx::StoreError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        queries: Mutex<Vec<String>>,
        fail_with: Option<String>,
        reject_token: bool,
    }

    #[async_trait]
    impl FluxStore for RecordingStore {
        async fn query(&self, flux: &str) -> influx::Result<Vec<ResultRow>> {
            self.queries.lock().unwrap().push(flux.to_string());
            if self.reject_token {
                return Err(StoreError::Unauthorized("invalid token".into()));
            }
            match &self.fail_with {
                Some(message) => Err(StoreError::Query(message.clone())),
                None => Ok(vec![ResultRow::new()]),
            }
        }
    }

    const QUERY: &str = r#"from(bucket: "testexecution") |> filter(fn: (r) => r.execution_number == "${execution_number}")"#;

    #[test]
    fn test_prepare_substitutes_placeholder() {
        let executor = QueryExecutor::new(Arc::new(RecordingStore::default()), "1");

        assert!(executor
            .prepare(QUERY, Some("3573"))
            .contains(r#"r.execution_number == "3573""#));
        assert!(executor
            .prepare(QUERY, None)
            .contains(r#"r.execution_number == "1""#));
    }

    #[tokio::test]
    async fn test_execute_sends_prepared_query() {
        let store = Arc::new(RecordingStore::default());
        let executor = QueryExecutor::new(store.clone(), "1");

        let rows = executor.execute(QUERY, Some("42")).await.unwrap();

        assert_eq!(rows.len(), 1);
        let sent = store.queries.lock().unwrap();
        assert!(sent[0].contains(r#""42""#));
        assert!(!sent[0].contains(EXECUTION_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_execute_maps_store_error() {
        let store = Arc::new(RecordingStore {
            fail_with: Some("runtime error: boom".to_string()),
            ..Default::default()
        });
        let executor = QueryExecutor::new(store, "1");

        let err = executor.execute(QUERY, None).await.unwrap_err();

        assert!(matches!(err, PipelineError::Execution(_)));
        assert_eq!(err.to_string(), "runtime error: boom");
    }

    #[tokio::test]
    async fn test_execute_separates_credential_errors() {
        let store = Arc::new(RecordingStore {
            reject_token: true,
            ..Default::default()
        });
        let executor = QueryExecutor::new(store, "1");

        let err = executor.execute(QUERY, None).await.unwrap_err();

        assert!(matches!(err, PipelineError::Store(_)));
        assert!(err.to_string().contains("invalid token"));
    }
}
