//! The query service facade.
//!
//! Wires the synthesizer, a validator, the executor, the summary
//! synthesizer and the optional query log behind the four public
//! operations, plus the predefined [`ReportService`]. Every operation awaits
//! its collaborators one after another.

use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::models::{LegacyQueryResult, QueryRequest, QueryWithSummary, SynthesizedQuery};
use crate::prompts;
use crate::query_log::{QueryLog, QueryLogEntry};
use crate::reports::ReportService;
use crate::retry::generate_with_retry;
use crate::schema::SchemaReference;
use crate::summary::{SummarySynthesizer, DEFAULT_MAX_FIELD_CHARS, DEFAULT_SAMPLE_ROWS};
use crate::synthesizer::QuerySynthesizer;
use crate::validator::{QueryValidator, SchemaLint, StoreValidator};
use influx::{FluxStore, ResultRow};
use llm::ChatModel;
use std::sync::Arc;
use tracing::{info, warn};

/// Tunables for [`QueryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Used when a request carries no execution number.
    pub default_execution_number: String,
    pub max_attempts: usize,
    pub summary_sample_rows: usize,
    pub max_field_chars: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            default_execution_number: "1".to_string(),
            max_attempts: 3,
            summary_sample_rows: DEFAULT_SAMPLE_ROWS,
            max_field_chars: DEFAULT_MAX_FIELD_CHARS,
        }
    }
}

/// Natural language in, validated Flux, rows and a summary out.
pub struct QueryService {
    synthesizer: QuerySynthesizer,
    validator: Arc<dyn QueryValidator>,
    executor: QueryExecutor,
    summarizer: SummarySynthesizer,
    reports: ReportService,
    query_log: Option<Arc<QueryLog>>,
    options: ServiceOptions,
}

impl QueryService {
    /// Service validating with [`StoreValidator`] (schema lint plus dry run).
    pub fn new(
        model: Arc<dyn ChatModel>,
        store: Arc<dyn FluxStore>,
        schema: Arc<SchemaReference>,
        options: ServiceOptions,
    ) -> Self {
        let executor = QueryExecutor::new(store, options.default_execution_number.clone());
        let validator = StoreValidator::new(SchemaLint::new(schema.clone()), executor.clone());
        let summarizer = SummarySynthesizer::new(model.clone(), schema.clone())
            .with_executor(executor.clone())
            .with_limits(options.summary_sample_rows, options.max_field_chars);
        let reports = ReportService::new(executor.clone(), schema.clone());

        Self {
            synthesizer: QuerySynthesizer::new(model, schema),
            validator: Arc::new(validator),
            executor,
            summarizer,
            reports,
            query_log: None,
            options,
        }
    }

    /// Replace the default validator.
    pub fn with_validator(mut self, validator: Arc<dyn QueryValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_query_log(mut self, log: Arc<QueryLog>) -> Self {
        self.query_log = Some(log);
        self
    }

    /// Predefined reports over the same store.
    pub fn reports(&self) -> &ReportService {
        &self.reports
    }

    /// A request with the configured attempt budget.
    pub fn request(&self, user_query: impl Into<String>) -> QueryRequest {
        QueryRequest::new(user_query, self.options.max_attempts)
    }

    /// Synthesize and validate, without executing or summarizing.
    pub async fn generate_query_only(&self, request: &QueryRequest) -> SynthesizedQuery {
        generate_with_retry(&self.synthesizer, self.validator.as_ref(), request).await
    }

    /// Summarize rows the caller already holds.
    pub async fn generate_summary(
        &self,
        user_query: &str,
        flux_query: &str,
        rows: &[ResultRow],
        row_count: usize,
    ) -> Result<String> {
        self.summarizer
            .summarize(user_query, flux_query, rows, row_count, None)
            .await
    }

    /// Synthesize, validate, execute and summarize.
    ///
    /// A failed summary does not fail the result: `summary` then carries a
    /// short markdown note and `summary_error` the cause.
    pub async fn generate_query_with_summary(&self, request: &QueryRequest) -> QueryWithSummary {
        // the model only hears about a number the caller named
        let synthesized =
            generate_with_retry(&self.synthesizer, self.validator.as_ref(), request).await;
        let request = self.resolve(request);
        let execution_number = request.execution_number.as_deref();
        if !synthesized.success {
            let result = QueryWithSummary::failed(
                synthesized.query,
                synthesized.error,
                synthesized.attempts,
            );
            self.log(&request, &result.query, false, 0, result.attempts, result.error.clone())
                .await;
            return result;
        }

        let rows = match self.executor.execute(&synthesized.query, execution_number).await {
            Ok(rows) => rows,
            Err(e) => {
                let result = QueryWithSummary::failed(
                    synthesized.query,
                    Some(e.to_string()),
                    synthesized.attempts,
                );
                self.log(&request, &result.query, false, 0, result.attempts, result.error.clone())
                    .await;
                return result;
            }
        };

        let row_count = rows.len();
        let (summary, summary_error) = match self
            .summarizer
            .summarize(
                &request.user_query,
                &synthesized.query,
                &rows,
                row_count,
                execution_number,
            )
            .await
        {
            Ok(summary) => (summary, None),
            Err(e) => {
                warn!(error = %e, row_count, "Summary failed, returning data without it");
                let error = e.to_string();
                (prompts::summary_failed_markdown(row_count, &error), Some(error))
            }
        };

        info!(
            attempts = synthesized.attempts,
            row_count,
            "Query answered"
        );
        self.log(&request, &synthesized.query, true, row_count, synthesized.attempts, None)
            .await;

        QueryWithSummary {
            query: synthesized.query,
            success: true,
            data: Some(rows),
            summary: Some(summary),
            summary_error,
            error: None,
            attempts: synthesized.attempts,
            row_count,
        }
    }

    /// Synthesize, validate and execute, without a summary.
    pub async fn generate_flux_with_validation(&self, request: &QueryRequest) -> LegacyQueryResult {
        let synthesized =
            generate_with_retry(&self.synthesizer, self.validator.as_ref(), request).await;
        let request = self.resolve(request);
        let execution_number = request.execution_number.as_deref();

        let result = if !synthesized.success {
            LegacyQueryResult {
                query: synthesized.query,
                success: false,
                data: None,
                error: synthesized.error,
                attempts: synthesized.attempts,
                row_count: 0,
            }
        } else {
            match self.executor.execute(&synthesized.query, execution_number).await {
                Ok(rows) => LegacyQueryResult {
                    query: synthesized.query,
                    success: true,
                    row_count: rows.len(),
                    data: Some(rows),
                    error: None,
                    attempts: synthesized.attempts,
                },
                Err(e) => LegacyQueryResult {
                    query: synthesized.query,
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                    attempts: synthesized.attempts,
                    row_count: 0,
                },
            }
        };

        self.log(
            &request,
            &result.query,
            result.success,
            result.row_count,
            result.attempts,
            result.error.clone(),
        )
        .await;
        result
    }

    /// Fill in the default execution number for execution, summary and log.
    fn resolve(&self, request: &QueryRequest) -> QueryRequest {
        let mut resolved = request.clone();
        if resolved.execution_number.is_none() {
            resolved.execution_number = Some(self.options.default_execution_number.clone());
        }
        resolved
    }

    async fn log(
        &self,
        request: &QueryRequest,
        flux_query: &str,
        success: bool,
        row_count: usize,
        attempts: usize,
        error: Option<String>,
    ) {
        if let Some(log) = &self.query_log {
            let entry = QueryLogEntry::new(
                request.user_query.clone(),
                flux_query,
                request.execution_number.clone(),
            )
            .with_outcome(success, row_count, attempts, error);
            log.record(entry).await;
        }
    }
}
