//! Result summaries
//!
//! Turns query rows into a markdown summary through the chat model. Only a
//! bounded sample goes into the prompt, large text fields are truncated, and
//! a small statistical profile of all rows is computed locally so the model
//! does not have to count.
//!
//! When the sample shows failures but carries no stack traces, the
//! synthesizer can fetch `failure_stack` for a handful of failing tests
//! before summarizing. That lookup is best effort.

use crate::error::{PipelineError, Result};
use crate::executor::QueryExecutor;
use crate::failure::{self, FailureCategory};
use crate::prompts::{self, SummaryPromptInput};
use crate::schema::SchemaReference;
use influx::ResultRow;
use llm::{ChatModel, ChatRequest, Message};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of rows placed in the prompt.
pub const DEFAULT_SAMPLE_ROWS: usize = 100;

/// Default character cap for large text fields.
pub const DEFAULT_MAX_FIELD_CHARS: usize = 1500;

/// Appended to truncated text.
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Failing tests looked up during enrichment.
const ENRICH_MAX_TESTS: usize = 5;

/// Rows inspected for a `FAIL` status before enrichment is considered.
const ENRICH_CHECK_ROWS: usize = 5;

/// Rows scanned for failing test names.
const ENRICH_SCAN_ROWS: usize = 10;

const SUMMARY_TEMPERATURE: f32 = 0.3;

const NUMERIC_COLUMNS: &[&str] = &["duration", "_value"];

/// Produces markdown summaries of query results.
#[derive(Clone)]
pub struct SummarySynthesizer {
    model: Arc<dyn ChatModel>,
    schema: Arc<SchemaReference>,
    executor: Option<QueryExecutor>,
    sample_rows: usize,
    max_field_chars: usize,
}

impl SummarySynthesizer {
    pub fn new(model: Arc<dyn ChatModel>, schema: Arc<SchemaReference>) -> Self {
        Self {
            model,
            schema,
            executor: None,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            max_field_chars: DEFAULT_MAX_FIELD_CHARS,
        }
    }

    /// Enable failure-stack enrichment through `executor`.
    pub fn with_executor(mut self, executor: QueryExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_limits(mut self, sample_rows: usize, max_field_chars: usize) -> Self {
        self.sample_rows = sample_rows.max(1);
        self.max_field_chars = max_field_chars;
        self
    }

    /// Summarize `rows`. `row_count` is reported as the total even when only
    /// a sample of `rows` reaches the model.
    ///
    /// An empty result yields fixed "No Results Found" markdown without
    /// calling the model.
    pub async fn summarize(
        &self,
        user_query: &str,
        flux_query: &str,
        rows: &[ResultRow],
        row_count: usize,
        execution_number: Option<&str>,
    ) -> Result<String> {
        if rows.is_empty() {
            debug!("Empty result, skipping summary model call");
            return Ok(prompts::no_results_markdown());
        }

        let mut sample: Vec<ResultRow> = rows.iter().take(self.sample_rows).cloned().collect();
        self.enrich(&mut sample, execution_number).await;

        let data_profile = data_profile(rows, &sample, row_count);
        self.truncate_large_fields(&mut sample);
        let sample_json = serde_json::to_string_pretty(&sample)?;

        let system = prompts::summary_system_prompt(&SummaryPromptInput {
            user_query,
            flux_query,
            row_count,
            sample_size: sample.len(),
            data_profile: &data_profile,
            sample_json: &sample_json,
        });
        let request = ChatRequest::new(vec![
            Message::system(system),
            Message::human(prompts::SUMMARY_USER_PROMPT),
        ])
        .with_temperature(SUMMARY_TEMPERATURE);

        let response = self
            .model
            .chat(request)
            .await
            .map_err(|e| PipelineError::Summary(e.to_string()))?;

        let summary = response.text().trim();
        if summary.is_empty() {
            return Err(PipelineError::Summary(
                "model returned an empty summary".to_string(),
            ));
        }

        debug!(row_count, sample = sample.len(), "Summary generated");
        Ok(summary.to_string())
    }

    fn truncate_large_fields(&self, sample: &mut [ResultRow]) {
        let large: Vec<&str> = self.schema.large_fields().collect();
        for row in sample.iter_mut() {
            for name in &large {
                if let Some(Value::String(text)) = row.get_mut(*name) {
                    if text.chars().count() > self.max_field_chars {
                        *text = truncate_chars(text, self.max_field_chars);
                    }
                }
            }
        }
    }

    /// Merge `failure_stack` into failing rows when the sample lacks it.
    async fn enrich(&self, sample: &mut [ResultRow], execution_number: Option<&str>) {
        let (Some(executor), Some(number)) = (&self.executor, execution_number) else {
            return;
        };

        let has_failures = sample
            .iter()
            .take(ENRICH_CHECK_ROWS)
            .any(|row| str_column(row, "status") == Some("FAIL"));
        if !has_failures || sample.iter().any(|row| row.contains_key("failure_stack")) {
            return;
        }

        let mut testnames: Vec<&str> = Vec::new();
        for row in sample.iter().take(ENRICH_SCAN_ROWS) {
            if let Some(name) = str_column(row, "testname") {
                if !testnames.contains(&name) && testnames.len() < ENRICH_MAX_TESTS {
                    testnames.push(name);
                }
            }
        }
        if testnames.is_empty() {
            return;
        }

        let query = failure_stack_query(&self.schema, number, &testnames);
        let stacks: HashMap<String, String> = match executor.execute(&query, Some(number)).await {
            Ok(found) => found
                .iter()
                .filter_map(|row| {
                    let name = str_column(row, "testname")?;
                    let stack = str_column(row, "_value")?;
                    Some((name.to_string(), stack.to_string()))
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failure stack lookup failed, summarizing without it");
                return;
            }
        };

        debug!(found = stacks.len(), "Merged failure stacks into sample");
        for row in sample.iter_mut() {
            let stack = str_column(row, "testname").and_then(|name| stacks.get(name)).cloned();
            if let Some(stack) = stack {
                row.insert("failure_stack".to_string(), Value::String(stack));
            }
        }
    }
}

/// At most `max` characters of `text`, with [`TRUNCATION_MARKER`] appended
/// when anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Plain-text profile of the result. Status breakdown, numeric ranges and
/// distinct test names cover every row in `rows`; failure categories cover
/// the (possibly enriched) `sample`, the only rows carrying stacks.
pub fn data_profile(rows: &[ResultRow], sample: &[ResultRow], row_count: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "- Rows: {} total, {} in sample", row_count, sample.len());

    let basis = if rows.len() == row_count {
        "all rows".to_string()
    } else {
        format!("{} supplied rows", rows.len())
    };

    let mut statuses: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        if let Some(status) = str_column(row, "status") {
            *statuses.entry(status).or_default() += 1;
        }
    }
    if !statuses.is_empty() {
        let total = rows.len() as f64;
        let parts: Vec<String> = statuses
            .iter()
            .map(|(status, n)| format!("{} {} ({:.1}%)", status, n, *n as f64 * 100.0 / total))
            .collect();
        let _ = writeln!(out, "- Status ({}): {}", basis, parts.join(", "));
    }

    for column in NUMERIC_COLUMNS {
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|row| row.get(*column).and_then(Value::as_f64))
            .collect();
        if values.is_empty() {
            continue;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        let _ = writeln!(
            out,
            "- {}: avg {:.2}, min {:.2}, max {:.2} over {} values",
            column,
            avg,
            min,
            max,
            values.len()
        );
    }

    let mut categories: BTreeMap<FailureCategory, usize> = BTreeMap::new();
    for row in sample {
        let text = str_column(row, "failure_stack").or_else(|| str_column(row, "failure_message"));
        if let Some(text) = text {
            for category in failure::categorize(text) {
                *categories.entry(category).or_default() += 1;
            }
        }
    }
    if !categories.is_empty() {
        let parts: Vec<String> = categories
            .iter()
            .map(|(category, n)| format!("{} ({}) {}", category, category.description(), n))
            .collect();
        let _ = writeln!(out, "- Failure categories (sample): {}", parts.join(", "));
    }

    let distinct_tests = {
        let mut names: Vec<&str> = rows.iter().filter_map(|r| str_column(r, "testname")).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    };
    if distinct_tests > 0 {
        let _ = writeln!(out, "- Distinct testnames ({}): {}", basis, distinct_tests);
    }

    out.trim_end().to_string()
}

fn str_column<'a>(row: &'a ResultRow, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

/// Flux fetching `failure_stack` values of failing tests in one execution.
fn failure_stack_query(schema: &SchemaReference, execution_number: &str, testnames: &[&str]) -> String {
    let names: Vec<String> = testnames
        .iter()
        .map(|name| format!("r.testname == {}", flux_string(name)))
        .collect();

    format!(
        r#"from(bucket: {bucket})
  |> range(start: 1970-01-01T00:00:00Z)
  |> filter(fn: (r) => r._measurement == {measurement})
  |> filter(fn: (r) => r.execution_number == {execution})
  |> filter(fn: (r) => {names})
  |> filter(fn: (r) => r.status == "FAIL")
  |> filter(fn: (r) => r._field == "failure_stack")
  |> keep(columns: ["testname", "_value"])"#,
        bucket = flux_string(&schema.bucket),
        measurement = flux_string(&schema.measurement),
        execution = flux_string(execution_number),
        names = names.join(" or "),
    )
}

pub(crate) fn flux_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use influx::{FluxStore, StoreError};
    use llm::{ChatResponse, LlmError};
    use serde_json::json;
    use std::sync::Mutex;

    struct CapturingModel {
        reply: Option<String>,
        prompts: Mutex<Vec<ChatRequest>>,
    }

    impl CapturingModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn system_prompt(&self) -> String {
            self.prompts.lock().unwrap()[0].messages[0].text().to_string()
        }
    }

    #[async_trait]
    impl ChatModel for CapturingModel {
        async fn chat(&self, request: ChatRequest) -> llm::Result<ChatResponse> {
            self.prompts.lock().unwrap().push(request);
            match &self.reply {
                Some(text) => Ok(ChatResponse::from_text(text.clone())),
                None => Err(LlmError::RateLimitExceeded("slow down".into())),
            }
        }

        fn model_name(&self) -> &str {
            "capturing"
        }
    }

    struct StackStore {
        queries: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl FluxStore for StackStore {
        async fn query(&self, flux: &str) -> influx::Result<Vec<ResultRow>> {
            self.queries.lock().unwrap().push(flux.to_string());
            if self.fail {
                return Err(StoreError::Query("boom".into()));
            }
            Ok(vec![row(json!({"testname": "LoginTest", "_value": "TimeoutException: waited 30s"}))])
        }
    }

    fn row(value: Value) -> ResultRow {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn failing_rows() -> Vec<ResultRow> {
        vec![
            row(json!({"testname": "LoginTest", "status": "FAIL", "_value": 12.5})),
            row(json!({"testname": "CartTest", "status": "PASS", "_value": 3.0})),
        ]
    }

    fn synthesizer(model: Arc<CapturingModel>) -> SummarySynthesizer {
        SummarySynthesizer::new(model, Arc::new(SchemaReference::default()))
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
        assert_eq!(truncate_chars("ééééé", 2), format!("éé{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_data_profile() {
        let sample = vec![
            row(json!({"testname": "A", "status": "FAIL", "duration": 10.0, "failure_message": "AssertionError: expected 1"})),
            row(json!({"testname": "A", "status": "PASS", "duration": 30.0})),
            row(json!({"testname": "B", "status": "FAIL", "duration": 20.0, "failure_message": "Timed out"})),
            row(json!({"testname": "C", "status": "SKIP", "duration": null})),
        ];

        let profile = data_profile(&sample, &sample, 4);

        assert!(profile.contains("- Rows: 4 total, 4 in sample"));
        assert!(profile.contains("- Status (all rows): FAIL 2 (50.0%), PASS 1 (25.0%), SKIP 1 (25.0%)"));
        assert!(profile.contains("- duration: avg 20.00, min 10.00, max 30.00 over 3 values"));
        assert!(profile.contains("timeout (Timeout issues) 1"));
        assert!(profile.contains("assertion (Assertion failures) 1"));
        assert!(profile.contains("Distinct testnames (all rows): 3"));
    }

    #[test]
    fn test_data_profile_counts_beyond_the_sample() {
        // 150 rows: the first 100 pass, the last 50 fail
        let rows: Vec<ResultRow> = (0..150)
            .map(|i| {
                let status = if i < 100 { "PASS" } else { "FAIL" };
                row(json!({"testname": format!("T{}", i % 30), "status": status, "duration": i as f64}))
            })
            .collect();
        let sample = &rows[..DEFAULT_SAMPLE_ROWS];

        let profile = data_profile(&rows, sample, 150);

        assert!(profile.contains("- Rows: 150 total, 100 in sample"));
        assert!(profile.contains("- Status (all rows): FAIL 50 (33.3%), PASS 100 (66.7%)"));
        assert!(profile.contains("- duration: avg 74.50, min 0.00, max 149.00 over 150 values"));
        assert!(profile.contains("Distinct testnames (all rows): 30"));

        let partial = data_profile(sample, sample, 150);
        assert!(partial.contains("- Status (100 supplied rows): PASS 100 (100.0%)"));
    }

    #[tokio::test]
    async fn test_empty_rows_skip_model() {
        let model = CapturingModel::replying("unused");
        let summary = synthesizer(model.clone())
            .summarize("failed tests", "from(bucket: \"b\")", &[], 0, None)
            .await
            .unwrap();

        assert!(summary.contains("No Results Found"));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_uses_sample_and_total() {
        let model = CapturingModel::replying("  ## 2 tests  \n");
        let rows: Vec<ResultRow> = (0..5)
            .map(|i| row(json!({"testname": format!("T{i}"), "status": "PASS"})))
            .collect();

        let summary = synthesizer(model.clone())
            .with_limits(3, 1500)
            .summarize("all tests", "q", &rows, 500, None)
            .await
            .unwrap();

        assert_eq!(summary, "## 2 tests");
        let prompt = model.system_prompt();
        assert!(prompt.contains("Row Count: 500"));
        assert!(prompt.contains("first 3 rows"));
        assert!(prompt.contains("\"T2\""));
        assert!(!prompt.contains("\"T3\""));
        assert_eq!(model.prompts.lock().unwrap()[0].config.temperature, Some(0.3));
    }

    #[tokio::test]
    async fn test_large_fields_truncated_in_prompt() {
        let model = CapturingModel::replying("ok");
        let rows = vec![row(json!({"testname": "A", "failure_stack": "x".repeat(50)}))];

        synthesizer(model.clone())
            .with_limits(100, 10)
            .summarize("why", "q", &rows, 1, None)
            .await
            .unwrap();

        let prompt = model.system_prompt();
        assert!(prompt.contains(&format!("{}{}", "x".repeat(10), TRUNCATION_MARKER)));
        assert!(!prompt.contains(&"x".repeat(11)));
    }

    #[tokio::test]
    async fn test_model_failure_is_summary_error() {
        let err = synthesizer(CapturingModel::failing())
            .summarize("q", "q", &failing_rows(), 2, None)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Summary(_)));
    }

    #[tokio::test]
    async fn test_enrichment_merges_failure_stack() {
        let model = CapturingModel::replying("ok");
        let store = Arc::new(StackStore {
            queries: Mutex::new(Vec::new()),
            fail: false,
        });
        let executor = QueryExecutor::new(store.clone(), "1");

        synthesizer(model.clone())
            .with_executor(executor)
            .summarize("failed tests", "q", &failing_rows(), 2, Some("3573"))
            .await
            .unwrap();

        let queries = store.queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains(r#"r.execution_number == "3573""#));
        assert!(queries[0].contains(r#"r.testname == "LoginTest" or r.testname == "CartTest""#));

        let prompt = model.system_prompt();
        assert!(prompt.contains("TimeoutException: waited 30s"));
        assert!(prompt.contains("timeout (Timeout issues)"));
    }

    #[tokio::test]
    async fn test_enrichment_needs_execution_number_and_tolerates_errors() {
        let store = Arc::new(StackStore {
            queries: Mutex::new(Vec::new()),
            fail: true,
        });
        let executor = QueryExecutor::new(store.clone(), "1");
        let summarizer = synthesizer(CapturingModel::replying("ok")).with_executor(executor);

        summarizer
            .summarize("failed tests", "q", &failing_rows(), 2, None)
            .await
            .unwrap();
        assert!(store.queries.lock().unwrap().is_empty());

        let summary = summarizer
            .summarize("failed tests", "q", &failing_rows(), 2, Some("3573"))
            .await
            .unwrap();
        assert_eq!(summary, "ok");
        assert_eq!(store.queries.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_flux_string_escapes() {
        assert_eq!(flux_string(r#"a"b\c"#), r#""a\"b\\c""#);
    }
}
