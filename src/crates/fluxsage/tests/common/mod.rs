//! Common test utilities and setup

#![allow(dead_code)]

use async_trait::async_trait;
use fluxsage::{QueryLog, QueryService, SchemaReference, ServiceOptions};
use influx::{FluxStore, ResultRow, StoreError};
use llm::{ChatModel, ChatRequest, ChatResponse, LlmError};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Chat model double.
///
/// Query-synthesis calls are answered from a script in order. Summary calls
/// (recognized by their system prompt) are answered by echoing the row count
/// and the statuses the prompt's sample contains, or fail when configured to.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
    fail_summary: bool,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            requests: Mutex::new(Vec::new()),
            fail_summary: false,
        })
    }

    /// Script where `Err` entries become provider failures.
    pub fn with_results(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
            fail_summary: false,
        })
    }

    pub fn failing_summaries(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            requests: Mutex::new(Vec::new()),
            fail_summary: true,
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn synthesis_calls(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| !is_summary_request(r))
            .count()
    }

    pub fn summary_calls(&self) -> usize {
        self.requests().iter().filter(|r| is_summary_request(r)).count()
    }

    fn summarize(prompt: &str) -> String {
        let row_count = prompt
            .lines()
            .find_map(|l| l.strip_prefix("- Row Count: "))
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or("?");
        let statuses: Vec<&str> = ["PASS", "FAIL", "SKIP"]
            .into_iter()
            .filter(|s| prompt.contains(&format!("\"status\": \"{}\"", s)))
            .collect();
        format!(
            "## {} tests returned\n\nStatuses present: {}",
            row_count,
            statuses.join(", ")
        )
    }
}

fn is_summary_request(request: &ChatRequest) -> bool {
    request
        .messages
        .first()
        .map(|m| m.text().starts_with("You are a data analyst"))
        .unwrap_or(false)
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, request: ChatRequest) -> llm::Result<ChatResponse> {
        let summary = is_summary_request(&request);
        let system = request.messages.first().map(|m| m.text().to_string());
        self.requests.lock().unwrap().push(request);

        if summary {
            if self.fail_summary {
                return Err(LlmError::RateLimitExceeded("too many requests".into()));
            }
            return Ok(ChatResponse::from_text(Self::summarize(
                system.as_deref().unwrap_or_default(),
            )));
        }

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(ChatResponse::from_text(text)),
            Some(Err(e)) => Err(LlmError::ServiceUnavailable(e)),
            None => Err(LlmError::InvalidResponse("script exhausted".into())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// In-memory store: the first rule whose marker occurs in the query decides
/// the answer; anything else returns no rows.
#[derive(Default)]
pub struct InMemoryStore {
    rules: Vec<(String, Result<Vec<ResultRow>, String>)>,
    queries: Mutex<Vec<String>>,
    reject_token: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(mut self, marker: &str, rows: Vec<ResultRow>) -> Self {
        self.rules.push((marker.to_string(), Ok(rows)));
        self
    }

    pub fn failing(mut self, marker: &str, message: &str) -> Self {
        self.rules.push((marker.to_string(), Err(message.to_string())));
        self
    }

    /// Every query fails as an InfluxDB 401 would.
    pub fn rejecting_token() -> Self {
        Self {
            reject_token: true,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl FluxStore for InMemoryStore {
    async fn query(&self, flux: &str) -> influx::Result<Vec<ResultRow>> {
        self.queries.lock().unwrap().push(flux.to_string());
        if self.reject_token {
            return Err(StoreError::Unauthorized("unauthorized access".into()));
        }

        for (marker, outcome) in &self.rules {
            if flux.contains(marker.as_str()) {
                return outcome.clone().map_err(StoreError::Query);
            }
        }
        Ok(Vec::new())
    }
}

pub fn row(value: Value) -> ResultRow {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// Four failed tests from build 3573.
pub fn failed_rows() -> Vec<ResultRow> {
    ["LoginTest", "CheckoutTest", "SearchTest", "ProfileTest"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            row(json!({
                "testname": name,
                "status": "FAIL",
                "execution_number": "3573",
                "_value": 10.0 + i as f64,
            }))
        })
        .collect()
}

/// Flux a well-behaved model would write for "failed tests in build N".
pub fn failed_tests_query(execution: &str) -> String {
    format!(
        r#"from(bucket: "testexecution")
  |> range(start: 1970-01-01T00:00:00Z)
  |> filter(fn: (r) => r._measurement == "testmethod")
  |> filter(fn: (r) => r.execution_number == "{execution}")
  |> filter(fn: (r) => r.status == "FAIL")
  |> filter(fn: (r) => r._field == "duration")
  |> keep(columns: ["testname", "status", "execution_number", "_value"])"#
    )
}

/// The same query with a column the schema does not declare.
pub fn unknown_column_query(execution: &str) -> String {
    failed_tests_query(execution).replace("r.execution_number ==", "r.build_number ==")
}

pub fn service(model: Arc<ScriptedModel>, store: Arc<InMemoryStore>) -> QueryService {
    QueryService::new(
        model,
        store,
        Arc::new(SchemaReference::default()),
        ServiceOptions::default(),
    )
}

/// Service writing its query log into a fresh temp dir.
pub fn logged_service(
    model: Arc<ScriptedModel>,
    store: Arc<InMemoryStore>,
) -> (TempDir, Arc<QueryLog>, QueryService) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log = Arc::new(QueryLog::new(temp_dir.path().join("query_logs.json")));
    let service = service(model, store).with_query_log(log.clone());
    (temp_dir, log, service)
}
