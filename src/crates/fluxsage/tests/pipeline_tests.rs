//! End-to-end tests for the query service facade with scripted collaborators.

mod common;

use common::*;
use fluxsage::{LegacyQueryResult, QueryRequest, SchemaLint, SchemaReference};
use std::sync::Arc;

#[tokio::test]
async fn test_failed_tests_in_build_corrected_on_second_attempt() {
    let model = ScriptedModel::new(&[
        &unknown_column_query("3573"),
        &failed_tests_query("3573"),
    ]);
    let store = Arc::new(
        InMemoryStore::new().returning(r#"r.execution_number == "3573""#, failed_rows()),
    );
    let service = service(model.clone(), store.clone());

    let request = QueryRequest::new("show me failed tests in build 3573", 2);
    let result = service.generate_query_with_summary(&request).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.row_count, 4);
    assert_eq!(result.data.as_ref().map(Vec::len), Some(4));
    assert!(result.error.is_none());

    let summary = result.summary.expect("summary");
    assert!(summary.contains('4'));
    assert!(summary.contains("FAIL"));

    // the lint rejected attempt 1 before it reached the store
    assert!(store.queries().iter().all(|q| !q.contains("build_number")));
    assert_eq!(model.synthesis_calls(), 2);
    assert_eq!(model.summary_calls(), 1);
}

#[tokio::test]
async fn test_zero_rows_yield_no_results_summary_without_model_call() {
    let model = ScriptedModel::new(&[&failed_tests_query("9999")]);
    let store = Arc::new(InMemoryStore::new());
    let service = service(model.clone(), store);

    let result = service
        .generate_query_with_summary(&QueryRequest::new("failed tests in build 9999", 3))
        .await;

    assert!(result.success);
    assert_eq!(result.row_count, 0);
    assert_eq!(result.data, Some(Vec::new()));
    assert!(result.summary.unwrap().contains("No Results Found"));
    assert_eq!(model.summary_calls(), 0);
}

#[tokio::test]
async fn test_summary_failure_keeps_data() {
    let model = ScriptedModel::failing_summaries(&[&failed_tests_query("3573")]);
    let store = Arc::new(
        InMemoryStore::new().returning(r#"r.execution_number == "3573""#, failed_rows()),
    );
    let service = service(model, store);

    let result = service
        .generate_query_with_summary(&QueryRequest::new("failed tests in build 3573", 3))
        .await;

    assert!(result.success);
    assert_eq!(result.row_count, 4);
    let summary = result.summary.unwrap();
    assert!(summary.starts_with("**Summary Generation Failed**"));
    assert!(summary.contains("4 rows"));
    assert!(result.summary_error.unwrap().contains("too many requests"));
}

#[tokio::test]
async fn test_store_error_is_fed_back_to_model() {
    let broken = failed_tests_query("3573").replace("|> keep", "|> pivott() |> keep");
    let model = ScriptedModel::new(&[&broken, &failed_tests_query("3573")]);
    let store = Arc::new(
        InMemoryStore::new()
            .failing("pivott", "runtime error @7:6-7:12: undefined identifier pivott")
            .returning(r#"r.execution_number == "3573""#, failed_rows()),
    );
    let service = service(model.clone(), store);

    let result = service
        .generate_query_with_summary(&QueryRequest::new("failed tests in build 3573", 3))
        .await;

    assert!(result.success);
    assert_eq!(result.attempts, 2);

    let correction = &model.requests()[1].messages;
    assert_eq!(correction.len(), 4);
    assert!(correction[3].text().contains("undefined identifier pivott"));
}

#[tokio::test]
async fn test_attempt_budget_is_respected() {
    for budget in 1..=4 {
        let script: Vec<String> = (0..6).map(|_| unknown_column_query("1")).collect();
        let script: Vec<&str> = script.iter().map(String::as_str).collect();
        let model = ScriptedModel::new(&script);
        let store = Arc::new(InMemoryStore::new());
        let (_temp, log, service) = logged_service(model.clone(), store.clone());

        let result = service
            .generate_query_with_summary(&QueryRequest::new("failed tests", budget))
            .await;

        assert!(!result.success);
        assert_eq!(result.attempts, budget);
        assert_eq!(model.synthesis_calls(), budget);
        assert!(result.data.is_none());
        assert_eq!(result.row_count, 0);
        assert!(result.error.unwrap().contains("r.build_number"));
        assert!(store.queries().is_empty());

        let logged = log.recent(10).await;
        assert_eq!(logged.len(), 1);
        assert!(!logged[0].success);
        assert_eq!(logged[0].attempts, budget);
    }
}

#[tokio::test]
async fn test_unsupported_request_is_not_retried() {
    let model = ScriptedModel::new(&["ERROR: Query not supported", &failed_tests_query("1")]);
    let service = service(model.clone(), Arc::new(InMemoryStore::new()));

    let result = service
        .generate_query_only(&QueryRequest::new("what's the weather", 3))
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.error.as_deref(), Some("ERROR: Query not supported"));
    assert_eq!(model.synthesis_calls(), 1);
}

#[tokio::test]
async fn test_generation_errors_exhaust_budget() {
    let model = ScriptedModel::with_results(vec![Err("connection reset"), Err("connection reset")]);
    let service = service(model, Arc::new(InMemoryStore::new()));

    let result = service
        .generate_query_only(&QueryRequest::new("failed tests", 2))
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 2);
    assert!(result.error.unwrap().starts_with("Generation error: "));
}

#[tokio::test]
async fn test_generate_query_only_dry_runs_once() {
    let model = ScriptedModel::new(&[&failed_tests_query("3573")]);
    let store = Arc::new(InMemoryStore::new());
    let service = service(model.clone(), store.clone());

    let result = service
        .generate_query_only(&QueryRequest::new("failed tests in build 3573", 3))
        .await;

    assert!(result.success);
    assert_eq!(result.attempts, 1);
    assert_eq!(store.queries().len(), 1);
    assert_eq!(model.summary_calls(), 0);
}

#[tokio::test]
async fn test_execution_placeholder_uses_request_then_default() {
    let templated = failed_tests_query("${execution_number}");
    let model = ScriptedModel::new(&[&templated, &templated]);
    let store = Arc::new(InMemoryStore::new());
    let service = service(model, store.clone());

    service
        .generate_query_only(&QueryRequest::new("failed tests", 1).with_execution_number("42"))
        .await;
    service
        .generate_query_only(&QueryRequest::new("failed tests", 1))
        .await;

    let queries = store.queries();
    assert!(queries[0].contains(r#"r.execution_number == "42""#));
    assert!(queries[1].contains(r#"r.execution_number == "1""#));
    assert!(queries.iter().all(|q| !q.contains("${execution_number}")));
}

#[tokio::test]
async fn test_execution_failure_after_lint_only_validation() {
    let model = ScriptedModel::new(&[&failed_tests_query("3573")]);
    let store = Arc::new(InMemoryStore::new().failing("testmethod", "unauthorized access"));
    let service = service(model, store).with_validator(Arc::new(SchemaLint::new(Arc::new(
        SchemaReference::default(),
    ))));

    let result = service
        .generate_query_with_summary(&QueryRequest::new("failed tests in build 3573", 3))
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.error.as_deref(), Some("unauthorized access"));
    assert!(result.summary.is_none());
}

#[tokio::test]
async fn test_legacy_operation_matches_recommended_subset() {
    let model = ScriptedModel::new(&[&failed_tests_query("3573"), &failed_tests_query("3573")]);
    let store = Arc::new(
        InMemoryStore::new().returning(r#"r.execution_number == "3573""#, failed_rows()),
    );
    let (_temp, log, service) = logged_service(model.clone(), store);
    let request = QueryRequest::new("failed tests in build 3573", 3);

    let legacy = service.generate_flux_with_validation(&request).await;
    let full = service.generate_query_with_summary(&request).await;

    assert_eq!(legacy, LegacyQueryResult::from(full.clone()));

    let legacy_json = serde_json::to_value(&legacy).unwrap();
    let full_json = serde_json::to_value(&full).unwrap();
    let legacy_keys = legacy_json.as_object().unwrap();
    let full_keys = full_json.as_object().unwrap();
    assert!(legacy_keys.keys().all(|k| full_keys.contains_key(k)));
    assert!(!legacy_keys.contains_key("summary"));
    assert!(full_keys.contains_key("summary"));

    let stats = log.statistics().await;
    assert_eq!(stats.total_queries, 2);
    assert_eq!(stats.successful_queries, 2);
    assert_eq!(stats.total_rows_returned, 8);
    assert_eq!(log.search("BUILD 3573").await.len(), 2);
}

#[tokio::test]
async fn test_generate_summary_from_supplied_rows() {
    let model = ScriptedModel::new(&[]);
    let service = service(model.clone(), Arc::new(InMemoryStore::new()));

    let summary = service
        .generate_summary("failed tests", &failed_tests_query("3573"), &failed_rows(), 40)
        .await
        .unwrap();

    assert!(summary.starts_with("## 40 tests returned"));
    assert!(summary.contains("FAIL"));

    let empty = service
        .generate_summary("failed tests", "q", &[], 0)
        .await
        .unwrap();
    assert!(empty.contains("No Results Found"));
    assert_eq!(model.summary_calls(), 1);
}

#[tokio::test]
async fn test_model_hears_only_a_caller_execution_number() {
    let model = ScriptedModel::new(&[&failed_tests_query("3573"), &failed_tests_query("3573")]);
    let store = Arc::new(
        InMemoryStore::new().returning(r#"r.execution_number == "3573""#, failed_rows()),
    );
    let (_temp, log, service) = logged_service(model.clone(), store);

    service
        .generate_flux_with_validation(&QueryRequest::new(
            "list all failed tests across every build",
            1,
        ))
        .await;
    service
        .generate_flux_with_validation(
            &QueryRequest::new("failed tests", 1).with_execution_number("3573"),
        )
        .await;

    let requests = model.requests();
    let unnamed = requests[0].messages[1].text();
    assert_eq!(unnamed, "list all failed tests across every build");
    assert!(!unnamed.contains("execution number"));
    let named = requests[1].messages[1].text();
    assert!(named.contains("execution number"));
    assert!(named.contains("3573"));

    // the configured default still reaches the log
    let mut logged: Vec<Option<String>> = log
        .recent(10)
        .await
        .into_iter()
        .map(|entry| entry.execution_number)
        .collect();
    logged.sort();
    assert_eq!(logged, vec![Some("1".to_string()), Some("3573".to_string())]);
}

#[tokio::test]
async fn test_rejected_store_token_ends_the_loop() {
    let model = ScriptedModel::new(&[&failed_tests_query("3573"), &failed_tests_query("3573")]);
    let store = Arc::new(InMemoryStore::rejecting_token());
    let service = service(model.clone(), store.clone());

    let result = service
        .generate_query_with_summary(&QueryRequest::new("failed tests in build 3573", 3))
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 1);
    assert!(result.error.unwrap().contains("Unauthorized"));
    assert_eq!(model.synthesis_calls(), 1);
    assert_eq!(store.queries().len(), 1);
}
