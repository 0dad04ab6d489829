//! Predefined reports through the query service, without a model call.

mod common;

use common::*;
use fluxsage::{detect_report, FailureCategory, PipelineError, Report, ReportRequest};
use serde_json::json;
use std::sync::Arc;

fn executions(numbers: &[&str]) -> Vec<influx::ResultRow> {
    numbers.iter().map(|n| row(json!({ "_value": n }))).collect()
}

#[tokio::test]
async fn test_build_question_routes_to_latest_build_report() {
    let model = ScriptedModel::new(&[]);
    let store = Arc::new(
        InMemoryStore::new()
            .returning("distinct(", executions(&["999", "1000"]))
            .returning(
                r#"r.execution_number == "1000""#,
                vec![
                    row(json!({"testname": "LoginTest", "status": "FAIL", "failure_stack": "NoSuchElementException: #login"})),
                    row(json!({"testname": "CartTest", "status": "SKIP"})),
                ],
            ),
    );
    let service = service(model.clone(), store.clone());

    let request = detect_report("give me the latest build summary").expect("report");
    let report = service.reports().run(&request).await.unwrap();

    let Report::Build(summary) = report else {
        panic!("expected a build report");
    };
    assert_eq!(summary.execution_number, "1000");
    assert_eq!(summary.scripts.len(), 2);
    assert!(summary.failure_categories[&FailureCategory::ElementNotFound].contains("LoginTest"));
    assert!(summary.markdown.contains("- CartTest (SKIP)"));
    assert_eq!(model.requests().len(), 0);
    assert_eq!(store.queries().len(), 2);
}

#[tokio::test]
async fn test_comparison_between_named_builds() {
    let store = Arc::new(InMemoryStore::new().returning(
        "join(",
        vec![row(json!({
            "testname": "SearchTest",
            "previous_status": "PASS",
            "current_status": "SKIP",
            "current_failure_stack": ""
        }))],
    ));
    let service = service(ScriptedModel::new(&[]), store.clone());

    let request = detect_report("compare build 3573 vs 3572").expect("report");
    let Report::Comparison(comparison) = service.reports().run(&request).await.unwrap() else {
        panic!("expected a comparison");
    };

    assert_eq!(comparison.previous, "3572");
    assert_eq!(comparison.current, "3573");
    assert_eq!(comparison.regressions(), 1);
    assert!(comparison.markdown.contains("**Regressions (PASS → FAIL/SKIP):** 1"));
    assert_eq!(store.queries().len(), 1);
}

#[tokio::test]
async fn test_reports_without_data() {
    let service = service(ScriptedModel::new(&[]), Arc::new(InMemoryStore::new()));

    let err = service
        .reports()
        .run(&ReportRequest::Comparison(None, None))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoData(_)));

    let Report::Flaky(flaky) = service.reports().run(&ReportRequest::Flaky).await.unwrap() else {
        panic!("expected a flaky report");
    };
    assert!(flaky.scripts.is_empty());
    assert!(flaky.markdown.contains("No flaky scripts found"));
}

#[tokio::test]
async fn test_query_errors_surface_as_execution_errors() {
    let store = Arc::new(InMemoryStore::new().failing("testmethod", "error @3:6: bad pivot"));
    let service = service(ScriptedModel::new(&[]), store);

    let err = service
        .reports()
        .run(&ReportRequest::Script("LoginTest".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Execution(_)));
}
