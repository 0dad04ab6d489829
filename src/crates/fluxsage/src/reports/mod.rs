//! Predefined reports
//!
//! Fixed queries for the questions asked most often (what broke in a build,
//! how a test has been doing, what is flaky, what changed between builds).
//! They run through the [`QueryExecutor`] without a model call and are
//! rendered to markdown locally, grouping failure stacks with
//! [`failure::categorize`].

mod detect;
pub mod queries;

pub use detect::{detect_report, ReportRequest, DEFAULT_TOP_LIMIT};

use crate::error::{PipelineError, Result};
use crate::executor::QueryExecutor;
use crate::failure::{self, FailureCategory};
use crate::schema::SchemaReference;
use crate::summary::truncate_chars;
use influx::ResultRow;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tests listed by name in the build report.
const BUILD_LISTED: usize = 20;
/// Test names listed per failure category.
const CATEGORY_LISTED: usize = 10;
/// Failures shown in the script report.
const RECENT_FAILURES: usize = 5;
/// Flaky tests shown in the flaky report.
const FLAKY_LISTED: usize = 10;
/// Test names listed per status transition.
const CHANGE_LISTED: usize = 5;
/// Characters of a failure stack kept in the script report.
const STACK_PREVIEW_CHARS: usize = 500;

/// A failed or skipped test of one build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptStatus {
    pub testname: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSummary {
    pub execution_number: String,
    pub scripts: Vec<ScriptStatus>,
    /// Failing test names per category.
    pub failure_categories: BTreeMap<FailureCategory, BTreeSet<String>>,
    pub markdown: String,
}

/// One failed run in a script report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureDetail {
    pub execution_number: String,
    pub timestamp: String,
    pub categories: Vec<FailureCategory>,
    pub failure_stack: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptSummary {
    pub script_name: String,
    pub total_executions: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failure_reasons: BTreeMap<FailureCategory, usize>,
    pub recent_failures: Vec<FailureDetail>,
    pub executions: Vec<ResultRow>,
    pub markdown: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlakyScript {
    pub testname: String,
    pub pass_count: u64,
    pub fail_count: u64,
    pub total: u64,
    pub flakiness_score: f64,
    pub main_reason: FailureCategory,
    pub failure_categories: BTreeMap<FailureCategory, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlakySummary {
    pub scripts: Vec<FlakyScript>,
    pub markdown: String,
}

/// A ranking returned as rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopScripts {
    pub limit: usize,
    pub rows: Vec<ResultRow>,
}

/// A test whose status differs between two builds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub testname: String,
    pub previous_status: String,
    pub current_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_stack: Option<String>,
}

impl StatusChange {
    /// A test that passed before and now fails or is skipped.
    pub fn is_regression(&self) -> bool {
        self.previous_status == "PASS" && matches!(self.current_status.as_str(), "FAIL" | "SKIP")
    }

    fn transition(&self) -> String {
        format!("{} → {}", self.previous_status, self.current_status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildComparison {
    pub previous: String,
    pub current: String,
    pub changes: Vec<StatusChange>,
    /// Failing test names of the current build per category.
    pub failure_categories: BTreeMap<FailureCategory, BTreeSet<String>>,
    pub markdown: String,
}

impl BuildComparison {
    pub fn regressions(&self) -> usize {
        self.changes.iter().filter(|c| c.is_regression()).count()
    }
}

/// Outcome of [`ReportService::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum Report {
    Build(BuildSummary),
    Script(ScriptSummary),
    Flaky(FlakySummary),
    TopFlaky(TopScripts),
    TopFailing(TopScripts),
    Comparison(BuildComparison),
}

impl Report {
    pub fn title(&self) -> String {
        match self {
            Report::Build(r) => format!("Build Summary for Execution #{}", r.execution_number),
            Report::Script(r) => format!("Script Summary for {}", r.script_name),
            Report::Flaky(_) => "Flaky Scripts Summary".to_string(),
            Report::TopFlaky(r) => format!("Top {} Flaky Scripts", r.limit),
            Report::TopFailing(r) => format!("Top {} Failing Scripts", r.limit),
            Report::Comparison(r) => format!("Build Comparison: {} vs {}", r.previous, r.current),
        }
    }

    /// Rendered markdown; the rankings are plain tables and have none.
    pub fn markdown(&self) -> Option<&str> {
        match self {
            Report::Build(r) => Some(&r.markdown),
            Report::Script(r) => Some(&r.markdown),
            Report::Flaky(r) => Some(&r.markdown),
            Report::Comparison(r) => Some(&r.markdown),
            Report::TopFlaky(_) | Report::TopFailing(_) => None,
        }
    }

    /// Rows worth showing as a table.
    pub fn rows(&self) -> Option<&[ResultRow]> {
        match self {
            Report::Script(r) => Some(&r.executions),
            Report::TopFlaky(r) | Report::TopFailing(r) => Some(&r.rows),
            _ => None,
        }
    }
}

/// Runs the predefined reports against the store.
#[derive(Clone)]
pub struct ReportService {
    executor: QueryExecutor,
    schema: Arc<SchemaReference>,
}

impl ReportService {
    pub fn new(executor: QueryExecutor, schema: Arc<SchemaReference>) -> Self {
        Self { executor, schema }
    }

    pub async fn run(&self, request: &ReportRequest) -> Result<Report> {
        info!(?request, "Running report");
        Ok(match request {
            ReportRequest::Build(number) => Report::Build(self.build_summary(number.as_deref()).await?),
            ReportRequest::Script(name) => Report::Script(self.script_summary(name).await?),
            ReportRequest::Flaky => Report::Flaky(self.flaky_summary().await?),
            ReportRequest::TopFlaky(limit) => Report::TopFlaky(self.top_flaky(*limit).await?),
            ReportRequest::TopFailing(limit) => Report::TopFailing(self.top_failing(*limit).await?),
            ReportRequest::Comparison(previous, current) => Report::Comparison(
                self.compare_builds(previous.as_deref(), current.as_deref())
                    .await?,
            ),
        })
    }

    /// Every execution number in the store, highest first. Numbers compare
    /// numerically when both parse.
    pub async fn execution_numbers(&self) -> Result<Vec<String>> {
        let rows = self.run_query(&queries::execution_numbers(&self.schema)).await?;

        let mut numbers: Vec<String> = rows
            .iter()
            .filter_map(|row| text(row, "_value").or_else(|| text(row, "execution_number")))
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        numbers.sort_by(|a, b| compare_execution_numbers(b, a));
        numbers.dedup();
        Ok(numbers)
    }

    /// The highest execution number, if any data exists.
    pub async fn latest_execution_number(&self) -> Result<Option<String>> {
        Ok(self.execution_numbers().await?.into_iter().next())
    }

    /// Failed and skipped tests of a build, grouped by failure category.
    /// `None` reports on the latest build.
    pub async fn build_summary(&self, execution_number: Option<&str>) -> Result<BuildSummary> {
        let execution_number = match execution_number {
            Some(number) => number.to_string(),
            None => self
                .latest_execution_number()
                .await?
                .ok_or_else(|| PipelineError::NoData("No execution data found".to_string()))?,
        };

        let rows = self
            .run_query(&queries::build_failures(&self.schema, &execution_number))
            .await?;

        let scripts: Vec<ScriptStatus> = rows
            .iter()
            .map(|row| ScriptStatus {
                testname: text(row, "testname").unwrap_or("Unknown").to_string(),
                status: text(row, "status").unwrap_or("UNKNOWN").to_string(),
                failure_stack: non_empty(row, "failure_stack"),
            })
            .collect();

        let mut failure_categories: BTreeMap<FailureCategory, BTreeSet<String>> = BTreeMap::new();
        for script in &scripts {
            if let (Some(stack), "FAIL") = (&script.failure_stack, script.status.as_str()) {
                for category in failure::categorize(stack) {
                    failure_categories
                        .entry(category)
                        .or_default()
                        .insert(script.testname.clone());
                }
            }
        }

        let markdown = build_markdown(&execution_number, &scripts, &failure_categories);
        debug!(execution_number = %execution_number, scripts = scripts.len(), "Build summary ready");
        Ok(BuildSummary {
            execution_number,
            scripts,
            failure_categories,
            markdown,
        })
    }

    /// Run history and failure reasons of the tests whose name contains
    /// `script`.
    pub async fn script_summary(&self, script: &str) -> Result<ScriptSummary> {
        let executions = self
            .run_query(&queries::script_runs(&self.schema, script))
            .await?;

        let count = |status: &str| {
            executions
                .iter()
                .filter(|row| text(row, "status") == Some(status))
                .count()
        };
        let (passed, failed, skipped) = (count("PASS"), count("FAIL"), count("SKIP"));

        let mut failure_reasons: BTreeMap<FailureCategory, usize> = BTreeMap::new();
        let mut recent_failures = Vec::new();
        for row in executions.iter().filter(|row| text(row, "status") == Some("FAIL")) {
            let Some(stack) = non_empty(row, "failure_stack") else {
                continue;
            };
            let categories = failure::categorize(&stack);
            for category in &categories {
                *failure_reasons.entry(*category).or_default() += 1;
            }
            recent_failures.push(FailureDetail {
                execution_number: text(row, "execution_number").unwrap_or("Unknown").to_string(),
                timestamp: text(row, "_time").unwrap_or("Unknown").to_string(),
                categories,
                failure_stack: truncate_chars(&stack, STACK_PREVIEW_CHARS),
            });
        }

        let mut summary = ScriptSummary {
            script_name: script.to_string(),
            total_executions: executions.len(),
            passed,
            failed,
            skipped,
            failure_reasons,
            recent_failures,
            executions,
            markdown: String::new(),
        };
        summary.markdown = script_markdown(&summary);
        Ok(summary)
    }

    /// Flaky tests of the recent window with the failure category seen most.
    pub async fn flaky_summary(&self) -> Result<FlakySummary> {
        let rows = self
            .run_query(&queries::flaky_scripts(&self.schema, None))
            .await?;

        // stacks only sharpen the report; it still stands without them
        let stacks = match self
            .run_query(&queries::recent_failure_stacks(&self.schema))
            .await
        {
            Ok(stacks) => stacks,
            Err(e) => {
                warn!(error = %e, "Failure stack lookup failed, reporting without reasons");
                Vec::new()
            }
        };
        let mut stacks_by_test: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for row in &stacks {
            if let (Some(name), Some(stack)) = (text(row, "testname"), text(row, "failure_stack")) {
                if !stack.trim().is_empty() {
                    stacks_by_test.entry(name).or_default().push(stack);
                }
            }
        }

        let scripts: Vec<FlakyScript> = rows
            .iter()
            .map(|row| {
                let testname = text(row, "testname").unwrap_or("Unknown").to_string();
                let mut failure_categories: BTreeMap<FailureCategory, usize> = BTreeMap::new();
                for stack in stacks_by_test.get(testname.as_str()).into_iter().flatten() {
                    for category in failure::categorize(stack) {
                        *failure_categories.entry(category).or_default() += 1;
                    }
                }
                FlakyScript {
                    pass_count: count_column(row, "pass_count"),
                    fail_count: count_column(row, "fail_count"),
                    total: count_column(row, "total"),
                    flakiness_score: number(row, "flakiness_score").unwrap_or(0.0),
                    main_reason: most_common(&failure_categories),
                    failure_categories,
                    testname,
                }
            })
            .collect();

        let markdown = flaky_markdown(&scripts);
        Ok(FlakySummary { scripts, markdown })
    }

    pub async fn top_flaky(&self, limit: usize) -> Result<TopScripts> {
        let limit = limit.max(1);
        let rows = self
            .run_query(&queries::flaky_scripts(&self.schema, Some(limit)))
            .await?;
        Ok(TopScripts { limit, rows })
    }

    pub async fn top_failing(&self, limit: usize) -> Result<TopScripts> {
        let limit = limit.max(1);
        let rows = self
            .run_query(&queries::top_failing(&self.schema, limit))
            .await?;
        Ok(TopScripts { limit, rows })
    }

    /// Status changes between two builds, reported lower number first.
    ///
    /// A missing `current` is the latest build; a missing `previous` is the
    /// build just before `current`.
    pub async fn compare_builds(
        &self,
        previous: Option<&str>,
        current: Option<&str>,
    ) -> Result<BuildComparison> {
        let (previous, current) = match (previous, current) {
            (Some(a), Some(b)) => (a.to_string(), b.to_string()),
            (previous, current) => {
                let numbers = self.execution_numbers().await?;
                if numbers.is_empty() {
                    return Err(PipelineError::NoData(
                        "No execution data found".to_string(),
                    ));
                }
                let current = current
                    .map(str::to_string)
                    .unwrap_or_else(|| numbers[0].clone());
                let previous = match previous {
                    Some(number) => number.to_string(),
                    None => numbers
                        .iter()
                        .find(|n| compare_execution_numbers(n, &current) == Ordering::Less)
                        .cloned()
                        .ok_or_else(|| {
                            PipelineError::NoData(format!(
                                "No execution before #{current} to compare with"
                            ))
                        })?,
                };
                (previous, current)
            }
        };
        let (previous, current) = if compare_execution_numbers(&previous, &current) == Ordering::Greater {
            (current, previous)
        } else {
            (previous, current)
        };

        let rows = self
            .run_query(&queries::status_changes(&self.schema, &previous, &current))
            .await?;

        let changes: Vec<StatusChange> = rows
            .iter()
            .map(|row| StatusChange {
                testname: text(row, "testname").unwrap_or("Unknown").to_string(),
                previous_status: text(row, "previous_status").unwrap_or("").to_string(),
                current_status: text(row, "current_status").unwrap_or("").to_string(),
                failure_stack: non_empty(row, "current_failure_stack"),
            })
            .collect();

        let mut failure_categories: BTreeMap<FailureCategory, BTreeSet<String>> = BTreeMap::new();
        for change in changes.iter().filter(|c| c.current_status == "FAIL") {
            if let Some(stack) = &change.failure_stack {
                for category in failure::categorize(stack) {
                    failure_categories
                        .entry(category)
                        .or_default()
                        .insert(change.testname.clone());
                }
            }
        }

        let mut comparison = BuildComparison {
            previous,
            current,
            changes,
            failure_categories,
            markdown: String::new(),
        };
        comparison.markdown = comparison_markdown(&comparison);
        Ok(comparison)
    }

    async fn run_query(&self, query: &str) -> Result<Vec<ResultRow>> {
        self.executor.execute(query, None).await
    }
}

/// Numeric order when both parse, text order otherwise.
pub fn compare_execution_numbers(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn text<'a>(row: &'a ResultRow, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

fn non_empty(row: &ResultRow, column: &str) -> Option<String> {
    text(row, column)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn number(row: &ResultRow, column: &str) -> Option<f64> {
    match row.get(column)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn count_column(row: &ResultRow, column: &str) -> u64 {
    number(row, column).map(|n| n.max(0.0) as u64).unwrap_or(0)
}

/// Category with the highest count; ties go to the earlier category.
fn most_common(counts: &BTreeMap<FailureCategory, usize>) -> FailureCategory {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(category, _)| *category)
        .unwrap_or(FailureCategory::Unknown)
}

fn write_names(out: &mut String, names: &BTreeSet<String>, listed: usize) {
    let shown: Vec<&str> = names.iter().take(listed).map(String::as_str).collect();
    let _ = write!(out, "{}", shown.join(", "));
    if names.len() > listed {
        let _ = write!(out, " ... and {} more", names.len() - listed);
    }
}

fn build_markdown(
    execution_number: &str,
    scripts: &[ScriptStatus],
    categories: &BTreeMap<FailureCategory, BTreeSet<String>>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Build Summary (Execution #{execution_number})\n");
    let _ = writeln!(out, "**Total Failed/Skipped Scripts:** {}", scripts.len());

    if !categories.is_empty() {
        let _ = writeln!(out, "\n### Failure Categories\n");
        for (category, names) in categories {
            let _ = write!(out, "- **{}** ({} scripts): ", category.description(), names.len());
            write_names(&mut out, names, CATEGORY_LISTED);
            out.push('\n');
        }
    }

    if scripts.is_empty() {
        let _ = writeln!(out, "\n✅ No failed or skipped scripts in this build.");
    } else {
        let _ = writeln!(out, "\n### Failed/Skipped Scripts\n");
        for script in scripts.iter().take(BUILD_LISTED) {
            let _ = writeln!(out, "- {} ({})", script.testname, script.status);
        }
        if scripts.len() > BUILD_LISTED {
            let _ = writeln!(out, "\n... and {} more scripts", scripts.len() - BUILD_LISTED);
        }
    }
    out.trim_end().to_string()
}

fn script_markdown(summary: &ScriptSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Script Analysis: {}\n", summary.script_name);
    let _ = writeln!(out, "**Total Executions:** {}", summary.total_executions);
    let _ = writeln!(out, "- Passed: {}", summary.passed);
    let _ = writeln!(out, "- Failed: {}", summary.failed);
    let _ = writeln!(out, "- Skipped: {}", summary.skipped);

    if summary.failed == 0 {
        let _ = writeln!(out, "\n✅ No failures recorded for this script.");
        return out.trim_end().to_string();
    }

    let success_rate = summary.passed as f64 * 100.0 / summary.total_executions as f64;
    let _ = writeln!(out, "\n**Success Rate:** {success_rate:.1}%");

    if !summary.failure_reasons.is_empty() {
        let _ = writeln!(out, "\n### Failure Reasons\n");
        let mut reasons: Vec<(&FailureCategory, &usize)> = summary.failure_reasons.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (category, count) in reasons {
            let share = *count as f64 * 100.0 / summary.failed as f64;
            let _ = writeln!(
                out,
                "- **{}**: {} times ({:.1}% of failures)",
                category.description(),
                count,
                share
            );
        }
    }

    if !summary.recent_failures.is_empty() {
        let _ = writeln!(out, "\n### Recent Failures\n");
        for detail in summary.recent_failures.iter().take(RECENT_FAILURES) {
            let categories: Vec<&str> = detail.categories.iter().map(|c| c.description()).collect();
            let _ = writeln!(
                out,
                "- Execution #{} ({}): {}",
                detail.execution_number,
                detail.timestamp,
                categories.join(", ")
            );
        }
    }
    out.trim_end().to_string()
}

fn flaky_markdown(scripts: &[FlakyScript]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Flaky Scripts Summary (Last 7 Days)\n");
    let _ = writeln!(out, "**Total Flaky Scripts:** {}", scripts.len());

    if scripts.is_empty() {
        let _ = writeln!(out, "\n✅ No flaky scripts found in the last 7 days.");
        return out.trim_end().to_string();
    }

    let _ = writeln!(out, "\n### Top Flaky Scripts\n");
    for script in scripts.iter().take(FLAKY_LISTED) {
        let _ = writeln!(
            out,
            "- **{}**: Failed {} of {} runs in last 7 days ({:.1}% failure rate) - Main reason: {}",
            script.testname,
            script.fail_count,
            script.total,
            script.flakiness_score * 100.0,
            script.main_reason.description()
        );
    }
    out.trim_end().to_string()
}

fn comparison_markdown(comparison: &BuildComparison) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Build Comparison Summary\n");
    let _ = writeln!(out, "**Previous Build:** Execution #{}", comparison.previous);
    let _ = writeln!(out, "**Current Build:** Execution #{}", comparison.current);
    let _ = writeln!(out, "**Tests Changed:** {}", comparison.changes.len());
    let _ = writeln!(out, "**Regressions (PASS → FAIL/SKIP):** {}", comparison.regressions());

    if comparison.changes.is_empty() {
        let _ = writeln!(out, "\n✅ No status changes between builds.");
        return out.trim_end().to_string();
    }

    let mut transitions: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for change in &comparison.changes {
        transitions
            .entry(change.transition())
            .or_default()
            .insert(change.testname.clone());
    }
    let _ = writeln!(out, "\n### Status Changes\n");
    for (transition, names) in &transitions {
        let _ = write!(out, "- **{}**: {} tests: ", transition, names.len());
        write_names(&mut out, names, CHANGE_LISTED);
        out.push('\n');
    }

    if !comparison.failure_categories.is_empty() {
        let _ = writeln!(out, "\n### Failure Categories in Current Build\n");
        for (category, names) in &comparison.failure_categories {
            let _ = write!(out, "- **{}** ({} tests): ", category.description(), names.len());
            write_names(&mut out, names, CHANGE_LISTED);
            out.push('\n');
        }
    }
    out.trim_end().to_string()
}
