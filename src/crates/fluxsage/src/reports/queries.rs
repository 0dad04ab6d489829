//! Fixed Flux queries behind the predefined reports.

use crate::schema::SchemaReference;
use crate::summary::flux_string;

/// Window the flakiness and failure rankings look at.
pub const RECENT_WINDOW: &str = "-7d";

const ALL_TIME: &str = "1970-01-01T00:00:00Z";

fn source(schema: &SchemaReference, start: &str) -> String {
    format!(
        r#"from(bucket: {bucket})
  |> range(start: {start})
  |> filter(fn: (r) => r._measurement == {measurement})"#,
        bucket = flux_string(&schema.bucket),
        measurement = flux_string(&schema.measurement),
    )
}

/// Distinct execution numbers, unordered.
pub fn execution_numbers(schema: &SchemaReference) -> String {
    format!(
        r#"{source}
  |> filter(fn: (r) => exists r.execution_number)
  |> keep(columns: ["execution_number"])
  |> group()
  |> distinct(column: "execution_number")"#,
        source = source(schema, ALL_TIME),
    )
}

/// Failed and skipped tests of one execution, with their stacks when
/// recorded.
pub fn build_failures(schema: &SchemaReference, execution_number: &str) -> String {
    format!(
        r#"{source}
  |> filter(fn: (r) => r.execution_number == {execution})
  |> filter(fn: (r) => r.status == "FAIL" or r.status == "SKIP")
  |> filter(fn: (r) => r._field == "duration" or r._field == "failure_stack")
  |> pivot(rowKey: ["_time", "testname", "status", "execution_number"], columnKey: ["_field"], valueColumn: "_value")
  |> group()
  |> keep(columns: ["testname", "status", "failure_stack"])
  |> sort(columns: ["testname"])"#,
        source = source(schema, ALL_TIME),
        execution = flux_string(execution_number),
    )
}

/// Every run of the tests whose name contains `script`, newest first.
pub fn script_runs(schema: &SchemaReference, script: &str) -> String {
    format!(
        r#"{source}
  |> filter(fn: (r) => r.testname =~ /{pattern}/)
  |> filter(fn: (r) => r._field == "duration" or r._field == "failure_stack")
  |> pivot(rowKey: ["_time", "testname", "status", "execution_number"], columnKey: ["_field"], valueColumn: "_value")
  |> group()
  |> keep(columns: ["_time", "testname", "status", "execution_number", "duration", "failure_stack"])
  |> sort(columns: ["_time"], desc: true)"#,
        source = source(schema, ALL_TIME),
        pattern = flux_regex_literal(script),
    )
}

/// Tests with both passes and failures in the recent window, most flaky
/// first. `limit` of `None` keeps them all.
pub fn flaky_scripts(schema: &SchemaReference, limit: Option<usize>) -> String {
    let mut query = format!(
        r#"{source}
  |> filter(fn: (r) => r._field == "duration")
  |> group(columns: ["testname"])
  |> reduce(
      identity: {{testname: "", pass_count: 0, fail_count: 0, total: 0}},
      fn: (r, accumulator) => ({{
          testname: r.testname,
          pass_count: accumulator.pass_count + (if r.status == "PASS" then 1 else 0),
          fail_count: accumulator.fail_count + (if r.status == "FAIL" then 1 else 0),
          total: accumulator.total + 1
      }})
  )
  |> filter(fn: (r) => r.pass_count > 0 and r.fail_count > 0)
  |> map(fn: (r) => ({{
      testname: r.testname,
      pass_count: r.pass_count,
      fail_count: r.fail_count,
      total: r.total,
      flakiness_score: float(v: r.fail_count) / float(v: r.total)
  }}))
  |> group()
  |> sort(columns: ["flakiness_score"], desc: true)"#,
        source = source(schema, RECENT_WINDOW),
    );
    if let Some(limit) = limit {
        query.push_str(&format!("\n  |> limit(n: {limit})"));
    }
    query
}

/// Failure stacks recorded in the recent window.
pub fn recent_failure_stacks(schema: &SchemaReference) -> String {
    format!(
        r#"{source}
  |> filter(fn: (r) => r.status == "FAIL")
  |> filter(fn: (r) => r._field == "failure_stack")
  |> group()
  |> keep(columns: ["testname", "_value"])
  |> rename(columns: {{_value: "failure_stack"}})"#,
        source = source(schema, RECENT_WINDOW),
    )
}

/// Tests ranked by failures in the recent window.
pub fn top_failing(schema: &SchemaReference, limit: usize) -> String {
    format!(
        r#"{source}
  |> filter(fn: (r) => r._field == "duration")
  |> filter(fn: (r) => r.status == "FAIL")
  |> group(columns: ["testname"])
  |> count()
  |> group()
  |> rename(columns: {{_value: "fail_count"}})
  |> sort(columns: ["fail_count"], desc: true)
  |> limit(n: {limit})
  |> keep(columns: ["testname", "fail_count"])"#,
        source = source(schema, RECENT_WINDOW),
    )
}

/// Tests whose status differs between two executions.
pub fn status_changes(schema: &SchemaReference, previous: &str, current: &str) -> String {
    let side = |execution: &str, status: &str, stack: &str| {
        format!(
            r#"{source}
  |> filter(fn: (r) => r.execution_number == {execution})
  |> filter(fn: (r) => r._field == "duration" or r._field == "failure_stack")
  |> pivot(rowKey: ["_time", "testname", "status"], columnKey: ["_field"], valueColumn: "_value")
  |> group()
  |> map(fn: (r) => ({{
      testname: r.testname,
      {status}: r.status,
      {stack}: if exists r.failure_stack then r.failure_stack else ""
  }}))"#,
            source = source(schema, ALL_TIME),
            execution = flux_string(execution),
        )
    };

    format!(
        r#"previous = {previous}

current = {current}

join(tables: {{p: previous, c: current}}, on: ["testname"])
  |> filter(fn: (r) => r.previous_status != r.current_status)
  |> keep(columns: ["testname", "previous_status", "current_status", "current_failure_stack"])
  |> sort(columns: ["testname"])"#,
        previous = side(previous, "previous_status", "previous_failure_stack"),
        current = side(current, "current_status", "current_failure_stack"),
    )
}

/// Body of a Flux regex literal matching `text` anywhere.
fn flux_regex_literal(text: &str) -> String {
    regex::escape(text).replace('/', "\\/")
}
