//! Prompt text for query synthesis, query correction and summaries.

use crate::schema::SchemaReference;

/// Prefix a model uses to decline a request it cannot express in Flux.
pub const UNSUPPORTED_PREFIX: &str = "ERROR:";

const QUERY_RULES: &str = r#"CRITICAL RULES:
1. Tags: r.status, r.testname (direct access). Fields: |> filter(fn: (r) => r._field == "duration")
2. NEVER: r._field == "status" or r.duration (wrong access)
3. ALWAYS: |> keep(columns: [...]) to exclude metadata (result, table, _start, _stop)
4. Pivot: only when multiple fields are needed in the same row, never for aggregations
5. Group before join: |> group(columns: ["testname"]) on BOTH tables
6. Always start with range(start: 1970-01-01T00:00:00Z) unless the request names a time window

QUERY INTENT MAPPING:
- Build/Execution: number after "build"/"execution" -> filter by execution_number
- Script/Test: CamelCase name -> filter by testname
- Owner: "of X", "by X", "owned by X", "X's" -> exists r.owner and r.owner =~ /(?i)X/
- Status lookup: "status of X" -> return status, do not filter by it
- Singular ("most", "the", "one") -> limit(n: 1); "top N" -> limit(n: N)
- Comparison ("vs", "compare") -> join on testname, find status changes
- Count/Aggregate -> group() + count()/sum()/mean()/max()/min()
- Flaky -> reduce() counting PASS/FAIL per testname, keep rows where both > 0
- "slower than X" / "faster than X" -> group by testname, max(), then filter on the max
- Failure reason ("failing due to X"): status == "FAIL", _field == "failure_message" or "failure_stack", _value =~ /(?i)X/, group by testname

PATTERNS:
Failed: |> filter(fn: (r) => r.status == "FAIL") |> filter(fn: (r) => r._field == "duration") |> keep(columns: ["testname", "status", "_value"])
Count: |> filter(fn: (r) => r._field == "duration") |> group(columns: ["status"]) |> count() |> rename(columns: {_value: "count"})
Top N: |> filter(fn: (r) => r._field == "duration") |> sort(columns: ["_value"], desc: true) |> limit(n: N) |> keep(columns: ["testname", "_value"])
Most failed: |> filter(fn: (r) => r.status == "FAIL") |> filter(fn: (r) => r._field == "duration") |> group(columns: ["testname"]) |> count() |> rename(columns: {_value: "failure_count"}) |> group() |> sort(columns: ["failure_count"], desc: true) |> limit(n: 1) |> keep(columns: ["testname", "failure_count"])
Slower than X: |> filter(fn: (r) => r._field == "duration") |> group(columns: ["testname"]) |> max(column: "_value") |> rename(columns: {_value: "max_duration"}) |> filter(fn: (r) => r.max_duration > X) |> group() |> sort(columns: ["max_duration"], desc: true) |> keep(columns: ["testname", "max_duration"])"#;

const CORRECTION_HINTS: &str = r#"Common fixes:
1. Filter by _field BEFORE pivot/group (schema collision error)
2. Check 'exists r.owner' before filtering by owner
3. Status values must be uppercase: "FAIL", "PASS", "SKIP"
4. Never mix numeric and string fields in group/pivot
5. Group by the same columns on both sides before join
6. Only reference declared tags, declared fields and columns the query itself creates"#;

/// System prompt for query synthesis.
pub fn query_system_prompt(schema: &SchemaReference) -> String {
    format!(
        "You are an expert InfluxDB 2.x and Flux specialist. Generate syntactically correct Flux queries from natural language.\n\n\
SCHEMA:\n{schema_section}\n\n\
{rules}\n\n\
OUTPUT: Only the Flux query, no markdown, no comments. Start with: from(bucket: \"{bucket}\")\n\
If the request cannot be answered from this schema, reply with: {unsupported} <reason>",
        schema_section = schema.render_prompt_section(),
        rules = QUERY_RULES,
        bucket = schema.bucket,
        unsupported = UNSUPPORTED_PREFIX,
    )
}

/// First user turn: the request plus the execution context when known.
pub fn query_user_prompt(user_query: &str, execution_number: Option<&str>) -> String {
    match execution_number {
        Some(number) => format!(
            "{}\n\n(Current execution number, use when the request does not name one: {})",
            user_query.trim(),
            number
        ),
        None => user_query.trim().to_string(),
    }
}

/// Follow-up user turn after a rejected query.
pub fn correction_prompt(failed_query: &str, error: &str) -> String {
    format!(
        "The query failed with this error:\n{error}\n\n\
FAILED QUERY:\n{failed_query}\n\n\
Analyze the error and generate a corrected query. {hints}\n\n\
Generate the corrected query:",
        error = error.trim(),
        failed_query = failed_query.trim(),
        hints = CORRECTION_HINTS,
    )
}

/// Inputs for the summary system prompt.
pub struct SummaryPromptInput<'a> {
    pub user_query: &'a str,
    pub flux_query: &'a str,
    pub row_count: usize,
    pub sample_size: usize,
    pub data_profile: &'a str,
    pub sample_json: &'a str,
}

/// System prompt for the result summary.
pub fn summary_system_prompt(input: &SummaryPromptInput<'_>) -> String {
    format!(
        "You are a data analyst specializing in test execution analysis.\n\n\
TASK: Summarize the query result. Reflect the ACTUAL data, not templates.\n\n\
INPUT:\n\
- User Query: {user_query}\n\
- Flux Query: {flux_query}\n\
- Row Count: {row_count} (THIS IS THE TOTAL; use it for all counts)\n\
- Sample: first {sample_size} rows below; large text fields may be truncated\n\n\
DATA PROFILE (each line names the rows it covers):\n{data_profile}\n\n\
RESULT SAMPLE (JSON):\n{sample_json}\n\n\
RULES:\n\
1. Report totals from Row Count, never from the sample length.\n\
2. Take status counts, percentages and averages from the DATA PROFILE.\n\
3. If failure_stack or failure_message is present, group failures by error type (assertion, timeout, element not found, visibility, toast, network).\n\
4. Name the most frequent failures, slowest tests, owners and execution numbers involved when the data has them.\n\n\
OUTPUT: Markdown. Start with a headline answering the user query, then key numbers, then observations and recommendations. Use emojis sparingly (PASS, FAIL, SKIP, flaky, slow).",
        user_query = input.user_query,
        flux_query = input.flux_query,
        row_count = input.row_count,
        sample_size = input.sample_size,
        data_profile = input.data_profile,
        sample_json = input.sample_json,
    )
}

/// User turn accompanying the summary system prompt.
pub const SUMMARY_USER_PROMPT: &str = "Generate the summary based on the data provided.";

/// Markdown returned for an empty result instead of calling the model.
pub fn no_results_markdown() -> String {
    "**No Results Found**\n\n\
The query executed successfully but returned no matching data. This could mean:\n\
- No tests match the specified criteria\n\
- The execution number doesn't exist\n\
- The test name is misspelled"
        .to_string()
}

/// Markdown placed in the summary slot when the summary model call failed.
pub fn summary_failed_markdown(row_count: usize, error: &str) -> String {
    format!(
        "**Summary Generation Failed**\n\nQuery returned {} rows. Error: {}",
        row_count, error
    )
}
