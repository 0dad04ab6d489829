//! Query validation.
//!
//! [`SchemaLint`] is a static check against the [`SchemaReference`] and never
//! touches the store. [`StoreValidator`] runs the lint and then a dry-run
//! execution, so the store's compiler has the final word on syntax. Neither
//! checks that the query answers the question.

use crate::error::{PipelineError, Result};
use crate::executor::QueryExecutor;
use crate::schema::SchemaReference;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::debug;

static SOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"from\s*\(\s*bucket\s*:").unwrap());
static RECORD_ACCESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\br\.([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static RECORD_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*:").unwrap());
static JOIN_TABLES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bjoin\s*\(\s*tables\s*:$").unwrap());
static IDENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bidentity\s*:$").unwrap());
static WITH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[A-Za-z_][A-Za-z0-9_]*\s+with\b").unwrap());
static FIELD_COMPARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\._field\s*[!=]=\s*"([^"]*)""#).unwrap());
static RENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rename\s*\(\s*columns\s*:\s*\{([^}]*)\}").unwrap());
static AS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bas\s*:\s*"([^"]+)""#).unwrap());
static STRING_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).unwrap());

/// Something that can accept or reject a candidate query.
#[async_trait]
pub trait QueryValidator: Send + Sync {
    /// `Ok(())` when the query may be executed; otherwise
    /// [`PipelineError::Validation`] with text suitable for a correction
    /// prompt.
    async fn validate(&self, query: &str, execution_number: Option<&str>) -> Result<()>;
}

/// Static schema and syntax-shape check.
#[derive(Debug, Clone)]
pub struct SchemaLint {
    schema: Arc<SchemaReference>,
}

impl SchemaLint {
    pub fn new(schema: Arc<SchemaReference>) -> Self {
        Self { schema }
    }

    /// Every problem found, in query order.
    pub fn problems(&self, query: &str) -> Vec<String> {
        let code = strip_literals(query);
        let mut problems = Vec::new();

        if !SOURCE_RE.is_match(&code) {
            problems.push(format!(
                "query must start from a bucket source: from(bucket: \"{}\")",
                self.schema.bucket
            ));
        }

        if let Some(problem) = unbalanced_delimiters(&code) {
            problems.push(problem);
        }

        for caps in FIELD_COMPARE_RE.captures_iter(query) {
            let name = &caps[1];
            if self.schema.is_tag(name) {
                problems.push(format!(
                    "\"{name}\" is a tag, not a field: filter it with r.{name}, not r._field"
                ));
            } else if !self.schema.is_field(name) {
                problems.push(format!(
                    "\"{name}\" is not a declared field (fields: {})",
                    self.field_names()
                ));
            }
        }

        let pivoted = code.contains("pivot(");
        let derived = derived_columns(query, &code);
        let mut reported = HashSet::new();

        for caps in RECORD_ACCESS_RE.captures_iter(&code) {
            let name = caps[1].to_string();
            if reported.contains(&name) {
                continue;
            }

            let problem = if self.schema.is_field(&name) && !pivoted {
                Some(format!(
                    "r.{name} reads a field directly: filter with r._field == \"{name}\" and read r._value, or pivot first"
                ))
            } else if self.schema.is_known_column(&name) || derived.contains(&name) {
                None
            } else {
                Some(format!(
                    "r.{name} is not a declared tag or field (tags: {}; fields: {})",
                    self.tag_names(),
                    self.field_names()
                ))
            };

            if let Some(problem) = problem {
                problems.push(problem);
                reported.insert(name);
            }
        }

        problems
    }

    fn tag_names(&self) -> String {
        let names: Vec<&str> = self.schema.tags.iter().map(|t| t.name.as_str()).collect();
        names.join(", ")
    }

    fn field_names(&self) -> String {
        let names: Vec<&str> = self.schema.fields.iter().map(|f| f.name.as_str()).collect();
        names.join(", ")
    }
}

#[async_trait]
impl QueryValidator for SchemaLint {
    async fn validate(&self, query: &str, _execution_number: Option<&str>) -> Result<()> {
        let problems = self.problems(query);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Validation(format!(
                "schema check failed: {}",
                problems.join("; ")
            )))
        }
    }
}

/// Lint first, then dry-run the query against the store.
#[derive(Clone)]
pub struct StoreValidator {
    lint: SchemaLint,
    executor: QueryExecutor,
}

impl StoreValidator {
    pub fn new(lint: SchemaLint, executor: QueryExecutor) -> Self {
        Self { lint, executor }
    }
}

#[async_trait]
impl QueryValidator for StoreValidator {
    async fn validate(&self, query: &str, execution_number: Option<&str>) -> Result<()> {
        self.lint.validate(query, execution_number).await?;

        match self.executor.execute(query, execution_number).await {
            Ok(rows) => {
                debug!(rows = rows.len(), "Dry run accepted query");
                Ok(())
            }
            Err(PipelineError::Execution(message)) => Err(PipelineError::Validation(message)),
            Err(e) => Err(e),
        }
    }
}

/// Columns the query itself introduces.
#[derive(Debug, Default)]
struct DerivedColumns {
    /// Record literal keys, rename targets and `as:` targets.
    names: HashSet<String>,
    /// Table keys of `join(tables: {...})`; joined columns carry them as a
    /// `_<key>` suffix.
    join_keys: HashSet<String>,
}

impl DerivedColumns {
    fn contains(&self, name: &str) -> bool {
        if self.names.contains(name) {
            return true;
        }
        name.rsplit_once('_')
            .map(|(base, suffix)| !base.is_empty() && self.join_keys.contains(suffix))
            .unwrap_or(false)
    }
}

/// Collect derived columns. Only braces that build a record count: a map or
/// reduce body `({...})`, a reduce `identity: {...}` and `{r with ...}`.
/// Argument labels such as `start:` or `columns:` never do.
fn derived_columns(query: &str, code: &str) -> DerivedColumns {
    let mut derived = DerivedColumns::default();

    for (open, close) in brace_spans(code) {
        let before = code[..open].trim_end();
        let inner = &code[open + 1..close];

        if JOIN_TABLES_RE.is_match(before) {
            derived.join_keys.extend(top_level_keys(inner));
        } else if before.ends_with('(') || IDENTITY_RE.is_match(before) || WITH_RE.is_match(inner) {
            derived.names.extend(top_level_keys(inner));
        }
    }

    for caps in RENAME_RE.captures_iter(query) {
        derived.names.extend(
            STRING_VALUE_RE
                .captures_iter(&caps[1])
                .map(|v| v[1].to_string()),
        );
    }
    derived
        .names
        .extend(AS_RE.captures_iter(query).map(|caps| caps[1].to_string()));
    derived
}

/// Byte offsets of every matched `{` `}` pair.
fn brace_spans(code: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    for (i, c) in code.char_indices() {
        match c {
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }
    spans
}

/// `key:` labels directly inside a record body, skipping nested calls and
/// records.
fn top_level_keys(inner: &str) -> Vec<String> {
    let mut flat = String::with_capacity(inner.len());
    let mut depth = 0usize;
    for c in inner.chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                flat.push(' ');
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                flat.push(' ');
            }
            _ if depth == 0 => flat.push(c),
            _ => {}
        }
    }
    RECORD_KEY_RE
        .captures_iter(&flat)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn unbalanced_delimiters(code: &str) -> Option<String> {
    let mut stack = Vec::new();
    for c in code.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Some(format!("unbalanced '{c}'"));
                }
            }
            _ => {}
        }
    }
    stack
        .last()
        .map(|open| format!("unclosed '{open}'"))
}

/// Blank out string literals, regex literals and line comments so structural
/// checks only see code.
fn strip_literals(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();
    let mut last_significant = ' ';

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push_str("\"\"");
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => {
                            chars.next();
                        }
                        '"' => break,
                        _ => {}
                    }
                }
                last_significant = '"';
            }
            '/' if chars.peek() == Some(&'/') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if matches!(last_significant, '~' | '(' | ',' | ':' | '[' | '=') => {
                out.push_str("//");
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => {
                            chars.next();
                        }
                        '/' => break,
                        _ => {}
                    }
                }
                last_significant = '/';
            }
            _ => {
                out.push(c);
                if !c.is_whitespace() {
                    last_significant = c;
                }
            }
        }
    }

    out
}
