//! Schema reference for the test execution measurement.
//!
//! Built once at startup and shared as `Arc<SchemaReference>` by the
//! synthesizer, the linter and the summary synthesizer.

use std::fmt::Write as _;

/// Columns every Flux table carries regardless of measurement.
pub const SYSTEM_COLUMNS: &[&str] = &[
    "_time",
    "_value",
    "_field",
    "_measurement",
    "_start",
    "_stop",
    "result",
    "table",
];

/// A named schema attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub description: String,
    /// Values can be large (stack traces) and must be truncated before
    /// they go into a prompt.
    pub large: bool,
}

impl Attribute {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            large: false,
        }
    }

    fn large(mut self) -> Self {
        self.large = true;
        self
    }
}

/// Tags (direct access, string-valued) and fields (filter by `_field`
/// first) of one measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReference {
    pub bucket: String,
    pub measurement: String,
    pub tags: Vec<Attribute>,
    pub fields: Vec<Attribute>,
}

impl SchemaReference {
    /// The `testmethod` measurement written by the test reporter.
    pub fn test_execution(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            measurement: "testmethod".to_string(),
            tags: vec![
                Attribute::new("testname", "test method name, CamelCase"),
                Attribute::new("status", "PASS, FAIL or SKIP (uppercase)"),
                Attribute::new("owner", "test owner; may be missing, check `exists r.owner`"),
                Attribute::new("execution_number", "build/execution identifier, string"),
                Attribute::new("environment", "target environment"),
            ],
            fields: vec![
                Attribute::new("duration", "seconds, always present"),
                Attribute::new("start_time", "test start time"),
                Attribute::new("failure_message", "short failure reason").large(),
                Attribute::new("failure_stack", "full stack trace (LARGE)").large(),
            ],
        }
    }

    pub fn is_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }

    pub fn is_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Declared tag, declared field, or a Flux system column.
    pub fn is_known_column(&self, name: &str) -> bool {
        self.is_tag(name) || self.is_field(name) || SYSTEM_COLUMNS.contains(&name)
    }

    /// Names of attributes whose values must be truncated for prompts.
    pub fn large_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|f| f.large).map(|f| f.name.as_str())
    }

    /// The SCHEMA block embedded in the synthesis prompt.
    pub fn render_prompt_section(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "- Bucket: {}, Measurement: {}",
            self.bucket, self.measurement
        );

        let tags: Vec<String> = self
            .tags
            .iter()
            .map(|t| format!("{} ({})", t.name, t.description))
            .collect();
        let _ = writeln!(out, "- TAGS (direct access, r.<tag>): {}", tags.join(", "));

        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{} ({})", f.name, f.description))
            .collect();
        let _ = write!(
            out,
            "- FIELDS (filter by _field first, value in _value): {}",
            fields.join(", ")
        );
        out
    }
}

impl Default for SchemaReference {
    fn default() -> Self {
        Self::test_execution("testexecution")
    }
}
