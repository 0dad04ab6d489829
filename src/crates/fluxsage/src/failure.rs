//! Keyword-based failure categorization for test failure stacks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad cause of a test failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Toast,
    Visibility,
    Timeout,
    ElementNotFound,
    Assertion,
    Network,
    Unknown,
}

impl FailureCategory {
    /// Categories with keywords, in matching order.
    pub const MATCHABLE: [FailureCategory; 6] = [
        Self::Toast,
        Self::Visibility,
        Self::Timeout,
        Self::ElementNotFound,
        Self::Assertion,
        Self::Network,
    ];

    /// Lowercase keywords that mark the category.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Toast => &[".toast", "toast"],
            Self::Visibility => &[
                "by.cssselector",
                "waiting for visibility",
                "visibility",
                "element not visible",
                "elementnotvisibleexception",
            ],
            Self::Timeout => &["timeout", "timeoutexception", "waiting", "timed out"],
            Self::ElementNotFound => &[
                "nosuchelementexception",
                "element not found",
                "could not find",
            ],
            Self::Assertion => &["assertionerror", "assert", "expected", "actual"],
            Self::Network => &["network", "connection", "httpexception", "500", "404"],
            Self::Unknown => &[],
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Toast => "Toast notification issues",
            Self::Visibility => "Element visibility issues",
            Self::Timeout => "Timeout issues",
            Self::ElementNotFound => "Element not found issues",
            Self::Assertion => "Assertion failures",
            Self::Network => "Network/API issues",
            Self::Unknown => "Unknown issue",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Toast => "toast",
            Self::Visibility => "visibility",
            Self::Timeout => "timeout",
            Self::ElementNotFound => "element_not_found",
            Self::Assertion => "assertion",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every category whose keywords appear in `failure_stack`, case-insensitively.
/// Never empty: no match (or blank input) yields `[Unknown]`.
pub fn categorize(failure_stack: &str) -> Vec<FailureCategory> {
    let lower = failure_stack.to_lowercase();
    if lower.trim().is_empty() {
        return vec![FailureCategory::Unknown];
    }

    let categories: Vec<_> = FailureCategory::MATCHABLE
        .into_iter()
        .filter(|category| category.keywords().iter().any(|k| lower.contains(k)))
        .collect();

    if categories.is_empty() {
        vec![FailureCategory::Unknown]
    } else {
        categories
    }
}
