//! Recognizes requests that a predefined report answers better than a
//! synthesized query.

use regex::Regex;
use std::sync::LazyLock;

/// Rows shown by the ranking reports when the request names no number.
pub const DEFAULT_TOP_LIMIT: usize = 10;

static BUILD_SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bbuild\s+summary\b|\bsummary\s+of\s+build\b|\b(?:build|execution)\s+\d+\s+summary\b")
        .unwrap()
});
static BUILD_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:build|execution)\s+(\d+)").unwrap());

static SCRIPT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\babout\s+(?:script|test)\s+([A-Za-z][A-Za-z0-9_]*)",
        r"(?i)\bsummary\s+of\s+(?:script|test)\s+([A-Za-z][A-Za-z0-9_]*)",
        r"(?i)\banalyze\s+(?:script|test)\s+([A-Za-z][A-Za-z0-9_]*)",
        r"(?i)\btell\s+me\s+about\s+([A-Za-z][A-Za-z0-9_]*)",
        r"(?i)\bgive\s+me\s+about\s+([A-Za-z][A-Za-z0-9_]*)",
        r"(?i)\bwhat\s+about\s+([A-Za-z][A-Za-z0-9_]*)",
        r"(?i)\bexplain\s+([A-Za-z][A-Za-z0-9_]*)",
        r"(?i)\bsummary\s+about\s+([A-Za-z][A-Za-z0-9_]*)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});
static ABOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\babout\s+([A-Za-z][A-Za-z0-9_]*)").unwrap());

static TOP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btop\b").unwrap());
static TOP_N_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btop\s+(\d+)").unwrap());
static FLAKY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bflaky\b").unwrap());
static FAILING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bfailing\b").unwrap());
static FLAKY_SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:flaky|unstable)\s+(?:scripts?|tests?)\s+summary\b|\bsummary\s+of\s+flaky\s+(?:scripts?|tests?)\b")
        .unwrap()
});

static COMPARE_NUMBERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bcompare\s+(?:build|execution)s?\s+(\d+)\s+(?:vs\.?|and|with|to)\s+(?:(?:build|execution)\s+)?(\d+)|\b(?:build|execution)\s+(\d+)\s+vs\.?\s+(?:build|execution)\s+(\d+)",
    )
    .unwrap()
});
static COMPARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bcompare\s+(?:builds?|executions?)\b|\bbuild\s+comparison\b|\byesterday\s+vs\.?\s+today\b|\b(?:previous|last)\s+(?:build\s+)?vs\.?\s+current\b",
    )
    .unwrap()
});

/// Words that introduce a report rather than name a test.
const RESERVED_NAMES: &[&str] = &["script", "test", "build", "execution", "the", "a", "all"];

/// A predefined report and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportRequest {
    /// Failed and skipped tests of one build; `None` means the latest.
    Build(Option<String>),
    /// Run history of the tests whose name contains the text.
    Script(String),
    /// Flaky tests of the recent window with their main failure reason.
    Flaky,
    /// The most flaky tests of the recent window.
    TopFlaky(usize),
    /// The most failing tests of the recent window.
    TopFailing(usize),
    /// Status changes between two builds; missing numbers are picked from
    /// the store.
    Comparison(Option<String>, Option<String>),
}

/// Map a plain-language request to a predefined report, if one fits.
pub fn detect_report(query: &str) -> Option<ReportRequest> {
    if BUILD_SUMMARY_RE.is_match(query) {
        let number = BUILD_NUMBER_RE.captures(query).map(|caps| caps[1].to_string());
        return Some(ReportRequest::Build(number));
    }

    for re in SCRIPT_RES.iter() {
        if let Some(name) = re.captures(query).map(|caps| caps[1].to_string()) {
            if !is_reserved(&name) {
                return Some(ReportRequest::Script(name));
            }
        }
    }
    if let Some(name) = ABOUT_RE.captures(query).map(|caps| caps[1].to_string()) {
        // only names shaped like a test method, so "about failures" stays a query
        if !is_reserved(&name) && name.chars().skip(1).any(|c| c.is_ascii_uppercase()) {
            return Some(ReportRequest::Script(name));
        }
    }

    if TOP_RE.is_match(query) {
        let limit = TOP_N_RE
            .captures(query)
            .and_then(|caps| caps[1].parse::<usize>().ok())
            .unwrap_or(DEFAULT_TOP_LIMIT)
            .max(1);
        if FLAKY_RE.is_match(query) {
            return Some(ReportRequest::TopFlaky(limit));
        }
        if FAILING_RE.is_match(query) {
            return Some(ReportRequest::TopFailing(limit));
        }
    }

    if FLAKY_SUMMARY_RE.is_match(query) {
        return Some(ReportRequest::Flaky);
    }

    if let Some(caps) = COMPARE_NUMBERS_RE.captures(query) {
        let first = caps.get(1).or_else(|| caps.get(3));
        let second = caps.get(2).or_else(|| caps.get(4));
        if let (Some(first), Some(second)) = (first, second) {
            return Some(ReportRequest::Comparison(
                Some(first.as_str().to_string()),
                Some(second.as_str().to_string()),
            ));
        }
    }
    if COMPARE_RE.is_match(query) {
        return Some(ReportRequest::Comparison(None, None));
    }

    None
}

fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name))
}
