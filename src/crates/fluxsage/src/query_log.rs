//! Append-only JSON log of answered requests.
//!
//! The file holds a single JSON array, trimmed to the newest
//! [`MAX_ENTRIES`]. A missing or unreadable file reads as an empty log and
//! write failures are only logged, so the log never fails a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Entries kept on disk.
pub const MAX_ENTRIES: usize = 1000;

/// Default `recent` limit.
pub const DEFAULT_RECENT_LIMIT: usize = 50;

pub const DEFAULT_LOG_FILE: &str = "query_logs.json";

/// One answered request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub user_query: String,
    pub flux_query: String,
    pub execution_number: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default = "default_attempts")]
    pub attempts: usize,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_attempts() -> usize {
    1
}

impl QueryLogEntry {
    pub fn new(
        user_query: impl Into<String>,
        flux_query: impl Into<String>,
        execution_number: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            user_query: user_query.into(),
            flux_query: flux_query.into(),
            execution_number,
            success: false,
            row_count: 0,
            attempts: 1,
            error: None,
        }
    }

    pub fn with_outcome(
        mut self,
        success: bool,
        row_count: usize,
        attempts: usize,
        error: Option<String>,
    ) -> Self {
        self.success = success;
        self.row_count = row_count;
        self.attempts = attempts;
        self.error = error;
        self
    }
}

/// Aggregates over the whole log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStatistics {
    pub total_queries: usize,
    pub successful_queries: usize,
    pub failed_queries: usize,
    /// Percent, rounded to 2 decimals.
    pub success_rate: f64,
    /// Rounded to 2 decimals.
    pub average_attempts: f64,
    pub total_rows_returned: usize,
}

/// File-backed query log.
#[derive(Debug)]
pub struct QueryLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl QueryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `entry`, dropping the oldest entries beyond [`MAX_ENTRIES`].
    pub async fn record(&self, entry: QueryLogEntry) {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.read_all().await;
        entries.push(entry);
        if entries.len() > MAX_ENTRIES {
            let excess = entries.len() - MAX_ENTRIES;
            entries.drain(..excess);
        }

        match serde_json::to_string_pretty(&entries) {
            Ok(content) => {
                if let Err(e) = fs::write(&self.path, content).await {
                    warn!(path = %self.path.display(), error = %e, "Failed to write query log");
                } else {
                    debug!(path = %self.path.display(), entries = entries.len(), "Query logged");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize query log"),
        }
    }

    /// The newest `limit` entries, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<QueryLogEntry> {
        let mut entries = self.read_all().await;
        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        entries
    }

    /// Entries whose user or Flux query contains `term`, case-insensitively.
    pub async fn search(&self, term: &str) -> Vec<QueryLogEntry> {
        let term = term.to_lowercase();
        self.read_all()
            .await
            .into_iter()
            .filter(|e| {
                e.user_query.to_lowercase().contains(&term)
                    || e.flux_query.to_lowercase().contains(&term)
            })
            .collect()
    }

    pub async fn statistics(&self) -> QueryStatistics {
        let entries = self.read_all().await;
        let total = entries.len();
        if total == 0 {
            return QueryStatistics {
                total_queries: 0,
                successful_queries: 0,
                failed_queries: 0,
                success_rate: 0.0,
                average_attempts: 0.0,
                total_rows_returned: 0,
            };
        }

        let successful = entries.iter().filter(|e| e.success).count();
        let attempts: usize = entries.iter().map(|e| e.attempts).sum();
        let rows: usize = entries.iter().map(|e| e.row_count).sum();

        QueryStatistics {
            total_queries: total,
            successful_queries: successful,
            failed_queries: total - successful,
            success_rate: round2(successful as f64 * 100.0 / total as f64),
            average_attempts: round2(attempts as f64 / total as f64),
            total_rows_returned: rows,
        }
    }

    async fn read_all(&self) -> Vec<QueryLogEntry> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read query log");
                return Vec::new();
            }
        };

        if content.trim().is_empty() {
            return Vec::new();
        }

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Query log is not valid JSON, ignoring");
            Vec::new()
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(user: &str, flux: &str, success: bool, rows: usize, attempts: usize) -> QueryLogEntry {
        QueryLogEntry::new(user, flux, Some("1".into())).with_outcome(
            success,
            rows,
            attempts,
            (!success).then(|| "failed".to_string()),
        )
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let log = QueryLog::new(temp.path().join("query_logs.json"));

        assert!(log.recent(DEFAULT_RECENT_LIMIT).await.is_empty());
        assert_eq!(log.statistics().await.total_queries, 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_empty_and_is_replaced() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("query_logs.json");
        std::fs::write(&path, "{not json").unwrap();
        let log = QueryLog::new(&path);

        assert!(log.recent(10).await.is_empty());

        log.record(entry("q", "f", true, 1, 1)).await;
        assert_eq!(log.recent(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_record_and_recent_order() {
        let temp = TempDir::new().unwrap();
        let log = QueryLog::new(temp.path().join("log.json"));

        for i in 0..5 {
            log.record(entry(&format!("q{i}"), "f", true, i, 1)).await;
        }

        let recent = log.recent(2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user_query, "q3");
        assert_eq!(recent[1].user_query, "q4");
    }

    #[tokio::test]
    async fn test_cap_keeps_newest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("log.json");

        let seeded: Vec<QueryLogEntry> = (0..MAX_ENTRIES)
            .map(|i| entry(&format!("q{i}"), "f", true, 0, 1))
            .collect();
        std::fs::write(&path, serde_json::to_string(&seeded).unwrap()).unwrap();

        let log = QueryLog::new(&path);
        log.record(entry("newest", "f", true, 0, 1)).await;

        let all = log.recent(usize::MAX).await;
        assert_eq!(all.len(), MAX_ENTRIES);
        assert_eq!(all[0].user_query, "q1");
        assert_eq!(all[MAX_ENTRIES - 1].user_query, "newest");
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_over_both_queries() {
        let temp = TempDir::new().unwrap();
        let log = QueryLog::new(temp.path().join("log.json"));

        log.record(entry("Failed tests in build 5", "from(bucket: \"x\")", true, 3, 1))
            .await;
        log.record(entry("slowest test", "|> sort(columns: [\"_value\"])", true, 1, 1))
            .await;

        assert_eq!(log.search("FAILED").await.len(), 1);
        assert_eq!(log.search("SORT(").await[0].user_query, "slowest test");
        assert!(log.search("owner").await.is_empty());
    }

    #[tokio::test]
    async fn test_statistics_rounding() {
        let temp = TempDir::new().unwrap();
        let log = QueryLog::new(temp.path().join("log.json"));

        log.record(entry("a", "f", true, 4, 1)).await;
        log.record(entry("b", "f", true, 6, 2)).await;
        log.record(entry("c", "f", false, 0, 3)).await;

        let stats = log.statistics().await;
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.successful_queries, 2);
        assert_eq!(stats.failed_queries, 1);
        assert_eq!(stats.success_rate, 66.67);
        assert_eq!(stats.average_attempts, 2.0);
        assert_eq!(stats.total_rows_returned, 10);
    }
}
