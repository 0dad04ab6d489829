//! Query log command handlers

use crate::cli::OutputFormat;
use crate::error::Result;
use crate::query_log::{QueryLog, QueryLogEntry};
use colored::Colorize;
use tabled::{Table, Tabled};

const QUERY_WIDTH: usize = 50;

/// Log entry display row for table output
#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Query")]
    query: String,
    #[tabled(rename = "Execution")]
    execution: String,
    #[tabled(rename = "OK")]
    ok: String,
    #[tabled(rename = "Rows")]
    rows: usize,
    #[tabled(rename = "Attempts")]
    attempts: usize,
}

impl From<&QueryLogEntry> for LogRow {
    fn from(entry: &QueryLogEntry) -> Self {
        let query = if entry.user_query.chars().count() > QUERY_WIDTH {
            let cut: String = entry.user_query.chars().take(QUERY_WIDTH - 3).collect();
            format!("{}...", cut)
        } else {
            entry.user_query.clone()
        };

        Self {
            time: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            query,
            execution: entry.execution_number.clone().unwrap_or_else(|| "-".to_string()),
            ok: if entry.success {
                "✓".green().to_string()
            } else {
                "✗".red().to_string()
            },
            rows: entry.row_count,
            attempts: entry.attempts,
        }
    }
}

/// Handle `logs recent`
pub async fn handle_recent(log: &QueryLog, limit: usize, format: OutputFormat) -> Result<()> {
    let entries = log.recent(limit).await;
    print_entries(&entries, format)
}

/// Handle `logs search`
pub async fn handle_search(log: &QueryLog, term: &str, format: OutputFormat) -> Result<()> {
    let entries = log.search(term).await;
    print_entries(&entries, format)
}

/// Handle `logs stats`
pub async fn handle_stats(log: &QueryLog, format: OutputFormat) -> Result<()> {
    let stats = log.statistics().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            println!("Query Statistics");
            println!("================");
            println!("Total queries:    {}", stats.total_queries);
            println!("Successful:       {}", stats.successful_queries);
            println!("Failed:           {}", stats.failed_queries);
            println!("Success rate:     {:.2}%", stats.success_rate);
            println!("Average attempts: {:.2}", stats.average_attempts);
            println!("Rows returned:    {}", stats.total_rows_returned);
        }
    }

    Ok(())
}

fn print_entries(entries: &[QueryLogEntry], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("{}", "No logged queries found".yellow());
            } else {
                let rows: Vec<LogRow> = entries.iter().map(LogRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
    }
    Ok(())
}
