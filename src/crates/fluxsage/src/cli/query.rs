//! Query command handlers

use crate::cli::OutputFormat;
use crate::error::{PipelineError, Result};
use crate::models::QueryRequest;
use crate::service::QueryService;
use colored::Colorize;
use influx::ResultRow;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tabled::Table;

/// Rows shown in text output; JSON output carries all rows.
const TEXT_ROW_LIMIT: usize = 20;

const CELL_WIDTH: usize = 60;

/// Handle `ask`: query, rows and summary.
pub async fn handle_ask(
    service: &QueryService,
    request: &QueryRequest,
    format: OutputFormat,
) -> Result<bool> {
    let result = service.generate_query_with_summary(request).await;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            print_header(&result.query, result.success, result.attempts);
            if let Some(error) = &result.error {
                println!("{} {}", "Error:".red().bold(), error);
            }
            if let Some(rows) = &result.data {
                println!("Rows: {}", result.row_count);
                if !rows.is_empty() {
                    println!("{}", render_rows(rows, TEXT_ROW_LIMIT));
                }
            }
            if let Some(summary) = &result.summary {
                println!();
                println!("{}", summary);
            }
            if let Some(error) = &result.summary_error {
                eprintln!("{} {}", "⚠ Summary unavailable:".yellow(), error);
            }
        }
    }

    Ok(result.success)
}

/// Handle `generate`: validated query text only.
pub async fn handle_generate(
    service: &QueryService,
    request: &QueryRequest,
    format: OutputFormat,
) -> Result<bool> {
    let result = service.generate_query_only(request).await;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            print_header(&result.query, result.success, result.attempts);
            if let Some(error) = &result.error {
                println!("{} {}", "Error:".red().bold(), error);
            }
        }
    }

    Ok(result.success)
}

/// Handle `validate`: query plus rows, no summary.
pub async fn handle_validate(
    service: &QueryService,
    request: &QueryRequest,
    format: OutputFormat,
) -> Result<bool> {
    let result = service.generate_flux_with_validation(request).await;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            print_header(&result.query, result.success, result.attempts);
            if let Some(error) = &result.error {
                println!("{} {}", "Error:".red().bold(), error);
            }
            if let Some(rows) = &result.data {
                println!("Rows: {}", result.row_count);
                if !rows.is_empty() {
                    println!("{}", render_rows(rows, TEXT_ROW_LIMIT));
                }
            }
        }
    }

    Ok(result.success)
}

/// Handle `summarize`: summary of rows read from a JSON file.
pub async fn handle_summarize(
    service: &QueryService,
    user_query: &str,
    flux_query: &str,
    rows_file: &Path,
    format: OutputFormat,
) -> Result<bool> {
    let content = tokio::fs::read_to_string(rows_file).await?;
    let rows: Vec<ResultRow> = serde_json::from_str(&content).map_err(|e| {
        PipelineError::Config(format!(
            "{} must hold a JSON array of objects: {}",
            rows_file.display(),
            e
        ))
    })?;

    let summary = service
        .generate_summary(user_query, flux_query, &rows, rows.len())
        .await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "summary": summary,
            "row_count": rows.len(),
        }))?,
        OutputFormat::Text => println!("{}", summary),
    }

    Ok(true)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_header(query: &str, success: bool, attempts: usize) {
    if success {
        println!("{} (attempts: {})", "✓ Query generated".green().bold(), attempts);
    } else {
        println!("{} (attempts: {})", "✗ Query failed".red().bold(), attempts);
    }
    if !query.is_empty() {
        println!();
        println!("{}", query);
        println!();
    }
}

/// Table of the first `limit` rows; columns in order of first appearance.
pub fn render_rows(rows: &[ResultRow], limit: usize) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows.iter().take(limit) {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let header = columns.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    let body = rows.iter().take(limit).map(|row| {
        columns
            .iter()
            .map(|column| row.get(*column).map(cell).unwrap_or_default())
            .collect::<Vec<_>>()
    });

    let mut table = Table::from_iter(std::iter::once(header).chain(body)).to_string();
    if rows.len() > limit {
        table.push_str(&format!("\n... and {} more rows", rows.len() - limit));
    }
    table
}

fn cell(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let first_line = text.lines().next().unwrap_or_default();
    match first_line.char_indices().nth(CELL_WIDTH) {
        Some((cut, _)) => format!("{}...", &first_line[..cut]),
        None if first_line.len() < text.len() => format!("{}...", first_line),
        None => text,
    }
}
