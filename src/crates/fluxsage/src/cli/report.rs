//! Report command handlers

use crate::cli::query::render_rows;
use crate::cli::OutputFormat;
use crate::error::{PipelineError, Result};
use crate::reports::{detect_report, Report, ReportRequest, ReportService};
use colored::Colorize;

/// Rows of a report table shown in text output.
const TEXT_ROW_LIMIT: usize = 20;

/// Handle `report <kind>` and `ask` requests routed to a report.
///
/// A report with nothing to work on is printed as a failure, not raised.
pub async fn handle_report(
    reports: &ReportService,
    request: &ReportRequest,
    format: OutputFormat,
) -> Result<bool> {
    let report = match reports.run(request).await {
        Ok(report) => report,
        Err(PipelineError::NoData(message)) => {
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "success": false,
                        "error": message,
                    }))?
                ),
                OutputFormat::Text => println!("{} {}", "✗".red(), message),
            }
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => println!("{}", render_report(&report)),
    }
    Ok(true)
}

/// Report an `ask` question should be answered with, if any. An execution
/// number given on the command line fills in a build report that names none.
pub fn route(query: &str, execution: Option<&str>) -> Option<ReportRequest> {
    match detect_report(query)? {
        ReportRequest::Build(None) => Some(ReportRequest::Build(execution.map(str::to_string))),
        other => Some(other),
    }
}

/// Title, then markdown and the row table when the report has them.
pub fn render_report(report: &Report) -> String {
    let mut out = format!("{}\n", report.title().bold());
    if let Some(markdown) = report.markdown() {
        out.push('\n');
        out.push_str(markdown);
        out.push('\n');
    }
    if let Some(rows) = report.rows() {
        out.push('\n');
        if rows.is_empty() {
            out.push_str("No rows.");
        } else {
            out.push_str(&render_rows(rows, TEXT_ROW_LIMIT));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}
