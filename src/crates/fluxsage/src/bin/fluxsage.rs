//! fluxsage CLI - ask questions about test executions in plain language
//!
//! Main entry point for the fluxsage command-line tool.

use clap::{Args, Parser, Subcommand};
use fluxsage::cli::{self, OutputFormat};
use fluxsage::config::ConfigLoader;
use fluxsage::query_log::DEFAULT_RECENT_LIMIT;
use fluxsage::reports::DEFAULT_TOP_LIMIT;
use fluxsage::ReportRequest;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fluxsage")]
#[command(about = "fluxsage - natural-language Flux queries over test execution data", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Read configuration from this file instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log level to debug
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, run and summarize a query
    Ask(RequestArgs),

    /// Generate and validate a query without running it
    Generate(RequestArgs),

    /// Generate, validate and run a query without a summary
    Validate(RequestArgs),

    /// Summarize rows from a JSON file
    Summarize {
        /// The question the rows answer
        query: String,
        /// Flux query that produced the rows
        #[arg(long)]
        flux: String,
        /// JSON array of row objects
        #[arg(long)]
        rows: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Run a predefined report without the model
    #[command(subcommand)]
    Report(ReportCommands),

    /// Inspect the query log
    #[command(subcommand)]
    Logs(LogCommands),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args)]
struct RequestArgs {
    /// The question, in plain language
    query: String,
    /// Execution number substituted for ${execution_number}
    #[arg(short, long)]
    execution: Option<String>,
    /// Synthesis attempt budget (default from configuration)
    #[arg(short, long)]
    retries: Option<usize>,
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Always synthesize a query, even when a predefined report matches
    #[arg(long)]
    no_reports: bool,
}

#[derive(Args)]
struct FormatArg {
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Failed and skipped tests of a build, grouped by failure reason
    Build {
        /// Execution number (default: the latest)
        #[arg(short, long)]
        execution: Option<String>,
        #[command(flatten)]
        output: FormatArg,
    },
    /// Run history and failure reasons of tests matching a name
    Script {
        name: String,
        #[command(flatten)]
        output: FormatArg,
    },
    /// Flaky tests of the last 7 days with their main failure reason
    Flaky {
        #[command(flatten)]
        output: FormatArg,
    },
    /// The most flaky tests of the last 7 days
    TopFlaky {
        #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_LIMIT)]
        limit: usize,
        #[command(flatten)]
        output: FormatArg,
    },
    /// The most failing tests of the last 7 days
    TopFailing {
        #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_LIMIT)]
        limit: usize,
        #[command(flatten)]
        output: FormatArg,
    },
    /// Status changes between two builds (default: the latest two)
    Compare {
        previous: Option<String>,
        current: Option<String>,
        #[command(flatten)]
        output: FormatArg,
    },
}

impl ReportCommands {
    fn into_request(self) -> (ReportRequest, OutputFormat) {
        match self {
            ReportCommands::Build { execution, output } => (ReportRequest::Build(execution), output.format),
            ReportCommands::Script { name, output } => (ReportRequest::Script(name), output.format),
            ReportCommands::Flaky { output } => (ReportRequest::Flaky, output.format),
            ReportCommands::TopFlaky { limit, output } => (ReportRequest::TopFlaky(limit), output.format),
            ReportCommands::TopFailing { limit, output } => {
                (ReportRequest::TopFailing(limit), output.format)
            }
            ReportCommands::Compare {
                previous,
                current,
                output,
            } => (ReportRequest::Comparison(previous, current), output.format),
        }
    }
}

#[derive(Subcommand)]
enum LogCommands {
    /// Show the most recent entries
    Recent {
        #[arg(short, long, default_value_t = DEFAULT_RECENT_LIMIT)]
        limit: usize,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Find entries whose question or query contains a term
    Search {
        term: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show success rate and averages
    Stats {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Report missing or placeholder settings
    Check {
        /// Also check that the model provider and InfluxDB answer
        #[arg(long)]
        connect: bool,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::from_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().await?;

    // RUST_LOG wins, then -v, then the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
        EnvFilter::new(level)
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ok = match cli.command {
        Commands::Ask(args) => {
            let service = cli::build_service(&config)?;
            let routed = if args.no_reports {
                None
            } else {
                cli::report::route(&args.query, args.execution.as_deref())
            };
            match routed {
                Some(report) => {
                    cli::report::handle_report(service.reports(), &report, args.format).await?
                }
                None => {
                    let request = request_from(&service, args.query, args.execution, args.retries);
                    cli::query::handle_ask(&service, &request, args.format).await?
                }
            }
        }
        Commands::Generate(args) => {
            let service = cli::build_service(&config)?;
            let request = request_from(&service, args.query, args.execution, args.retries);
            cli::query::handle_generate(&service, &request, args.format).await?
        }
        Commands::Validate(args) => {
            let service = cli::build_service(&config)?;
            let request = request_from(&service, args.query, args.execution, args.retries);
            cli::query::handle_validate(&service, &request, args.format).await?
        }
        Commands::Summarize {
            query,
            flux,
            rows,
            format,
        } => {
            let service = cli::build_service(&config)?;
            cli::query::handle_summarize(&service, &query, &flux, &rows, format).await?
        }
        Commands::Report(report_cmd) => {
            let service = cli::build_service(&config)?;
            let (request, format) = report_cmd.into_request();
            cli::report::handle_report(service.reports(), &request, format).await?
        }
        Commands::Logs(log_cmd) => {
            let log = cli::build_query_log(&config);
            match log_cmd {
                LogCommands::Recent { limit, format } => {
                    cli::logs::handle_recent(&log, limit, format).await?;
                }
                LogCommands::Search { term, format } => {
                    cli::logs::handle_search(&log, &term, format).await?;
                }
                LogCommands::Stats { format } => {
                    cli::logs::handle_stats(&log, format).await?;
                }
            }
            true
        }
        Commands::Config(ConfigCommands::Check { connect, format }) => {
            cli::config::handle_check(&loader, &config, connect, format).await?
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn request_from(
    service: &fluxsage::QueryService,
    query: String,
    execution: Option<String>,
    retries: Option<usize>,
) -> fluxsage::QueryRequest {
    let mut request = match retries {
        Some(n) => fluxsage::QueryRequest::new(query, n),
        None => service.request(query),
    };
    if let Some(execution) = execution {
        request = request.with_execution_number(execution);
    }
    request
}
