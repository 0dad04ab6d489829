//! Configuration command handlers

use crate::cli::context::{build_model, build_store};
use crate::cli::OutputFormat;
use crate::config::{ConfigLoader, FluxsageConfig};
use crate::error::Result;
use colored::Colorize;
use influx::FluxStore;
use llm::ChatModel;
use serde::Serialize;

/// Whether one configured service answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub service: &'static str,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceStatus {
    fn from_check(service: &'static str, check: std::result::Result<bool, String>) -> Self {
        match check {
            Ok(reachable) => Self {
                service,
                reachable,
                error: None,
            },
            Err(error) => Self {
                service,
                reachable: false,
                error: Some(error),
            },
        }
    }
}

/// Ask the model provider and the store whether they are reachable.
pub async fn check_connectivity(model: &dyn ChatModel, store: &dyn FluxStore) -> Vec<ServiceStatus> {
    let (model_check, store_check) = tokio::join!(model.is_available(), store.is_available());
    vec![
        ServiceStatus::from_check("llm", model_check.map_err(|e| e.to_string())),
        ServiceStatus::from_check("influx", store_check.map_err(|e| e.to_string())),
    ]
}

async fn connect(config: &FluxsageConfig) -> Vec<ServiceStatus> {
    match (build_model(config), build_store(config)) {
        (Ok(model), Ok(store)) => check_connectivity(model.as_ref(), store.as_ref()).await,
        (model, store) => vec![
            ServiceStatus::from_check("llm", unchecked(model)),
            ServiceStatus::from_check("influx", unchecked(store)),
        ],
    }
}

/// Neither service is contacted unless both clients could be built.
fn unchecked<T>(built: Result<T>) -> std::result::Result<bool, String> {
    match built {
        Ok(_) => Err("not checked".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Handle `config check`: report which files were read and every missing
/// or placeholder setting, and with `connect` whether the model provider
/// and InfluxDB answer. Returns whether the configuration is usable.
pub async fn handle_check(
    loader: &ConfigLoader,
    config: &FluxsageConfig,
    connect_services: bool,
    format: OutputFormat,
) -> Result<bool> {
    let problems = config.problems();
    let services = if connect_services {
        connect(config).await
    } else {
        Vec::new()
    };
    let ok = problems.is_empty() && services.iter().all(|s| s.reachable);
    let files: Vec<String> = loader
        .existing_paths()
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "ok": ok,
                "files": files,
                "problems": problems,
                "services": services,
                "llm": { "provider": config.llm.provider, "model": config.llm.model },
                "influx": {
                    "url": config.influx.url,
                    "org": config.influx.org,
                    "bucket": config.influx.bucket,
                },
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!("Configuration Check");
            println!("===================");
            if files.is_empty() {
                println!("Files: none (defaults and environment only)");
            } else {
                for file in &files {
                    println!("File:   {}", file);
                }
            }
            println!("Model:  {}:{}", config.llm.provider, config.llm.model);
            println!(
                "Influx: {} (org {}, bucket {})",
                config.influx.url, config.influx.org, config.influx.bucket
            );
            println!();

            if problems.is_empty() {
                println!("{}", "✓ Configuration is complete".green().bold());
            } else {
                for problem in &problems {
                    println!("{} {}", "✗".red(), problem);
                }
            }
            for status in &services {
                match (&status.error, status.reachable) {
                    (_, true) => println!("{} {} reachable", "✓".green(), status.service),
                    (Some(error), false) => println!("{} {}: {}", "✗".red(), status.service, error),
                    (None, false) => println!("{} {} unreachable", "✗".red(), status.service),
                }
            }
        }
    }

    Ok(ok)
}
