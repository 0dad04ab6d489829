//! Builds the model, store and service from configuration.

use crate::config::FluxsageConfig;
use crate::error::{PipelineError, Result};
use crate::query_log::QueryLog;
use crate::schema::SchemaReference;
use crate::service::QueryService;
use influx::{FluxStore, InfluxClient, InfluxConfig};
use llm::config::{OLLAMA_BASE_URL, OPENAI_BASE_URL};
use llm::local::OllamaClient;
use llm::remote::OpenAiClient;
use llm::{ChatModel, LocalLlmConfig, RemoteLlmConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Chat model for `config.llm.provider`.
pub fn build_model(config: &FluxsageConfig) -> Result<Arc<dyn ChatModel>> {
    let llm = &config.llm;
    let timeout = Duration::from_secs(llm.timeout_secs);

    match llm.provider.as_str() {
        "openai" => {
            let api_key = llm
                .api_key
                .clone()
                .ok_or_else(|| PipelineError::Config("llm.api_key is not set".to_string()))?;
            let base_url = llm.api_base.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            let remote = RemoteLlmConfig::new(api_key, base_url, &llm.model).with_timeout(timeout);
            info!(provider = "openai", model = %llm.model, "Using remote model");
            Ok(Arc::new(OpenAiClient::new(remote)))
        }
        "ollama" => {
            let base_url = llm.api_base.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
            let local = LocalLlmConfig::new(base_url, &llm.model).with_timeout(timeout);
            info!(provider = "ollama", model = %llm.model, "Using local model");
            Ok(Arc::new(OllamaClient::new(local)))
        }
        other => Err(PipelineError::Config(format!(
            "Unknown llm.provider: {}",
            other
        ))),
    }
}

/// InfluxDB store from `config.influx`.
pub fn build_store(config: &FluxsageConfig) -> Result<Arc<dyn FluxStore>> {
    let influx = &config.influx;
    let token = influx
        .token
        .clone()
        .ok_or_else(|| PipelineError::Config("influx.token is not set".to_string()))?;

    let client = InfluxClient::new(
        InfluxConfig::new(&influx.url, token, &influx.org)
            .with_timeout(Duration::from_secs(influx.timeout_secs)),
    )
    .map_err(|e| PipelineError::Config(e.to_string()))?;

    Ok(Arc::new(client))
}

pub fn build_query_log(config: &FluxsageConfig) -> Arc<QueryLog> {
    Arc::new(QueryLog::new(config.query_log_path()))
}

/// Validated config in, ready service out.
pub fn build_service(config: &FluxsageConfig) -> Result<QueryService> {
    config.validate()?;

    let schema = Arc::new(SchemaReference::test_execution(&config.influx.bucket));
    let service = QueryService::new(
        build_model(config)?,
        build_store(config)?,
        schema,
        config.service_options(),
    )
    .with_query_log(build_query_log(config));

    Ok(service)
}
