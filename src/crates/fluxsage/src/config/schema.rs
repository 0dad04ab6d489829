//! Configuration schema definitions

use crate::error::{PipelineError, Result};
use crate::service::ServiceOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main fluxsage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FluxsageConfig {
    /// Language model configuration
    #[serde(default)]
    pub llm: LlmSection,

    /// InfluxDB connection
    #[serde(default)]
    pub influx: InfluxSection,

    /// Query pipeline tunables
    #[serde(default)]
    pub query: QuerySection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Language model provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// "openai" or "ollama"
    pub provider: String,

    pub model: String,

    /// API key (supports environment variable interpolation)
    pub api_key: Option<String>,

    /// Custom endpoint; provider default when unset
    pub api_base: Option<String>,

    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: Some("${OPENAI_API_KEY}".to_string()),
            api_base: None,
            timeout_secs: 60,
        }
    }
}

/// InfluxDB v2 connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxSection {
    pub url: String,
    pub token: Option<String>,
    pub org: String,
    pub bucket: String,
    pub timeout_secs: u64,
}

impl Default for InfluxSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            token: Some("${INFLUX_TOKEN}".to_string()),
            org: "myorg".to_string(),
            bucket: "testexecution".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Query pipeline tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    /// Substituted for `${execution_number}` when a request names none
    pub default_execution_number: String,

    /// Synthesis attempt budget
    pub max_retries: usize,

    pub summary_sample_rows: usize,

    /// Character cap for failure_stack/failure_message in summary prompts
    pub max_field_chars: usize,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            default_execution_number: "1".to_string(),
            max_retries: 3,
            summary_sample_rows: 100,
            max_field_chars: 1500,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// JSON query log; relative paths resolve against the working directory
    pub query_log_path: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            query_log_path: "query_logs.json".to_string(),
        }
    }
}

impl FluxsageConfig {
    /// Resolve environment variables in configuration values
    ///
    /// Supports ${VAR_NAME} syntax in string fields
    pub fn resolve_env_vars(&mut self) {
        for value in [
            &mut self.llm.api_key,
            &mut self.llm.api_base,
            &mut self.influx.token,
        ]
        .into_iter()
        .flatten()
        {
            *value = Self::expand_env_var(value);
        }

        self.influx.url = Self::expand_env_var(&self.influx.url);
        self.influx.org = Self::expand_env_var(&self.influx.org);
    }

    /// Expand environment variable in a string
    ///
    /// Supports ${VAR_NAME} syntax; unset variables leave the value as is
    fn expand_env_var(value: &str) -> String {
        match value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
            Some(var_name) => std::env::var(var_name).unwrap_or_else(|_| value.to_string()),
            None => value.to_string(),
        }
    }

    /// Apply well-known environment variable overrides.
    ///
    /// `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("OPENAI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("INFLUX_URL") {
            self.influx.url = v;
        }
        if let Some(v) = lookup("INFLUX_TOKEN") {
            self.influx.token = Some(v);
        }
        if let Some(v) = lookup("INFLUX_ORG") {
            self.influx.org = v;
        }
        if let Some(v) = lookup("INFLUX_BUCKET") {
            self.influx.bucket = v;
        }
        if let Some(v) = lookup("DEFAULT_EXECUTION_NUMBER") {
            self.query.default_execution_number = v;
        }
        if let Some(v) = lookup("MAX_RETRIES") {
            match v.trim().parse() {
                Ok(n) => self.query.max_retries = n,
                Err(_) => tracing::warn!(value = %v, "Ignoring non-numeric MAX_RETRIES"),
            }
        }
    }

    /// Missing or placeholder settings, one message each.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.llm.provider == "openai" {
            check_credential(&mut problems, "llm.api_key (OPENAI_API_KEY)", self.llm.api_key.as_deref());
        } else if self.llm.provider != "ollama" {
            problems.push(format!(
                "llm.provider must be \"openai\" or \"ollama\", got \"{}\"",
                self.llm.provider
            ));
        }

        check_credential(&mut problems, "influx.token (INFLUX_TOKEN)", self.influx.token.as_deref());
        check_credential(&mut problems, "influx.url (INFLUX_URL)", Some(&self.influx.url));
        check_credential(&mut problems, "influx.org (INFLUX_ORG)", Some(&self.influx.org));

        problems
    }

    /// Reject missing or placeholder credentials.
    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Config(problems.join("; ")))
        }
    }

    pub fn query_log_path(&self) -> PathBuf {
        PathBuf::from(&self.logging.query_log_path)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            default_execution_number: self.query.default_execution_number.clone(),
            max_attempts: self.query.max_retries.max(1),
            summary_sample_rows: self.query.summary_sample_rows,
            max_field_chars: self.query.max_field_chars,
        }
    }
}

fn check_credential(problems: &mut Vec<String>, name: &str, value: Option<&str>) {
    match value.map(str::trim) {
        None | Some("") => problems.push(format!("{name} is not set")),
        Some(v) if v.starts_with("your_") || v.starts_with("${") => {
            problems.push(format!("{name} is still a placeholder"))
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn configured() -> FluxsageConfig {
        let mut config = FluxsageConfig::default();
        config.llm.api_key = Some("sk-test".to_string());
        config.influx.token = Some("tok".to_string());
        config
    }

    #[test]
    fn test_default_config() {
        let config = FluxsageConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.influx.org, "myorg");
        assert_eq!(config.influx.bucket, "testexecution");
        assert_eq!(config.query.default_execution_number, "1");
        assert_eq!(config.query.max_retries, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_var_expansion() {
        let mut config = FluxsageConfig::default();
        config.llm.api_key = Some("${FLUXSAGE_TEST_API_KEY}".to_string());

        std::env::set_var("FLUXSAGE_TEST_API_KEY", "test-key-123");
        config.resolve_env_vars();

        assert_eq!(config.llm.api_key, Some("test-key-123".to_string()));

        std::env::remove_var("FLUXSAGE_TEST_API_KEY");
    }

    #[test]
    fn test_unset_env_var_is_kept() {
        assert_eq!(
            FluxsageConfig::expand_env_var("${FLUXSAGE_SURELY_UNSET_VAR}"),
            "${FLUXSAGE_SURELY_UNSET_VAR}"
        );
        assert_eq!(FluxsageConfig::expand_env_var("plain"), "plain");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_MODEL", "gpt-4o"),
            ("INFLUX_BUCKET", "ci"),
            ("DEFAULT_EXECUTION_NUMBER", "3573"),
            ("MAX_RETRIES", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = FluxsageConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.influx.bucket, "ci");
        assert_eq!(config.query.default_execution_number, "3573");
        assert_eq!(config.query.max_retries, 5);
        assert_eq!(config.influx.org, "myorg");
    }

    #[test]
    fn test_bad_max_retries_is_ignored() {
        let mut config = FluxsageConfig::default();
        config.apply_env_overrides(|k| (k == "MAX_RETRIES").then(|| "many".to_string()));
        assert_eq!(config.query.max_retries, 3);
    }

    #[test]
    fn test_validate_accepts_real_credentials() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_placeholders() {
        let mut config = configured();
        config.llm.api_key = Some("your_openai_api_key_here".to_string());
        config.influx.token = None;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("llm.api_key (OPENAI_API_KEY) is still a placeholder"));
        assert!(err.contains("influx.token (INFLUX_TOKEN) is not set"));

        // unexpanded ${VAR} counts as a placeholder too
        assert_eq!(FluxsageConfig::default().problems().len(), 2);
    }

    #[test]
    fn test_ollama_needs_no_api_key() {
        let mut config = configured();
        config.llm.provider = "ollama".to_string();
        config.llm.api_key = None;
        assert!(config.validate().is_ok());

        config.llm.provider = "bard".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_service_options_clamp_attempts() {
        let mut config = configured();
        config.query.max_retries = 0;
        assert_eq!(config.service_options().max_attempts, 1);
    }
}
