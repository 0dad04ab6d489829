//! HTTP client for the InfluxDB 2.x query API.
//!
//! # Example
//!
//! ```rust,ignore
//! use influx::{FluxStore, InfluxClient, InfluxConfig};
//!
//! let config = InfluxConfig::new("http://localhost:8086", "my-token", "myorg");
//! let client = InfluxClient::new(config)?;
//!
//! let rows = client
//!     .query(r#"from(bucket: "testexecution") |> range(start: -1d) |> limit(n: 5)"#)
//!     .await?;
//! ```

use crate::csv::{decode_annotated_csv, ResultRow};
use crate::error::{reduce_error_message, Result, StoreError};
use crate::store::FluxStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for an InfluxDB 2.x server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// Server URL, e.g. "http://localhost:8086".
    pub url: String,

    /// API token with read access to the bucket.
    pub token: String,

    /// Organization name.
    pub org: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl InfluxConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>, org: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            org: org.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Flux query client.
#[derive(Clone)]
pub struct InfluxClient {
    config: InfluxConfig,
    client: Client,
}

impl InfluxClient {
    /// Create a client. Fails when URL, token or org is empty.
    pub fn new(config: InfluxConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(StoreError::Config("InfluxDB URL is empty".to_string()));
        }
        if config.token.trim().is_empty() {
            return Err(StoreError::Config("InfluxDB token is empty".to_string()));
        }
        if config.org.trim().is_empty() {
            return Err(StoreError::Config("InfluxDB org is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
                Client::new()
            });

        Ok(Self { config, client })
    }

    fn query_url(&self) -> String {
        format!("{}/api/v2/query", self.config.url.trim_end_matches('/'))
    }

    fn query_body<'a>(&self, flux: &'a str) -> QueryBody<'a> {
        QueryBody {
            query: flux,
            kind: "flux",
            dialect: Dialect {
                header: true,
                delimiter: ",",
                annotations: ["datatype", "group", "default"],
                comment_prefix: "#",
                date_time_format: "RFC3339",
            },
        }
    }
}

#[async_trait]
impl FluxStore for InfluxClient {
    async fn query(&self, flux: &str) -> Result<Vec<ResultRow>> {
        debug!(org = %self.config.org, query_len = flux.len(), "Executing Flux query");

        let response = self
            .client
            .post(self.query_url())
            .query(&[("org", self.config.org.as_str())])
            .header("Authorization", format!("Token {}", self.config.token))
            .header("Accept", "application/csv")
            .json(&self.query_body(flux))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&error_text)
                .map(|e| e.message)
                .unwrap_or(error_text);

            return Err(match status.as_u16() {
                401 | 403 => StoreError::Unauthorized(message),
                _ => StoreError::Query(reduce_error_message(&message)),
            });
        }

        let body = response.text().await?;
        let rows = decode_annotated_csv(&body).map_err(|e| match e {
            StoreError::Query(message) => StoreError::Query(reduce_error_message(&message)),
            other => other,
        })?;

        debug!(rows = rows.len(), "Flux query returned");
        Ok(rows)
    }

    async fn is_available(&self) -> Result<bool> {
        let url = format!("{}/health", self.config.url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

// InfluxDB API types
#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    dialect: Dialect,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Dialect {
    header: bool,
    delimiter: &'static str,
    annotations: [&'static str; 3],
    comment_prefix: &'static str,
    date_time_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InfluxConfig {
        InfluxConfig::new("http://localhost:8086/", "token", "myorg")
    }

    #[test]
    fn test_rejects_incomplete_config() {
        let err = InfluxClient::new(InfluxConfig::new("", "token", "myorg")).err().unwrap();
        assert!(matches!(err, StoreError::Config(_)));

        let err = InfluxClient::new(InfluxConfig::new("http://x", " ", "myorg")).err().unwrap();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn test_query_url_trims_trailing_slash() {
        let client = InfluxClient::new(config()).unwrap();
        assert_eq!(client.query_url(), "http://localhost:8086/api/v2/query");
    }

    #[test]
    fn test_query_body_requests_annotations() {
        let client = InfluxClient::new(config()).unwrap();
        let json = serde_json::to_value(client.query_body("from(bucket: \"b\")")).unwrap();

        assert_eq!(json["type"], "flux");
        assert_eq!(json["query"], "from(bucket: \"b\")");
        assert_eq!(json["dialect"]["commentPrefix"], "#");
        assert_eq!(json["dialect"]["annotations"][0], "datatype");
    }

    #[test]
    fn test_timeout_setting() {
        let config = config().with_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_api_error_parsing() {
        let body = r#"{"code":"invalid","message":"compilation failed: error at @1:1-1:5: undefined identifier \"form\""}"#;
        let parsed: ApiError = serde_json::from_str(body).unwrap();
        assert!(parsed.message.starts_with("compilation failed"));
    }
}
