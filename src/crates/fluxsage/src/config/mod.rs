//! Configuration management for fluxsage
//!
//! Supports dual-location configuration:
//! - User-level: ~/.fluxsage/fluxsage.toml
//! - Project-level: ./.fluxsage/fluxsage.toml
//!
//! Project-level config overrides user-level config. Environment variables
//! override both.

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::{FluxsageConfig, InfluxSection, LlmSection, LoggingSection, QuerySection};

use crate::error::Result;

/// Load configuration from both locations with project config taking precedence
///
/// Priority order:
/// 1. Default values
/// 2. User-level config (~/.fluxsage/fluxsage.toml)
/// 3. Project-level config (./.fluxsage/fluxsage.toml)
/// 4. Environment variables
pub async fn load_config() -> Result<FluxsageConfig> {
    ConfigLoader::new().load().await
}
