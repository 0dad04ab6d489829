//! Configuration loader with dual-location support
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.fluxsage/fluxsage.toml
//! 3. Project-level config: ./.fluxsage/fluxsage.toml
//!
//! Later configs override earlier ones key by key, so a project file that
//! sets only `llm.model` keeps the user's `llm.provider`. An explicit path
//! replaces both locations.

use crate::config::schema::FluxsageConfig;
use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use toml::Table;
use tracing::{debug, info};

/// Configuration loader that handles both user and project configs
pub struct ConfigLoader {
    user_config_path: PathBuf,
    project_config_path: PathBuf,
    explicit_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            user_config_path: Self::user_config_path(),
            project_config_path: Self::project_config_path(),
            explicit_path: None,
        }
    }

    /// Loader reading only `path`; a missing file is an error.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            explicit_path: Some(path.into()),
            ..Self::new()
        }
    }

    /// Get user-level config path (~/.fluxsage/fluxsage.toml)
    fn user_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fluxsage")
            .join("fluxsage.toml")
    }

    /// Get project-level config path (./.fluxsage/fluxsage.toml)
    fn project_config_path() -> PathBuf {
        PathBuf::from(".fluxsage").join("fluxsage.toml")
    }

    /// Load, merge, expand `${VAR}` values and apply environment overrides.
    pub async fn load(&self) -> Result<FluxsageConfig> {
        let mut config = self.load_files().await?;
        config.resolve_env_vars();
        config.apply_env_overrides(|name| std::env::var(name).ok());

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Defaults plus config files, without environment handling.
    pub async fn load_files(&self) -> Result<FluxsageConfig> {
        if let Some(path) = &self.explicit_path {
            let table = self.load_table(path).await?;
            info!(path = %path.display(), "Loaded explicit config");
            return Self::into_config(table);
        }

        let mut merged = Table::new();
        info!("Loading configuration with defaults");

        for (label, path) in [
            ("user", &self.user_config_path),
            ("project", &self.project_config_path),
        ] {
            match self.load_table(path).await {
                Ok(table) => {
                    debug!(path = %path.display(), level = label, "Loaded config");
                    merge_tables(&mut merged, table);
                }
                Err(e) => {
                    debug!(
                        path = %path.display(),
                        level = label,
                        error = %e,
                        "Config not loaded"
                    );
                }
            }
        }

        Self::into_config(merged)
    }

    async fn load_table(&self, path: &Path) -> Result<Table> {
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::Config(format!("Failed to read config: {}", e)))?;

        content
            .parse::<Table>()
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))
    }

    fn into_config(table: Table) -> Result<FluxsageConfig> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|e| PipelineError::Config(format!("Invalid config: {}", e)))
    }

    /// Get user config path
    pub fn get_user_config_path(&self) -> &PathBuf {
        &self.user_config_path
    }

    /// Get project config path
    pub fn get_project_config_path(&self) -> &PathBuf {
        &self.project_config_path
    }

    /// Paths that exist and would be read, in precedence order.
    pub fn existing_paths(&self) -> Vec<&Path> {
        match &self.explicit_path {
            Some(path) => vec![path.as_path()],
            None => [&self.user_config_path, &self.project_config_path]
                .into_iter()
                .filter(|p| p.exists())
                .map(PathBuf::as_path)
                .collect(),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively overlay `overlay` onto `base`.
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader(user: PathBuf, project: PathBuf) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        loader.user_config_path = user;
        loader.project_config_path = project;
        loader
    }

    #[test]
    fn test_config_paths() {
        let loader = ConfigLoader::new();

        assert!(loader.get_user_config_path().ends_with(".fluxsage/fluxsage.toml"));
        assert!(loader.get_project_config_path().ends_with(".fluxsage/fluxsage.toml"));
    }

    #[tokio::test]
    async fn test_defaults_when_no_files() {
        let loader = loader(
            PathBuf::from("/nonexistent/user.toml"),
            PathBuf::from("/nonexistent/project.toml"),
        );

        let config = loader.load_files().await.unwrap();
        assert_eq!(config, FluxsageConfig::default());
    }

    #[tokio::test]
    async fn test_config_merging_priority() {
        let temp_dir = TempDir::new().unwrap();
        let user_path = temp_dir.path().join("user.toml");
        let project_path = temp_dir.path().join("project.toml");

        fs::write(
            &user_path,
            r#"
[llm]
provider = "ollama"
model = "llama3"

[query]
max_retries = 5
"#,
        )
        .await
        .unwrap();
        fs::write(
            &project_path,
            r#"
[llm]
model = "qwen2.5-coder"

[influx]
bucket = "ci"
"#,
        )
        .await
        .unwrap();

        let config = loader(user_path, project_path).load_files().await.unwrap();

        assert_eq!(config.llm.model, "qwen2.5-coder"); // project
        assert_eq!(config.llm.provider, "ollama"); // user, not overridden
        assert_eq!(config.query.max_retries, 5); // user
        assert_eq!(config.influx.bucket, "ci"); // project
        assert_eq!(config.influx.org, "myorg"); // default
        assert_eq!(config.logging.level, "info"); // default
    }

    #[tokio::test]
    async fn test_empty_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let user_path = temp_dir.path().join("user.toml");
        fs::write(&user_path, "# nothing here\n").await.unwrap();

        let config = loader(user_path, PathBuf::from("/nonexistent/project.toml"))
            .load_files()
            .await
            .unwrap();

        assert_eq!(config, FluxsageConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_toml_is_skipped_for_discovered_files() {
        let temp_dir = TempDir::new().unwrap();
        let user_path = temp_dir.path().join("user.toml");
        fs::write(&user_path, "[llm\nmodel = ").await.unwrap();

        let config = loader(user_path, PathBuf::from("/nonexistent/project.toml"))
            .load_files()
            .await
            .unwrap();

        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_explicit_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        fs::write(&path, "[influx]\norg = \"qa\"\n").await.unwrap();

        let config = ConfigLoader::from_path(&path).load_files().await.unwrap();
        assert_eq!(config.influx.org, "qa");

        let missing = ConfigLoader::from_path(temp_dir.path().join("missing.toml"))
            .load_files()
            .await;
        assert!(matches!(missing, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_wrong_type_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        fs::write(&path, "[query]\nmax_retries = \"three\"\n").await.unwrap();

        let err = ConfigLoader::from_path(&path).load_files().await.unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }

    #[test]
    fn test_merge_tables_is_recursive() {
        let mut base: Table = "[a]\nx = 1\ny = 2\n".parse().unwrap();
        let overlay: Table = "[a]\ny = 3\n[b]\nz = 4\n".parse().unwrap();

        merge_tables(&mut base, overlay);

        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
        assert_eq!(base["b"]["z"].as_integer(), Some(4));
    }
}
