//! Configuration Loader
//!
//! Layers consumer configuration from built-in defaults, an optional YAML
//! file and environment variables (`HARNESS__DROP_EXCHANGE=dead-letter`),
//! later sources overriding earlier ones.

use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::ConsumerConfig;

const DEFAULT_ENV_PREFIX: &str = "HARNESS";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
        }
    }

    /// Read a YAML file; a missing file is an error
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Use a different environment variable prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Ignore the environment entirely
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Build and validate the configuration
    pub fn load(&self) -> ConfigResult<ConsumerConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&ConsumerConfig::default())?);

        if let Some(path) = &self.file {
            if !path.is_file() {
                return Err(ConfigurationError::load_error(
                    path.display().to_string(),
                    "file not found",
                ));
            }
            builder = builder.add_source(File::from(path.clone()).format(FileFormat::Yaml));
        }

        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let source_name = self
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());
        let config: ConsumerConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::load_error(source_name, e))?;

        config.validate()?;
        debug!(
            consumer = %config.name,
            drop_exchange = ?config.drop_exchange,
            error_exchange = %config.error_exchange,
            "✅ Consumer configuration loaded"
        );
        Ok(config)
    }
}
