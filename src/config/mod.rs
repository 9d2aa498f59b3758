//! Configuration module for the Kahiko RPC framework.
//!
//! This module provides a layered configuration system that loads defaults,
//! then a file (TOML, YAML, or JSON), then environment variables, validating
//! the merged result before use. The loaded configuration is never stashed
//! in a process-wide global: the host binary loads it once and passes it by
//! value into `Server`/`Client` construction (see the "Global mutable
//! state" design decision in `DESIGN.md`).

use std::path::{Path, PathBuf};
use crate::error::config::ConfigError;
use config::{Config, ConfigError as ExternalConfigError, Environment, File};
use serde::{Deserialize, Serialize};

pub mod http;
pub mod limits;
pub mod server;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A trait for types that can be validated.
pub trait Validate {
    /// Validates that the configuration is correct.
    fn validate(&self) -> ConfigResult<()>;
}

/// Top-level configuration for the Kahiko RPC framework.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KahikoConfig {
    /// Server configuration
    pub server: server::ServerConfig,

    /// HTTP transport configuration
    pub http: http::HttpConfig,

    /// Resource limits configuration
    pub limits: limits::LimitsConfig,

    /// Log configuration
    pub log: LogConfig,
}

impl Validate for KahikoConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.http.validate()?;
        self.limits.validate()?;
        self.log.validate()?;
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Whether to log in JSON format
    pub json: bool,

    /// Whether to include source code locations in logs
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            source_location: true,
        }
    }
}

impl Validate for LogConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}",
                self.level
            ))),
        }
    }
}

/// Configuration loader for the Kahiko RPC framework.
#[derive(Debug)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    pub fn new<P: AsRef<Path>>(config_path: Option<P>, env_prefix: &str) -> Self {
        Self {
            config_path: config_path.map(|p| p.as_ref().to_path_buf()),
            env_prefix: env_prefix.to_string(),
        }
    }

    /// Loads the configuration from a file and environment variables.
    pub fn load(&self) -> ConfigResult<KahikoConfig> {
        let mut builder = Config::builder();

        builder = builder.add_source(
            Config::try_from(&KahikoConfig::default())
                .map_err(|e| ConfigError::ParseError(e.to_string()))?,
        );

        if let Some(path) = &self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }

            builder = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => builder.add_source(File::with_name(path.to_str().unwrap())),
                Some("json") => builder.add_source(
                    File::with_name(path.to_str().unwrap()).format(config::FileFormat::Json),
                ),
                Some("yaml" | "yml") => builder.add_source(
                    File::with_name(path.to_str().unwrap()).format(config::FileFormat::Yaml),
                ),
                _ => {
                    return Err(ConfigError::ParseError(format!(
                        "Unsupported file extension for: {path:?}"
                    )))
                }
            };
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(|e| match e {
            ExternalConfigError::NotFound(path) => ConfigError::FileNotFound(PathBuf::from(path)),
            ExternalConfigError::PathParse(path) => {
                ConfigError::ParseError(format!("Invalid path: {path:?}"))
            }
            ExternalConfigError::FileParse { .. } => {
                ConfigError::ParseError("Error parsing config file".to_string())
            }
            ExternalConfigError::Foreign(err) => ConfigError::ParseError(err.to_string()),
            ExternalConfigError::Frozen => {
                ConfigError::ParseError("Configuration is frozen".to_string())
            }
            ExternalConfigError::Message(msg) => ConfigError::ParseError(msg),
            ExternalConfigError::Type { .. } => {
                ConfigError::ParseError("Type conversion error".to_string())
            }
        })?;

        let kahiko_config: KahikoConfig = config
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        kahiko_config.validate()?;

        Ok(kahiko_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = KahikoConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_catches_bad_values() {
        let mut config = KahikoConfig::default();
        config.server.worker_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        std::env::remove_var("TEST_FILE__SERVER__NAME");

        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config_file_test.toml");

        let config_content = r#"
        [server]
        name = "test-server"
        worker_threads = 2
        "#;

        fs::write(&config_path, config_content).unwrap();

        let loader = ConfigLoader::new(Some(&config_path), "TEST_FILE");
        let config = loader.load().unwrap();

        assert_eq!(config.server.name, "test-server");
        assert_eq!(config.server.worker_threads, 2);
    }

    #[test]
    fn test_env_var_override() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config_env_test.toml");
        fs::write(&config_path, "[server]\nname = \"test-server\"\n").unwrap();

        std::env::set_var("TEST_ENV__SERVER__NAME", "env-server");

        let loader = ConfigLoader::new(Some(&config_path), "TEST_ENV");
        let config = loader.load().unwrap();

        assert_eq!(config.server.name, "env-server");

        std::env::remove_var("TEST_ENV__SERVER__NAME");
    }

    #[test]
    fn test_load_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("invalid.toml");
        fs::write(&config_path, "[server\nname = test-server\"\n").unwrap();

        let loader = ConfigLoader::new(Some(&config_path), "TEST_INVALID");
        assert!(loader.load().is_err());
    }
}
