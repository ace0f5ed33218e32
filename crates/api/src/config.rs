//! Service configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `PADDY__SECTION__KEY` environment variables.

use class_mapping::DEFAULT_HEALTHY_LABEL;
use image_preprocess::PreprocessConfig;
use inference_engine::ModelConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

/// Config file read when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "config/paddy";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PADDY";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid log level {0:?}: expected trace, debug, info, warn or error")]
    InvalidLogLevel(String),
}

/// Full service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelConfig,
    pub mappings: MappingConfig,
    pub preprocess: PreprocessConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration; an explicit path must exist, the default file is optional
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.logging.max_level()?;
        Ok(config)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Maximum upload size in bytes
    pub body_limit_bytes: usize,
    /// Give up waiting for a prediction after this many seconds
    pub request_timeout_secs: Option<u64>,
    /// Expose Prometheus metrics on /metrics
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            body_limit_bytes: 10 * 1024 * 1024,
            request_timeout_secs: None,
            metrics: true,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Class mapping resources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Disease index-to-label JSON
    pub disease_path: PathBuf,
    /// Variety index-to-label JSON
    pub variety_path: PathBuf,
    /// Disease label that means "healthy"
    pub healthy_label: String,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            disease_path: PathBuf::from("config/disease_classes.json"),
            variety_path: PathBuf::from("config/variety_classes.json"),
            healthy_label: DEFAULT_HEALTHY_LABEL.to_string(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl LoggingConfig {
    /// Parsed maximum level (case-insensitive)
    pub fn max_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.level).map_err(|_| ConfigError::InvalidLogLevel(self.level.clone()))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
