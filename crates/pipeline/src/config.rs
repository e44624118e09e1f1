//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

/// Environment variable prefix, e.g. `SENSOR_SYNC_DATABASE_URL`
const ENV_PREFIX: &str = "SENSOR_SYNC";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sensor database connection string
    pub database_url: String,
    /// Connection pool size
    pub max_connections: u32,
    /// Number of simulated sensors
    pub sensor_count: u32,
    /// Seconds between collection cycles
    pub interval_secs: u64,
    /// Run one cycle immediately at startup
    pub run_on_startup: bool,
    /// Max log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Prometheus listener; metrics are not exported when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sensors.db".to_string(),
            max_connections: 4,
            sensor_count: 10,
            interval_secs: 5,
            run_on_startup: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_addr: None,
        }
    }
}

impl PipelineConfig {
    /// Load defaults, then the optional config file, then the environment
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid("database_url is empty".to_string()));
        }
        if self.sensor_count == 0 {
            return Err(ConfigError::Invalid("sensor_count must be at least 1".to_string()));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval_secs must be at least 1".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1".to_string()));
        }
        self.level()?;
        Ok(())
    }

    /// Parsed log level
    pub fn level(&self) -> Result<Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)))
    }

    /// Collection interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
