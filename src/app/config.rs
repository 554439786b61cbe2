//! Application configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::scanner::modules::DEFAULT_KEYWORDS;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dispatch pipeline settings
    pub pipeline: PipelineConfig,

    /// Alert output settings
    pub sink: SinkConfig,

    /// Module selection and module options
    pub modules: ModulesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Transactions dispatched concurrently
    pub max_workers: usize,

    /// Captured transactions buffered ahead of the workers
    pub queue_capacity: usize,

    /// Per-module wall-clock budget in milliseconds (0 to disable)
    pub module_budget_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Alerts buffered between modules and the writer
    pub capacity: usize,

    /// Longest a worker waits for room in a full alert queue, in milliseconds
    pub send_timeout_ms: u64,

    /// Alert output file (JSON lines); stdout when unset
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Module names that are registered but not run
    pub disabled: Vec<String>,

    /// Meta tag detection options
    pub meta_tags: MetaTagsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaTagsConfig {
    /// Case-insensitive keyword patterns, tested in order
    pub keywords: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            queue_capacity: 1024,
            module_budget_ms: 2000,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            send_timeout_ms: 30_000,
            output: None,
        }
    }
}

impl Default for MetaTagsConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    pub fn module_budget(&self) -> Option<Duration> {
        match self.module_budget_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl SinkConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// An explicit path must exist; the default location falls back to defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                let p = PathBuf::from(p);
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.display().to_string()).into());
                }
                p
            }
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).map_err(|source| ConfigError::ReadError {
                    path: config_path.display().to_string(),
                    source,
                })?;

            let config: Config = toml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;

            tracing::info!("Loaded configuration from {:?}", config_path);
            Ok(config)
        } else {
            tracing::info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Check values that would stall or break the pipeline
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_workers == 0 {
            return Err(invalid("pipeline.max_workers", "must be greater than 0"));
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(invalid("pipeline.queue_capacity", "must be greater than 0"));
        }

        if self.sink.capacity == 0 {
            return Err(invalid("sink.capacity", "must be greater than 0"));
        }

        if self.sink.send_timeout_ms == 0 {
            return Err(invalid("sink.send_timeout_ms", "must be greater than 0"));
        }

        Ok(())
    }

    /// Get default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "vantage", "vantage")
            .context("Failed to determine config directory")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "vantage", "vantage")
            .context("Failed to determine data directory")?;

        Ok(dirs.data_dir().to_path_buf())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
