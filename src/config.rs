use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::solver::ModelParams;

/// Errors in service configuration; all are fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Environment(#[from] envy::Error),

    #[error("confidence must be a finite value greater than zero, got {0}")]
    InvalidConfidence(f64),

    #[error("regularization must be a finite value greater than zero, got {0}")]
    InvalidRegularization(f64),

    #[error("max_count must be at least 1")]
    ZeroMaxCount,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Directory holding the trained model artifacts
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Item factor array, relative to `data_dir`
    #[serde(default = "default_factors_file")]
    pub factors_file: String,

    /// Identifier list, relative to `data_dir`
    #[serde(default = "default_items_file")]
    pub items_file: String,

    /// Weight given to observed interactions in the preference solve
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    /// Ridge penalty of the preference solve
    #[serde(default = "default_regularization")]
    pub regularization: f64,

    /// Recommendations returned when a request does not ask for a count
    #[serde(default = "default_count")]
    pub default_count: usize,

    /// Upper bound on the count a request may ask for
    #[serde(default = "default_max_count")]
    pub max_count: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/")
}

fn default_factors_file() -> String {
    crate::store::FACTORS_FILE.to_string()
}

fn default_items_file() -> String {
    crate::store::ITEMS_FILE.to_string()
}

fn default_confidence() -> f64 {
    3.0
}

fn default_regularization() -> f64 {
    0.001
}

fn default_count() -> usize {
    10
}

fn default_max_count() -> usize {
    100
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Bounds applied to the per-request recommendation count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountLimits {
    pub default_count: usize,
    pub max_count: usize,
}

impl CountLimits {
    pub fn new(default_count: usize, max_count: usize) -> Result<Self, ConfigError> {
        if max_count == 0 {
            return Err(ConfigError::ZeroMaxCount);
        }
        Ok(Self {
            default_count: default_count.min(max_count),
            max_count,
        })
    }

    /// Count to serve for a request asking for `requested` items.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_count).min(self.max_count)
    }
}

impl Default for CountLimits {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            max_count: default_max_count(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env::<Config>()?)
    }

    /// Validated solver hyperparameters
    pub fn model_params(&self) -> Result<ModelParams, ConfigError> {
        ModelParams::new(self.confidence, self.regularization)
    }

    /// Validated request count bounds
    pub fn count_limits(&self) -> Result<CountLimits, ConfigError> {
        CountLimits::new(self.default_count, self.max_count)
    }

    pub fn factors_path(&self) -> PathBuf {
        self.data_dir.join(&self.factors_file)
    }

    pub fn items_path(&self) -> PathBuf {
        self.data_dir.join(&self.items_file)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
