//! Configuration management for the pipeline.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. `config/default.{toml,yaml,json}` (optional)
//! 3. `config/{APP_ENV}.{toml,yaml,json}` (optional)
//! 4. An explicit file given on the command line (optional)
//! 5. Environment variables prefixed with `LMS_`, nested with `__`
//!
//! ## Example Configuration
//!
//! ```toml
//! [services]
//! scoring_url = "http://scoring.internal:8001"
//! prediction_url = "http://prediction.internal:8002"
//!
//! [inventory]
//! expiry_lead_days = 15
//! audience_roles = ["admin", "gerente"]
//! ```
//!
//! The same keys from the environment: `LMS_SERVICES__SCORING_URL=...`,
//! `LMS_INVENTORY__AUDIENCE_ROLES=admin,gerente`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "LMS";

/// Upper bound of `inventory.expiry_lead_days`
const MAX_EXPIRY_LEAD_DAYS: i64 = 3650;

/// Root configuration shared by every pipeline component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub services: ServicesConfig,
    pub telemetry: TelemetryConfig,
    pub grading: GradingConfig,
    pub recalibration: RecalibrationConfig,
    pub inventory: InventoryConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_db_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
            timeout_seconds: default_db_timeout(),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

/// Endpoints of the external ML services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Base URL of the answer scoring agent
    #[serde(default = "default_scoring_url")]
    pub scoring_url: String,

    /// Base URL of the prediction pipeline
    #[serde(default = "default_prediction_url")]
    pub prediction_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            scoring_url: default_scoring_url(),
            prediction_url: default_prediction_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable JSON logging format
    #[serde(default)]
    pub json_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            json_logging: false,
            log_level: default_log_level(),
        }
    }
}

/// Essay grading settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Answers must exceed this many words to be sent to the scorer
    #[serde(default = "default_word_threshold")]
    pub long_answer_word_threshold: usize,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            long_answer_word_threshold: default_word_threshold(),
        }
    }
}

/// Difficulty recalibration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalibrationConfig {
    /// Questions need strictly more uses than this
    #[serde(default = "default_min_usage")]
    pub min_usage: u32,

    /// Drift strictly above this is logged as significant
    #[serde(default = "default_significant_delta")]
    pub significant_delta: f64,

    /// Questions recalibrated at the same time; 1 runs them in order
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RecalibrationConfig {
    fn default() -> Self {
        Self {
            min_usage: default_min_usage(),
            significant_delta: default_significant_delta(),
            concurrency: default_concurrency(),
        }
    }
}

/// Inventory alert settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Look-ahead window of the near-expiry sweep, in days
    #[serde(default = "default_lead_days")]
    pub expiry_lead_days: i64,

    /// Window in which a repeated notification is suppressed, in hours
    #[serde(default = "default_dedup_window")]
    pub dedup_window_hours: i64,

    /// Roles that receive inventory notifications
    #[serde(default = "default_audience_roles")]
    pub audience_roles: Vec<String>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            expiry_lead_days: default_lead_days(),
            dedup_window_hours: default_dedup_window(),
            audience_roles: default_audience_roles(),
        }
    }
}

// Default value functions
fn default_database_url() -> String {
    "postgres://localhost:5432/plataforma_educativa".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_db_timeout() -> u64 {
    30
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_scoring_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_prediction_url() -> String {
    "http://localhost:8002".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_service_name() -> String {
    "lms-pipeline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_word_threshold() -> usize {
    500
}

fn default_min_usage() -> u32 {
    5
}

fn default_significant_delta() -> f64 {
    0.15
}

fn default_concurrency() -> usize {
    1
}

fn default_lead_days() -> i64 {
    30
}

fn default_dedup_window() -> i64 {
    24
}

fn default_audience_roles() -> Vec<String> {
    ["admin", "gerente", "encargado_inventario"]
        .iter()
        .map(|role| role.to_string())
        .collect()
}

/// Build the layered configuration sources.
///
/// Exposed so that binaries can read their own sections from the same layers.
pub fn layered(explicit_file: Option<&str>) -> Result<config::Config> {
    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false))
        .add_source(config::File::with_name(&format!("config/{}", env)).required(false));

    if let Some(path) = explicit_file {
        builder = builder.add_source(config::File::with_name(path).required(true));
    }

    builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("inventory.audience_roles")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")
}

impl PipelineConfig {
    /// Load and validate the configuration
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lms_pipeline_common::config::PipelineConfig;
    ///
    /// let config = PipelineConfig::load(None).expect("Failed to load configuration");
    /// println!("Scoring agent at {}", config.services.scoring_url);
    /// ```
    pub fn load(explicit_file: Option<&str>) -> Result<Self> {
        Self::from_layers(&layered(explicit_file)?)
    }

    /// Deserialize and validate from already built layers
    pub fn from_layers(layers: &config::Config) -> Result<Self> {
        let config: PipelineConfig = layers
            .clone()
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL is required");
        }

        if self.database.pool_size == 0 {
            anyhow::bail!("Database pool size must be greater than 0");
        }

        if self.database.timeout_seconds == 0 {
            anyhow::bail!("Database timeout must be greater than 0");
        }

        if self.redis.url.is_empty() {
            anyhow::bail!("Redis URL is required");
        }

        for (name, value) in [
            ("scoring", &self.services.scoring_url),
            ("prediction", &self.services.prediction_url),
        ] {
            url::Url::parse(value)
                .with_context(|| format!("Invalid {} service URL '{}'", name, value))?;
        }

        if self.services.request_timeout_seconds == 0 {
            anyhow::bail!("Service request timeout must be greater than 0");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.telemetry.log_level,
                valid_log_levels.join(", ")
            );
        }

        if !(0.0..=1.0).contains(&self.recalibration.significant_delta) {
            anyhow::bail!("Significant difficulty delta must be within 0..=1");
        }

        if self.recalibration.concurrency == 0 {
            anyhow::bail!("Recalibration concurrency must be greater than 0");
        }

        if !(1..=MAX_EXPIRY_LEAD_DAYS).contains(&self.inventory.expiry_lead_days) {
            anyhow::bail!(
                "Expiry lead days must be within 1..={}",
                MAX_EXPIRY_LEAD_DAYS
            );
        }

        if self.inventory.dedup_window_hours <= 0 {
            anyhow::bail!("Dedup window must be greater than 0");
        }

        Ok(())
    }

    /// Get the database connection timeout as a Duration
    pub fn database_timeout(&self) -> Duration {
        Duration::from_secs(self.database.timeout_seconds)
    }

    /// Get the external service request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.services.request_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grading.long_answer_word_threshold, 500);
        assert_eq!(config.recalibration.min_usage, 5);
        assert_eq!(config.inventory.expiry_lead_days, 30);
        assert_eq!(
            config.inventory.audience_roles,
            vec!["admin", "gerente", "encargado_inventario"]
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::default();

        config.services.scoring_url = "not a url".to_string();
        assert!(config.validate().is_err());
        config.services.scoring_url = "http://localhost:8001".to_string();

        config.database.pool_size = 0;
        assert!(config.validate().is_err());
        config.database.pool_size = 10;

        config.telemetry.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
        config.telemetry.log_level = "info".to_string();

        config.inventory.dedup_window_hours = 0;
        assert!(config.validate().is_err());
        config.inventory.dedup_window_hours = 24;

        config.inventory.expiry_lead_days = 3651;
        assert!(config.validate().is_err());
        config.inventory.expiry_lead_days = 30;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let layers = config::Config::builder()
            .set_override("inventory.expiry_lead_days", 15)
            .unwrap()
            .build()
            .unwrap();

        let config = PipelineConfig::from_layers(&layers).unwrap();
        assert_eq!(config.inventory.expiry_lead_days, 15);
        assert_eq!(config.inventory.dedup_window_hours, 24);
        assert_eq!(config.services.request_timeout_seconds, 30);
    }
}
