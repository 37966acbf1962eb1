//! Worker configuration
//!
//! Read from the `worker` section of the shared configuration layers, e.g.
//! `LMS_WORKER__POOL_SIZE=8` or `LMS_WORKER__SCHEDULER__ENABLED=false`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Jobs run at the same time
    pub pool_size: usize,

    /// Queue settings
    pub queue: QueueConfig,

    /// Scheduler settings
    pub scheduler: SchedulerConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get(),
            queue: QueueConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Read the `worker` section, falling back to defaults when absent
    pub fn from_layers(layers: &config::Config) -> Result<Self> {
        let config = match layers.get::<WorkerConfig>("worker") {
            Ok(config) => config,
            Err(config::ConfigError::NotFound(_)) => WorkerConfig::default(),
            Err(e) => return Err(e).context("Failed to read worker configuration"),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            anyhow::bail!("Worker pool size must be greater than 0");
        }

        if self.queue.prefix.is_empty() {
            anyhow::bail!("Queue key prefix is required");
        }

        // The scheduler fires on the matching minute only
        if self.scheduler.tick_interval == 0 || self.scheduler.tick_interval >= 60 {
            anyhow::bail!(
                "Scheduler tick interval must be within 1..60 seconds, got {}",
                self.scheduler.tick_interval
            );
        }

        for (name, expr) in [
            ("low_stock", &self.scheduler.low_stock),
            ("near_expiry", &self.scheduler.near_expiry),
            ("recalibration", &self.scheduler.recalibration),
        ] {
            crate::scheduler::Schedule::parse(expr)
                .with_context(|| format!("Invalid {} schedule '{}'", name, expr))?;
        }

        Ok(())
    }
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Prefix for queue keys in Redis
    pub prefix: String,

    /// Wait between polls of an empty queue (milliseconds)
    pub poll_interval_ms: u64,

    /// Interval of the delayed job promoter (seconds)
    pub promote_interval: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            prefix: "lms-pipeline".to_string(),
            poll_interval_ms: 100,
            promote_interval: 1,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn promote_interval(&self) -> Duration {
        Duration::from_secs(self.promote_interval.max(1))
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Whether the scheduler is enabled
    pub enabled: bool,

    /// Scheduler tick interval (seconds)
    pub tick_interval: u64,

    /// Cron expression of the low-stock sweep
    pub low_stock: String,

    /// Cron expression of the near-expiry sweep
    pub near_expiry: String,

    /// Cron expression of the difficulty recalibration
    pub recalibration: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval: 20,
            low_stock: "0 * * * *".to_string(),
            near_expiry: "0 7 * * *".to_string(),
            recalibration: "0 2 * * *".to_string(),
        }
    }
}
