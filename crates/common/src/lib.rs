//! Common utilities shared by the LMS recompute pipeline crates.
//!
//! This crate provides:
//! - Layered configuration loading
//! - Telemetry setup
//! - Retry policies for queued jobs and connection setup
//! - An injectable clock

pub mod clock;
pub mod config;
pub mod retry;
pub mod telemetry;

// Re-export commonly used types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    DatabaseConfig, GradingConfig, InventoryConfig, PipelineConfig, RecalibrationConfig,
    RedisConfig, ServicesConfig, TelemetryConfig,
};
pub use retry::{retry_with_backoff, Backoff, GiveUpReason, RetryDecision, RetryPolicy};
pub use telemetry::init_tracing;

/// Common error type used throughout the crate
pub type Result<T> = std::result::Result<T, anyhow::Error>;
