//! Infrastructure layer for the LMS recompute pipeline
//!
//! This crate provides implementations of the application ports:
//! - PostgreSQL repositories over the platform's existing tables (sqlx)
//! - An in-memory store implementing every repository port
//! - HTTP gateways to the scoring agent and the prediction pipeline (reqwest)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lms_pipeline_infrastructure::{database::DatabasePool, repositories::PgGradingRepository};
//!
//! let pool = DatabasePool::new(&config.database).await?;
//! let grading = PgGradingRepository::new(pool.pool().clone());
//! ```

pub mod database;
pub mod http;
pub mod memory;
pub mod repositories;

// Re-export commonly used types
pub use database::{DatabasePool, HealthStatus};
pub use http::{HttpPredictionPipeline, HttpScoringGateway};
pub use memory::InMemoryStore;
pub use repositories::{
    PgGradingRepository, PgInventoryRepository, PgQuestionRepository, PgUserRepository,
};

use lms_pipeline_application::ApplicationError;

pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure-level errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database errors from sqlx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP transport errors from reqwest
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored value that does not map onto the domain model
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(_) => true,
            Error::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(true, |s| s.is_server_error())
            }
            _ => false,
        }
    }
}

impl From<Error> for ApplicationError {
    fn from(err: Error) -> Self {
        match err {
            Error::Database(e) => ApplicationError::Database(e.to_string()),
            Error::Http(e) => ApplicationError::integration("http", e.to_string()),
            Error::Serialization(e) => ApplicationError::Internal(e.to_string()),
            Error::InvalidData(msg) => ApplicationError::Internal(msg),
            Error::Configuration(msg) => ApplicationError::InvalidInput(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_errors_map_to_retryable() {
        let err: ApplicationError = Error::Database(sqlx::Error::PoolTimedOut).into();
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_invalid_data_is_not_retryable() {
        let err = Error::InvalidData("unknown notification type".to_string());
        assert!(!err.is_retryable());
        let app: ApplicationError = err.into();
        assert!(!app.is_retryable());
    }
}
