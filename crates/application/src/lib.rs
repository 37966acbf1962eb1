//! Application layer for the LMS recompute pipeline
//!
//! This crate owns the use cases the background jobs orchestrate and the ports
//! through which they reach storage and the external ML services.
//!
//! ## Modules
//!
//! - `ports` - Repository and gateway traits implemented by the infrastructure crate
//! - `services` - Attempt metric aggregation, question analytics and inventory alerting

pub mod ports;
pub mod services;

// Re-export commonly used types
pub use ports::{
    AnalyticsPort, AnswerRepositoryPort, AttemptRepositoryPort, EvaluationAnswer,
    EvaluationRepositoryPort, InventoryRepositoryPort, NotificationRepositoryPort,
    PredictionPipeline, QuestionAnalyticsRepositoryPort, QuestionRepositoryPort, ScoringGateway,
    ScoringRequest, UserRepositoryPort,
};
pub use services::{
    AnalyticsSummary, AttemptMetricsService, CommonError, InventoryAlertService,
    QuestionAnalyticsService,
};

use lms_pipeline_domain::DomainError;
use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApplicationError {
    /// Entity not found
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// External service answered with an error or an unusable body
    #[error("{service} integration failed: {message}")]
    Integration { service: String, message: String },

    /// External service did not answer in time
    #[error("{service} timed out after {after_ms} ms")]
    Timeout { service: String, after_ms: u64 },

    /// Storage failure
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Not-found error for an entity
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Integration error for a named service
    pub fn integration(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Integration {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a missing entity
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Integration { .. } | Self::Timeout { .. } | Self::Database(_)
        )
    }

    /// Get the error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Integration { .. } => "INTEGRATION_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DomainError> for ApplicationError {
    fn from(err: DomainError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(ApplicationError::integration("scoring", "502").is_retryable());
        assert!(ApplicationError::Timeout {
            service: "prediction".to_string(),
            after_ms: 30_000
        }
        .is_retryable());
        assert!(ApplicationError::Database("connection reset".to_string()).is_retryable());
        assert!(!ApplicationError::not_found("answer", 42).is_retryable());
        assert!(!ApplicationError::InvalidInput("test".to_string()).is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let err = ApplicationError::not_found("student", 7);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "student 7 not found");
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_from_domain_error() {
        let err: ApplicationError = DomainError::InvalidLeadDays(0).into();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }
}
