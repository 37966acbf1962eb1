//! Error types for domain value validation.

/// Result alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Errors raised when a domain value violates its invariant
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// Confidence score outside 0..=1
    #[error("Confidence must be between 0 and 1, got {0}")]
    InvalidConfidence(f64),

    /// Difficulty outside 0..=1
    #[error("Difficulty must be between 0 and 1, got {0}")]
    InvalidDifficulty(f64),

    /// Negative or zero look-ahead window for expiry sweeps
    #[error("Expiry lead days must be positive, got {0}")]
    InvalidLeadDays(i64),

    /// Negative points
    #[error("Points cannot be negative, got {0}")]
    NegativePoints(f64),
}

impl DomainError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfidence(_) => "INVALID_CONFIDENCE",
            Self::InvalidDifficulty(_) => "INVALID_DIFFICULTY",
            Self::InvalidLeadDays(_) => "INVALID_LEAD_DAYS",
            Self::NegativePoints(_) => "NEGATIVE_POINTS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DomainError::InvalidConfidence(1.5);
        assert_eq!(err.to_string(), "Confidence must be between 0 and 1, got 1.5");
        assert_eq!(err.error_code(), "INVALID_CONFIDENCE");
    }
}
