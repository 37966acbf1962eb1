//! Question bank items and their usage analytics.
//!
//! Empirical difficulty is derived from observed hit rate:
//! `1 - hit_rate / 100`, clamped to `[0, 1]`. A drift between the instructor's
//! estimate and the empirical value is "significant" when it is strictly
//! greater than [`SIGNIFICANT_DIFFICULTY_DELTA`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{DomainError, DomainResult};
use crate::identifiers::{CourseId, EvaluationId, QuestionId};
use crate::round_to;

/// Questions need more than this many uses before recalibration.
pub const MIN_USAGE_FOR_RECALIBRATION: u32 = 5;

/// Drift above which a recalibration is reported as significant.
pub const SIGNIFICANT_DIFFICULTY_DELTA: f64 = 0.15;

/// Discrimination index below which a question needs review.
pub const LOW_DISCRIMINATION: f64 = 0.2;

/// Attempts at or above this percentage belong to the high-performance group.
pub const HIGH_PERFORMANCE_CUTOFF: f64 = 70.0;

/// A question bank item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub course_id: CourseId,
    pub statement: String,
    /// Correct option for closed questions
    pub correct_option: Option<String>,
    pub points: f64,
    /// Instructor estimate, 0 (easy) ..= 1 (hard)
    pub estimated_difficulty: f64,
    /// Last recalibrated value
    pub empirical_difficulty: Option<f64>,
    pub usage_count: u32,
}

impl Question {
    /// Whether enough history exists to recalibrate
    pub fn eligible_for_recalibration(&self, min_usage: u32) -> bool {
        self.usage_count > min_usage
    }
}

/// Validate a difficulty value
pub fn validate_difficulty(value: f64) -> DomainResult<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(DomainError::InvalidDifficulty(value))
    }
}

/// Empirical difficulty for a hit rate given in percent
pub fn empirical_difficulty(hit_rate_percent: f64) -> f64 {
    (1.0 - hit_rate_percent / 100.0).clamp(0.0, 1.0)
}

/// Whether the drift between two difficulty values exceeds `threshold`.
///
/// The delta is rounded to six decimals first so that `0.55 - 0.40` compares
/// as exactly `0.15`.
pub fn is_significant_change(previous: f64, current: f64, threshold: f64) -> bool {
    round_to((previous - current).abs(), 6) > threshold
}

/// Usage statistics of one question within one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnalytics {
    pub question_id: QuestionId,
    pub evaluation_id: EvaluationId,
    pub times_answered: u32,
    pub times_correct: u32,
    pub times_incorrect: u32,
    /// Percent correct, 2 decimals
    pub hit_rate: f64,
    /// `p_high - p_low`, 3 decimals; absent when a group is empty
    pub discrimination_index: Option<f64>,
    pub avg_response_time_secs: Option<f64>,
    /// Selected option to percent of answers
    pub response_distribution: BTreeMap<String, f64>,
    /// `cluster_<id>` to percent correct
    pub cluster_performance: BTreeMap<String, f64>,
    pub updated_at: DateTime<Utc>,
}

impl QuestionAnalytics {
    /// Whether the question separates strong and weak students poorly
    pub fn needs_review(&self) -> bool {
        matches!(self.discrimination_index, Some(index) if index < LOW_DISCRIMINATION)
    }
}

/// A reviewable issue detected from a question's analytics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImprovementSuggestion {
    /// Strong and weak students answer alike
    LowDiscrimination { index: f64 },
    /// Hit rate below 20%
    TooHard { hit_rate: f64 },
    /// Hit rate above 95%
    TooEasy { hit_rate: f64 },
    /// A wrong option attracts many answers
    CommonError { option: String, frequency: u32 },
    /// Hit rate varies strongly between student clusters
    ClusterBias { spread: f64 },
}

impl ImprovementSuggestion {
    /// Review urgency
    pub fn urgency(&self) -> Urgency {
        match self {
            Self::TooHard { .. } => Urgency::High,
            Self::LowDiscrimination { .. } | Self::TooEasy { .. } | Self::ClusterBias { .. } => {
                Urgency::Medium
            }
            Self::CommonError { .. } => Urgency::Low,
        }
    }
}

/// Review urgency of a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// Population standard deviation; 0 for fewer than two values
pub fn spread(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(usage_count: u32) -> Question {
        Question {
            id: QuestionId::new(1),
            course_id: CourseId::new(1),
            statement: "¿Qué es la fotosíntesis?".to_string(),
            correct_option: None,
            points: 5.0,
            estimated_difficulty: 0.4,
            empirical_difficulty: None,
            usage_count,
        }
    }

    #[test]
    fn test_recalibration_gating() {
        assert!(!question(5).eligible_for_recalibration(MIN_USAGE_FOR_RECALIBRATION));
        assert!(question(6).eligible_for_recalibration(MIN_USAGE_FOR_RECALIBRATION));
    }

    #[test]
    fn test_empirical_difficulty() {
        assert_eq!(empirical_difficulty(100.0), 0.0);
        assert_eq!(empirical_difficulty(0.0), 1.0);
        assert_eq!(empirical_difficulty(25.0), 0.75);
        assert_eq!(empirical_difficulty(130.0), 0.0);
        assert_eq!(empirical_difficulty(-10.0), 1.0);
    }

    #[test]
    fn test_significant_change_is_strict() {
        assert!(is_significant_change(0.40, 0.56, SIGNIFICANT_DIFFICULTY_DELTA));
        assert!(!is_significant_change(0.40, 0.55, SIGNIFICANT_DIFFICULTY_DELTA));
        assert!(!is_significant_change(0.55, 0.40, SIGNIFICANT_DIFFICULTY_DELTA));
        assert!(is_significant_change(0.90, 0.10, SIGNIFICANT_DIFFICULTY_DELTA));
    }

    #[test]
    fn test_validate_difficulty() {
        assert!(validate_difficulty(0.3).is_ok());
        assert_eq!(
            validate_difficulty(1.2),
            Err(DomainError::InvalidDifficulty(1.2))
        );
    }

    #[test]
    fn test_spread() {
        assert_eq!(spread(&[50.0]), 0.0);
        assert_eq!(spread(&[20.0, 80.0]), 30.0);
    }

    #[test]
    fn test_suggestion_urgency_order() {
        let hard = ImprovementSuggestion::TooHard { hit_rate: 10.0 };
        let common = ImprovementSuggestion::CommonError {
            option: "B".to_string(),
            frequency: 4,
        };
        assert!(hard.urgency() > common.urgency());
    }
}
