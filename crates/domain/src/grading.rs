//! Grading entities: answers, attempts, evaluations and the metrics derived from them.
//!
//! An [`Attempt`] carries three aggregate fields (total points, percentage and
//! average confidence) that are always recomputed from the full set of its
//! answers. [`AttemptMetrics::compute`] is that recomputation; it is pure so
//! that running it twice over the same answers yields identical values.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::identifiers::{AnswerId, AttemptId, CourseId, EvaluationId, QuestionId, UserId};
use crate::round_to;

/// Answers longer than this many words are scored off the request path.
pub const LONG_ANSWER_WORD_THRESHOLD: usize = 500;

/// Confidence used when the scorer omits it and when no answer has one yet.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

static WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}'-]*\p{L}[\p{L}'-]*").expect("word pattern is valid")
});

/// Count words the way the submission form does: runs of letters, apostrophes
/// and hyphens containing at least one letter. Digits and punctuation are not words.
pub fn count_words(text: &str) -> usize {
    WORD.find_iter(text).count()
}

/// Whether an answer of `word_count` words is long enough for deferred scoring.
pub fn exceeds_word_threshold(word_count: usize, threshold: usize) -> bool {
    word_count > threshold
}

/// One student's response to one question within one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    /// Free-text body
    pub body: Option<String>,
    /// Derived from `body`
    pub word_count: usize,
    pub points_awarded: f64,
    pub is_correct: Option<bool>,
    /// 0..=1, absent until scored
    pub confidence: Option<f64>,
    /// Detected pattern tags
    pub patterns: Vec<String>,
    pub recommendation: Option<String>,
    pub response_time_secs: Option<f64>,
    /// Chosen option for closed questions
    pub selected_option: Option<String>,
}

impl Answer {
    /// Word count recomputed from the stored text
    pub fn current_word_count(&self) -> usize {
        self.body.as_deref().map(count_words).unwrap_or(0)
    }

    /// Overwrite the scored fields with a scoring result
    pub fn apply_scoring(&mut self, result: &ScoringResult) {
        self.patterns = result.patterns.clone();
        self.recommendation = result.recommendation.clone();
        self.confidence = Some(result.confidence);
        self.is_correct = Some(result.is_correct);
        self.points_awarded = result.suggested_points;
    }
}

/// How the scoring collaborator should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Block until the score is available
    Synchronous,
    /// Let the collaborator queue the work itself
    Deferred,
}

/// Result of scoring one free-text answer.
///
/// Every field has the default the pipeline applies when the scorer omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub suggested_points: f64,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

impl Default for ScoringResult {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            recommendation: None,
            confidence: DEFAULT_CONFIDENCE,
            is_correct: false,
            suggested_points: 0.0,
        }
    }
}

impl ScoringResult {
    /// Clamp confidence into 0..=1 and points into 0..=max_points
    pub fn clamped(mut self, max_points: f64) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self.suggested_points = self.suggested_points.clamp(0.0, max_points.max(0.0));
        self
    }
}

/// One student's graded run through one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub evaluation_id: EvaluationId,
    pub student_id: UserId,
    pub points_awarded: f64,
    pub percentage: f64,
    pub average_confidence: f64,
    pub last_analyzed_at: Option<DateTime<Utc>>,
}

impl Attempt {
    /// Overwrite the derived fields
    pub fn apply_metrics(&mut self, metrics: &AttemptMetrics, analyzed_at: DateTime<Utc>) {
        self.points_awarded = metrics.total_points;
        self.percentage = metrics.percentage;
        self.average_confidence = metrics.average_confidence;
        self.last_analyzed_at = Some(analyzed_at);
    }
}

/// An evaluation; read-only for the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub course_id: CourseId,
    pub title: String,
    pub total_possible_points: f64,
    pub question_ids: Vec<QuestionId>,
}

/// The two answer fields the attempt aggregates read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnswerScore {
    pub confidence: Option<f64>,
    pub points_awarded: f64,
}

impl From<&Answer> for AnswerScore {
    fn from(answer: &Answer) -> Self {
        Self {
            confidence: answer.confidence,
            points_awarded: answer.points_awarded,
        }
    }
}

/// Aggregates derived from all answers of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttemptMetrics {
    /// Mean of present confidences (4 decimals), 0.5 when none are present
    pub average_confidence: f64,
    pub total_points: f64,
    /// `total_points / total_possible * 100` (2 decimals), 0 when nothing is possible
    pub percentage: f64,
}

impl AttemptMetrics {
    /// Recompute the aggregates from scratch
    pub fn compute(answers: &[AnswerScore], total_possible_points: f64) -> Self {
        let confidences: Vec<f64> = answers.iter().filter_map(|a| a.confidence).collect();
        let average_confidence = if confidences.is_empty() {
            DEFAULT_CONFIDENCE
        } else {
            round_to(confidences.iter().sum::<f64>() / confidences.len() as f64, 4)
        };

        let total_points: f64 = answers.iter().map(|a| a.points_awarded).sum();

        let percentage = if total_possible_points > 0.0 {
            round_to(total_points / total_possible_points * 100.0, 2)
        } else {
            0.0
        };

        Self {
            average_confidence,
            total_points,
            percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(confidence: Option<f64>, points: f64) -> AnswerScore {
        AnswerScore {
            confidence,
            points_awarded: points,
        }
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("Hola mundo"), 2);
        assert_eq!(count_words("  la fotosíntesis, en 3 pasos: luz-agua; carbono.  "), 6);
        assert_eq!(count_words("123 456 ..."), 0);
    }

    #[test]
    fn test_word_threshold_is_strict() {
        assert!(!exceeds_word_threshold(500, LONG_ANSWER_WORD_THRESHOLD));
        assert!(exceeds_word_threshold(501, LONG_ANSWER_WORD_THRESHOLD));
    }

    #[test]
    fn test_mixed_confidences() {
        let answers = [score(Some(0.8), 10.0), score(None, 0.0), score(Some(0.6), 5.0)];
        let metrics = AttemptMetrics::compute(&answers, 20.0);

        assert_eq!(metrics.average_confidence, 0.7);
        assert_eq!(metrics.total_points, 15.0);
        assert_eq!(metrics.percentage, 75.0);
    }

    #[test]
    fn test_cold_start_confidence() {
        let answers = [score(None, 3.0), score(None, 2.0)];
        let metrics = AttemptMetrics::compute(&answers, 10.0);
        assert_eq!(metrics.average_confidence, DEFAULT_CONFIDENCE);
        assert_eq!(metrics.percentage, 50.0);
    }

    #[test]
    fn test_zero_possible_points() {
        let answers = [score(Some(1.0), 4.0)];
        let metrics = AttemptMetrics::compute(&answers, 0.0);
        assert_eq!(metrics.percentage, 0.0);
        assert!(!metrics.percentage.is_nan());
    }

    #[test]
    fn test_no_answers() {
        let metrics = AttemptMetrics::compute(&[], 20.0);
        assert_eq!(metrics.total_points, 0.0);
        assert_eq!(metrics.percentage, 0.0);
        assert_eq!(metrics.average_confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_scoring_result_defaults() {
        let result: ScoringResult = serde_json::from_str("{}").unwrap();
        assert!(result.patterns.is_empty());
        assert_eq!(result.recommendation, None);
        assert_eq!(result.confidence, 0.5);
        assert!(!result.is_correct);
        assert_eq!(result.suggested_points, 0.0);
    }

    #[test]
    fn test_scoring_result_clamped() {
        let result = ScoringResult {
            confidence: 1.4,
            suggested_points: 12.0,
            ..Default::default()
        }
        .clamped(10.0);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.suggested_points, 10.0);
    }

    #[test]
    fn test_apply_metrics() {
        let mut attempt = Attempt {
            id: AttemptId::new(1),
            evaluation_id: EvaluationId::new(1),
            student_id: UserId::new(1),
            points_awarded: 0.0,
            percentage: 0.0,
            average_confidence: 0.0,
            last_analyzed_at: None,
        };
        let metrics = AttemptMetrics {
            average_confidence: 0.7,
            total_points: 15.0,
            percentage: 75.0,
        };
        let now = Utc::now();
        attempt.apply_metrics(&metrics, now);

        assert_eq!(attempt.points_awarded, 15.0);
        assert_eq!(attempt.percentage, 75.0);
        assert_eq!(attempt.last_analyzed_at, Some(now));
    }
}
