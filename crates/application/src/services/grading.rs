//! Attempt metric aggregation.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use lms_pipeline_common::Clock;
use lms_pipeline_domain::grading::{AnswerScore, Attempt, AttemptMetrics};

use crate::ports::{AnswerRepositoryPort, AttemptRepositoryPort, EvaluationRepositoryPort};
use crate::{ApplicationError, ApplicationResult};

/// Recomputes the aggregate fields of an attempt from all of its answers
pub struct AttemptMetricsService {
    answers: Arc<dyn AnswerRepositoryPort>,
    attempts: Arc<dyn AttemptRepositoryPort>,
    evaluations: Arc<dyn EvaluationRepositoryPort>,
    clock: Arc<dyn Clock>,
}

impl AttemptMetricsService {
    pub fn new(
        answers: Arc<dyn AnswerRepositoryPort>,
        attempts: Arc<dyn AttemptRepositoryPort>,
        evaluations: Arc<dyn EvaluationRepositoryPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            answers,
            attempts,
            evaluations,
            clock,
        }
    }

    /// Recompute and persist points, percentage and average confidence.
    ///
    /// `attempt` is updated in place and written back as a whole; running this
    /// twice without answer changes stores the same values.
    #[instrument(skip(self, attempt), fields(attempt_id = %attempt.id))]
    pub async fn recalculate(&self, attempt: &mut Attempt) -> ApplicationResult<AttemptMetrics> {
        let evaluation = self
            .evaluations
            .get_by_id(attempt.evaluation_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("evaluation", attempt.evaluation_id))?;

        let answers = self.answers.list_by_attempt(attempt.id).await?;
        let scores: Vec<AnswerScore> = answers.iter().map(AnswerScore::from).collect();

        let metrics = AttemptMetrics::compute(&scores, evaluation.total_possible_points);
        attempt.apply_metrics(&metrics, self.clock.now());

        self.attempts.save_metrics(attempt).await?;

        debug!(
            answers = scores.len(),
            total_points = metrics.total_points,
            percentage = metrics.percentage,
            average_confidence = metrics.average_confidence,
            "Attempt metrics recalculated"
        );

        Ok(metrics)
    }

    /// Like [`recalculate`](Self::recalculate) but never fails: errors are
    /// logged and `None` is returned. Used where aggregation is a side effect
    /// of some other unit of work.
    pub async fn recalculate_quietly(&self, attempt: &mut Attempt) -> Option<AttemptMetrics> {
        match self.recalculate(attempt).await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(
                    attempt_id = %attempt.id,
                    error = %e,
                    "Attempt metric aggregation failed"
                );
                None
            }
        }
    }
}
