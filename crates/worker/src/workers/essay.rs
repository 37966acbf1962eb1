//! Essay analysis worker - scores long free-text answers

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use lms_pipeline_application::{ApplicationError, ScoringRequest};
use lms_pipeline_domain::{
    grading::{exceeds_word_threshold, ScoringMode},
    AnswerId,
};

use super::Worker;
use crate::context::WorkerContext;
use crate::queue::job::{Job, JobType};

/// What became of one essay analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EssayOutcome {
    /// Scored and persisted
    Scored,
    /// Too short for deferred scoring; nothing was written
    TooShort { word_count: usize },
}

/// Worker that sends long answers to the scoring agent and cascades into the
/// attempt aggregates
pub struct EssayAnalysisWorker {
    ctx: Arc<WorkerContext>,
}

impl EssayAnalysisWorker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    /// Score one answer.
    ///
    /// A missing answer is an error so the queue retry budget applies; scoring
    /// failures propagate. Attempt aggregation never fails the run.
    #[instrument(skip(self))]
    pub async fn analyze(&self, answer_id: AnswerId) -> Result<EssayOutcome> {
        let ctx = &self.ctx;

        let mut answer = ctx
            .answers
            .get_by_id(answer_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("answer", answer_id))?;

        let word_count = answer.current_word_count();
        let threshold = ctx.config.grading.long_answer_word_threshold;
        if !exceeds_word_threshold(word_count, threshold) {
            warn!(
                word_count,
                threshold, "Answer below the long-answer threshold, skipping scoring"
            );
            return Ok(EssayOutcome::TooShort { word_count });
        }

        let question = ctx
            .questions
            .get_by_id(answer.question_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("question", answer.question_id))?;
        let attempt = ctx.attempts.get_by_id(answer.attempt_id).await?;

        let result = ctx
            .scoring
            .score(ScoringRequest {
                answer: &answer,
                question: &question,
                student_id: attempt.as_ref().map(|a| a.student_id),
                evaluation_id: attempt.as_ref().map(|a| a.evaluation_id),
                mode: ScoringMode::Synchronous,
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Scoring agent call failed");
                e
            })?;

        answer.apply_scoring(&result);
        answer.word_count = word_count;
        ctx.answers.save_scoring(&answer).await?;

        info!(
            word_count,
            confidence = result.confidence,
            is_correct = result.is_correct,
            points = result.suggested_points,
            "Answer scored"
        );

        match ctx.attempts.get_by_id(answer.attempt_id).await {
            Ok(Some(mut attempt)) => {
                ctx.aggregator.recalculate_quietly(&mut attempt).await;
            }
            Ok(None) => warn!(attempt_id = %answer.attempt_id, "Attempt vanished before aggregation"),
            Err(e) => warn!(
                attempt_id = %answer.attempt_id,
                error = %e,
                "Failed to reload attempt for aggregation"
            ),
        }

        Ok(EssayOutcome::Scored)
    }
}

#[async_trait]
impl Worker for EssayAnalysisWorker {
    async fn process(&self, job: &Job) -> Result<()> {
        match &job.job_type {
            JobType::EssayAnalysis { answer_id } => {
                let outcome = self.analyze(*answer_id).await?;
                debug!(job_id = %job.id, ?outcome, "Essay analysis finished");
                Ok(())
            }
            _ => {
                warn!(
                    job_id = %job.id,
                    job_type = job.job_type.name(),
                    "Invalid job type for EssayAnalysisWorker"
                );
                Err(anyhow::anyhow!("Invalid job type"))
            }
        }
    }

    async fn failed(&self, job: &Job, error: &str) {
        if let JobType::EssayAnalysis { answer_id } = &job.job_type {
            error!(
                answer_id = %answer_id,
                attempts = job.attempts,
                error,
                "Essay analysis failed permanently"
            );
        }
    }

    fn name(&self) -> &str {
        "EssayAnalysisWorker"
    }
}
