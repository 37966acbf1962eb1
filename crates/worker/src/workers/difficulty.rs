//! Difficulty recalibration worker
//!
//! Every question used more than the configured minimum gets a fresh empirical
//! difficulty. Questions are independent: one failing is logged and skipped.
//! Drifts above the significance threshold are logged but never block the write.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use lms_pipeline_domain::{question::is_significant_change, question::Question, CourseId};

use super::Worker;
use crate::context::WorkerContext;
use crate::queue::job::{Job, JobType};

/// Outcome of one recalibration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecalibrationSummary {
    pub considered: usize,
    pub recalibrated: usize,
    pub significant_changes: usize,
}

enum QuestionOutcome {
    Recalibrated { significant: bool },
    Failed,
}

/// Worker that recalibrates question difficulty from usage history
pub struct DifficultyRecalibrationWorker {
    ctx: Arc<WorkerContext>,
}

impl DifficultyRecalibrationWorker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    /// Recalibrate every eligible question, optionally of one course.
    ///
    /// Only the candidate query can fail the run.
    #[instrument(skip(self))]
    pub async fn run(&self, course_id: Option<CourseId>) -> Result<RecalibrationSummary> {
        let settings = &self.ctx.config.recalibration;

        let questions = self
            .ctx
            .questions
            .list_recalibration_candidates(settings.min_usage, course_id)
            .await?;

        let considered = questions.len();
        let outcomes: Vec<QuestionOutcome> = stream::iter(questions)
            .map(|question| self.recalibrate_one(question))
            .buffer_unordered(settings.concurrency.max(1))
            .collect()
            .await;

        let mut summary = RecalibrationSummary {
            considered,
            ..Default::default()
        };
        for outcome in outcomes {
            if let QuestionOutcome::Recalibrated { significant } = outcome {
                summary.recalibrated += 1;
                if significant {
                    summary.significant_changes += 1;
                }
            }
        }

        info!(
            considered = summary.considered,
            recalibrated = summary.recalibrated,
            significant_changes = summary.significant_changes,
            "Difficulty recalibration finished"
        );

        Ok(summary)
    }

    async fn recalibrate_one(&self, question: Question) -> QuestionOutcome {
        let previous = question.estimated_difficulty;

        match self.ctx.analytics.recalibrate_difficulty(&question).await {
            Ok(current) => {
                let significant = is_significant_change(
                    previous,
                    current,
                    self.ctx.config.recalibration.significant_delta,
                );
                if significant {
                    info!(
                        question_id = %question.id,
                        previous,
                        current,
                        "Significant difficulty change detected"
                    );
                }
                QuestionOutcome::Recalibrated { significant }
            }
            Err(e) => {
                warn!(
                    question_id = %question.id,
                    error = %e,
                    "Failed to recalibrate question difficulty"
                );
                QuestionOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl Worker for DifficultyRecalibrationWorker {
    async fn process(&self, job: &Job) -> Result<()> {
        match &job.job_type {
            JobType::DifficultyRecalibration { course_id } => {
                self.run(*course_id).await?;
                Ok(())
            }
            _ => {
                warn!(
                    job_id = %job.id,
                    job_type = job.job_type.name(),
                    "Invalid job type for DifficultyRecalibrationWorker"
                );
                Err(anyhow::anyhow!("Invalid job type"))
            }
        }
    }

    fn name(&self) -> &str {
        "DifficultyRecalibrationWorker"
    }
}
