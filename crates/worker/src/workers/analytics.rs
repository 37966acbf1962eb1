//! Analytics refresh worker

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use lms_pipeline_application::AnalyticsSummary;
use lms_pipeline_domain::EvaluationId;

use super::Worker;
use crate::context::WorkerContext;
use crate::queue::job::{Job, JobType};

/// Worker that recomputes the question analytics of one evaluation
pub struct AnalyticsRefreshWorker {
    ctx: Arc<WorkerContext>,
}

impl AnalyticsRefreshWorker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    pub async fn refresh(&self, evaluation_id: EvaluationId) -> Result<AnalyticsSummary> {
        let summary = self.ctx.analytics.update_analytics(evaluation_id).await?;
        info!(
            evaluation_id = %summary.evaluation_id,
            questions_updated = summary.questions_updated,
            answers_considered = summary.answers_considered,
            "Question analytics refreshed"
        );
        Ok(summary)
    }
}

#[async_trait]
impl Worker for AnalyticsRefreshWorker {
    async fn process(&self, job: &Job) -> Result<()> {
        match &job.job_type {
            JobType::AnalyticsRefresh { evaluation_id } => {
                self.refresh(*evaluation_id).await?;
                Ok(())
            }
            _ => {
                warn!(
                    job_id = %job.id,
                    job_type = job.job_type.name(),
                    "Invalid job type for AnalyticsRefreshWorker"
                );
                Err(anyhow::anyhow!("Invalid job type"))
            }
        }
    }

    fn name(&self) -> &str {
        "AnalyticsRefreshWorker"
    }
}
