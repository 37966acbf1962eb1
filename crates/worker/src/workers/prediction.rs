//! Prediction dispatch worker

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use lms_pipeline_domain::UserId;

use super::Worker;
use crate::context::WorkerContext;
use crate::queue::job::{Job, JobType};

/// Worker that runs the prediction pipeline for one student
pub struct PredictionDispatchWorker {
    ctx: Arc<WorkerContext>,
}

impl PredictionDispatchWorker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    /// Run the pipeline. Returns `false` when the student does not exist,
    /// which is logged and not retried.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, student_id: UserId) -> Result<bool> {
        let Some(student) = self.ctx.users.get_by_id(student_id).await? else {
            error!("Student not found, skipping prediction");
            return Ok(false);
        };

        let result = self.ctx.predictions.run_for_student(student.id).await?;

        info!(result = %result, "Prediction pipeline finished");

        Ok(true)
    }
}

#[async_trait]
impl Worker for PredictionDispatchWorker {
    async fn process(&self, job: &Job) -> Result<()> {
        match &job.job_type {
            JobType::PredictionDispatch { student_id } => {
                self.dispatch(*student_id).await?;
                Ok(())
            }
            _ => {
                warn!(
                    job_id = %job.id,
                    job_type = job.job_type.name(),
                    "Invalid job type for PredictionDispatchWorker"
                );
                Err(anyhow::anyhow!("Invalid job type"))
            }
        }
    }

    async fn failed(&self, job: &Job, error: &str) {
        if let JobType::PredictionDispatch { student_id } = &job.job_type {
            error!(
                student_id = %student_id,
                attempts = job.attempts,
                error,
                "Prediction dispatch failed permanently"
            );
        }
    }

    fn name(&self) -> &str {
        "PredictionDispatchWorker"
    }
}
