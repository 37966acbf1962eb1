//! Worker implementations

pub mod analytics;
pub mod difficulty;
pub mod essay;
pub mod low_stock;
pub mod near_expiry;
pub mod prediction;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use crate::context::WorkerContext;
use crate::queue::job::Job;

pub use analytics::AnalyticsRefreshWorker;
pub use difficulty::{DifficultyRecalibrationWorker, RecalibrationSummary};
pub use essay::EssayAnalysisWorker;
pub use low_stock::LowStockWorker;
pub use near_expiry::NearExpiryWorker;
pub use prediction::PredictionDispatchWorker;

/// Worker trait for processing jobs
#[async_trait]
pub trait Worker: Send + Sync {
    /// Process a job
    async fn process(&self, job: &Job) -> Result<()>;

    /// Called once when the job is given up for good
    async fn failed(&self, job: &Job, error: &str) {
        error!(
            job_id = %job.id,
            job_type = job.job_type.name(),
            attempts = job.attempts,
            error,
            "Job failed permanently"
        );
    }

    /// Get the worker name
    fn name(&self) -> &str;
}

/// Outcome of an inventory sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Products or lots in violation
    pub violations: usize,
    /// Notifications written
    pub notified: usize,
    /// Alerts skipped because one was sent inside the dedup window
    pub suppressed: usize,
    /// Alerts that failed and were skipped
    pub failed: usize,
}

/// Routes jobs to the worker registered for their type
#[derive(Clone)]
pub struct JobHandler {
    workers: HashMap<&'static str, Arc<dyn Worker>>,
}

impl JobHandler {
    /// Handler with every pipeline worker registered
    pub fn new(ctx: WorkerContext) -> Self {
        let ctx = Arc::new(ctx);
        let mut handler = Self::empty();

        handler.register("essay_analysis", Arc::new(EssayAnalysisWorker::new(ctx.clone())));
        handler.register(
            "prediction_dispatch",
            Arc::new(PredictionDispatchWorker::new(ctx.clone())),
        );
        handler.register(
            "difficulty_recalibration",
            Arc::new(DifficultyRecalibrationWorker::new(ctx.clone())),
        );
        handler.register(
            "analytics_refresh",
            Arc::new(AnalyticsRefreshWorker::new(ctx.clone())),
        );
        handler.register("low_stock_sweep", Arc::new(LowStockWorker::new(ctx.clone())));
        handler.register("near_expiry_sweep", Arc::new(NearExpiryWorker::new(ctx)));

        handler
    }

    /// Handler without workers
    pub fn empty() -> Self {
        Self {
            workers: HashMap::new(),
        }
    }

    /// Register or replace the worker of a job type
    pub fn register(&mut self, job_type: &'static str, worker: Arc<dyn Worker>) {
        self.workers.insert(job_type, worker);
    }

    /// Worker for a job
    pub fn worker_for(&self, job: &Job) -> Option<Arc<dyn Worker>> {
        self.workers.get(job.job_type.name()).cloned()
    }
}
