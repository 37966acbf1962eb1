//! Near-expiry sweep worker
//!
//! The dedup key covers the whole window (`days:N`), not individual lots: once
//! a batch for N days went out, new lots entering the window are not reported
//! until the dedup window has passed.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use lms_pipeline_application::services::near_expiry_draft;
use lms_pipeline_domain::notification::{DedupKey, NotificationType};

use super::{SweepSummary, Worker};
use crate::context::WorkerContext;
use crate::queue::job::{Job, JobType};

/// Worker that notifies the inventory audience about lots close to expiry
pub struct NearExpiryWorker {
    ctx: Arc<WorkerContext>,
}

impl NearExpiryWorker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    pub async fn sweep(&self, days_ahead: i64) -> Result<SweepSummary> {
        let alerts = &self.ctx.inventory;
        let today = alerts.today();

        let lots = alerts.near_expiry_lots(days_ahead, today).await?;
        let mut summary = SweepSummary {
            violations: lots.len(),
            ..Default::default()
        };
        if lots.is_empty() {
            debug!(days_ahead, "No lot expiring inside the window");
            return Ok(summary);
        }

        let audience = alerts.resolve_audience().await?;
        if audience.is_empty() {
            warn!(lots = lots.len(), "No users to notify about expiring lots");
            return Ok(summary);
        }

        let key = DedupKey::lead_days(days_ahead);
        if alerts
            .already_notified(NotificationType::NearExpiry, &key)
            .await?
        {
            info!(days_ahead, lots = lots.len(), "Near expiry alert already sent");
            summary.suppressed = 1;
            return Ok(summary);
        }

        for lot in &lots {
            info!(
                stock_item_id = %lot.item.id,
                product = %lot.product_name,
                quantity = lot.item.quantity,
                expires_on = ?lot.item.expires_on,
                days_left = ?lot.item.days_until_expiry(today),
                "Lot close to expiry"
            );
        }

        summary.notified = alerts
            .notify_audience(&audience, &near_expiry_draft(days_ahead, &lots, today))
            .await?;

        info!(
            days_ahead,
            lots = summary.violations,
            notified = summary.notified,
            "Near expiry sweep finished"
        );

        Ok(summary)
    }
}

#[async_trait]
impl Worker for NearExpiryWorker {
    async fn process(&self, job: &Job) -> Result<()> {
        match &job.job_type {
            JobType::NearExpirySweep { days_ahead } => {
                self.sweep(*days_ahead).await?;
                Ok(())
            }
            _ => {
                warn!(
                    job_id = %job.id,
                    job_type = job.job_type.name(),
                    "Invalid job type for NearExpiryWorker"
                );
                Err(anyhow::anyhow!("Invalid job type"))
            }
        }
    }

    fn name(&self) -> &str {
        "NearExpiryWorker"
    }
}
