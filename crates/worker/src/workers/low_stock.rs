//! Low-stock sweep worker

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use lms_pipeline_application::{services::low_stock_draft, ApplicationResult};
use lms_pipeline_domain::{
    inventory::ProductStock,
    notification::{DedupKey, NotificationType},
    user::User,
};

use super::{SweepSummary, Worker};
use crate::context::WorkerContext;
use crate::queue::job::{Job, JobType};

/// Worker that notifies the inventory audience about products under their
/// minimum stock, at most once per product per dedup window
pub struct LowStockWorker {
    ctx: Arc<WorkerContext>,
}

impl LowStockWorker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    pub async fn sweep(&self) -> Result<SweepSummary> {
        let alerts = &self.ctx.inventory;

        let low = alerts.low_stock_products().await?;
        let mut summary = SweepSummary {
            violations: low.len(),
            ..Default::default()
        };
        if low.is_empty() {
            debug!("No product under its minimum stock");
            return Ok(summary);
        }

        let audience = alerts.resolve_audience().await?;
        if audience.is_empty() {
            warn!(products = low.len(), "No users to notify about low stock");
            return Ok(summary);
        }

        for stock in &low {
            match self.alert(stock, &audience).await {
                Ok(Some(written)) => summary.notified += written,
                Ok(None) => summary.suppressed += 1,
                Err(e) => {
                    warn!(
                        product_id = %stock.product.id,
                        error = %e,
                        "Failed to send low stock alert"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            products = summary.violations,
            notified = summary.notified,
            suppressed = summary.suppressed,
            failed = summary.failed,
            "Low stock sweep finished"
        );

        Ok(summary)
    }

    /// Notify about one product; `None` when suppressed by the dedup window
    async fn alert(
        &self,
        stock: &ProductStock,
        audience: &[User],
    ) -> ApplicationResult<Option<usize>> {
        let alerts = &self.ctx.inventory;
        let key = DedupKey::product(stock.product.id);

        if alerts
            .already_notified(NotificationType::LowStock, &key)
            .await?
        {
            debug!(product_id = %stock.product.id, "Low stock alert already sent");
            return Ok(None);
        }

        let written = alerts
            .notify_audience(audience, &low_stock_draft(stock))
            .await?;

        info!(
            product_id = %stock.product.id,
            product = %stock.product.name,
            total_stock = stock.total_stock,
            min_stock = stock.product.min_stock,
            recipients = written,
            "Low stock alert sent"
        );

        Ok(Some(written))
    }
}

#[async_trait]
impl Worker for LowStockWorker {
    async fn process(&self, job: &Job) -> Result<()> {
        match &job.job_type {
            JobType::LowStockSweep => {
                self.sweep().await?;
                Ok(())
            }
            _ => {
                warn!(
                    job_id = %job.id,
                    job_type = job.job_type.name(),
                    "Invalid job type for LowStockWorker"
                );
                Err(anyhow::anyhow!("Invalid job type"))
            }
        }
    }

    fn name(&self) -> &str {
        "LowStockWorker"
    }
}
