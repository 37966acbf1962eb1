//! LMS Recompute Pipeline Worker
//!
//! Background job processing for the LMS grading and inventory pipeline.
//!
//! This crate provides:
//! - Redis-based and in-memory job queues with priority handling
//! - Workers for essay scoring, predictions, analytics and inventory alerts
//! - Job scheduling with cron-like functionality
//! - Per-job retry policies and a dead letter queue
//! - Metrics and monitoring

pub mod config;
pub mod context;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod workers;

pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use metrics::WorkerMetrics;
pub use queue::{InMemoryJobQueue, JobConsumer, JobProducer, JobQueue, RedisJobQueue};
pub use workers::JobHandler;

use anyhow::Result;
use scheduler::Scheduler;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use lms_pipeline_common::Clock;

/// Worker pool for processing background jobs
pub struct WorkerPool {
    config: WorkerConfig,
    producer: JobProducer,
    consumer: JobConsumer,
    metrics: WorkerMetrics,
    clock: Arc<dyn Clock>,
    expiry_lead_days: i64,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl WorkerPool {
    /// Create a new worker pool over `queue`
    pub fn new(config: WorkerConfig, queue: Arc<dyn JobQueue>, ctx: WorkerContext) -> Self {
        let metrics = WorkerMetrics::new();
        let clock = ctx.clock.clone();
        let expiry_lead_days = ctx.config.inventory.expiry_lead_days;

        let producer = JobProducer::new(queue.clone());
        let consumer = JobConsumer::new(queue, JobHandler::new(ctx), metrics.clone())
            .with_poll_interval(config.queue.poll_interval());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Self {
            config,
            producer,
            consumer,
            metrics,
            clock,
            expiry_lead_days,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Start the worker pool and run until a shutdown signal arrives
    pub async fn start(&mut self) -> Result<()> {
        info!(
            pool_size = self.config.pool_size,
            scheduler_enabled = self.config.scheduler.enabled,
            "Starting worker pool"
        );

        let (stop_tx, stop_rx) = watch::channel(false);

        let consumer = self.consumer.clone();
        let pool_size = self.config.pool_size;
        let consumer_rx = stop_rx.clone();
        let consumer_handle = tokio::spawn(async move { consumer.run(pool_size, consumer_rx).await });

        let promoter = self.consumer.clone();
        let promote_interval = self.config.queue.promote_interval();
        let promoter_rx = stop_rx.clone();
        let promoter_handle = tokio::spawn(async move {
            promoter.promote_delayed(promote_interval, promoter_rx).await
        });

        let scheduler_handle = if self.config.scheduler.enabled {
            let scheduler = Scheduler::new(
                &self.config.scheduler,
                self.expiry_lead_days,
                self.producer.clone(),
                self.clock.clone(),
            )?;
            Some(tokio::spawn(scheduler.run(stop_rx)))
        } else {
            None
        };

        // Wait for shutdown signal
        self.shutdown_rx.recv().await;

        info!("Shutting down worker pool");
        let _ = stop_tx.send(true);

        let mut handles = vec![consumer_handle, promoter_handle];
        handles.extend(scheduler_handle);
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task error: {}", e);
            }
        }

        Ok(())
    }

    /// Get a handle to send shutdown signal
    pub fn shutdown_handle(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Get the job producer for enqueuing jobs
    pub fn producer(&self) -> &JobProducer {
        &self.producer
    }

    /// Get metrics
    pub fn metrics(&self) -> &WorkerMetrics {
        &self.metrics
    }
}
