//! Job consumer - fetch and run jobs under their retry policy

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use lms_pipeline_common::{GiveUpReason, RetryDecision};

use super::job::Job;
use super::{JobQueue, QueueResult};
use crate::metrics::WorkerMetrics;
use crate::workers::JobHandler;

/// What happened to a job after one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The run succeeded
    Completed,
    /// The run failed and the job was requeued
    Retrying { delay: Duration },
    /// The job failed for good and was dead-lettered
    DeadLettered { reason: GiveUpReason },
    /// No worker handles the job type; dead-lettered without running
    Unroutable,
}

/// Job consumer for fetching and processing jobs
#[derive(Clone)]
pub struct JobConsumer {
    queue: Arc<dyn JobQueue>,
    handler: Arc<JobHandler>,
    metrics: WorkerMetrics,
    poll_interval: Duration,
}

impl JobConsumer {
    pub fn new(queue: Arc<dyn JobQueue>, handler: JobHandler, metrics: WorkerMetrics) -> Self {
        Self {
            queue,
            handler: Arc::new(handler),
            metrics,
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Wait between polls of an empty queue
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run a job once and settle it: completed, requeued with the policy
    /// delay, or dead-lettered after the worker's `failed` hook.
    ///
    /// A run cut off by the policy timeout counts as an attempt but not as an
    /// exception; a panicking worker counts as both. Errors are only returned
    /// when the queue itself fails.
    pub async fn execute(&self, mut job: Job) -> QueueResult<JobOutcome> {
        let job_type = job.job_type.name();

        let Some(worker) = self.handler.worker_for(&job) else {
            error!(job_id = %job.id, job_type, "No worker registered for job type");
            job.record_failure(format!("no worker registered for {}", job_type), true);
            job.mark_failed();
            self.queue.dead_letter(&job).await?;
            self.metrics.record_failed(job_type);
            return Ok(JobOutcome::Unroutable);
        };

        let policy = job.retry_policy();
        job.mark_processing();
        self.metrics.record_started();
        let started = Instant::now();

        debug!(
            job_id = %job.id,
            job_type,
            attempt = job.attempts,
            worker = worker.name(),
            "Processing job"
        );

        let run = AssertUnwindSafe(worker.process(&job))
            .catch_unwind()
            .map(|caught| match caught {
                Ok(result) => result.map_err(|e| format!("{:#}", e)),
                Err(panic) => {
                    error!(job_id = %job.id, job_type, "Worker panicked");
                    Err(format!("worker panicked: {}", panic_message(panic.as_ref())))
                }
            });

        let result = match policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result.map_err(|message| (message, true)),
                Err(_) => Err((format!("timed out after {} ms", limit.as_millis()), false)),
            },
            None => run.await.map_err(|message| (message, true)),
        };

        let (message, exception) = match result {
            Ok(()) => {
                let duration = started.elapsed();
                job.mark_completed();
                self.metrics.record_succeeded(job_type, duration);
                info!(
                    job_id = %job.id,
                    job_type,
                    duration_ms = duration.as_millis() as u64,
                    "Job completed successfully"
                );
                return Ok(JobOutcome::Completed);
            }
            Err(failure) => failure,
        };

        if !exception {
            self.metrics.record_timed_out();
        }
        job.record_failure(message.clone(), exception);

        match policy.decide(job.attempts, job.exceptions) {
            RetryDecision::RetryAfter(delay) => {
                warn!(
                    job_id = %job.id,
                    job_type,
                    attempt = job.attempts,
                    backoff_secs = delay.as_secs(),
                    error = %message,
                    "Job failed, retrying"
                );
                job.delay_by(delay);
                self.queue.push_delayed(&job, delay).await?;
                self.metrics.record_retried();
                Ok(JobOutcome::Retrying { delay })
            }
            RetryDecision::GiveUp(reason) => {
                job.mark_failed();
                worker.failed(&job, &message).await;
                self.queue.dead_letter(&job).await?;
                self.metrics.record_failed(job_type);
                warn!(job_id = %job.id, job_type, %reason, "Job given up");
                Ok(JobOutcome::DeadLettered { reason })
            }
        }
    }

    /// Pull jobs until shutdown, running at most `pool_size` at once.
    ///
    /// In-flight jobs are awaited before returning.
    pub async fn run(&self, pool_size: usize, mut shutdown: watch::Receiver<bool>) {
        let pool_size = pool_size.max(1);
        let semaphore = Arc::new(Semaphore::new(pool_size));

        info!(pool_size, "Job consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            match self.queue.pop().await {
                Ok(Some(job)) => {
                    let consumer = self.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let job_id = job.id;
                        if let Err(e) = consumer.execute(job).await {
                            error!(job_id = %job_id, error = %e, "Failed to settle job");
                        }
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "Failed to fetch job");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("Job consumer draining in-flight jobs");
        let _ = semaphore.acquire_many(pool_size as u32).await;
    }

    /// Promote due delayed jobs every `interval` until shutdown
    pub async fn promote_delayed(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            match self.queue.promote_due().await {
                Ok(0) => {}
                Ok(promoted) => debug!(promoted, "Delayed jobs promoted"),
                Err(e) => error!(error = %e, "Failed to promote delayed jobs"),
            }

            if let Ok(depth) = self.queue.len().await {
                self.metrics.update_queue_depth(depth);
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
