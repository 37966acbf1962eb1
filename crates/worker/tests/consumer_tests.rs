//! Tests for job settlement
//!
//! Retry budgets, timeouts, exception caps and the dead letter queue, driven
//! through the consumer with paused tokio time.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use lms_pipeline_common::GiveUpReason;
use lms_pipeline_domain::{AnswerId, EvaluationId};
use lms_pipeline_worker::{
    queue::job::{Job, JobStatus, JobType},
    queue::JobOutcome,
    workers::Worker,
    InMemoryJobQueue, JobConsumer, JobHandler, JobProducer, JobQueue, WorkerMetrics,
};

enum Behaviour {
    Succeed,
    Fail,
    Hang,
    Panic,
}

struct ScriptedWorker {
    behaviour: Behaviour,
    runs: Mutex<u32>,
    failures: Mutex<Vec<String>>,
}

impl ScriptedWorker {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            runs: Mutex::new(0),
            failures: Mutex::new(Vec::new()),
        })
    }

    fn runs(&self) -> u32 {
        *self.runs.lock()
    }

    fn failures(&self) -> Vec<String> {
        self.failures.lock().clone()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn process(&self, _job: &Job) -> Result<()> {
        *self.runs.lock() += 1;
        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(anyhow::anyhow!("upstream unavailable")),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            Behaviour::Panic => panic!("date overflow in sweep"),
        }
    }

    async fn failed(&self, _job: &Job, error: &str) {
        self.failures.lock().push(error.to_string());
    }

    fn name(&self) -> &str {
        "ScriptedWorker"
    }
}

struct Harness {
    queue: Arc<InMemoryJobQueue>,
    producer: JobProducer,
    consumer: JobConsumer,
    metrics: WorkerMetrics,
}

fn harness(job_type: &'static str, worker: Arc<ScriptedWorker>) -> Harness {
    let queue = Arc::new(InMemoryJobQueue::new());
    let mut handler = JobHandler::empty();
    handler.register(job_type, worker);
    let metrics = WorkerMetrics::new();

    Harness {
        producer: JobProducer::new(queue.clone()),
        consumer: JobConsumer::new(queue.clone(), handler, metrics.clone()),
        queue,
        metrics,
    }
}

impl Harness {
    /// Wait out `delay`, promote and pop the next job
    async fn next_after(&self, delay: Duration) -> Job {
        tokio::time::advance(delay).await;
        self.queue.promote_due().await.unwrap();
        self.queue.pop().await.unwrap().unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_successful_job_completes() {
    // Arrange
    let worker = ScriptedWorker::new(Behaviour::Succeed);
    let h = harness("low_stock_sweep", worker.clone());
    let job = h.producer.enqueue(JobType::LowStockSweep).await.unwrap();

    // Act
    let popped = h.queue.pop().await.unwrap().unwrap();
    let outcome = h.consumer.execute(popped).await.unwrap();

    // Assert
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(worker.runs(), 1);
    assert_eq!(h.metrics.jobs_succeeded(), 1);
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_job_retries_then_dead_letters() {
    // Arrange
    let worker = ScriptedWorker::new(Behaviour::Fail);
    let h = harness("low_stock_sweep", worker.clone());
    h.producer.enqueue(JobType::LowStockSweep).await.unwrap();

    // Act
    let first = h.queue.pop().await.unwrap().unwrap();
    let outcome1 = h.consumer.execute(first).await.unwrap();
    let second = h.next_after(Duration::from_secs(10)).await;
    let outcome2 = h.consumer.execute(second).await.unwrap();
    let third = h.next_after(Duration::from_secs(10)).await;
    let outcome3 = h.consumer.execute(third).await.unwrap();

    // Assert
    let backoff = Duration::from_secs(10);
    assert_eq!(outcome1, JobOutcome::Retrying { delay: backoff });
    assert_eq!(outcome2, JobOutcome::Retrying { delay: backoff });
    assert_eq!(
        outcome3,
        JobOutcome::DeadLettered {
            reason: GiveUpReason::AttemptsExhausted
        }
    );
    assert_eq!(worker.runs(), 3);
    assert_eq!(worker.failures(), vec!["upstream unavailable".to_string()]);

    let dead = h.queue.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(dead[0].status, JobStatus::Failed);
    assert_eq!(dead[0].last_error.as_deref(), Some("upstream unavailable"));
    assert_eq!(h.metrics.jobs_retried(), 2);
    assert_eq!(h.metrics.jobs_failed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_for_backoff() {
    // Arrange
    let worker = ScriptedWorker::new(Behaviour::Fail);
    let h = harness("low_stock_sweep", worker);
    h.producer.enqueue(JobType::LowStockSweep).await.unwrap();
    let first = h.queue.pop().await.unwrap().unwrap();
    h.consumer.execute(first).await.unwrap();

    // Act
    tokio::time::advance(Duration::from_secs(9)).await;
    let early = h.queue.promote_due().await.unwrap();
    tokio::time::advance(Duration::from_secs(1)).await;
    let due = h.queue.promote_due().await.unwrap();

    // Assert
    assert_eq!(early, 0);
    assert_eq!(due, 1);
}

#[tokio::test(start_paused = true)]
async fn test_essay_timeout_counts_attempt_not_exception() {
    // Arrange
    let worker = ScriptedWorker::new(Behaviour::Hang);
    let h = harness("essay_analysis", worker.clone());
    h.producer
        .enqueue(JobType::EssayAnalysis {
            answer_id: AnswerId::new(7),
        })
        .await
        .unwrap();

    // Act
    let first = h.queue.pop().await.unwrap().unwrap();
    let outcome1 = h.consumer.execute(first).await.unwrap();
    let second = h.next_after(Duration::from_secs(30)).await;
    let (attempts, exceptions) = (second.attempts, second.exceptions);
    let outcome2 = h.consumer.execute(second).await.unwrap();

    // Assert
    assert_eq!(
        outcome1,
        JobOutcome::Retrying {
            delay: Duration::from_secs(30)
        }
    );
    assert_eq!((attempts, exceptions), (1, 0));
    assert_eq!(
        outcome2,
        JobOutcome::DeadLettered {
            reason: GiveUpReason::AttemptsExhausted
        }
    );
    assert_eq!(h.metrics.jobs_timed_out(), 2);
    assert_eq!(worker.failures().len(), 1);
    assert!(worker.failures()[0].contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_analytics_gives_up_after_one_exception() {
    // Arrange
    let worker = ScriptedWorker::new(Behaviour::Fail);
    let h = harness("analytics_refresh", worker.clone());
    h.producer
        .enqueue(JobType::AnalyticsRefresh {
            evaluation_id: EvaluationId::new(4),
        })
        .await
        .unwrap();

    // Act
    let job = h.queue.pop().await.unwrap().unwrap();
    let outcome = h.consumer.execute(job).await.unwrap();

    // Assert
    assert_eq!(
        outcome,
        JobOutcome::DeadLettered {
            reason: GiveUpReason::ExceptionLimit
        }
    );
    assert_eq!(worker.runs(), 1);
    assert_eq!(h.queue.dead_letters(10).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_worker_is_retried_then_dead_lettered() {
    // Arrange
    let worker = ScriptedWorker::new(Behaviour::Panic);
    let h = harness("near_expiry_sweep", worker.clone());
    h.producer
        .enqueue(JobType::NearExpirySweep { days_ahead: 30 })
        .await
        .unwrap();

    // Act
    let first = h.queue.pop().await.unwrap().unwrap();
    let outcome1 = h.consumer.execute(first).await.unwrap();
    let second = h.next_after(Duration::from_secs(10)).await;
    h.consumer.execute(second).await.unwrap();
    let third = h.next_after(Duration::from_secs(10)).await;
    let outcome3 = h.consumer.execute(third).await.unwrap();

    // Assert
    assert_eq!(
        outcome1,
        JobOutcome::Retrying {
            delay: Duration::from_secs(10)
        }
    );
    assert_eq!(
        outcome3,
        JobOutcome::DeadLettered {
            reason: GiveUpReason::AttemptsExhausted
        }
    );
    assert_eq!(worker.runs(), 3);
    assert_eq!(
        worker.failures(),
        vec!["worker panicked: date overflow in sweep".to_string()]
    );
    let dead = h.queue.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].exceptions, 3);
}

#[tokio::test(start_paused = true)]
async fn test_panic_inside_run_loop_settles_job() {
    // Arrange
    let worker = ScriptedWorker::new(Behaviour::Panic);
    let h = harness("analytics_refresh", worker.clone());
    h.producer
        .enqueue(JobType::AnalyticsRefresh {
            evaluation_id: EvaluationId::new(4),
        })
        .await
        .unwrap();
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let consumer = h.consumer.clone();
    let handle = tokio::spawn(async move { consumer.run(1, stop_rx).await });

    // Act
    tokio::time::sleep(Duration::from_secs(1)).await;
    stop_tx.send(true).unwrap();
    handle.await.unwrap();

    // Assert
    assert_eq!(worker.runs(), 1);
    assert_eq!(worker.failures().len(), 1);
    assert_eq!(h.queue.dead_letters(10).await.unwrap().len(), 1);
    assert_eq!(h.metrics.jobs_failed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_job_without_worker_is_unroutable() {
    // Arrange
    let worker = ScriptedWorker::new(Behaviour::Succeed);
    let h = harness("low_stock_sweep", worker.clone());
    h.producer
        .enqueue(JobType::NearExpirySweep { days_ahead: 30 })
        .await
        .unwrap();

    // Act
    let job = h.queue.pop().await.unwrap().unwrap();
    let outcome = h.consumer.execute(job).await.unwrap();

    // Assert
    assert_eq!(outcome, JobOutcome::Unroutable);
    assert_eq!(worker.runs(), 0);
    assert_eq!(h.queue.dead_letters(10).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recalibration_scheduled_with_initial_delay() {
    // Arrange
    let worker = ScriptedWorker::new(Behaviour::Succeed);
    let h = harness("difficulty_recalibration", worker);

    // Act
    h.producer
        .schedule(JobType::DifficultyRecalibration { course_id: None })
        .await
        .unwrap();
    let immediately = h.queue.pop().await.unwrap();
    let later = h.next_after(Duration::from_secs(300)).await;

    // Assert
    assert!(immediately.is_none());
    assert_eq!(
        later.job_type,
        JobType::DifficultyRecalibration { course_id: None }
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_drains_queue_until_shutdown() {
    // Arrange
    let worker = ScriptedWorker::new(Behaviour::Succeed);
    let h = harness("low_stock_sweep", worker.clone());
    for _ in 0..5 {
        h.producer.enqueue(JobType::LowStockSweep).await.unwrap();
    }
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let consumer = h.consumer.clone();
    let handle = tokio::spawn(async move { consumer.run(2, stop_rx).await });

    // Act
    tokio::time::sleep(Duration::from_secs(1)).await;
    stop_tx.send(true).unwrap();
    handle.await.unwrap();

    // Assert
    assert_eq!(worker.runs(), 5);
    assert_eq!(h.metrics.jobs_succeeded(), 5);
    assert_eq!(h.queue.len().await.unwrap(), 0);
}
