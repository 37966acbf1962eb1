//! Job producer - enqueue jobs

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::job::{Job, JobPriority, JobType};
use super::{JobQueue, QueueResult};

/// Job producer for enqueueing jobs
#[derive(Clone)]
pub struct JobProducer {
    queue: Arc<dyn JobQueue>,
}

impl JobProducer {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue a job with the default priority of its type
    pub async fn enqueue(&self, job_type: JobType) -> QueueResult<Job> {
        let priority = job_type.default_priority();
        self.enqueue_with_priority(job_type, priority).await
    }

    /// Enqueue a job with specific priority
    pub async fn enqueue_with_priority(
        &self,
        job_type: JobType,
        priority: JobPriority,
    ) -> QueueResult<Job> {
        let job = Job::new(job_type, priority);
        self.queue.push(&job).await?;

        debug!(
            job_id = %job.id,
            job_type = job.job_type.name(),
            priority = ?job.priority,
            "Job enqueued"
        );

        Ok(job)
    }

    /// Enqueue a job that becomes runnable after `delay`
    pub async fn enqueue_delayed(&self, job_type: JobType, delay: Duration) -> QueueResult<Job> {
        let mut job = Job::of(job_type);
        job.delay_by(delay);
        self.queue.push_delayed(&job, delay).await?;

        debug!(
            job_id = %job.id,
            job_type = job.job_type.name(),
            delay_seconds = delay.as_secs(),
            "Delayed job enqueued"
        );

        Ok(job)
    }

    /// Enqueue a job honouring the initial delay of its type
    pub async fn schedule(&self, job_type: JobType) -> QueueResult<Job> {
        match job_type.initial_delay() {
            Some(delay) => self.enqueue_delayed(job_type, delay).await,
            None => self.enqueue(job_type).await,
        }
    }

    /// Enqueue multiple jobs
    pub async fn enqueue_batch(&self, job_types: Vec<JobType>) -> QueueResult<Vec<Job>> {
        let mut created_jobs = Vec::with_capacity(job_types.len());

        for job_type in job_types {
            let job = Job::of(job_type);
            self.queue.push(&job).await?;
            created_jobs.push(job);
        }

        info!(count = created_jobs.len(), "Batch jobs enqueued");

        Ok(created_jobs)
    }

    /// Jobs waiting in the queue, ready or delayed
    pub async fn queue_size(&self) -> QueueResult<usize> {
        self.queue.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryJobQueue;
    use lms_pipeline_domain::{AnswerId, EvaluationId};

    #[tokio::test]
    async fn test_enqueue_uses_type_priority() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let producer = JobProducer::new(queue.clone());

        let job = producer
            .enqueue(JobType::EssayAnalysis {
                answer_id: AnswerId::new(3),
            })
            .await
            .unwrap();

        assert_eq!(job.priority, JobPriority::High);
        assert_eq!(queue.ready_len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_applies_initial_delay() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let producer = JobProducer::new(queue.clone());

        producer
            .schedule(JobType::DifficultyRecalibration { course_id: None })
            .await
            .unwrap();
        producer.schedule(JobType::LowStockSweep).await.unwrap();

        assert_eq!(queue.delayed_len(), 1);
        assert_eq!(queue.ready_len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_batch() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let producer = JobProducer::new(queue);

        let jobs = producer
            .enqueue_batch(
                (1..=3)
                    .map(|id| JobType::AnalyticsRefresh {
                        evaluation_id: EvaluationId::new(id),
                    })
                    .collect(),
            )
            .await
            .unwrap();

        assert_eq!(jobs.len(), 3);
        assert_eq!(producer.queue_size().await.unwrap(), 3);
    }
}
