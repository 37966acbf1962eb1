//! Job queue implementation
//!
//! [`JobQueue`] is the storage seam of the runtime. Ready jobs are drained by
//! priority; delayed jobs wait until [`JobQueue::promote_due`] moves them to
//! their priority list; jobs that ran out of retries land in a dead letter list.

pub mod consumer;
pub mod job;
pub mod memory;
pub mod producer;
pub mod redis_queue;

pub use consumer::{JobConsumer, JobOutcome};
pub use job::{Job, JobPriority, JobStatus, JobType};
pub use memory::InMemoryJobQueue;
pub use producer::JobProducer;
pub use redis_queue::RedisJobQueue;

use async_trait::async_trait;
use std::time::Duration;

/// Queue backend errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Job storage
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Make a job runnable now
    async fn push(&self, job: &Job) -> QueueResult<()>;

    /// Make a job runnable after `delay`
    async fn push_delayed(&self, job: &Job, delay: Duration) -> QueueResult<()>;

    /// Take the next runnable job, highest priority first
    async fn pop(&self) -> QueueResult<Option<Job>>;

    /// Move delayed jobs whose time has come to their priority list;
    /// returns how many were moved
    async fn promote_due(&self) -> QueueResult<usize>;

    /// Park a job that failed for good
    async fn dead_letter(&self, job: &Job) -> QueueResult<()>;

    /// Most recent dead-lettered jobs, newest first
    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<Job>>;

    /// Jobs waiting, ready or delayed
    async fn len(&self) -> QueueResult<usize>;
}
