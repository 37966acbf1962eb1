//! Redis-backed job queue
//!
//! Layout under the key prefix:
//! - `{prefix}:jobs:{critical,high,normal,low}` lists of ready jobs (LPUSH / RPOP)
//! - `{prefix}:jobs:delayed` sorted set scored by the runnable time in epoch ms
//! - `{prefix}:jobs:dlq` list of dead-lettered jobs, newest at the head

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::job::{Job, JobPriority};
use super::{JobQueue, QueueResult};

/// Upper bound of delayed jobs promoted per call
const PROMOTE_BATCH: isize = 100;

/// Job queue stored in Redis
#[derive(Clone)]
pub struct RedisJobQueue {
    redis: ConnectionManager,
    prefix: String,
}

impl RedisJobQueue {
    /// Connect to Redis
    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            redis,
            prefix: prefix.into(),
        })
    }

    fn delayed_key(&self) -> String {
        format!("{}:jobs:delayed", self.prefix)
    }

    fn dead_letter_key(&self) -> String {
        format!("{}:jobs:dlq", self.prefix)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, job: &Job) -> QueueResult<()> {
        let mut redis = self.redis.clone();
        let queue_name = job.priority.queue_name(&self.prefix);
        let job_json = serde_json::to_string(job)?;

        redis.lpush::<_, _, ()>(&queue_name, &job_json).await?;

        Ok(())
    }

    async fn push_delayed(&self, job: &Job, delay: Duration) -> QueueResult<()> {
        let mut redis = self.redis.clone();
        let job_json = serde_json::to_string(job)?;
        let score = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;

        redis
            .zadd::<_, _, _, ()>(self.delayed_key(), &job_json, score)
            .await?;

        Ok(())
    }

    async fn pop(&self) -> QueueResult<Option<Job>> {
        let mut redis = self.redis.clone();

        for priority in JobPriority::DRAIN_ORDER {
            let queue_name = priority.queue_name(&self.prefix);
            let popped: Option<String> = redis.rpop(&queue_name, None).await?;

            if let Some(job_json) = popped {
                return Ok(Some(serde_json::from_str(&job_json)?));
            }
        }

        Ok(None)
    }

    async fn promote_due(&self) -> QueueResult<usize> {
        let mut redis = self.redis.clone();
        let delayed_key = self.delayed_key();
        let now = chrono::Utc::now().timestamp_millis();

        let due: Vec<String> = redis
            .zrangebyscore_limit(&delayed_key, 0, now, 0, PROMOTE_BATCH)
            .await?;

        let mut promoted = 0;
        for job_json in due {
            // Another consumer may have promoted it first
            let removed: i64 = redis.zrem(&delayed_key, &job_json).await?;
            if removed == 0 {
                continue;
            }

            let job: Job = match serde_json::from_str(&job_json) {
                Ok(job) => job,
                Err(e) => {
                    error!(error = %e, "Dropping unreadable delayed job");
                    continue;
                }
            };

            let queue_name = job.priority.queue_name(&self.prefix);
            redis.lpush::<_, _, ()>(&queue_name, &job_json).await?;
            promoted += 1;

            debug!(job_id = %job.id, "Delayed job promoted");
        }

        Ok(promoted)
    }

    async fn dead_letter(&self, job: &Job) -> QueueResult<()> {
        let mut redis = self.redis.clone();
        let job_json = serde_json::to_string(job)?;

        redis
            .lpush::<_, _, ()>(self.dead_letter_key(), &job_json)
            .await?;

        warn!(job_id = %job.id, "Job moved to dead letter queue");

        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut redis = self.redis.clone();
        let jobs_json: Vec<String> = redis
            .lrange(self.dead_letter_key(), 0, limit as isize - 1)
            .await?;

        Ok(jobs_json
            .iter()
            .filter_map(|job_json| serde_json::from_str(job_json).ok())
            .collect())
    }

    async fn len(&self) -> QueueResult<usize> {
        let mut redis = self.redis.clone();
        let mut total: usize = redis.zcard(self.delayed_key()).await?;

        for priority in JobPriority::DRAIN_ORDER {
            let size: usize = redis.llen(priority.queue_name(&self.prefix)).await?;
            total += size;
        }

        Ok(total)
    }
}
