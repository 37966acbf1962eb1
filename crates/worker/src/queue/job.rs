//! Job types and definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use lms_pipeline_common::RetryPolicy;
use lms_pipeline_domain::{AnswerId, CourseId, EvaluationId, UserId};

/// Job priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobPriority {
    /// Critical priority - processed first
    Critical = 4,
    /// High priority
    High = 3,
    /// Normal priority (default)
    Normal = 2,
    /// Low priority - processed last
    Low = 1,
}

impl Default for JobPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl JobPriority {
    /// Priorities in the order queues are drained
    pub const DRAIN_ORDER: [JobPriority; 4] = [Self::Critical, Self::High, Self::Normal, Self::Low];

    /// Get the queue name for this priority
    pub fn queue_name(&self, prefix: &str) -> String {
        match self {
            Self::Critical => format!("{}:jobs:critical", prefix),
            Self::High => format!("{}:jobs:high", prefix),
            Self::Normal => format!("{}:jobs:normal", prefix),
            Self::Low => format!("{}:jobs:low", prefix),
        }
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job is queued and waiting to be processed
    Queued,
    /// Job is currently being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed and waits for another run
    Retrying,
    /// Job failed for good and sits in the dead letter queue
    Failed,
}

/// Job type enumeration.
///
/// Payloads carry ids and scalars only; workers reload everything else when
/// they run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobType {
    /// Score a long free-text answer
    EssayAnalysis { answer_id: AnswerId },
    /// Run the prediction pipeline for a student
    PredictionDispatch { student_id: UserId },
    /// Recalibrate question difficulty, optionally for one course
    DifficultyRecalibration { course_id: Option<CourseId> },
    /// Refresh question analytics of an evaluation
    AnalyticsRefresh { evaluation_id: EvaluationId },
    /// Notify about products under their minimum stock
    LowStockSweep,
    /// Notify about lots expiring within `days_ahead` days
    NearExpirySweep { days_ahead: i64 },
}

impl JobType {
    /// Stable name, used for routing and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::EssayAnalysis { .. } => "essay_analysis",
            Self::PredictionDispatch { .. } => "prediction_dispatch",
            Self::DifficultyRecalibration { .. } => "difficulty_recalibration",
            Self::AnalyticsRefresh { .. } => "analytics_refresh",
            Self::LowStockSweep => "low_stock_sweep",
            Self::NearExpirySweep { .. } => "near_expiry_sweep",
        }
    }

    /// Retry policy the runner applies to this job
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::EssayAnalysis { .. } => {
                RetryPolicy::fixed(2, Duration::from_secs(30)).with_timeout(Duration::from_secs(60))
            }
            Self::PredictionDispatch { .. } => RetryPolicy::fixed(3, Duration::from_secs(60)),
            Self::DifficultyRecalibration { .. } => {
                RetryPolicy::fixed(2, Duration::from_secs(300))
            }
            Self::AnalyticsRefresh { .. } => {
                RetryPolicy::fixed(3, Duration::from_secs(60)).with_max_exceptions(1)
            }
            Self::LowStockSweep | Self::NearExpirySweep { .. } => RetryPolicy::default(),
        }
    }

    /// Delay before the first run when the job is scheduled
    pub fn initial_delay(&self) -> Option<Duration> {
        match self {
            Self::DifficultyRecalibration { .. } => Some(Duration::from_secs(300)),
            _ => None,
        }
    }

    pub fn default_priority(&self) -> JobPriority {
        match self {
            Self::EssayAnalysis { .. } => JobPriority::High,
            Self::DifficultyRecalibration { .. } => JobPriority::Low,
            _ => JobPriority::Normal,
        }
    }
}

/// Job wrapper with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    pub id: Uuid,
    /// Job type and payload
    pub job_type: JobType,
    /// Job priority
    pub priority: JobPriority,
    /// Job status
    pub status: JobStatus,
    /// Runs started so far
    pub attempts: u32,
    /// Runs that failed with an error of their own (timeouts excluded)
    pub exceptions: u32,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job becomes runnable
    pub scheduled_at: DateTime<Utc>,
    /// When the last run started
    pub started_at: Option<DateTime<Utc>>,
    /// When the job completed or failed for good
    pub completed_at: Option<DateTime<Utc>>,
    /// Error of the last failed run
    pub last_error: Option<String>,
}

impl Job {
    /// Create a new job
    pub fn new(job_type: JobType, priority: JobPriority) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            priority,
            status: JobStatus::Queued,
            attempts: 0,
            exceptions: 0,
            created_at: now,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    /// Create a job with its default priority
    pub fn of(job_type: JobType) -> Self {
        let priority = job_type.default_priority();
        Self::new(job_type, priority)
    }

    /// Push the runnable time `delay` into the future
    pub fn delay_by(&mut self, delay: Duration) {
        self.scheduled_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
    }

    /// Mark job as processing; starts a new attempt
    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.attempts += 1;
        self.started_at = Some(Utc::now());
    }

    /// Mark job as completed
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.last_error = None;
    }

    /// Record a failed run. `exception` is false for timeouts.
    pub fn record_failure(&mut self, error: String, exception: bool) {
        if exception {
            self.exceptions += 1;
        }
        self.status = JobStatus::Retrying;
        self.last_error = Some(error);
    }

    /// Mark job as failed for good
    pub fn mark_failed(&mut self) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.job_type.retry_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_pipeline_common::{GiveUpReason, RetryDecision};

    #[test]
    fn test_job_creation() {
        let job = Job::of(JobType::EssayAnalysis {
            answer_id: AnswerId::new(42),
        });

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.priority, JobPriority::High);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.exceptions, 0);
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = Job::of(JobType::LowStockSweep);

        job.mark_processing();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.attempts, 1);
        assert!(job.started_at.is_some());

        job.record_failure("timed out".to_string(), false);
        assert_eq!(job.exceptions, 0);
        assert_eq!(job.last_error.as_deref(), Some("timed out"));

        job.mark_processing();
        job.mark_completed();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 2);
        assert!(job.last_error.is_none());
    }

    #[test]
    fn test_payload_is_tagged() {
        let job_type = JobType::AnalyticsRefresh {
            evaluation_id: EvaluationId::new(9),
        };

        let json = serde_json::to_value(&job_type).unwrap();

        assert_eq!(json["type"], "analytics_refresh");
        assert_eq!(json["evaluation_id"], 9);
        let back: JobType = serde_json::from_value(json).unwrap();
        assert_eq!(back, job_type);
    }

    #[test]
    fn test_essay_policy() {
        let policy = JobType::EssayAnalysis {
            answer_id: AnswerId::new(1),
        }
        .retry_policy();

        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.timeout, Some(Duration::from_secs(60)));
        assert_eq!(
            policy.decide(1, 1),
            RetryDecision::RetryAfter(Duration::from_secs(30))
        );
        assert_eq!(
            policy.decide(2, 2),
            RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted)
        );
    }

    #[test]
    fn test_analytics_policy_fails_on_first_exception() {
        let policy = JobType::AnalyticsRefresh {
            evaluation_id: EvaluationId::new(1),
        }
        .retry_policy();

        assert_eq!(
            policy.decide(1, 1),
            RetryDecision::GiveUp(GiveUpReason::ExceptionLimit)
        );
    }

    #[test]
    fn test_recalibration_is_delayed_and_low_priority() {
        let job_type = JobType::DifficultyRecalibration { course_id: None };

        assert_eq!(job_type.initial_delay(), Some(Duration::from_secs(300)));
        assert_eq!(job_type.default_priority(), JobPriority::Low);
        assert_eq!(job_type.retry_policy().max_attempts, 2);
    }

    #[test]
    fn test_priority_queue_name() {
        assert_eq!(JobPriority::Critical.queue_name("lms"), "lms:jobs:critical");
        assert_eq!(JobPriority::High.queue_name("lms"), "lms:jobs:high");
        assert_eq!(JobPriority::Normal.queue_name("lms"), "lms:jobs:normal");
        assert_eq!(JobPriority::Low.queue_name("lms"), "lms:jobs:low");
    }
}
