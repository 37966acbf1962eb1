//! Ports to storage and to the external ML services.
//!
//! Repository ports read entities and overwrite derived fields; none of them
//! offers read-modify-write counters. Gateway ports wrap the scoring agent and
//! the prediction pipeline.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

use lms_pipeline_domain::{
    grading::{Answer, Attempt, Evaluation, ScoringMode, ScoringResult},
    inventory::{ExpiringLot, ProductStock},
    notification::{DedupKey, NewNotification, NotificationType},
    question::{Question, QuestionAnalytics},
    user::User,
    AnswerId, AttemptId, CourseId, EvaluationId, NotificationId, QuestionId, UserId,
};

use crate::ApplicationResult;

/// An answer given within an evaluation, with the context analytics needs
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationAnswer {
    pub answer: Answer,
    pub student_id: UserId,
    /// Percentage of the attempt the answer belongs to
    pub attempt_percentage: f64,
}

/// Answer repository
#[async_trait]
pub trait AnswerRepositoryPort: Send + Sync {
    async fn get_by_id(&self, id: AnswerId) -> ApplicationResult<Option<Answer>>;

    async fn list_by_attempt(&self, attempt_id: AttemptId) -> ApplicationResult<Vec<Answer>>;

    /// Answers of every attempt of an evaluation
    async fn list_by_evaluation(
        &self,
        evaluation_id: EvaluationId,
    ) -> ApplicationResult<Vec<EvaluationAnswer>>;

    /// Answers to a question across all evaluations
    async fn list_by_question(&self, question_id: QuestionId) -> ApplicationResult<Vec<Answer>>;

    /// Overwrite word count and the scored fields
    async fn save_scoring(&self, answer: &Answer) -> ApplicationResult<()>;
}

/// Attempt repository
#[async_trait]
pub trait AttemptRepositoryPort: Send + Sync {
    async fn get_by_id(&self, id: AttemptId) -> ApplicationResult<Option<Attempt>>;

    /// Overwrite points, percentage, average confidence and analysis time
    async fn save_metrics(&self, attempt: &Attempt) -> ApplicationResult<()>;
}

/// Evaluation repository
#[async_trait]
pub trait EvaluationRepositoryPort: Send + Sync {
    async fn get_by_id(&self, id: EvaluationId) -> ApplicationResult<Option<Evaluation>>;
}

/// Question repository
#[async_trait]
pub trait QuestionRepositoryPort: Send + Sync {
    async fn get_by_id(&self, id: QuestionId) -> ApplicationResult<Option<Question>>;

    /// Questions used strictly more than `min_usage` times, optionally in one course
    async fn list_recalibration_candidates(
        &self,
        min_usage: u32,
        course_id: Option<CourseId>,
    ) -> ApplicationResult<Vec<Question>>;

    async fn save_empirical_difficulty(
        &self,
        id: QuestionId,
        difficulty: f64,
    ) -> ApplicationResult<()>;
}

/// Question analytics repository
#[async_trait]
pub trait QuestionAnalyticsRepositoryPort: Send + Sync {
    /// Insert or replace the row keyed by question and evaluation
    async fn upsert(&self, analytics: &QuestionAnalytics) -> ApplicationResult<()>;

    async fn list_by_question(
        &self,
        question_id: QuestionId,
    ) -> ApplicationResult<Vec<QuestionAnalytics>>;
}

/// User repository
#[async_trait]
pub trait UserRepositoryPort: Send + Sync {
    async fn get_by_id(&self, id: UserId) -> ApplicationResult<Option<User>>;

    async fn list_with_any_role(&self, roles: &[String]) -> ApplicationResult<Vec<User>>;

    async fn list_with_email_containing(&self, fragment: &str) -> ApplicationResult<Vec<User>>;

    /// Any single user, used as the audience of last resort
    async fn first(&self) -> ApplicationResult<Option<User>>;

    /// Cluster assignment of each given student that has one
    async fn cluster_assignments(
        &self,
        student_ids: &[UserId],
    ) -> ApplicationResult<HashMap<UserId, i32>>;
}

/// Inventory repository
#[async_trait]
pub trait InventoryRepositoryPort: Send + Sync {
    /// Active products with a minimum configured, with stock summed over warehouses
    async fn list_product_stock(&self) -> ApplicationResult<Vec<ProductStock>>;

    /// Lots with stock whose expiry date falls in `from..=until`
    async fn list_lots_expiring_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> ApplicationResult<Vec<ExpiringLot>>;
}

/// Append-only notification log
#[async_trait]
pub trait NotificationRepositoryPort: Send + Sync {
    async fn append(&self, notification: NewNotification) -> ApplicationResult<NotificationId>;

    /// Whether a notification of `kind` for `key` was written after `since`
    async fn exists_since(
        &self,
        kind: NotificationType,
        key: &DedupKey,
        since: DateTime<Utc>,
    ) -> ApplicationResult<bool>;
}

/// What the scoring agent needs to grade one answer
#[derive(Debug, Clone, Copy)]
pub struct ScoringRequest<'a> {
    pub answer: &'a Answer,
    pub question: &'a Question,
    pub student_id: Option<UserId>,
    /// Evaluation the answer belongs to, sent as the agent's task id
    pub evaluation_id: Option<EvaluationId>,
    pub mode: ScoringMode,
}

/// Free-text answer scoring agent
#[async_trait]
pub trait ScoringGateway: Send + Sync {
    async fn score(&self, request: ScoringRequest<'_>) -> ApplicationResult<ScoringResult>;
}

/// Per-student prediction pipeline
#[async_trait]
pub trait PredictionPipeline: Send + Sync {
    /// Run the pipeline; the result is opaque to the caller
    async fn run_for_student(&self, student_id: UserId) -> ApplicationResult<serde_json::Value>;
}

/// Question analytics collaborator used by the jobs
#[async_trait]
pub trait AnalyticsPort: Send + Sync {
    /// Recompute and store the analytics of every question of an evaluation
    async fn update_analytics(
        &self,
        evaluation_id: EvaluationId,
    ) -> ApplicationResult<crate::services::AnalyticsSummary>;

    /// Store and return a fresh empirical difficulty for a question
    async fn recalibrate_difficulty(&self, question: &Question) -> ApplicationResult<f64>;
}
