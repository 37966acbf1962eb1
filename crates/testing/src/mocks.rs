//! Scripted mocks of the external collaborators.
//!
//! Each mock records what it was asked and answers from a script set up by
//! the test.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lms_pipeline_application::{
    ports::{
        AnalyticsPort, NotificationRepositoryPort, PredictionPipeline, ScoringGateway,
        ScoringRequest,
    },
    AnalyticsSummary, ApplicationError, ApplicationResult,
};
use lms_pipeline_domain::{
    grading::{ScoringMode, ScoringResult},
    notification::{DedupKey, NewNotification, NotificationType},
    question::Question,
    AnswerId, EvaluationId, NotificationId, QuestionId, UserId,
};

/// Mock scoring agent
pub struct MockScoringGateway {
    response: RwLock<ApplicationResult<ScoringResult>>,
    calls: RwLock<Vec<(AnswerId, ScoringMode, Option<UserId>)>>,
}

impl MockScoringGateway {
    /// Answer every request with `result`
    pub fn returning(result: ScoringResult) -> Self {
        Self {
            response: RwLock::new(Ok(result)),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Fail every request with `error`
    pub fn failing(error: ApplicationError) -> Self {
        Self {
            response: RwLock::new(Err(error)),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Fail every request as an unreachable agent
    pub fn unavailable() -> Self {
        Self::failing(ApplicationError::integration("scoring-agent", "connection refused"))
    }

    pub fn set_response(&self, response: ApplicationResult<ScoringResult>) {
        *self.response.write() = response;
    }

    pub fn calls(&self) -> Vec<(AnswerId, ScoringMode, Option<UserId>)> {
        self.calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }
}

#[async_trait]
impl ScoringGateway for MockScoringGateway {
    async fn score(&self, request: ScoringRequest<'_>) -> ApplicationResult<ScoringResult> {
        self.calls
            .write()
            .push((request.answer.id, request.mode, request.student_id));
        self.response.read().clone()
    }
}

/// Mock prediction pipeline
pub struct MockPredictionPipeline {
    response: RwLock<ApplicationResult<serde_json::Value>>,
    students: RwLock<Vec<UserId>>,
}

impl MockPredictionPipeline {
    pub fn returning(value: serde_json::Value) -> Self {
        Self {
            response: RwLock::new(Ok(value)),
            students: RwLock::new(Vec::new()),
        }
    }

    pub fn failing(error: ApplicationError) -> Self {
        Self {
            response: RwLock::new(Err(error)),
            students: RwLock::new(Vec::new()),
        }
    }

    pub fn students(&self) -> Vec<UserId> {
        self.students.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.students.read().len()
    }
}

impl Default for MockPredictionPipeline {
    fn default() -> Self {
        Self::returning(serde_json::json!({ "status": "ok" }))
    }
}

#[async_trait]
impl PredictionPipeline for MockPredictionPipeline {
    async fn run_for_student(&self, student_id: UserId) -> ApplicationResult<serde_json::Value> {
        self.students.write().push(student_id);
        self.response.read().clone()
    }
}

/// Mock analytics collaborator.
///
/// Recalibration returns the scripted difficulty of a question, or its stored
/// estimate when none is scripted, and fails for questions marked as failing.
#[derive(Default)]
pub struct MockAnalytics {
    difficulties: RwLock<HashMap<QuestionId, f64>>,
    failing_questions: RwLock<HashSet<QuestionId>>,
    recalibrated: RwLock<Vec<QuestionId>>,
    update_error: RwLock<Option<ApplicationError>>,
    updates: RwLock<Vec<EvaluationId>>,
}

impl MockAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_difficulty(self, question_id: QuestionId, difficulty: f64) -> Self {
        self.difficulties.write().insert(question_id, difficulty);
        self
    }

    pub fn failing_for(self, question_id: QuestionId) -> Self {
        self.failing_questions.write().insert(question_id);
        self
    }

    pub fn failing_updates(self, error: ApplicationError) -> Self {
        *self.update_error.write() = Some(error);
        self
    }

    /// Questions recalibrated successfully, in call order
    pub fn recalibrated(&self) -> Vec<QuestionId> {
        self.recalibrated.read().clone()
    }

    /// Evaluations whose analytics were requested, in call order
    pub fn updates(&self) -> Vec<EvaluationId> {
        self.updates.read().clone()
    }
}

#[async_trait]
impl AnalyticsPort for MockAnalytics {
    async fn update_analytics(&self, evaluation_id: EvaluationId) -> ApplicationResult<AnalyticsSummary> {
        self.updates.write().push(evaluation_id);
        if let Some(error) = self.update_error.read().clone() {
            return Err(error);
        }
        Ok(AnalyticsSummary {
            evaluation_id,
            questions_updated: 0,
            answers_considered: 0,
        })
    }

    async fn recalibrate_difficulty(&self, question: &Question) -> ApplicationResult<f64> {
        if self.failing_questions.read().contains(&question.id) {
            return Err(ApplicationError::Database(format!(
                "deadlock detected while updating question {}",
                question.id
            )));
        }
        self.recalibrated.write().push(question.id);
        Ok(self
            .difficulties
            .read()
            .get(&question.id)
            .copied()
            .unwrap_or(question.estimated_difficulty))
    }
}

/// Notification log that refuses writes for one dedup key and forwards
/// everything else to `inner`
pub struct FailingNotifications {
    inner: Arc<dyn NotificationRepositoryPort>,
    failing_key: DedupKey,
}

impl FailingNotifications {
    pub fn new(inner: Arc<dyn NotificationRepositoryPort>, failing_key: DedupKey) -> Self {
        Self { inner, failing_key }
    }
}

#[async_trait]
impl NotificationRepositoryPort for FailingNotifications {
    async fn append(&self, notification: NewNotification) -> ApplicationResult<NotificationId> {
        if notification.dedup_key == self.failing_key {
            return Err(ApplicationError::Database(format!(
                "insert into notificaciones failed for {}",
                self.failing_key.as_str()
            )));
        }
        self.inner.append(notification).await
    }

    async fn exists_since(
        &self,
        kind: NotificationType,
        key: &DedupKey,
        since: DateTime<Utc>,
    ) -> ApplicationResult<bool> {
        self.inner.exists_since(kind, key, since).await
    }
}
