//! In-memory store implementing every repository port.
//!
//! Backs the worker's `--in-memory` mode and the scenario tests. All state sits
//! behind one lock so each port call sees a consistent snapshot.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use lms_pipeline_application::{
    ports::{
        AnswerRepositoryPort, AttemptRepositoryPort, EvaluationAnswer, EvaluationRepositoryPort,
        InventoryRepositoryPort, NotificationRepositoryPort, QuestionAnalyticsRepositoryPort,
        QuestionRepositoryPort, UserRepositoryPort,
    },
    ApplicationError, ApplicationResult,
};
use lms_pipeline_domain::{
    grading::{Answer, Attempt, Evaluation},
    inventory::{ExpiringLot, Product, ProductStock, StockItem},
    notification::{DedupKey, NewNotification, NotificationRecord, NotificationType},
    question::{Question, QuestionAnalytics},
    user::User,
    AnswerId, AttemptId, CourseId, EvaluationId, NotificationId, ProductId, QuestionId,
    StockItemId, UserId,
};

#[derive(Debug, Default)]
struct State {
    answers: BTreeMap<AnswerId, Answer>,
    attempts: BTreeMap<AttemptId, Attempt>,
    evaluations: BTreeMap<EvaluationId, Evaluation>,
    questions: BTreeMap<QuestionId, Question>,
    analytics: BTreeMap<(QuestionId, EvaluationId), QuestionAnalytics>,
    users: BTreeMap<UserId, User>,
    clusters: HashMap<UserId, i32>,
    products: BTreeMap<ProductId, Product>,
    stock: BTreeMap<StockItemId, StockItem>,
    notifications: Vec<NotificationRecord>,
}

/// Thread-safe in-memory implementation of the repository ports
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_answer(&self, answer: Answer) {
        self.state.write().answers.insert(answer.id, answer);
    }

    pub fn insert_attempt(&self, attempt: Attempt) {
        self.state.write().attempts.insert(attempt.id, attempt);
    }

    pub fn insert_evaluation(&self, evaluation: Evaluation) {
        self.state.write().evaluations.insert(evaluation.id, evaluation);
    }

    pub fn remove_evaluation(&self, id: EvaluationId) -> Option<Evaluation> {
        self.state.write().evaluations.remove(&id)
    }

    pub fn insert_question(&self, question: Question) {
        self.state.write().questions.insert(question.id, question);
    }

    pub fn insert_analytics(&self, analytics: QuestionAnalytics) {
        self.state
            .write()
            .analytics
            .insert((analytics.question_id, analytics.evaluation_id), analytics);
    }

    pub fn insert_user(&self, user: User) {
        self.state.write().users.insert(user.id, user);
    }

    pub fn assign_cluster(&self, student_id: UserId, cluster_id: i32) {
        self.state.write().clusters.insert(student_id, cluster_id);
    }

    pub fn insert_product(&self, product: Product) {
        self.state.write().products.insert(product.id, product);
    }

    pub fn insert_stock_item(&self, item: StockItem) {
        self.state.write().stock.insert(item.id, item);
    }

    /// Append a notification with an explicit timestamp
    pub fn insert_notification(&self, notification: NewNotification) -> NotificationId {
        let mut state = self.state.write();
        let id = NotificationId::new(state.notifications.len() as i64 + 1);
        state
            .notifications
            .push(NotificationRecord::from_new(id, notification));
        id
    }

    pub fn answer(&self, id: AnswerId) -> Option<Answer> {
        self.state.read().answers.get(&id).cloned()
    }

    pub fn attempt(&self, id: AttemptId) -> Option<Attempt> {
        self.state.read().attempts.get(&id).cloned()
    }

    pub fn question(&self, id: QuestionId) -> Option<Question> {
        self.state.read().questions.get(&id).cloned()
    }

    pub fn analytics(&self, question_id: QuestionId, evaluation_id: EvaluationId) -> Option<QuestionAnalytics> {
        self.state
            .read()
            .analytics
            .get(&(question_id, evaluation_id))
            .cloned()
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.state.read().notifications.clone()
    }
}

#[async_trait]
impl AnswerRepositoryPort for InMemoryStore {
    async fn get_by_id(&self, id: AnswerId) -> ApplicationResult<Option<Answer>> {
        Ok(self.answer(id))
    }

    async fn list_by_attempt(&self, attempt_id: AttemptId) -> ApplicationResult<Vec<Answer>> {
        Ok(self
            .state
            .read()
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect())
    }

    async fn list_by_evaluation(
        &self,
        evaluation_id: EvaluationId,
    ) -> ApplicationResult<Vec<EvaluationAnswer>> {
        let state = self.state.read();
        Ok(state
            .answers
            .values()
            .filter_map(|answer| {
                let attempt = state.attempts.get(&answer.attempt_id)?;
                (attempt.evaluation_id == evaluation_id).then(|| EvaluationAnswer {
                    answer: answer.clone(),
                    student_id: attempt.student_id,
                    attempt_percentage: attempt.percentage,
                })
            })
            .collect())
    }

    async fn list_by_question(&self, question_id: QuestionId) -> ApplicationResult<Vec<Answer>> {
        Ok(self
            .state
            .read()
            .answers
            .values()
            .filter(|a| a.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn save_scoring(&self, answer: &Answer) -> ApplicationResult<()> {
        let mut state = self.state.write();
        let stored = state
            .answers
            .get_mut(&answer.id)
            .ok_or_else(|| ApplicationError::not_found("answer", answer.id))?;

        stored.word_count = answer.word_count;
        stored.patterns = answer.patterns.clone();
        stored.recommendation = answer.recommendation.clone();
        stored.confidence = answer.confidence;
        stored.is_correct = answer.is_correct;
        stored.points_awarded = answer.points_awarded;
        Ok(())
    }
}

#[async_trait]
impl AttemptRepositoryPort for InMemoryStore {
    async fn get_by_id(&self, id: AttemptId) -> ApplicationResult<Option<Attempt>> {
        Ok(self.attempt(id))
    }

    async fn save_metrics(&self, attempt: &Attempt) -> ApplicationResult<()> {
        let mut state = self.state.write();
        let stored = state
            .attempts
            .get_mut(&attempt.id)
            .ok_or_else(|| ApplicationError::not_found("attempt", attempt.id))?;

        stored.points_awarded = attempt.points_awarded;
        stored.percentage = attempt.percentage;
        stored.average_confidence = attempt.average_confidence;
        stored.last_analyzed_at = attempt.last_analyzed_at;
        Ok(())
    }
}

#[async_trait]
impl EvaluationRepositoryPort for InMemoryStore {
    async fn get_by_id(&self, id: EvaluationId) -> ApplicationResult<Option<Evaluation>> {
        Ok(self.state.read().evaluations.get(&id).cloned())
    }
}

#[async_trait]
impl QuestionRepositoryPort for InMemoryStore {
    async fn get_by_id(&self, id: QuestionId) -> ApplicationResult<Option<Question>> {
        Ok(self.question(id))
    }

    async fn list_recalibration_candidates(
        &self,
        min_usage: u32,
        course_id: Option<CourseId>,
    ) -> ApplicationResult<Vec<Question>> {
        Ok(self
            .state
            .read()
            .questions
            .values()
            .filter(|q| q.eligible_for_recalibration(min_usage))
            .filter(|q| course_id.map_or(true, |course| q.course_id == course))
            .cloned()
            .collect())
    }

    async fn save_empirical_difficulty(&self, id: QuestionId, difficulty: f64) -> ApplicationResult<()> {
        let mut state = self.state.write();
        let question = state
            .questions
            .get_mut(&id)
            .ok_or_else(|| ApplicationError::not_found("question", id))?;
        question.empirical_difficulty = Some(difficulty);
        Ok(())
    }
}

#[async_trait]
impl QuestionAnalyticsRepositoryPort for InMemoryStore {
    async fn upsert(&self, analytics: &QuestionAnalytics) -> ApplicationResult<()> {
        self.insert_analytics(analytics.clone());
        Ok(())
    }

    async fn list_by_question(&self, question_id: QuestionId) -> ApplicationResult<Vec<QuestionAnalytics>> {
        Ok(self
            .state
            .read()
            .analytics
            .values()
            .filter(|row| row.question_id == question_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserRepositoryPort for InMemoryStore {
    async fn get_by_id(&self, id: UserId) -> ApplicationResult<Option<User>> {
        Ok(self.state.read().users.get(&id).cloned())
    }

    async fn list_with_any_role(&self, roles: &[String]) -> ApplicationResult<Vec<User>> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .filter(|u| u.has_any_role(roles))
            .cloned()
            .collect())
    }

    async fn list_with_email_containing(&self, fragment: &str) -> ApplicationResult<Vec<User>> {
        let fragment = fragment.to_lowercase();
        Ok(self
            .state
            .read()
            .users
            .values()
            .filter(|u| u.email.to_lowercase().contains(&fragment))
            .cloned()
            .collect())
    }

    async fn first(&self) -> ApplicationResult<Option<User>> {
        Ok(self.state.read().users.values().next().cloned())
    }

    async fn cluster_assignments(&self, student_ids: &[UserId]) -> ApplicationResult<HashMap<UserId, i32>> {
        let state = self.state.read();
        Ok(student_ids
            .iter()
            .filter_map(|id| state.clusters.get(id).map(|cluster| (*id, *cluster)))
            .collect())
    }
}

#[async_trait]
impl InventoryRepositoryPort for InMemoryStore {
    async fn list_product_stock(&self) -> ApplicationResult<Vec<ProductStock>> {
        let state = self.state.read();
        Ok(state
            .products
            .values()
            .filter(|p| p.active && p.min_stock > 0)
            .map(|product| ProductStock {
                product: product.clone(),
                total_stock: state
                    .stock
                    .values()
                    .filter(|item| item.product_id == product.id)
                    .map(|item| item.quantity)
                    .sum(),
            })
            .collect())
    }

    async fn list_lots_expiring_between(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> ApplicationResult<Vec<ExpiringLot>> {
        let state = self.state.read();
        Ok(state
            .stock
            .values()
            .filter(|item| item.quantity > 0)
            .filter(|item| matches!(item.expires_on, Some(date) if date >= from && date <= until))
            .filter_map(|item| {
                let product = state.products.get(&item.product_id)?;
                Some(ExpiringLot {
                    item: item.clone(),
                    product_name: product.name.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl NotificationRepositoryPort for InMemoryStore {
    async fn append(&self, notification: NewNotification) -> ApplicationResult<NotificationId> {
        Ok(self.insert_notification(notification))
    }

    async fn exists_since(
        &self,
        kind: NotificationType,
        key: &DedupKey,
        since: DateTime<Utc>,
    ) -> ApplicationResult<bool> {
        Ok(self
            .state
            .read()
            .notifications
            .iter()
            .any(|record| record.suppresses(kind, key, since)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, min_stock: i64, active: bool) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Producto {}", id),
            min_stock,
            active,
        }
    }

    fn lot(id: i64, product_id: i64, quantity: i64, expires_on: Option<NaiveDate>) -> StockItem {
        StockItem {
            id: StockItemId::new(id),
            product_id: ProductId::new(product_id),
            warehouse_id: lms_pipeline_domain::WarehouseId::new(1),
            lot: None,
            quantity,
            expires_on,
        }
    }

    #[tokio::test]
    async fn test_product_stock_sums_over_warehouses() {
        let store = InMemoryStore::new();
        store.insert_product(product(1, 10, true));
        store.insert_product(product(2, 0, true));
        store.insert_product(product(3, 10, false));
        store.insert_stock_item(lot(1, 1, 4, None));
        store.insert_stock_item(lot(2, 1, 3, None));

        let stock = store.list_product_stock().await.unwrap();
        assert_eq!(stock.len(), 1);
        assert_eq!(stock[0].total_stock, 7);
    }

    #[tokio::test]
    async fn test_expiring_lots_window_and_quantity() {
        let store = InMemoryStore::new();
        let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let until = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        store.insert_product(product(1, 10, true));
        store.insert_stock_item(lot(1, 1, 5, NaiveDate::from_ymd_opt(2024, 3, 15)));
        store.insert_stock_item(lot(2, 1, 0, NaiveDate::from_ymd_opt(2024, 3, 15)));
        store.insert_stock_item(lot(3, 1, 5, NaiveDate::from_ymd_opt(2024, 4, 15)));

        let lots = store.list_lots_expiring_between(from, until).await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].item.id, StockItemId::new(1));
        assert_eq!(lots[0].product_name, "Producto 1");
    }

    #[tokio::test]
    async fn test_save_scoring_on_missing_answer_is_not_found() {
        let store = InMemoryStore::new();
        let answer = Answer {
            id: AnswerId::new(99),
            attempt_id: AttemptId::new(1),
            question_id: QuestionId::new(1),
            body: None,
            word_count: 0,
            points_awarded: 0.0,
            is_correct: None,
            confidence: None,
            patterns: vec![],
            recommendation: None,
            response_time_secs: None,
            selected_option: None,
        };

        let err = store.save_scoring(&answer).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
