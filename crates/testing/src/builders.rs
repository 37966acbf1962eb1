//! Fluent builder pattern for constructing test data.
//!
//! Every builder starts from values that are valid but uninteresting, so a
//! test only spells out the fields its scenario is about.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

use lms_pipeline_domain::{
    grading::{Answer, Attempt, Evaluation},
    inventory::{Product, StockItem},
    question::Question,
    user::User,
    AnswerId, AttemptId, CourseId, EvaluationId, ProductId, QuestionId, StockItemId, UserId,
    WarehouseId,
};

use crate::fixtures::essay_text;

static NEXT_ID: AtomicI64 = AtomicI64::new(10_000);

/// Fresh identifier value for builders whose id a test does not care about
pub fn next_id() -> i64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Builder for creating Answer test instances
#[derive(Clone)]
pub struct AnswerBuilder {
    answer: Answer,
}

impl AnswerBuilder {
    pub fn new() -> Self {
        Self {
            answer: Answer {
                id: AnswerId::new(next_id()),
                attempt_id: AttemptId::new(1),
                question_id: QuestionId::new(1),
                body: None,
                word_count: 0,
                points_awarded: 0.0,
                is_correct: None,
                confidence: None,
                patterns: Vec::new(),
                recommendation: None,
                response_time_secs: None,
                selected_option: None,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.answer.id = AnswerId::new(id);
        self
    }

    pub fn for_attempt(mut self, attempt_id: i64) -> Self {
        self.answer.attempt_id = AttemptId::new(attempt_id);
        self
    }

    pub fn for_question(mut self, question_id: i64) -> Self {
        self.answer.question_id = QuestionId::new(question_id);
        self
    }

    /// Body text; the stored word count is left stale on purpose
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.answer.body = Some(body.into());
        self
    }

    /// Body of exactly `words` words
    pub fn with_words(self, words: usize) -> Self {
        self.with_body(essay_text(words))
    }

    pub fn with_points(mut self, points: f64) -> Self {
        self.answer.points_awarded = points;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.answer.confidence = Some(confidence);
        self
    }

    pub fn correct(mut self) -> Self {
        self.answer.is_correct = Some(true);
        self
    }

    pub fn incorrect(mut self) -> Self {
        self.answer.is_correct = Some(false);
        self
    }

    pub fn selecting(mut self, option: impl Into<String>) -> Self {
        self.answer.selected_option = Some(option.into());
        self
    }

    pub fn with_response_time(mut self, seconds: f64) -> Self {
        self.answer.response_time_secs = Some(seconds);
        self
    }

    pub fn build(self) -> Answer {
        self.answer
    }
}

impl Default for AnswerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating Attempt test instances
#[derive(Clone)]
pub struct AttemptBuilder {
    attempt: Attempt,
}

impl AttemptBuilder {
    pub fn new() -> Self {
        Self {
            attempt: Attempt {
                id: AttemptId::new(next_id()),
                evaluation_id: EvaluationId::new(1),
                student_id: UserId::new(1),
                points_awarded: 0.0,
                percentage: 0.0,
                average_confidence: 0.5,
                last_analyzed_at: None,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.attempt.id = AttemptId::new(id);
        self
    }

    pub fn for_evaluation(mut self, evaluation_id: i64) -> Self {
        self.attempt.evaluation_id = EvaluationId::new(evaluation_id);
        self
    }

    pub fn by_student(mut self, student_id: i64) -> Self {
        self.attempt.student_id = UserId::new(student_id);
        self
    }

    /// Stored percentage; drives the high/low split of the discrimination index
    pub fn with_percentage(mut self, percentage: f64) -> Self {
        self.attempt.percentage = percentage;
        self
    }

    pub fn analyzed_at(mut self, at: DateTime<Utc>) -> Self {
        self.attempt.last_analyzed_at = Some(at);
        self
    }

    pub fn build(self) -> Attempt {
        self.attempt
    }
}

impl Default for AttemptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating Evaluation test instances
#[derive(Clone)]
pub struct EvaluationBuilder {
    evaluation: Evaluation,
}

impl EvaluationBuilder {
    pub fn new() -> Self {
        Self {
            evaluation: Evaluation {
                id: EvaluationId::new(next_id()),
                course_id: CourseId::new(1),
                title: "Parcial 1".to_string(),
                total_possible_points: 0.0,
                question_ids: Vec::new(),
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.evaluation.id = EvaluationId::new(id);
        self
    }

    pub fn for_course(mut self, course_id: i64) -> Self {
        self.evaluation.course_id = CourseId::new(course_id);
        self
    }

    pub fn with_total_points(mut self, total: f64) -> Self {
        self.evaluation.total_possible_points = total;
        self
    }

    pub fn with_questions(mut self, question_ids: &[i64]) -> Self {
        self.evaluation.question_ids = question_ids.iter().copied().map(QuestionId::new).collect();
        self
    }

    pub fn build(self) -> Evaluation {
        self.evaluation
    }
}

impl Default for EvaluationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating Question test instances
#[derive(Clone)]
pub struct QuestionBuilder {
    question: Question,
}

impl QuestionBuilder {
    pub fn new() -> Self {
        Self {
            question: Question {
                id: QuestionId::new(next_id()),
                course_id: CourseId::new(1),
                statement: "Explique el concepto de encapsulamiento.".to_string(),
                correct_option: Some("a".to_string()),
                points: 1.0,
                estimated_difficulty: 0.5,
                empirical_difficulty: None,
                usage_count: 0,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.question.id = QuestionId::new(id);
        self
    }

    pub fn for_course(mut self, course_id: i64) -> Self {
        self.question.course_id = CourseId::new(course_id);
        self
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.question.statement = statement.into();
        self
    }

    pub fn with_correct_option(mut self, option: impl Into<String>) -> Self {
        self.question.correct_option = Some(option.into());
        self
    }

    pub fn with_points(mut self, points: f64) -> Self {
        self.question.points = points;
        self
    }

    pub fn with_estimated_difficulty(mut self, difficulty: f64) -> Self {
        self.question.estimated_difficulty = difficulty;
        self
    }

    pub fn with_usage(mut self, usage_count: u32) -> Self {
        self.question.usage_count = usage_count;
        self
    }

    pub fn build(self) -> Question {
        self.question
    }
}

impl Default for QuestionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating Product test instances
#[derive(Clone)]
pub struct ProductBuilder {
    product: Product,
}

impl ProductBuilder {
    pub fn new() -> Self {
        Self {
            product: Product {
                id: ProductId::new(next_id()),
                name: "Guantes de nitrilo".to_string(),
                min_stock: 0,
                active: true,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.product.id = ProductId::new(id);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.product.name = name.into();
        self
    }

    pub fn with_min_stock(mut self, min_stock: i64) -> Self {
        self.product.min_stock = min_stock;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.product.active = false;
        self
    }

    pub fn build(self) -> Product {
        self.product
    }
}

impl Default for ProductBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating StockItem test instances
#[derive(Clone)]
pub struct StockItemBuilder {
    item: StockItem,
}

impl StockItemBuilder {
    pub fn new() -> Self {
        Self {
            item: StockItem {
                id: StockItemId::new(next_id()),
                product_id: ProductId::new(1),
                warehouse_id: WarehouseId::new(1),
                lot: None,
                quantity: 0,
                expires_on: None,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.item.id = StockItemId::new(id);
        self
    }

    pub fn of_product(mut self, product_id: i64) -> Self {
        self.item.product_id = ProductId::new(product_id);
        self
    }

    pub fn in_warehouse(mut self, warehouse_id: i64) -> Self {
        self.item.warehouse_id = WarehouseId::new(warehouse_id);
        self
    }

    pub fn with_lot(mut self, lot: impl Into<String>) -> Self {
        self.item.lot = Some(lot.into());
        self
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.item.quantity = quantity;
        self
    }

    pub fn expiring_on(mut self, date: NaiveDate) -> Self {
        self.item.expires_on = Some(date);
        self
    }

    pub fn build(self) -> StockItem {
        self.item
    }
}

impl Default for StockItemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating User test instances
#[derive(Clone)]
pub struct UserBuilder {
    user: User,
}

impl UserBuilder {
    pub fn new() -> Self {
        let id = next_id();
        Self {
            user: User {
                id: UserId::new(id),
                name: "Test User".to_string(),
                email: format!("user{}@example.com", id),
                roles: Vec::new(),
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.user.id = UserId::new(id);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.user.name = name.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.user.email = email.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.user.roles.push(role.into());
        self
    }

    pub fn admin(self) -> Self {
        self.with_role("admin")
    }

    pub fn build(self) -> User {
        self.user
    }
}

impl Default for UserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_builder_words() {
        let answer = AnswerBuilder::new().with_words(12).build();
        assert_eq!(answer.current_word_count(), 12);
        assert_eq!(answer.word_count, 0);
    }

    #[test]
    fn test_user_builder_roles() {
        let user = UserBuilder::new().admin().with_role("gerente").build();
        assert!(user.has_any_role(&["gerente"]));
        assert!(!user.has_any_role(&["cliente"]));
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = QuestionBuilder::new().build();
        let b = QuestionBuilder::new().build();
        assert_ne!(a.id, b.id);
    }
}
