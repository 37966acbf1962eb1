//! Test fixtures for the pipeline scenarios.
//!
//! Seeders write into an [`InMemoryStore`] and hand back the identifiers a
//! test needs to drive the scenario.

use chrono::{DateTime, NaiveDate, Utc};
use fake::{
    faker::{internet::en::FreeEmail, lorem::en::Word, name::en::Name},
    Fake,
};
use std::sync::Arc;

use lms_pipeline_common::FixedClock;
use lms_pipeline_domain::{user::User, AttemptId, EvaluationId, QuestionId, UserId};
use lms_pipeline_infrastructure::InMemoryStore;

use crate::builders::*;

/// Lorem text of exactly `words` words
pub fn essay_text(words: usize) -> String {
    (0..words)
        .map(|_| Word().fake::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 2026-03-02 07:00 UTC, a Monday morning
pub fn fixed_now() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .and_then(|d| d.and_hms_opt(7, 0, 0))
        .map(|naive| naive.and_utc())
        .expect("fixture timestamp is valid")
}

/// Clock frozen at [`fixed_now`]
pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(fixed_now()))
}

/// Date `days` after the fixed clock's day
pub fn days_from_today(days: i64) -> NaiveDate {
    fixed_now().date_naive() + chrono::Duration::days(days)
}

/// Create a test user with a random name and email and no roles
pub fn create_test_user() -> User {
    UserBuilder::new()
        .named(Name().fake::<String>())
        .with_email(FreeEmail().fake::<String>())
        .build()
}

/// Identifiers of a seeded graded attempt
#[derive(Debug, Clone, Copy)]
pub struct GradedAttempt {
    pub evaluation_id: EvaluationId,
    pub attempt_id: AttemptId,
    pub student_id: UserId,
    pub question_ids: [QuestionId; 3],
}

/// Evaluation worth 20 points with one attempt whose three answers carry
/// confidences `[0.8, none, 0.6]` and points `[10, 0, 5]`
pub fn seed_graded_attempt(store: &InMemoryStore) -> GradedAttempt {
    let evaluation = EvaluationBuilder::new()
        .with_id(1)
        .with_total_points(20.0)
        .with_questions(&[1, 2, 3])
        .build();
    let student = UserBuilder::new().with_id(100).named("Ana Torres").build();
    let attempt = AttemptBuilder::new()
        .with_id(1)
        .for_evaluation(1)
        .by_student(100)
        .build();

    for (id, points) in [(1, 10.0), (2, 5.0), (3, 5.0)] {
        store.insert_question(QuestionBuilder::new().with_id(id).with_points(points).build());
    }

    store.insert_answer(
        AnswerBuilder::new()
            .with_id(1)
            .for_attempt(1)
            .for_question(1)
            .with_confidence(0.8)
            .with_points(10.0)
            .correct()
            .build(),
    );
    store.insert_answer(
        AnswerBuilder::new()
            .with_id(2)
            .for_attempt(1)
            .for_question(2)
            .with_points(0.0)
            .build(),
    );
    store.insert_answer(
        AnswerBuilder::new()
            .with_id(3)
            .for_attempt(1)
            .for_question(3)
            .with_confidence(0.6)
            .with_points(5.0)
            .correct()
            .build(),
    );

    store.insert_evaluation(evaluation);
    store.insert_user(student);
    store.insert_attempt(attempt);

    GradedAttempt {
        evaluation_id: EvaluationId::new(1),
        attempt_id: AttemptId::new(1),
        student_id: UserId::new(100),
        question_ids: [QuestionId::new(1), QuestionId::new(2), QuestionId::new(3)],
    }
}

/// Questions 3, 7 and 9 used six times (eligible) and question 11 used five
/// times (not eligible), all with an estimated difficulty of 0.5
pub fn seed_recalibration_bank(store: &InMemoryStore) -> Vec<QuestionId> {
    for (id, usage) in [(3, 6), (7, 6), (9, 6), (11, 5)] {
        store.insert_question(
            QuestionBuilder::new()
                .with_id(id)
                .with_usage(usage)
                .with_estimated_difficulty(0.5)
                .build(),
        );
    }
    vec![QuestionId::new(3), QuestionId::new(7), QuestionId::new(9)]
}

/// One admin, one manager and one user without inventory roles
pub fn seed_inventory_staff(store: &InMemoryStore) -> Vec<UserId> {
    store.insert_user(
        UserBuilder::new()
            .with_id(1)
            .named("Admin")
            .with_email("root@empresa.test")
            .admin()
            .build(),
    );
    store.insert_user(
        UserBuilder::new()
            .with_id(2)
            .named("Gerente")
            .with_email("gerente@empresa.test")
            .with_role("gerente")
            .build(),
    );
    store.insert_user(
        UserBuilder::new()
            .with_id(3)
            .named("Cajero")
            .with_email("caja@empresa.test")
            .with_role("cajero")
            .build(),
    );
    vec![UserId::new(1), UserId::new(2)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_pipeline_domain::grading::count_words;

    #[test]
    fn test_essay_text_word_count() {
        assert_eq!(count_words(&essay_text(0)), 0);
        assert_eq!(count_words(&essay_text(500)), 500);
        assert_eq!(count_words(&essay_text(501)), 501);
    }

    #[test]
    fn test_create_test_user_has_no_roles() {
        let user = create_test_user();
        assert!(user.roles.is_empty());
        assert!(user.email.contains('@'));
    }

    #[test]
    fn test_seed_graded_attempt() {
        let store = InMemoryStore::new();
        let seeded = seed_graded_attempt(&store);
        assert!(store.attempt(seeded.attempt_id).is_some());
        assert!(store.question(seeded.question_ids[2]).is_some());
    }
}
