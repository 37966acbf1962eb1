//! Tests for question analytics and difficulty recalibration

use std::sync::Arc;

use lms_pipeline_application::{
    ports::{QuestionAnalyticsRepositoryPort, QuestionRepositoryPort},
    ApplicationError, CommonError, QuestionAnalyticsService,
};
use lms_pipeline_domain::{
    question::{ImprovementSuggestion, QuestionAnalytics},
    EvaluationId, QuestionId, UserId,
};
use lms_pipeline_infrastructure::InMemoryStore;
use lms_pipeline_testing::{builders::*, fixtures::*};

fn service(store: &Arc<InMemoryStore>) -> QuestionAnalyticsService {
    QuestionAnalyticsService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        fixed_clock(),
    )
}

/// Evaluation 10 with questions 1, 2 and 3. Four students; the first two
/// scored high (80, 90) and answered question 1 correctly, the last two
/// scored low (40, 30) and chose the wrong option "b". Only student 1 answered
/// question 2; nobody answered question 3.
fn seed_evaluation(store: &InMemoryStore) {
    store.insert_evaluation(
        EvaluationBuilder::new()
            .with_id(10)
            .with_total_points(10.0)
            .with_questions(&[1, 2, 3])
            .build(),
    );
    for id in 1..=3 {
        store.insert_question(QuestionBuilder::new().with_id(id).build());
    }

    let students = [(1, 80.0, true), (2, 90.0, true), (3, 40.0, false), (4, 30.0, false)];
    for (student, percentage, correct) in students {
        store.insert_user(UserBuilder::new().with_id(student).build());
        store.insert_attempt(
            AttemptBuilder::new()
                .with_id(100 + student)
                .for_evaluation(10)
                .by_student(student)
                .with_percentage(percentage)
                .build(),
        );
        let answer = AnswerBuilder::new()
            .for_attempt(100 + student)
            .for_question(1)
            .with_response_time(10.0 * student as f64);
        let answer = if correct {
            answer.correct().selecting("a")
        } else {
            answer.incorrect().selecting("b")
        };
        store.insert_answer(answer.build());
    }

    store.insert_answer(
        AnswerBuilder::new()
            .for_attempt(101)
            .for_question(2)
            .correct()
            .build(),
    );

    store.assign_cluster(UserId::new(1), 0);
    store.assign_cluster(UserId::new(2), 1);
    store.assign_cluster(UserId::new(3), 1);
}

#[tokio::test]
async fn test_update_analytics_computes_rows() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    seed_evaluation(&store);

    // Act
    let summary = service(&store)
        .update_analytics(EvaluationId::new(10))
        .await
        .unwrap();

    // Assert
    assert_eq!(summary.questions_updated, 2);
    assert_eq!(summary.answers_considered, 5);

    let row = store
        .analytics(QuestionId::new(1), EvaluationId::new(10))
        .unwrap();
    assert_eq!(row.times_answered, 4);
    assert_eq!(row.times_correct, 2);
    assert_eq!(row.times_incorrect, 2);
    assert_eq!(row.hit_rate, 50.0);
    assert_eq!(row.discrimination_index, Some(1.0));
    assert_eq!(row.avg_response_time_secs, Some(25.0));
    assert_eq!(row.response_distribution.get("a"), Some(&50.0));
    assert_eq!(row.response_distribution.get("b"), Some(&50.0));
    assert_eq!(row.cluster_performance.get("cluster_0"), Some(&100.0));
    assert_eq!(row.cluster_performance.get("cluster_1"), Some(&50.0));
    assert_eq!(row.updated_at, fixed_now());

    // Only high scorers answered question 2
    let row = store
        .analytics(QuestionId::new(2), EvaluationId::new(10))
        .unwrap();
    assert_eq!(row.discrimination_index, None);
    assert_eq!(row.avg_response_time_secs, None);

    assert!(store
        .analytics(QuestionId::new(3), EvaluationId::new(10))
        .is_none());
}

#[tokio::test]
async fn test_update_analytics_is_an_upsert() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    seed_evaluation(&store);
    let service = service(&store);

    // Act
    service.update_analytics(EvaluationId::new(10)).await.unwrap();
    service.update_analytics(EvaluationId::new(10)).await.unwrap();

    // Assert
    let rows = QuestionAnalyticsRepositoryPort::list_by_question(&*store, QuestionId::new(1))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_update_analytics_unknown_evaluation() {
    let store = Arc::new(InMemoryStore::new());

    let result = service(&store).update_analytics(EvaluationId::new(99)).await;

    assert!(matches!(result, Err(ApplicationError::NotFound { .. })));
}

#[tokio::test]
async fn test_recalibrate_without_analytics_keeps_estimate() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    let question = QuestionBuilder::new()
        .with_id(5)
        .with_usage(8)
        .with_estimated_difficulty(0.35)
        .build();
    store.insert_question(question.clone());

    // Act
    let difficulty = service(&store).recalibrate_difficulty(&question).await.unwrap();

    // Assert
    assert_eq!(difficulty, 0.35);
    assert_eq!(store.question(QuestionId::new(5)).unwrap().empirical_difficulty, None);
}

#[tokio::test]
async fn test_recalibrate_aggregates_across_evaluations() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    let question = QuestionBuilder::new().with_id(5).with_usage(8).build();
    store.insert_question(question.clone());
    for (evaluation, answered, correct) in [(1, 6, 3), (2, 4, 1)] {
        store.insert_analytics(QuestionAnalytics {
            question_id: QuestionId::new(5),
            evaluation_id: EvaluationId::new(evaluation),
            times_answered: answered,
            times_correct: correct,
            times_incorrect: answered - correct,
            hit_rate: 0.0,
            discrimination_index: None,
            avg_response_time_secs: None,
            response_distribution: Default::default(),
            cluster_performance: Default::default(),
            updated_at: fixed_now(),
        });
    }

    // Act
    let difficulty = service(&store).recalibrate_difficulty(&question).await.unwrap();

    // Assert: 4 correct out of 10
    assert_eq!(difficulty, 0.6);
    let stored = QuestionRepositoryPort::get_by_id(&*store, QuestionId::new(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.empirical_difficulty, Some(0.6));
    assert_eq!(stored.estimated_difficulty, 0.5);
}

#[tokio::test]
async fn test_common_errors_most_frequent_first() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    for option in ["c", "b", "b", "b", "d", "c"] {
        store.insert_answer(
            AnswerBuilder::new()
                .for_question(8)
                .incorrect()
                .selecting(option)
                .build(),
        );
    }
    store.insert_answer(AnswerBuilder::new().for_question(8).correct().selecting("a").build());

    // Act
    let errors = service(&store).common_errors(QuestionId::new(8)).await.unwrap();

    // Assert
    assert_eq!(
        errors,
        vec![
            CommonError { option: "b".into(), frequency: 3 },
            CommonError { option: "c".into(), frequency: 2 },
            CommonError { option: "d".into(), frequency: 1 },
        ]
    );
}

#[tokio::test]
async fn test_suggest_improvements_flags_hard_biased_question() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    let mut clusters = std::collections::BTreeMap::new();
    clusters.insert("cluster_0".to_string(), 0.0);
    clusters.insert("cluster_1".to_string(), 60.0);
    store.insert_analytics(QuestionAnalytics {
        question_id: QuestionId::new(9),
        evaluation_id: EvaluationId::new(1),
        times_answered: 10,
        times_correct: 1,
        times_incorrect: 9,
        hit_rate: 10.0,
        discrimination_index: Some(0.1),
        avg_response_time_secs: None,
        response_distribution: Default::default(),
        cluster_performance: clusters,
        updated_at: fixed_now(),
    });
    for _ in 0..3 {
        store.insert_answer(
            AnswerBuilder::new()
                .for_question(9)
                .incorrect()
                .selecting("d")
                .build(),
        );
    }

    // Act
    let suggestions = service(&store)
        .suggest_improvements(QuestionId::new(9))
        .await
        .unwrap();

    // Assert
    assert_eq!(
        suggestions,
        vec![
            ImprovementSuggestion::LowDiscrimination { index: 0.1 },
            ImprovementSuggestion::TooHard { hit_rate: 10.0 },
            ImprovementSuggestion::CommonError { option: "d".into(), frequency: 3 },
            ImprovementSuggestion::ClusterBias { spread: 30.0 },
        ]
    );
}

#[tokio::test]
async fn test_suggest_improvements_without_analytics() {
    let store = Arc::new(InMemoryStore::new());

    let suggestions = service(&store)
        .suggest_improvements(QuestionId::new(1))
        .await
        .unwrap();

    assert!(suggestions.is_empty());
}
