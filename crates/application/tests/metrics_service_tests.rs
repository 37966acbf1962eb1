//! Tests for attempt metric aggregation
//!
//! Exercises the aggregator against the in-memory store.

use std::sync::Arc;

use lms_pipeline_application::{ApplicationError, AttemptMetricsService};
use lms_pipeline_domain::AttemptId;
use lms_pipeline_infrastructure::InMemoryStore;
use lms_pipeline_testing::{builders::*, fixtures::*};
use proptest::prelude::*;

fn service(store: &Arc<InMemoryStore>) -> AttemptMetricsService {
    AttemptMetricsService::new(store.clone(), store.clone(), store.clone(), fixed_clock())
}

#[tokio::test]
async fn test_recalculate_end_to_end() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    let seeded = seed_graded_attempt(&store);
    let mut attempt = store.attempt(seeded.attempt_id).unwrap();

    // Act
    let metrics = service(&store).recalculate(&mut attempt).await.unwrap();

    // Assert
    assert_eq!(metrics.average_confidence, 0.7);
    assert_eq!(metrics.total_points, 15.0);
    assert_eq!(metrics.percentage, 75.0);

    let stored = store.attempt(seeded.attempt_id).unwrap();
    assert_eq!(stored.points_awarded, 15.0);
    assert_eq!(stored.percentage, 75.0);
    assert_eq!(stored.average_confidence, 0.7);
    assert_eq!(stored.last_analyzed_at, Some(fixed_now()));
}

#[tokio::test]
async fn test_recalculate_twice_stores_same_values() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    let seeded = seed_graded_attempt(&store);
    let service = service(&store);

    // Act
    let mut attempt = store.attempt(seeded.attempt_id).unwrap();
    service.recalculate(&mut attempt).await.unwrap();
    let first = store.attempt(seeded.attempt_id).unwrap();

    let mut attempt = store.attempt(seeded.attempt_id).unwrap();
    service.recalculate(&mut attempt).await.unwrap();
    let second = store.attempt(seeded.attempt_id).unwrap();

    // Assert
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_zero_total_possible_gives_zero_percentage() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    store.insert_evaluation(EvaluationBuilder::new().with_id(5).with_total_points(0.0).build());
    store.insert_attempt(AttemptBuilder::new().with_id(50).for_evaluation(5).build());
    store.insert_answer(AnswerBuilder::new().for_attempt(50).with_points(3.0).build());
    let mut attempt = store.attempt(AttemptId::new(50)).unwrap();

    // Act
    let metrics = service(&store).recalculate(&mut attempt).await.unwrap();

    // Assert
    assert_eq!(metrics.total_points, 3.0);
    assert_eq!(metrics.percentage, 0.0);
    assert_eq!(metrics.average_confidence, 0.5);
}

#[tokio::test]
async fn test_missing_evaluation_is_not_found() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    store.insert_attempt(AttemptBuilder::new().with_id(60).for_evaluation(404).build());
    let mut attempt = store.attempt(AttemptId::new(60)).unwrap();

    // Act
    let result = service(&store).recalculate(&mut attempt).await;

    // Assert
    assert!(matches!(result, Err(ApplicationError::NotFound { entity: "evaluation", .. })));
}

#[tokio::test]
async fn test_recalculate_quietly_swallows_errors() {
    // Arrange
    let store = Arc::new(InMemoryStore::new());
    store.insert_attempt(AttemptBuilder::new().with_id(61).for_evaluation(404).build());
    let mut attempt = store.attempt(AttemptId::new(61)).unwrap();

    // Act
    let metrics = service(&store).recalculate_quietly(&mut attempt).await;

    // Assert
    assert!(metrics.is_none());
    assert_eq!(store.attempt(AttemptId::new(61)).unwrap().last_analyzed_at, None);
}

proptest! {
    #[test]
    fn prop_recalculation_is_idempotent(
        answers in prop::collection::vec((0.0f64..10.0, prop::option::of(0.0f64..=1.0)), 0..12),
        total in 0.0f64..100.0,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let store = Arc::new(InMemoryStore::new());
        store.insert_evaluation(EvaluationBuilder::new().with_id(7).with_total_points(total).build());
        store.insert_attempt(AttemptBuilder::new().with_id(70).for_evaluation(7).build());
        for (points, confidence) in &answers {
            let builder = AnswerBuilder::new().for_attempt(70).with_points(*points);
            let builder = match confidence {
                Some(c) => builder.with_confidence(*c),
                None => builder,
            };
            store.insert_answer(builder.build());
        }
        let service = service(&store);

        let (first, second) = runtime.block_on(async {
            let mut attempt = store.attempt(AttemptId::new(70)).unwrap();
            service.recalculate(&mut attempt).await.unwrap();
            let first = store.attempt(AttemptId::new(70)).unwrap();
            let mut attempt = store.attempt(AttemptId::new(70)).unwrap();
            service.recalculate(&mut attempt).await.unwrap();
            (first, store.attempt(AttemptId::new(70)).unwrap())
        });

        prop_assert_eq!(first, second);
    }
}
