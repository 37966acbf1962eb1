//! HTTP gateway tests against a mock server.

use lms_pipeline_application::{
    ports::{PredictionPipeline, ScoringGateway, ScoringRequest},
    ApplicationError,
};
use lms_pipeline_common::ServicesConfig;
use lms_pipeline_domain::{grading::ScoringMode, EvaluationId, UserId};
use lms_pipeline_infrastructure::{HttpPredictionPipeline, HttpScoringGateway};
use lms_pipeline_testing::{AnswerBuilder, QuestionBuilder};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn services(server: &MockServer) -> ServicesConfig {
    ServicesConfig {
        scoring_url: server.uri(),
        prediction_url: server.uri(),
        request_timeout_seconds: 2,
    }
}

#[tokio::test]
async fn test_scoring_posts_agent_payload_and_derives_result() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/analysis/student-solution"))
        .and(body_partial_json(json!({
            "task_id": 4,
            "student_id": 100,
            "task_type": "evaluacion",
            "language": "text",
            "question_context": "Explique la herencia."
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "feedback": {
                    "conceptos_correctos": ["herencia"],
                    "errores_encontrados": ["confunde clase y objeto"],
                    "calidad_codigo": 0.8,
                    "nivel_bloom": "understand"
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpScoringGateway::new(&services(&server)).unwrap();
    let answer = AnswerBuilder::new().with_words(520).build();
    let question = QuestionBuilder::new()
        .with_statement("Explique la herencia.")
        .with_points(5.0)
        .build();

    let result = gateway
        .score(ScoringRequest {
            answer: &answer,
            question: &question,
            student_id: Some(UserId::new(100)),
            evaluation_id: Some(EvaluationId::new(4)),
            mode: ScoringMode::Synchronous,
        })
        .await
        .unwrap();

    assert!(result.is_correct);
    assert_eq!(result.confidence, 0.8);
    assert_eq!(result.suggested_points, 4.0);
    assert_eq!(
        result.recommendation.as_deref(),
        Some("Revisar los siguientes puntos: confunde clase y objeto.")
    );
    assert!(result.patterns.contains(&"concepto:herencia".to_string()));
}

#[tokio::test]
async fn test_scoring_without_data_is_integration_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/analysis/student-solution"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;

    let gateway = HttpScoringGateway::new(&services(&server)).unwrap();
    let answer = AnswerBuilder::new().with_words(600).build();
    let question = QuestionBuilder::new().build();

    let err = gateway
        .score(ScoringRequest {
            answer: &answer,
            question: &question,
            student_id: None,
            evaluation_id: None,
            mode: ScoringMode::Synchronous,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ApplicationError::Integration { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_scoring_server_error_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let gateway = HttpScoringGateway::new(&services(&server)).unwrap();
    let answer = AnswerBuilder::new().with_words(600).build();
    let question = QuestionBuilder::new().build();

    let err = gateway
        .score(ScoringRequest {
            answer: &answer,
            question: &question,
            student_id: None,
            evaluation_id: None,
            mode: ScoringMode::Synchronous,
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("503"));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_scoring_timeout_maps_to_timeout_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_secs(3))
                .set_body_json(json!({ "data": {} })),
        )
        .mount(&server)
        .await;

    let mut config = services(&server);
    config.request_timeout_seconds = 1;
    let gateway = HttpScoringGateway::new(&config).unwrap();
    let answer = AnswerBuilder::new().with_words(600).build();
    let question = QuestionBuilder::new().build();

    let err = gateway
        .score(ScoringRequest {
            answer: &answer,
            question: &question,
            student_id: None,
            evaluation_id: None,
            mode: ScoringMode::Synchronous,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ApplicationError::Timeout { after_ms: 1000, .. }));
}

#[tokio::test]
async fn test_prediction_returns_opaque_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/predictions/students/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "riesgo": "bajo",
            "probabilidad_aprobar": 0.91
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = HttpPredictionPipeline::new(&services(&server)).unwrap();
    let value = pipeline.run_for_student(UserId::new(42)).await.unwrap();

    assert_eq!(value["riesgo"], "bajo");
}

#[tokio::test]
async fn test_prediction_client_error_propagates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "message": "sin datos" })))
        .mount(&server)
        .await;

    let pipeline = HttpPredictionPipeline::new(&services(&server)).unwrap();
    let err = pipeline.run_for_student(UserId::new(42)).await.unwrap_err();

    assert_eq!(err.error_code(), "INTEGRATION_FAILED");
}
