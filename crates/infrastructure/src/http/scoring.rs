//! Scoring agent client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

use lms_pipeline_application::{
    ports::{ScoringGateway, ScoringRequest},
    ApplicationError, ApplicationResult,
};
use lms_pipeline_common::ServicesConfig;
use lms_pipeline_domain::{grading::ScoringResult, round_to};

use super::{build_client, endpoint, post_json};
use crate::Result;

const SERVICE: &str = "scoring-agent";
const ANALYSIS_PATH: &str = "/api/analysis/student-solution";

/// Quality at or above which an answer counts as correct
pub const CORRECT_QUALITY_THRESHOLD: f64 = 0.7;

/// Quality assumed when the agent omits it
const DEFAULT_QUALITY: f64 = 0.5;

const DEFAULT_BLOOM_LEVEL: &str = "apply";

const GENERIC_RUBRIC: &str = "Evalúa la respuesta según:
- Precisión conceptual
- Completitud de la respuesta
- Claridad de explicación
- Relevancia al tema";

#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    task_id: Option<i64>,
    student_id: Option<i64>,
    solution_code: &'a str,
    task_type: &'static str,
    language: &'static str,
    question_context: &'a str,
    rubric: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisData {
    #[serde(default)]
    feedback: Feedback,
}

#[derive(Debug, Default, Deserialize)]
struct Feedback {
    #[serde(default)]
    conceptos_correctos: Vec<String>,
    #[serde(default)]
    errores_encontrados: Vec<String>,
    #[serde(default)]
    calidad_codigo: Option<f64>,
    #[serde(default)]
    nivel_bloom: Option<String>,
}

/// [`ScoringGateway`] backed by the LLM analysis agent
pub struct HttpScoringGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpScoringGateway {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_seconds);
        Ok(Self {
            client: build_client(timeout)?,
            base_url: config.scoring_url.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl ScoringGateway for HttpScoringGateway {
    #[instrument(skip(self, request), fields(answer_id = %request.answer.id, mode = ?request.mode))]
    async fn score(&self, request: ScoringRequest<'_>) -> ApplicationResult<ScoringResult> {
        let payload = AnalysisRequest {
            task_id: request.evaluation_id.map(|id| id.value()),
            student_id: request.student_id.map(|id| id.value()),
            solution_code: request.answer.body.as_deref().unwrap_or_default(),
            task_type: "evaluacion",
            language: "text",
            question_context: &request.question.statement,
            rubric: GENERIC_RUBRIC,
        };

        let url = endpoint(&self.base_url, ANALYSIS_PATH);
        let body = post_json(&self.client, SERVICE, self.timeout, &url, &payload).await?;

        let data = match body.get("data") {
            Some(data) if !data.is_null() => data.clone(),
            _ => return Err(ApplicationError::integration(SERVICE, "response without 'data'")),
        };

        let data: AnalysisData = serde_json::from_value(data)
            .map_err(|e| ApplicationError::integration(SERVICE, format!("malformed 'data': {}", e)))?;

        let result = interpret_feedback(data.feedback, request.question.points);
        info!(
            confidence = result.confidence,
            is_correct = result.is_correct,
            suggested_points = result.suggested_points,
            "Answer scored"
        );
        Ok(result)
    }
}

fn interpret_feedback(feedback: Feedback, max_points: f64) -> ScoringResult {
    let quality = feedback.calidad_codigo.unwrap_or(DEFAULT_QUALITY);
    let bloom = feedback.nivel_bloom.as_deref().unwrap_or(DEFAULT_BLOOM_LEVEL);

    let recommendation = if feedback.errores_encontrados.is_empty() {
        "Excelente respuesta con todos los conceptos clave identificados.".to_string()
    } else {
        let first: Vec<&str> = feedback
            .errores_encontrados
            .iter()
            .take(2)
            .map(String::as_str)
            .collect();
        format!("Revisar los siguientes puntos: {}.", first.join(", "))
    };

    let mut patterns: Vec<String> = feedback
        .conceptos_correctos
        .iter()
        .map(|c| format!("concepto:{}", c))
        .collect();
    patterns.extend(feedback.errores_encontrados.iter().map(|e| format!("error:{}", e)));
    patterns.push(format!("bloom:{}", bloom));

    ScoringResult {
        patterns,
        recommendation: Some(recommendation),
        confidence: round_to(quality, 2),
        is_correct: quality >= CORRECT_QUALITY_THRESHOLD,
        suggested_points: round_to(max_points * quality, 2),
    }
    .clamped(max_points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_feedback_uses_defaults() {
        let result = interpret_feedback(Feedback::default(), 10.0);
        assert_eq!(result.confidence, 0.5);
        assert!(!result.is_correct);
        assert_eq!(result.suggested_points, 5.0);
        assert_eq!(result.patterns, vec!["bloom:apply".to_string()]);
        assert_eq!(
            result.recommendation.as_deref(),
            Some("Excelente respuesta con todos los conceptos clave identificados.")
        );
    }

    #[test]
    fn test_recommendation_lists_first_two_errors() {
        let feedback = Feedback {
            conceptos_correctos: vec!["herencia".into()],
            errores_encontrados: vec!["a".into(), "b".into(), "c".into()],
            calidad_codigo: Some(0.734),
            nivel_bloom: Some("analyze".into()),
        };

        let result = interpret_feedback(feedback, 4.0);
        assert_eq!(result.recommendation.as_deref(), Some("Revisar los siguientes puntos: a, b."));
        assert_eq!(result.confidence, 0.73);
        assert!(result.is_correct);
        assert_eq!(result.suggested_points, 2.94);
        assert_eq!(
            result.patterns,
            vec!["concepto:herencia", "error:a", "error:b", "error:c", "bloom:analyze"]
        );
    }

    #[test]
    fn test_points_clamped_to_question_maximum() {
        let feedback = Feedback {
            calidad_codigo: Some(1.4),
            ..Feedback::default()
        };

        let result = interpret_feedback(feedback, 3.0);
        assert_eq!(result.suggested_points, 3.0);
        assert_eq!(result.confidence, 1.0);
    }
}
