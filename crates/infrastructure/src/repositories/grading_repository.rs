//! Answers, attempts and evaluations.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{debug, instrument};

use lms_pipeline_application::{
    ports::{AnswerRepositoryPort, AttemptRepositoryPort, EvaluationAnswer, EvaluationRepositoryPort},
    ApplicationResult,
};
use lms_pipeline_domain::{
    grading::{Answer, Attempt, Evaluation},
    AnswerId, AttemptId, EvaluationId, QuestionId, UserId,
};

use crate::{Error, Result};

const ANSWER_COLUMNS: &str = r#"
    r.id, r.intento_evaluacion_id, r.pregunta_id, r.respuesta_texto,
    COALESCE(r.numero_palabras, 0)::BIGINT AS numero_palabras,
    COALESCE(r.puntos_obtenidos, 0)::FLOAT8 AS puntos_obtenidos,
    r.es_correcta,
    r.confianza_respuesta::FLOAT8 AS confianza_respuesta,
    COALESCE(r.patrones, '[]'::jsonb) AS patrones,
    r.recomendacion,
    r.tiempo_respuesta::FLOAT8 AS tiempo_respuesta,
    r.respuesta_datos->>'opcion_seleccionada' AS opcion_seleccionada
"#;

/// PostgreSQL repository for `respuestas_evaluacion`, `intentos_evaluacion`
/// and `evaluaciones`.
pub struct PgGradingRepository {
    pool: PgPool,
}

impl PgGradingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_answer(row: &PgRow) -> Result<Answer> {
    let patterns: serde_json::Value = row.try_get("patrones")?;
    let word_count: i64 = row.try_get("numero_palabras")?;

    Ok(Answer {
        id: AnswerId::new(row.try_get("id")?),
        attempt_id: AttemptId::new(row.try_get("intento_evaluacion_id")?),
        question_id: QuestionId::new(row.try_get("pregunta_id")?),
        body: row.try_get("respuesta_texto")?,
        word_count: word_count.max(0) as usize,
        points_awarded: row.try_get("puntos_obtenidos")?,
        is_correct: row.try_get("es_correcta")?,
        confidence: row.try_get("confianza_respuesta")?,
        patterns: serde_json::from_value(patterns).map_err(Error::Serialization)?,
        recommendation: row.try_get("recomendacion")?,
        response_time_secs: row.try_get("tiempo_respuesta")?,
        selected_option: row.try_get("opcion_seleccionada")?,
    })
}

fn row_to_attempt(row: &PgRow) -> Result<Attempt> {
    Ok(Attempt {
        id: AttemptId::new(row.try_get("id")?),
        evaluation_id: EvaluationId::new(row.try_get("evaluacion_id")?),
        student_id: UserId::new(row.try_get("estudiante_id")?),
        points_awarded: row.try_get("puntaje_obtenido")?,
        percentage: row.try_get("porcentaje_acierto")?,
        average_confidence: row.try_get("nivel_confianza_respuestas")?,
        last_analyzed_at: row.try_get("ultimo_analisis_ml")?,
    })
}

#[async_trait]
impl AnswerRepositoryPort for PgGradingRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: AnswerId) -> ApplicationResult<Option<Answer>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM respuestas_evaluacion r WHERE r.id = $1",
            ANSWER_COLUMNS
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(row_to_answer).transpose()?)
    }

    #[instrument(skip(self))]
    async fn list_by_attempt(&self, attempt_id: AttemptId) -> ApplicationResult<Vec<Answer>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM respuestas_evaluacion r WHERE r.intento_evaluacion_id = $1 ORDER BY r.id",
            ANSWER_COLUMNS
        ))
        .bind(attempt_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(row_to_answer).collect::<Result<Vec<_>>>()?)
    }

    #[instrument(skip(self))]
    async fn list_by_evaluation(
        &self,
        evaluation_id: EvaluationId,
    ) -> ApplicationResult<Vec<EvaluationAnswer>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {},
                i.estudiante_id,
                COALESCE(i.porcentaje_acierto, 0)::FLOAT8 AS porcentaje_intento
            FROM respuestas_evaluacion r
            JOIN intentos_evaluacion i ON i.id = r.intento_evaluacion_id
            WHERE i.evaluacion_id = $1
            ORDER BY r.id
            "#,
            ANSWER_COLUMNS
        ))
        .bind(evaluation_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let answers = rows
            .iter()
            .map(|row| {
                Ok(EvaluationAnswer {
                    answer: row_to_answer(row)?,
                    student_id: UserId::new(row.try_get("estudiante_id")?),
                    attempt_percentage: row.try_get("porcentaje_intento")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(answers)
    }

    #[instrument(skip(self))]
    async fn list_by_question(&self, question_id: QuestionId) -> ApplicationResult<Vec<Answer>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM respuestas_evaluacion r WHERE r.pregunta_id = $1 ORDER BY r.id",
            ANSWER_COLUMNS
        ))
        .bind(question_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(row_to_answer).collect::<Result<Vec<_>>>()?)
    }

    #[instrument(skip(self, answer), fields(answer_id = %answer.id))]
    async fn save_scoring(&self, answer: &Answer) -> ApplicationResult<()> {
        sqlx::query(
            r#"
            UPDATE respuestas_evaluacion
            SET numero_palabras = $2,
                patrones = $3,
                recomendacion = $4,
                confianza_respuesta = $5,
                es_correcta = $6,
                puntos_obtenidos = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(answer.id.value())
        .bind(answer.word_count as i64)
        .bind(serde_json::to_value(&answer.patterns).map_err(Error::Serialization)?)
        .bind(&answer.recommendation)
        .bind(answer.confidence)
        .bind(answer.is_correct)
        .bind(answer.points_awarded)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!("Answer scoring saved");
        Ok(())
    }
}

#[async_trait]
impl AttemptRepositoryPort for PgGradingRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: AttemptId) -> ApplicationResult<Option<Attempt>> {
        let row = sqlx::query(
            r#"
            SELECT
                id, evaluacion_id, estudiante_id,
                COALESCE(puntaje_obtenido, 0)::FLOAT8 AS puntaje_obtenido,
                COALESCE(porcentaje_acierto, 0)::FLOAT8 AS porcentaje_acierto,
                COALESCE(nivel_confianza_respuestas, 0.5)::FLOAT8 AS nivel_confianza_respuestas,
                ultimo_analisis_ml
            FROM intentos_evaluacion
            WHERE id = $1
            "#,
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(row_to_attempt).transpose()?)
    }

    #[instrument(skip(self, attempt), fields(attempt_id = %attempt.id))]
    async fn save_metrics(&self, attempt: &Attempt) -> ApplicationResult<()> {
        sqlx::query(
            r#"
            UPDATE intentos_evaluacion
            SET puntaje_obtenido = $2,
                porcentaje_acierto = $3,
                nivel_confianza_respuestas = $4,
                ultimo_analisis_ml = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(attempt.id.value())
        .bind(attempt.points_awarded)
        .bind(attempt.percentage)
        .bind(attempt.average_confidence)
        .bind(attempt.last_analyzed_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }
}

#[async_trait]
impl EvaluationRepositoryPort for PgGradingRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: EvaluationId) -> ApplicationResult<Option<Evaluation>> {
        let row = sqlx::query(
            r#"
            SELECT
                e.id, e.curso_id, e.titulo,
                COALESCE(e.puntaje_total, 0)::FLOAT8 AS puntaje_total,
                COALESCE(
                    ARRAY_AGG(ep.pregunta_id ORDER BY ep.orden) FILTER (WHERE ep.pregunta_id IS NOT NULL),
                    '{}'
                ) AS preguntas
            FROM evaluaciones e
            LEFT JOIN evaluacion_pregunta ep ON ep.evaluacion_id = e.id
            WHERE e.id = $1
            GROUP BY e.id, e.curso_id, e.titulo, e.puntaje_total
            "#,
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let question_ids: Vec<i64> = row.try_get("preguntas").map_err(Error::Database)?;

        Ok(Some(Evaluation {
            id: EvaluationId::new(row.try_get("id").map_err(Error::Database)?),
            course_id: row.try_get::<i64, _>("curso_id").map_err(Error::Database)?.into(),
            title: row.try_get("titulo").map_err(Error::Database)?,
            total_possible_points: row.try_get("puntaje_total").map_err(Error::Database)?,
            question_ids: question_ids.into_iter().map(QuestionId::new).collect(),
        }))
    }
}
