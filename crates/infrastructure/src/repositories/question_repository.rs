//! Question bank and question analytics.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::BTreeMap;
use tracing::instrument;

use lms_pipeline_application::{
    ports::{QuestionAnalyticsRepositoryPort, QuestionRepositoryPort},
    ApplicationResult,
};
use lms_pipeline_domain::{
    question::{Question, QuestionAnalytics},
    CourseId, EvaluationId, QuestionId,
};

use crate::{Error, Result};

const QUESTION_COLUMNS: &str = r#"
    id, curso_id, enunciado, respuesta_correcta,
    COALESCE(puntos, 0)::FLOAT8 AS puntos,
    COALESCE(dificultad_estimada, 0.5)::FLOAT8 AS dificultad_estimada,
    dificultad_empirica::FLOAT8 AS dificultad_empirica,
    COALESCE(veces_usada, 0)::BIGINT AS veces_usada
"#;

/// PostgreSQL repository for `preguntas` and `analisis_preguntas`.
pub struct PgQuestionRepository {
    pool: PgPool,
}

impl PgQuestionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_question(row: &PgRow) -> Result<Question> {
    let usage: i64 = row.try_get("veces_usada")?;

    Ok(Question {
        id: QuestionId::new(row.try_get("id")?),
        course_id: CourseId::new(row.try_get("curso_id")?),
        statement: row.try_get("enunciado")?,
        correct_option: row.try_get("respuesta_correcta")?,
        points: row.try_get("puntos")?,
        estimated_difficulty: row.try_get("dificultad_estimada")?,
        empirical_difficulty: row.try_get("dificultad_empirica")?,
        usage_count: u32::try_from(usage.max(0)).unwrap_or(u32::MAX),
    })
}

fn row_to_analytics(row: &PgRow) -> Result<QuestionAnalytics> {
    let count = |column: &str| -> Result<u32> {
        let value: i64 = row.try_get(column)?;
        u32::try_from(value).map_err(|_| Error::InvalidData(format!("{} out of range: {}", column, value)))
    };

    let distribution: serde_json::Value = row.try_get("distribucion_respuestas")?;
    let clusters: serde_json::Value = row.try_get("rendimiento_por_cluster")?;

    Ok(QuestionAnalytics {
        question_id: QuestionId::new(row.try_get("pregunta_id")?),
        evaluation_id: EvaluationId::new(row.try_get("evaluacion_id")?),
        times_answered: count("veces_respondida")?,
        times_correct: count("veces_correcta")?,
        times_incorrect: count("veces_incorrecta")?,
        hit_rate: row.try_get("tasa_acierto")?,
        discrimination_index: row.try_get("indice_discriminacion")?,
        avg_response_time_secs: row.try_get("tiempo_promedio_respuesta")?,
        response_distribution: serde_json::from_value::<BTreeMap<String, f64>>(distribution)?,
        cluster_performance: serde_json::from_value::<BTreeMap<String, f64>>(clusters)?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl QuestionRepositoryPort for PgQuestionRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: QuestionId) -> ApplicationResult<Option<Question>> {
        let row = sqlx::query(&format!("SELECT {} FROM preguntas WHERE id = $1", QUESTION_COLUMNS))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(row_to_question).transpose()?)
    }

    #[instrument(skip(self))]
    async fn list_recalibration_candidates(
        &self,
        min_usage: u32,
        course_id: Option<CourseId>,
    ) -> ApplicationResult<Vec<Question>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM preguntas
            WHERE veces_usada > $1
              AND ($2::BIGINT IS NULL OR curso_id = $2)
            ORDER BY id
            "#,
            QUESTION_COLUMNS
        ))
        .bind(i64::from(min_usage))
        .bind(course_id.map(|c| c.value()))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(row_to_question).collect::<Result<Vec<_>>>()?)
    }

    #[instrument(skip(self))]
    async fn save_empirical_difficulty(&self, id: QuestionId, difficulty: f64) -> ApplicationResult<()> {
        sqlx::query(
            r#"
            UPDATE preguntas
            SET dificultad_empirica = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.value())
        .bind(difficulty)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }
}

#[async_trait]
impl QuestionAnalyticsRepositoryPort for PgQuestionRepository {
    #[instrument(skip(self, analytics), fields(question_id = %analytics.question_id, evaluation_id = %analytics.evaluation_id))]
    async fn upsert(&self, analytics: &QuestionAnalytics) -> ApplicationResult<()> {
        sqlx::query(
            r#"
            INSERT INTO analisis_preguntas (
                pregunta_id, evaluacion_id, veces_respondida, veces_correcta,
                veces_incorrecta, tasa_acierto, indice_discriminacion,
                tiempo_promedio_respuesta, distribucion_respuestas,
                rendimiento_por_cluster, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            ON CONFLICT (pregunta_id, evaluacion_id) DO UPDATE SET
                veces_respondida = EXCLUDED.veces_respondida,
                veces_correcta = EXCLUDED.veces_correcta,
                veces_incorrecta = EXCLUDED.veces_incorrecta,
                tasa_acierto = EXCLUDED.tasa_acierto,
                indice_discriminacion = EXCLUDED.indice_discriminacion,
                tiempo_promedio_respuesta = EXCLUDED.tiempo_promedio_respuesta,
                distribucion_respuestas = EXCLUDED.distribucion_respuestas,
                rendimiento_por_cluster = EXCLUDED.rendimiento_por_cluster,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(analytics.question_id.value())
        .bind(analytics.evaluation_id.value())
        .bind(i64::from(analytics.times_answered))
        .bind(i64::from(analytics.times_correct))
        .bind(i64::from(analytics.times_incorrect))
        .bind(analytics.hit_rate)
        .bind(analytics.discrimination_index)
        .bind(analytics.avg_response_time_secs)
        .bind(serde_json::to_value(&analytics.response_distribution).map_err(Error::Serialization)?)
        .bind(serde_json::to_value(&analytics.cluster_performance).map_err(Error::Serialization)?)
        .bind(analytics.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_by_question(&self, question_id: QuestionId) -> ApplicationResult<Vec<QuestionAnalytics>> {
        let rows = sqlx::query(
            r#"
            SELECT
                pregunta_id, evaluacion_id,
                veces_respondida::BIGINT AS veces_respondida,
                veces_correcta::BIGINT AS veces_correcta,
                veces_incorrecta::BIGINT AS veces_incorrecta,
                tasa_acierto::FLOAT8 AS tasa_acierto,
                indice_discriminacion::FLOAT8 AS indice_discriminacion,
                tiempo_promedio_respuesta::FLOAT8 AS tiempo_promedio_respuesta,
                COALESCE(distribucion_respuestas, '{}'::jsonb) AS distribucion_respuestas,
                COALESCE(rendimiento_por_cluster, '{}'::jsonb) AS rendimiento_por_cluster,
                updated_at
            FROM analisis_preguntas
            WHERE pregunta_id = $1
            ORDER BY evaluacion_id
            "#,
        )
        .bind(question_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(row_to_analytics).collect::<Result<Vec<_>>>()?)
    }
}
