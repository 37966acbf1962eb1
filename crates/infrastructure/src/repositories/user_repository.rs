//! Users, roles and student cluster assignments.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashMap;
use tracing::instrument;

use lms_pipeline_application::{ports::UserRepositoryPort, ApplicationResult};
use lms_pipeline_domain::{user::User, UserId};

use crate::{Error, Result};

/// Users joined with their role names
const USER_SELECT: &str = r#"
    SELECT
        u.id, u.name, u.email,
        COALESCE(ARRAY_AGG(r.name) FILTER (WHERE r.name IS NOT NULL), '{}') AS roles
    FROM users u
    LEFT JOIN model_has_roles mr ON mr.model_id = u.id
    LEFT JOIN roles r ON r.id = mr.role_id
"#;

const USER_GROUP_BY: &str = "GROUP BY u.id, u.name, u.email ORDER BY u.id";

/// PostgreSQL repository for `users`, their roles and `student_clusters`.
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &PgRow) -> Result<User> {
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        roles: row.try_get("roles")?,
    })
}

#[async_trait]
impl UserRepositoryPort for PgUserRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: UserId) -> ApplicationResult<Option<User>> {
        let row = sqlx::query(&format!("{} WHERE u.id = $1 {}", USER_SELECT, USER_GROUP_BY))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(row_to_user).transpose()?)
    }

    #[instrument(skip(self))]
    async fn list_with_any_role(&self, roles: &[String]) -> ApplicationResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            r#"{}
            WHERE u.id IN (
                SELECT mr2.model_id
                FROM model_has_roles mr2
                JOIN roles r2 ON r2.id = mr2.role_id
                WHERE r2.name = ANY($1)
            )
            {}"#,
            USER_SELECT, USER_GROUP_BY
        ))
        .bind(roles)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?)
    }

    #[instrument(skip(self))]
    async fn list_with_email_containing(&self, fragment: &str) -> ApplicationResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "{} WHERE u.email ILIKE '%' || $1 || '%' {}",
            USER_SELECT, USER_GROUP_BY
        ))
        .bind(fragment)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?)
    }

    #[instrument(skip(self))]
    async fn first(&self) -> ApplicationResult<Option<User>> {
        let row = sqlx::query(&format!("{} {} LIMIT 1", USER_SELECT, USER_GROUP_BY))
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(row_to_user).transpose()?)
    }

    #[instrument(skip(self, student_ids), fields(students = student_ids.len()))]
    async fn cluster_assignments(&self, student_ids: &[UserId]) -> ApplicationResult<HashMap<UserId, i32>> {
        if student_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<i64> = student_ids.iter().map(|id| id.value()).collect();

        // Latest assignment per student
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (estudiante_id) estudiante_id, cluster_id::INT4 AS cluster_id
            FROM student_clusters
            WHERE estudiante_id = ANY($1)
            ORDER BY estudiante_id, fecha_asignacion DESC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut assignments = HashMap::with_capacity(rows.len());
        for row in &rows {
            let student: i64 = row.try_get("estudiante_id").map_err(Error::Database)?;
            let cluster: i32 = row.try_get("cluster_id").map_err(Error::Database)?;
            assignments.insert(UserId::new(student), cluster);
        }

        Ok(assignments)
    }
}
