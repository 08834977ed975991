use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::usage::Usage;

use super::usage_repository::UsageRepository;

pub struct PostgresUsageRepository {
    pub pool: PgPool,
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn find_current(&self, project_id: Uuid) -> Result<Option<Usage>, sqlx::Error> {
        sqlx::query_as::<_, Usage>(
            r#"
            SELECT id, project_id, consumed_tasks, window_end, created_at
            FROM usages
            WHERE project_id = $1
            ORDER BY window_end DESC
            LIMIT 1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn append_window(
        &self,
        project_id: Uuid,
        window_end: OffsetDateTime,
    ) -> Result<Usage, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO usages (project_id, consumed_tasks, window_end, created_at)
            VALUES ($1, 0, $2, now())
            ON CONFLICT (project_id, window_end) DO NOTHING
            "#,
        )
        .bind(project_id)
        .bind(window_end)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, Usage>(
            r#"
            SELECT id, project_id, consumed_tasks, window_end, created_at
            FROM usages
            WHERE project_id = $1 AND window_end = $2
            "#,
        )
        .bind(project_id)
        .bind(window_end)
        .fetch_one(&self.pool)
        .await
    }

    async fn set_consumed(
        &self,
        usage_id: Uuid,
        consumed_tasks: i64,
    ) -> Result<Usage, sqlx::Error> {
        sqlx::query_as::<_, Usage>(
            r#"
            UPDATE usages
            SET consumed_tasks = $2
            WHERE id = $1
            RETURNING id, project_id, consumed_tasks, window_end, created_at
            "#,
        )
        .bind(usage_id)
        .bind(consumed_tasks)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Usage>, sqlx::Error> {
        sqlx::query_as::<_, Usage>(
            r#"
            SELECT id, project_id, consumed_tasks, window_end, created_at
            FROM usages
            WHERE project_id = $1
            ORDER BY window_end DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }
}
