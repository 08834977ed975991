use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::project::ProjectOwner;

use super::project_directory::ProjectDirectory;

pub struct PostgresProjectDirectory {
    pub pool: PgPool,
}

#[async_trait]
impl ProjectDirectory for PostgresProjectDirectory {
    async fn find_project_owner(
        &self,
        project_id: Uuid,
    ) -> Result<Option<ProjectOwner>, sqlx::Error> {
        sqlx::query_as::<_, ProjectOwner>(
            r#"
            SELECT p.id AS project_id,
                   u.id AS owner_id,
                   u.email,
                   u.first_name,
                   u.last_name,
                   p.created_at AS project_created_at
            FROM projects p
            JOIN users u ON u.id = p.owner_id
            WHERE p.id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }
}
