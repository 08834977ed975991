use async_trait::async_trait;
use uuid::Uuid;

use crate::models::project::ProjectOwner;

/// Read-only view over projects and their owning users.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn find_project_owner(
        &self,
        project_id: Uuid,
    ) -> Result<Option<ProjectOwner>, sqlx::Error>;
}
