use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::usage::Usage;

#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Latest window for the project (greatest `window_end`).
    async fn find_current(&self, project_id: Uuid) -> Result<Option<Usage>, sqlx::Error>;

    /// Append a zeroed window ending at `window_end`. If a row with the same boundary
    /// already exists it is returned untouched.
    async fn append_window(
        &self,
        project_id: Uuid,
        window_end: OffsetDateTime,
    ) -> Result<Usage, sqlx::Error>;

    async fn set_consumed(&self, usage_id: Uuid, consumed_tasks: i64)
        -> Result<Usage, sqlx::Error>;

    /// All windows for the project, newest first.
    async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Usage>, sqlx::Error>;
}
