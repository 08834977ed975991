use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Billing contact for a project: the owning user plus the project's creation time,
/// which anchors the first subscription.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectOwner {
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub project_created_at: OffsetDateTime,
}

impl ProjectOwner {
    pub fn display_name(&self) -> Option<String> {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            None
        } else {
            Some(full.to_string())
        }
    }
}
