use async_trait::async_trait;
use uuid::Uuid;

use crate::models::plan::{NewPlan, Plan, PlanUpdate};

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn find_by_project(&self, project_id: Uuid) -> Result<Option<Plan>, sqlx::Error>;

    async fn find_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Plan>, sqlx::Error>;

    /// Insert keyed by `project_id`; an existing row for the project is overwritten
    /// rather than duplicated.
    async fn upsert_plan(&self, plan: NewPlan) -> Result<(), sqlx::Error>;

    async fn update_subscription(
        &self,
        project_id: Uuid,
        update: PlanUpdate,
    ) -> Result<Plan, sqlx::Error>;
}
