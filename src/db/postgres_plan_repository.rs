use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::plan::{NewPlan, Plan, PlanUpdate};

use super::plan_repository::PlanRepository;

pub struct PostgresPlanRepository {
    pub pool: PgPool,
}

const PLAN_COLUMNS: &str = "id, project_id, stripe_customer_id, stripe_subscription_id, tasks, \
                            plan_name, cycle_start, created_at, updated_at";

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn find_by_project(&self, project_id: Uuid) -> Result<Option<Plan>, sqlx::Error> {
        sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE project_id = $1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Plan>, sqlx::Error> {
        sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE stripe_customer_id = $1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn upsert_plan(&self, plan: NewPlan) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO plans (
                project_id, stripe_customer_id, stripe_subscription_id,
                tasks, plan_name, cycle_start, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, now(), now())
            ON CONFLICT (project_id) DO UPDATE
            SET stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                tasks = EXCLUDED.tasks,
                plan_name = EXCLUDED.plan_name,
                cycle_start = EXCLUDED.cycle_start,
                updated_at = now()
            "#,
        )
        .bind(plan.project_id)
        .bind(&plan.stripe_customer_id)
        .bind(&plan.stripe_subscription_id)
        .bind(plan.tasks)
        .bind(&plan.plan_name)
        .bind(plan.cycle_start)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_subscription(
        &self,
        project_id: Uuid,
        update: PlanUpdate,
    ) -> Result<Plan, sqlx::Error> {
        sqlx::query_as::<_, Plan>(&format!(
            r#"
            UPDATE plans
            SET stripe_subscription_id = $2,
                tasks = $3,
                plan_name = $4,
                cycle_start = $5,
                updated_at = now()
            WHERE project_id = $1
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(&update.stripe_subscription_id)
        .bind(update.tasks)
        .bind(&update.plan_name)
        .bind(update.cycle_start)
        .fetch_one(&self.pool)
        .await
    }
}
