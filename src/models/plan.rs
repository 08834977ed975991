use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Local mirror of a project's Stripe subscription and its task allotment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub project_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub tasks: i64,
    pub plan_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub cycle_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPlan {
    pub project_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub tasks: i64,
    pub plan_name: String,
    pub cycle_start: OffsetDateTime,
}

/// Fields overwritten together on every subscription transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanUpdate {
    pub stripe_subscription_id: String,
    pub tasks: i64,
    pub plan_name: String,
    pub cycle_start: OffsetDateTime,
}
