use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use uuid::Uuid;

use super::plan_repository::PlanRepository;
use super::project_directory::ProjectDirectory;
use super::usage_repository::UsageRepository;
use crate::models::plan::{NewPlan, Plan, PlanUpdate};
use crate::models::project::ProjectOwner;
use crate::models::usage::Usage;

fn mock_failure() -> sqlx::Error {
    sqlx::Error::Protocol("Mock DB failure".into())
}

#[derive(Clone, Default)]
pub struct MockPlanRepository {
    pub plans: Arc<Mutex<Vec<Plan>>>,
    pub upsert_calls: Arc<Mutex<usize>>,
    pub updates: Arc<Mutex<Vec<(Uuid, PlanUpdate)>>>,
    pub should_fail: Arc<Mutex<bool>>,
}

impl MockPlanRepository {
    pub fn snapshot(&self, project_id: Uuid) -> Option<Plan> {
        self.plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.project_id == project_id)
            .cloned()
    }

    fn check_failure(&self) -> Result<(), sqlx::Error> {
        if *self.should_fail.lock().unwrap() {
            return Err(mock_failure());
        }
        Ok(())
    }
}

#[async_trait]
impl PlanRepository for MockPlanRepository {
    async fn find_by_project(&self, project_id: Uuid) -> Result<Option<Plan>, sqlx::Error> {
        self.check_failure()?;
        Ok(self.snapshot(project_id))
    }

    async fn find_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Plan>, sqlx::Error> {
        self.check_failure()?;
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.stripe_customer_id == customer_id)
            .cloned())
    }

    async fn upsert_plan(&self, plan: NewPlan) -> Result<(), sqlx::Error> {
        self.check_failure()?;
        *self.upsert_calls.lock().unwrap() += 1;

        let mut plans = self.plans.lock().unwrap();
        let customer_taken = plans.iter().any(|p| {
            p.stripe_customer_id == plan.stripe_customer_id && p.project_id != plan.project_id
        });
        if customer_taken {
            return Err(sqlx::Error::Protocol(
                "duplicate key value violates unique constraint \"plans_stripe_customer_id_key\""
                    .into(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        if let Some(existing) = plans.iter_mut().find(|p| p.project_id == plan.project_id) {
            existing.stripe_customer_id = plan.stripe_customer_id;
            existing.stripe_subscription_id = plan.stripe_subscription_id;
            existing.tasks = plan.tasks;
            existing.plan_name = plan.plan_name;
            existing.cycle_start = plan.cycle_start;
            existing.updated_at = now;
        } else {
            plans.push(Plan {
                id: Uuid::new_v4(),
                project_id: plan.project_id,
                stripe_customer_id: plan.stripe_customer_id,
                stripe_subscription_id: plan.stripe_subscription_id,
                tasks: plan.tasks,
                plan_name: plan.plan_name,
                cycle_start: plan.cycle_start,
                created_at: now,
                updated_at: now,
            });
        }
        Ok(())
    }

    async fn update_subscription(
        &self,
        project_id: Uuid,
        update: PlanUpdate,
    ) -> Result<Plan, sqlx::Error> {
        self.check_failure()?;
        let mut plans = self.plans.lock().unwrap();
        let plan = plans
            .iter_mut()
            .find(|p| p.project_id == project_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        plan.stripe_subscription_id = update.stripe_subscription_id.clone();
        plan.tasks = update.tasks;
        plan.plan_name = update.plan_name.clone();
        plan.cycle_start = update.cycle_start;
        plan.updated_at = OffsetDateTime::now_utc();
        self.updates.lock().unwrap().push((project_id, update));
        Ok(plan.clone())
    }
}

#[derive(Clone, Default)]
pub struct MockUsageRepository {
    pub rows: Arc<Mutex<Vec<Usage>>>,
    pub should_fail: Arc<Mutex<bool>>,
}

impl MockUsageRepository {
    pub fn rows_for(&self, project_id: Uuid) -> Vec<Usage> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.project_id == project_id)
            .cloned()
            .collect()
    }

    fn check_failure(&self) -> Result<(), sqlx::Error> {
        if *self.should_fail.lock().unwrap() {
            return Err(mock_failure());
        }
        Ok(())
    }
}

#[async_trait]
impl UsageRepository for MockUsageRepository {
    async fn find_current(&self, project_id: Uuid) -> Result<Option<Usage>, sqlx::Error> {
        self.check_failure()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.project_id == project_id)
            .max_by_key(|u| u.window_end)
            .cloned())
    }

    async fn append_window(
        &self,
        project_id: Uuid,
        window_end: OffsetDateTime,
    ) -> Result<Usage, sqlx::Error> {
        self.check_failure()?;
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows
            .iter()
            .find(|u| u.project_id == project_id && u.window_end == window_end)
        {
            return Ok(existing.clone());
        }
        let usage = Usage {
            id: Uuid::new_v4(),
            project_id,
            consumed_tasks: 0,
            window_end,
            created_at: OffsetDateTime::now_utc(),
        };
        rows.push(usage.clone());
        Ok(usage)
    }

    async fn set_consumed(
        &self,
        usage_id: Uuid,
        consumed_tasks: i64,
    ) -> Result<Usage, sqlx::Error> {
        self.check_failure()?;
        let mut rows = self.rows.lock().unwrap();
        let usage = rows
            .iter_mut()
            .find(|u| u.id == usage_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        usage.consumed_tasks = consumed_tasks;
        Ok(usage.clone())
    }

    async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Usage>, sqlx::Error> {
        self.check_failure()?;
        let mut rows = self.rows_for(project_id);
        rows.sort_by(|a, b| b.window_end.cmp(&a.window_end));
        Ok(rows)
    }
}

#[derive(Clone, Default)]
pub struct MockProjectDirectory {
    pub owners: Arc<Mutex<HashMap<Uuid, ProjectOwner>>>,
    pub lookups: Arc<Mutex<usize>>,
}

impl MockProjectDirectory {
    pub fn with_project(project_id: Uuid, project_created_at: OffsetDateTime) -> Self {
        let directory = Self::default();
        directory.owners.lock().unwrap().insert(
            project_id,
            ProjectOwner {
                project_id,
                owner_id: Uuid::new_v4(),
                email: "owner@example.com".into(),
                first_name: "Owner".into(),
                last_name: "User".into(),
                project_created_at,
            },
        );
        directory
    }
}

#[async_trait]
impl ProjectDirectory for MockProjectDirectory {
    async fn find_project_owner(
        &self,
        project_id: Uuid,
    ) -> Result<Option<ProjectOwner>, sqlx::Error> {
        *self.lookups.lock().unwrap() += 1;
        Ok(self.owners.lock().unwrap().get(&project_id).cloned())
    }
}
