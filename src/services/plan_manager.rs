use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::plan_repository::PlanRepository;
use crate::db::project_directory::ProjectDirectory;
use crate::models::plan::{NewPlan, Plan, PlanUpdate};
use crate::services::locks::{plan_lock_key, LockError, LockService};
use crate::services::stripe::events::BillingEvent;
use crate::services::stripe::{
    CreateSubscriptionRequest, PlanMetadata, StripeService, StripeServiceError, SubscriptionInfo,
};

pub const TASKS_METADATA_KEY: &str = "tasks";

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("billing configuration error: {0}")]
    Configuration(String),
    #[error("no plan found for stripe customer {0}")]
    NotFound(String),
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stripe error: {0}")]
    Stripe(#[from] StripeServiceError),
}

/// Task allotment and display name read off a Stripe plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntitlement {
    pub tasks: i64,
    pub name: String,
}

impl PlanEntitlement {
    pub fn from_metadata(plan: &PlanMetadata) -> Result<Self, PlanError> {
        let tasks = plan
            .metadata
            .get(TASKS_METADATA_KEY)
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| {
                PlanError::Configuration(format!(
                    "stripe plan {} has no `{}` metadata",
                    plan.id, TASKS_METADATA_KEY
                ))
            })?;
        let tasks = tasks
            .parse::<i64>()
            .ok()
            .filter(|t| *t >= 0)
            .ok_or_else(|| {
                PlanError::Configuration(format!(
                    "stripe plan {} has invalid `{}` metadata: {:?}",
                    plan.id, TASKS_METADATA_KEY, tasks
                ))
            })?;
        let name = plan.nickname.clone().ok_or_else(|| {
            PlanError::Configuration(format!("stripe plan {} has no nickname", plan.id))
        })?;
        Ok(Self { tasks, name })
    }
}

#[derive(Debug, Clone)]
pub struct PlanSettings {
    pub default_plan_id: String,
    pub lock_timeout: Duration,
    /// Frontend origin the customer portal sends users back to.
    pub portal_return_origin: String,
}

fn timestamp(secs: i64) -> Result<OffsetDateTime, PlanError> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| PlanError::Stripe(StripeServiceError::Serde(e.to_string())))
}

#[derive(Clone)]
pub struct PlanManager {
    plans: Arc<dyn PlanRepository>,
    directory: Arc<dyn ProjectDirectory>,
    stripe: Arc<dyn StripeService>,
    locks: Arc<dyn LockService>,
    settings: Arc<PlanSettings>,
}

impl PlanManager {
    pub fn new(
        plans: Arc<dyn PlanRepository>,
        directory: Arc<dyn ProjectDirectory>,
        stripe: Arc<dyn StripeService>,
        locks: Arc<dyn LockService>,
        settings: PlanSettings,
    ) -> Self {
        Self {
            plans,
            directory,
            stripe,
            locks,
            settings: Arc::new(settings),
        }
    }

    /// Current plan for the project, provisioning the default plan on first use.
    pub async fn get_plan(&self, project_id: Uuid) -> Result<Plan, PlanError> {
        if let Some(plan) = self.plans.find_by_project(project_id).await? {
            return Ok(plan);
        }

        let _guard = self
            .locks
            .acquire(&plan_lock_key(project_id), self.settings.lock_timeout)
            .await?;

        // Another request may have provisioned while we waited for the lock.
        if let Some(plan) = self.plans.find_by_project(project_id).await? {
            return Ok(plan);
        }

        self.provision_plan(project_id).await
    }

    async fn provision_plan(&self, project_id: Uuid) -> Result<Plan, PlanError> {
        let owner = self
            .directory
            .find_project_owner(project_id)
            .await?
            .ok_or(PlanError::ProjectNotFound(project_id))?;

        let default_plan = self
            .stripe
            .retrieve_plan(&self.settings.default_plan_id)
            .await?;
        let entitlement = PlanEntitlement::from_metadata(&default_plan)?;

        let metadata: BTreeMap<String, String> = [
            ("project_id".to_string(), project_id.to_string()),
            ("owner_id".to_string(), owner.owner_id.to_string()),
        ]
        .into_iter()
        .collect();
        let display_name = owner.display_name();
        let customer_id = self
            .stripe
            .create_customer(&owner.email, display_name.as_deref(), metadata)
            .await?;

        let subscription = self
            .stripe
            .create_subscription(CreateSubscriptionRequest {
                customer_id: customer_id.clone(),
                plan_id: self.settings.default_plan_id.clone(),
                backdate_start: Some(owner.project_created_at.unix_timestamp()),
            })
            .await?;

        self.plans
            .upsert_plan(NewPlan {
                project_id,
                stripe_customer_id: customer_id.clone(),
                stripe_subscription_id: subscription.id.clone(),
                tasks: entitlement.tasks,
                plan_name: entitlement.name.clone(),
                cycle_start: timestamp(subscription.current_period_start)?,
            })
            .await?;

        info!(
            %project_id,
            %customer_id,
            subscription_id = %subscription.id,
            plan = %entitlement.name,
            tasks = entitlement.tasks,
            "provisioned default plan"
        );

        self.plans
            .find_by_project(project_id)
            .await?
            .ok_or(PlanError::Database(sqlx::Error::RowNotFound))
    }

    /// Apply a verified Stripe subscription event to the owning project's plan.
    ///
    /// Subscription events first resolve the plan by Stripe customer and fail with
    /// [`PlanError::NotFound`] for an unknown customer. `BillingEvent::Unhandled`
    /// carries no customer, so it is acknowledged as a no-op before that lookup and
    /// never reports `NotFound`.
    pub async fn handle_webhook(&self, event: &BillingEvent) -> Result<(), PlanError> {
        let subscription = match event {
            BillingEvent::SubscriptionCreated(sub)
            | BillingEvent::SubscriptionUpdated(sub)
            | BillingEvent::SubscriptionDeleted(sub) => sub,
            BillingEvent::Unhandled(evt_type) => {
                info!(%evt_type, "ignoring unhandled stripe event");
                return Ok(());
            }
        };

        let plan = self
            .plans
            .find_by_stripe_customer_id(&subscription.customer)
            .await?
            .ok_or_else(|| {
                warn!(
                    customer_id = %subscription.customer,
                    evt_type = event.event_type(),
                    "subscription event for unknown customer"
                );
                PlanError::NotFound(subscription.customer.clone())
            })?;

        match event {
            BillingEvent::SubscriptionCreated(sub) => self.apply_plan_update(&plan, sub).await,
            BillingEvent::SubscriptionDeleted(_) => self.apply_downgrade(&plan).await,
            BillingEvent::SubscriptionUpdated(sub) => match sub.status.as_str() {
                "canceled" | "unpaid" => self.apply_downgrade(&plan).await,
                _ => self.apply_plan_update(&plan, sub).await,
            },
            BillingEvent::Unhandled(_) => Ok(()),
        }
    }

    async fn apply_plan_update(
        &self,
        plan: &Plan,
        subscription: &SubscriptionInfo,
    ) -> Result<(), PlanError> {
        let project_id = plan.project_id;
        let _guard = self
            .locks
            .acquire(&plan_lock_key(project_id), self.settings.lock_timeout)
            .await?;

        let stripe_plan = subscription.plan.as_ref().ok_or_else(|| {
            PlanError::Configuration(format!(
                "subscription {} has no plan on its first item",
                subscription.id
            ))
        })?;
        let entitlement = PlanEntitlement::from_metadata(stripe_plan)?;

        let updated = self
            .plans
            .update_subscription(
                project_id,
                PlanUpdate {
                    stripe_subscription_id: subscription.id.clone(),
                    tasks: entitlement.tasks,
                    plan_name: entitlement.name,
                    cycle_start: timestamp(subscription.current_period_start)?,
                },
            )
            .await?;

        info!(
            %project_id,
            subscription_id = %updated.stripe_subscription_id,
            plan = %updated.plan_name,
            tasks = updated.tasks,
            "applied subscription change"
        );
        Ok(())
    }

    async fn apply_downgrade(&self, plan: &Plan) -> Result<(), PlanError> {
        let project_id = plan.project_id;
        let _guard = self
            .locks
            .acquire(&plan_lock_key(project_id), self.settings.lock_timeout)
            .await?;

        let default_plan = self
            .stripe
            .retrieve_plan(&self.settings.default_plan_id)
            .await?;
        let entitlement = PlanEntitlement::from_metadata(&default_plan)?;

        let subscription = self
            .stripe
            .create_subscription(CreateSubscriptionRequest {
                customer_id: plan.stripe_customer_id.clone(),
                plan_id: self.settings.default_plan_id.clone(),
                backdate_start: None,
            })
            .await?;

        let updated = self
            .plans
            .update_subscription(
                project_id,
                PlanUpdate {
                    stripe_subscription_id: subscription.id.clone(),
                    tasks: entitlement.tasks,
                    plan_name: self.settings.default_plan_id.clone(),
                    cycle_start: timestamp(subscription.current_period_start)?,
                },
            )
            .await?;

        info!(
            %project_id,
            previous_subscription_id = %plan.stripe_subscription_id,
            subscription_id = %updated.stripe_subscription_id,
            tasks = updated.tasks,
            "downgraded project to default plan"
        );
        Ok(())
    }

    /// Hosted Stripe customer-portal URL for the project's billing customer.
    pub async fn get_portal_url(&self, project_id: Uuid) -> Result<String, PlanError> {
        let plan = self.get_plan(project_id).await?;
        let return_url = format!(
            "{}/projects/{}/settings/billing",
            self.settings.portal_return_origin.trim_end_matches('/'),
            project_id
        );
        let url = self
            .stripe
            .create_portal_session(&plan.stripe_customer_id, &return_url)
            .await?;
        Ok(url)
    }
}
