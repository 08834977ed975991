use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MeteringSettings;
use crate::db::usage_repository::UsageRepository;
use crate::models::usage::{next_window_end, Usage};
use crate::services::locks::{usage_lock_key, LockError, LockService};
use crate::services::plan_manager::{PlanError, PlanManager};

#[derive(Error, Debug)]
pub enum UsageError {
    #[error("project {project_id} has exceeded its task quota")]
    QuotaExceeded { project_id: Uuid },
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of a soft quota check.
#[derive(Debug)]
pub enum QuotaCheck {
    Allowed,
    Exceeded { consumed: i64, quota: i64 },
    /// The check could not run. Callers proceed as if it passed.
    SkippedDueToError(UsageError),
}

#[derive(Clone)]
pub struct UsageMeter {
    usages: Arc<dyn UsageRepository>,
    plans: PlanManager,
    locks: Arc<dyn LockService>,
    settings: MeteringSettings,
}

impl UsageMeter {
    pub fn new(
        usages: Arc<dyn UsageRepository>,
        plans: PlanManager,
        locks: Arc<dyn LockService>,
        settings: MeteringSettings,
    ) -> Self {
        Self {
            usages,
            plans,
            locks,
            settings,
        }
    }

    /// Live usage window for the project, rolling forward to a fresh window when the
    /// stored one has ended.
    pub async fn get_usage(&self, project_id: Uuid) -> Result<Usage, UsageError> {
        self.get_usage_at(project_id, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn get_usage_at(
        &self,
        project_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Usage, UsageError> {
        let plan = self.plans.get_plan(project_id).await?;
        let target = next_window_end(plan.cycle_start, now);

        match self.usages.find_current(project_id).await? {
            Some(usage) if usage.window_end == target => Ok(usage),
            current => {
                let usage = self.usages.append_window(project_id, target).await?;
                info!(
                    %project_id,
                    window_end = %usage.window_end,
                    previous_window_end = ?current.map(|u| u.window_end),
                    "opened usage window"
                );
                Ok(usage)
            }
        }
    }

    /// Add `tasks` to the project's live window.
    pub async fn record_consumption(
        &self,
        project_id: Uuid,
        tasks: u32,
    ) -> Result<Usage, UsageError> {
        self.record_consumption_at(project_id, tasks, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn record_consumption_at(
        &self,
        project_id: Uuid,
        tasks: u32,
        now: OffsetDateTime,
    ) -> Result<Usage, UsageError> {
        let _guard = self
            .locks
            .acquire(&usage_lock_key(project_id), self.settings.lock_timeout)
            .await?;

        let usage = self.get_usage_at(project_id, now).await?;
        let consumed = usage.consumed_tasks.saturating_add(i64::from(tasks));
        let usage = self.usages.set_consumed(usage.id, consumed).await?;

        debug!(
            %project_id,
            tasks,
            consumed = usage.consumed_tasks,
            window_end = %usage.window_end,
            "recorded task consumption"
        );
        Ok(usage)
    }

    /// Compare the live window against the plan quota under the usage lock.
    pub async fn check_quota(&self, project_id: Uuid) -> QuotaCheck {
        match self.try_check_quota(project_id).await {
            Ok((consumed, quota)) if consumed > quota => QuotaCheck::Exceeded { consumed, quota },
            Ok(_) => QuotaCheck::Allowed,
            Err(err) => QuotaCheck::SkippedDueToError(err),
        }
    }

    async fn try_check_quota(&self, project_id: Uuid) -> Result<(i64, i64), UsageError> {
        let _guard = self
            .locks
            .acquire(&usage_lock_key(project_id), self.settings.lock_timeout)
            .await?;
        let usage = self.get_usage(project_id).await?;
        let plan = self.plans.get_plan(project_id).await?;
        Ok((usage.consumed_tasks, plan.tasks))
    }

    /// Fails with `QuotaExceeded` only when the project is over quota. Any failure of
    /// the check itself is reported and the caller is let through.
    pub async fn enforce_quota(&self, project_id: Uuid, context: &str) -> Result<(), UsageError> {
        if !self.settings.deployment_mode.meters_usage() {
            return Ok(());
        }

        match self.check_quota(project_id).await {
            QuotaCheck::Allowed => Ok(()),
            QuotaCheck::Exceeded { consumed, quota } => {
                warn!(%project_id, context, consumed, quota, "task quota exceeded");
                Err(UsageError::QuotaExceeded { project_id })
            }
            QuotaCheck::SkippedDueToError(err) => {
                sentry::capture_error(&err);
                error!(%project_id, context, ?err, "quota check failed; allowing request");
                Ok(())
            }
        }
    }

    pub async fn usage_history(&self, project_id: Uuid) -> Result<Vec<Usage>, UsageError> {
        Ok(self.usages.list_for_project(project_id).await?)
    }
}
