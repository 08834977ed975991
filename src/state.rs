use crate::db::stripe_event_log_repository::StripeEventLogRepository;
use crate::services::plan_manager::PlanManager;
use crate::services::stripe::StripeService;
use crate::services::usage_meter::UsageMeter;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub plans: PlanManager,
    pub usage: UsageMeter,
    pub stripe: Arc<dyn StripeService>,
    pub stripe_event_log_repo: Arc<dyn StripeEventLogRepository>,
}
