pub mod billing;
pub mod stripe;
pub mod usage;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Project billing and metering endpoints plus the public Stripe webhook.
pub fn api_routes() -> Router<AppState> {
    let project_routes = Router::new()
        .route("/{project_id}/billing", get(billing::get_billing))
        .route("/{project_id}/usage", post(usage::record_usage))
        .route("/{project_id}/usage/check", post(usage::check_quota))
        .route("/{project_id}/usage/history", get(usage::usage_history));

    Router::new()
        .nest("/api/projects", project_routes)
        .route("/api/stripe/webhook", post(stripe::webhook))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::ops::Deref;
    use std::sync::Arc;

    use axum::Router;

    use crate::db::mock_stripe_event_log_repository::MockStripeEventLogRepository;
    use crate::services::usage_meter::test_support::{usage_fixture, UsageFixture};
    use crate::state::AppState;

    pub struct RouteFixture {
        pub usage: UsageFixture,
        pub event_log: MockStripeEventLogRepository,
    }

    impl Deref for RouteFixture {
        type Target = UsageFixture;

        fn deref(&self) -> &UsageFixture {
            &self.usage
        }
    }

    pub fn test_state() -> (AppState, RouteFixture) {
        let usage = usage_fixture();
        let event_log = MockStripeEventLogRepository::default();
        let state = AppState {
            plans: usage.plan.manager.clone(),
            usage: usage.meter.clone(),
            stripe: Arc::new(usage.plan.stripe.clone()),
            stripe_event_log_repo: Arc::new(event_log.clone()),
        };
        (state, RouteFixture { usage, event_log })
    }

    pub fn test_router(state: AppState) -> Router {
        super::api_routes().with_state(state)
    }
}
