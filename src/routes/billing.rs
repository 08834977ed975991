use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::responses::JsonResponse;
use crate::services::locks::LockError;
use crate::services::plan_manager::PlanError;
use crate::state::AppState;

pub(crate) fn plan_error_response(err: &PlanError) -> Response {
    match err {
        PlanError::ProjectNotFound(_) => JsonResponse::not_found("Project not found").into_response(),
        PlanError::NotFound(_) => {
            JsonResponse::not_found("No plan for this billing customer").into_response()
        }
        PlanError::Lock(LockError::Timeout { .. }) => JsonResponse::service_unavailable(
            "Billing is busy for this project. Please try again shortly.",
        )
        .into_response(),
        PlanError::Configuration(_) => {
            JsonResponse::server_error("Billing is misconfigured").into_response()
        }
        _ => JsonResponse::server_error("Billing is unavailable").into_response(),
    }
}

// GET /api/projects/{project_id}/billing
pub async fn get_billing(
    State(app_state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Response {
    let plan = match app_state.plans.get_plan(project_id).await {
        Ok(plan) => plan,
        Err(err) => {
            error!(?err, %project_id, "failed to load plan");
            return plan_error_response(&err);
        }
    };

    let usage = match app_state.usage.get_usage(project_id).await {
        Ok(usage) => usage,
        Err(err) => {
            error!(?err, %project_id, "failed to load usage");
            return super::usage::usage_error_response(&err);
        }
    };

    // A portal outage should not hide the plan and usage figures.
    let portal_url = match app_state.plans.get_portal_url(project_id).await {
        Ok(url) => Some(url),
        Err(err) => {
            warn!(?err, %project_id, "failed to create billing portal session");
            None
        }
    };

    Json(json!({
        "success": true,
        "plan": plan,
        "usage": usage,
        "portal_url": portal_url,
    }))
    .into_response()
}
