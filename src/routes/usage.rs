use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::responses::JsonResponse;
use crate::services::locks::LockError;
use crate::services::usage_meter::UsageError;
use crate::state::AppState;

pub const QUOTA_EXCEEDED_CODE: &str = "QUOTA_EXCEEDED";

#[derive(Debug, Deserialize)]
pub struct RecordUsagePayload {
    pub tasks: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuotaCheckPayload {
    #[serde(default)]
    pub context: Option<String>,
}

pub(crate) fn usage_error_response(err: &UsageError) -> Response {
    match err {
        UsageError::QuotaExceeded { .. } => JsonResponse::forbidden_with_code(
            "This project has used all of the tasks included in its plan for the current period.",
            QUOTA_EXCEEDED_CODE,
        )
        .into_response(),
        UsageError::Plan(plan_err) => super::billing::plan_error_response(plan_err),
        UsageError::Lock(LockError::Timeout { .. }) => JsonResponse::service_unavailable(
            "Usage is busy for this project. Please try again shortly.",
        )
        .into_response(),
        _ => JsonResponse::server_error("Usage metering is unavailable").into_response(),
    }
}

// POST /api/projects/{project_id}/usage
pub async fn record_usage(
    State(app_state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<RecordUsagePayload>,
) -> Response {
    match app_state
        .usage
        .record_consumption(project_id, payload.tasks)
        .await
    {
        Ok(usage) => Json(json!({ "success": true, "usage": usage })).into_response(),
        Err(err) => {
            error!(?err, %project_id, tasks = payload.tasks, "failed to record usage");
            usage_error_response(&err)
        }
    }
}

// POST /api/projects/{project_id}/usage/check
pub async fn check_quota(
    State(app_state): State<AppState>,
    Path(project_id): Path<Uuid>,
    body: axum::body::Bytes,
) -> Response {
    // The body is optional; an empty one checks with the default context.
    let payload = if body.is_empty() {
        QuotaCheckPayload::default()
    } else {
        match serde_json::from_slice::<QuotaCheckPayload>(&body) {
            Ok(p) => p,
            Err(_) => return JsonResponse::bad_request("Invalid request body").into_response(),
        }
    };
    let context = payload.context.unwrap_or_else(|| "api".to_string());

    match app_state.usage.enforce_quota(project_id, &context).await {
        Ok(()) => JsonResponse::success("Within quota").into_response(),
        Err(err) => {
            info!(%project_id, %context, "request blocked by task quota");
            usage_error_response(&err)
        }
    }
}

// GET /api/projects/{project_id}/usage/history
pub async fn usage_history(
    State(app_state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Response {
    match app_state.usage.usage_history(project_id).await {
        Ok(windows) => Json(json!({ "success": true, "windows": windows })).into_response(),
        Err(err) => {
            error!(?err, %project_id, "failed to list usage history");
            usage_error_response(&err)
        }
    }
}
