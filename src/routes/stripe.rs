use axum::Json;
use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use axum::{http::StatusCode, response::Response};
use tracing::{error, info, warn};

use crate::responses::JsonResponse;
use crate::services::stripe::events::BillingEvent;
use crate::state::AppState;

fn received() -> Response {
    Json(serde_json::json!({ "received": true })).into_response()
}

// POST /api/stripe/webhook
pub async fn webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let sig = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing Stripe-Signature").into_response(),
    };

    let evt = match app_state.stripe.verify_webhook(&body, sig) {
        Ok(e) => e,
        Err(err) => {
            warn!(?err, "stripe webhook verification failed");
            return (StatusCode::BAD_REQUEST, "invalid webhook").into_response();
        }
    };

    let evt_id = evt.id.as_str();
    let evt_type = evt.r#type.as_str();

    match app_state
        .stripe_event_log_repo
        .has_processed_event(evt_id)
        .await
    {
        Ok(true) => {
            info!(evt_id, evt_type, "stripe event already processed");
            return received();
        }
        Ok(false) => {}
        Err(err) => {
            error!(?err, evt_id, "failed to check stripe event log");
            return JsonResponse::server_error("Failed to process webhook").into_response();
        }
    }

    let billing_event = match BillingEvent::from_stripe_event(&evt) {
        Ok(e) => e,
        Err(err) => {
            // Redelivery cannot fix a payload we cannot read.
            warn!(%err, "acknowledging unreadable stripe event");
            return received();
        }
    };

    if let Err(err) = app_state.plans.handle_webhook(&billing_event).await {
        error!(?err, evt_id, evt_type, "failed to apply stripe event");
        return super::billing::plan_error_response(&err);
    }

    if let Err(err) = app_state
        .stripe_event_log_repo
        .record_event(evt_id, evt_type)
        .await
    {
        // Already applied; a redelivery replays an idempotent transition.
        error!(?err, evt_id, "failed to record processed stripe event");
    }

    received()
}
