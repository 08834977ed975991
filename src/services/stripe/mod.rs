// NOTE: async-stripe is compiled with a minimal feature set (runtime-tokio-hyper, billing,
// checkout, webhook-events, and connect to satisfy webhook payload types). Touching APIs outside
// those features will require updating Cargo.toml explicitly so we keep compile times and binary
// size in check.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum StripeServiceError {
    #[error("stripe api error: {0}")]
    Api(String),
    #[error("webhook verification failed: {0}")]
    Webhook(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("other error: {0}")]
    Other(String),
}

impl From<stripe::StripeError> for StripeServiceError {
    fn from(err: stripe::StripeError) -> Self {
        StripeServiceError::Api(err.to_string())
    }
}

impl From<stripe::WebhookError> for StripeServiceError {
    fn from(err: stripe::WebhookError) -> Self {
        StripeServiceError::Webhook(err.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    pub r#type: String,
    pub payload: serde_json::Value,
}

/// The parts of a Stripe plan we read: its nickname and free-form metadata, where
/// the task allotment lives under `tasks`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub id: String,
    pub nickname: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
    pub customer: String,
    pub status: String,
    /// Unix timestamp (seconds) when the current period started
    pub current_period_start: i64,
    /// Unix timestamp (seconds) when the current period ends
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
    /// Plan attached to the subscription's first item, if any
    pub plan: Option<PlanMetadata>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,
    pub plan_id: String,
    /// Unix timestamp (seconds) to backdate the subscription start to
    pub backdate_start: Option<i64>,
}

#[async_trait]
pub trait StripeService: Send + Sync {
    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        metadata: BTreeMap<String, String>,
    ) -> Result<String, StripeServiceError>;

    async fn retrieve_plan(&self, plan_id: &str) -> Result<PlanMetadata, StripeServiceError>;

    async fn create_subscription(
        &self,
        req: CreateSubscriptionRequest,
    ) -> Result<SubscriptionInfo, StripeServiceError>;

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, StripeServiceError>;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError>;
}

pub mod events;
mod live;
#[cfg(test)]
mod mock;

pub use live::LiveStripeService;
#[cfg(test)]
pub use mock::MockStripeService;
