use super::events::{plan_metadata_from_value, subscription_from_value};
use super::{
    CreateSubscriptionRequest, PlanMetadata, StripeEvent, StripeService, StripeServiceError,
    SubscriptionInfo,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

pub struct LiveStripeService {
    client: stripe::Client,
    webhook_secret: String,
}

impl LiveStripeService {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        let client = stripe::Client::new(secret_key);
        Self {
            client,
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn from_settings(settings: &crate::config::StripeSettings) -> Self {
        Self::new(settings.secret_key.clone(), settings.webhook_secret.clone())
    }
}

fn parse_customer_id(customer_id: &str) -> Result<stripe::CustomerId, StripeServiceError> {
    customer_id
        .parse::<stripe::CustomerId>()
        .map_err(|e| StripeServiceError::Other(e.to_string()))
}

#[async_trait]
impl StripeService for LiveStripeService {
    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        metadata: BTreeMap<String, String>,
    ) -> Result<String, StripeServiceError> {
        let mut params = stripe::CreateCustomer::new();
        params.email = Some(email);
        if let Some(name) = name {
            params.name = Some(name);
        }
        if !metadata.is_empty() {
            params.metadata = Some(metadata.into_iter().collect::<HashMap<_, _>>());
        }
        let customer = stripe::Customer::create(&self.client, params).await?;
        Ok(customer.id.to_string())
    }

    async fn retrieve_plan(&self, plan_id: &str) -> Result<PlanMetadata, StripeServiceError> {
        let id = plan_id
            .parse::<stripe::PlanId>()
            .map_err(|e| StripeServiceError::Other(e.to_string()))?;
        let plan = stripe::Plan::retrieve(&self.client, &id, &[]).await?;
        let value =
            serde_json::to_value(&plan).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        plan_metadata_from_value(&value)
            .ok_or_else(|| StripeServiceError::Serde(format!("plan {plan_id} has no id")))
    }

    async fn create_subscription(
        &self,
        req: CreateSubscriptionRequest,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        let customer = parse_customer_id(&req.customer_id)?;
        let mut params = stripe::CreateSubscription::new(customer);
        params.items = Some(vec![stripe::CreateSubscriptionItems {
            price: Some(req.plan_id.clone()),
            ..Default::default()
        }]);
        params.backdate_start_date = req.backdate_start;

        let sub = stripe::Subscription::create(&self.client, params).await?;
        let value =
            serde_json::to_value(&sub).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        subscription_from_value(&value).ok_or_else(|| {
            StripeServiceError::Serde(format!("subscription {} missing required fields", sub.id))
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, StripeServiceError> {
        let customer = parse_customer_id(customer_id)?;
        let mut params = stripe::CreateBillingPortalSession::new(customer);
        params.return_url = Some(return_url);
        let session = stripe::BillingPortalSession::create(&self.client, params).await?;
        Ok(session.url)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        let payload_str =
            std::str::from_utf8(payload).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let event =
            stripe::Webhook::construct_event(payload_str, signature_header, &self.webhook_secret)?;
        let payload =
            serde_json::to_value(&event).map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        Ok(StripeEvent {
            id: event.id.to_string(),
            r#type: event.type_.to_string(),
            payload,
        })
    }
}
