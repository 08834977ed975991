use super::{
    CreateSubscriptionRequest, PlanMetadata, StripeEvent, StripeService, StripeServiceError,
    SubscriptionInfo,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct CreatedCustomer {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
pub struct MockStripeService {
    pub plans: Arc<Mutex<HashMap<String, PlanMetadata>>>,
    pub customers: Arc<Mutex<Vec<CreatedCustomer>>>,
    pub subscription_requests: Arc<Mutex<Vec<CreateSubscriptionRequest>>>,
    pub subscriptions: Arc<Mutex<Vec<SubscriptionInfo>>>,
    pub portal_sessions: Arc<Mutex<Vec<(String, String)>>>,
    pub events: Arc<Mutex<Vec<StripeEvent>>>,
    pub fail_plan_lookup: Arc<Mutex<bool>>,
}

impl MockStripeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(self, id: &str, nickname: Option<&str>, tasks: Option<&str>) -> Self {
        let mut metadata = BTreeMap::new();
        if let Some(tasks) = tasks {
            metadata.insert("tasks".to_string(), tasks.to_string());
        }
        self.plans.lock().unwrap().insert(
            id.to_string(),
            PlanMetadata {
                id: id.to_string(),
                nickname: nickname.map(|s| s.to_string()),
                metadata,
            },
        );
        self
    }

    pub fn customer_count(&self) -> usize {
        self.customers.lock().unwrap().len()
    }
}

// Unique even when many tests create objects within the same millisecond.
fn make_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[async_trait]
impl StripeService for MockStripeService {
    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        metadata: BTreeMap<String, String>,
    ) -> Result<String, StripeServiceError> {
        let id = make_id("cus_test");
        self.customers.lock().unwrap().push(CreatedCustomer {
            id: id.clone(),
            email: email.to_string(),
            name: name.map(|s| s.to_string()),
            metadata,
        });
        Ok(id)
    }

    async fn retrieve_plan(&self, plan_id: &str) -> Result<PlanMetadata, StripeServiceError> {
        if *self.fail_plan_lookup.lock().unwrap() {
            return Err(StripeServiceError::Api("mock stripe outage".into()));
        }
        self.plans
            .lock()
            .unwrap()
            .get(plan_id)
            .cloned()
            .ok_or_else(|| StripeServiceError::NotFound(format!("plan {} not found", plan_id)))
    }

    async fn create_subscription(
        &self,
        req: CreateSubscriptionRequest,
    ) -> Result<SubscriptionInfo, StripeServiceError> {
        self.subscription_requests.lock().unwrap().push(req.clone());

        let plan = self.plans.lock().unwrap().get(&req.plan_id).cloned();
        let start = req
            .backdate_start
            .unwrap_or_else(|| OffsetDateTime::now_utc().unix_timestamp());
        let sub = SubscriptionInfo {
            id: make_id("sub_test"),
            customer: req.customer_id.clone(),
            status: "active".into(),
            current_period_start: start,
            current_period_end: start + 30 * 24 * 60 * 60,
            cancel_at_period_end: false,
            plan,
        };
        self.subscriptions.lock().unwrap().push(sub.clone());
        Ok(sub)
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, StripeServiceError> {
        self.portal_sessions
            .lock()
            .unwrap()
            .push((customer_id.to_string(), return_url.to_string()));
        Ok(format!("https://billing.example.test/session/{}", customer_id))
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, StripeServiceError> {
        if signature_header.is_empty() || signature_header.contains("invalid") {
            return Err(StripeServiceError::Webhook("signature mismatch".into()));
        }
        let val: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| StripeServiceError::Serde(e.to_string()))?;
        let id = match val.get("id").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => make_id("evt"),
        };
        let ty = val
            .get("type")
            .or_else(|| val.get("type_"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let evt = StripeEvent {
            id,
            r#type: ty,
            payload: val,
        };
        self.events.lock().unwrap().push(evt.clone());
        Ok(evt)
    }
}
