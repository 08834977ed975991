use std::collections::BTreeMap;

use serde_json::Value;

use super::{PlanMetadata, StripeEvent, SubscriptionInfo};

pub const SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

// Small helper: nested json lookup
fn jget<'a>(val: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn extract_str<'a>(val: &'a Value, path: &[&str]) -> Option<&'a str> {
    jget(val, path)?.as_str()
}

fn extract_i64(val: &Value, path: &[&str]) -> Option<i64> {
    jget(val, path)?.as_i64()
}

fn extract_bool(val: &Value, path: &[&str]) -> Option<bool> {
    jget(val, path)?.as_bool()
}

/// `customer` is either an id string or, when expanded, a customer object.
fn extract_customer(val: &Value) -> Option<String> {
    match val.get("customer")? {
        Value::String(id) => Some(id.clone()),
        Value::Object(obj) => obj.get("id")?.as_str().map(|s| s.to_string()),
        _ => None,
    }
}

pub fn plan_metadata_from_value(plan: &Value) -> Option<PlanMetadata> {
    let id = extract_str(plan, &["id"])?.to_string();
    let nickname = extract_str(plan, &["nickname"])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let metadata = plan
        .get("metadata")
        .and_then(|m| m.as_object())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| match v {
                    Value::String(s) => Some((k.clone(), s.clone())),
                    Value::Number(n) => Some((k.clone(), n.to_string())),
                    _ => None,
                })
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    Some(PlanMetadata {
        id,
        nickname,
        metadata,
    })
}

/// Reads a subscription object as serialized by Stripe (webhook `data.object` or an
/// API response).
pub fn subscription_from_value(sub: &Value) -> Option<SubscriptionInfo> {
    let id = extract_str(sub, &["id"])?.to_string();
    let customer = extract_customer(sub)?;
    let status = extract_str(sub, &["status"]).unwrap_or("unknown").to_string();
    let current_period_start = extract_i64(sub, &["current_period_start"])?;
    let current_period_end = extract_i64(sub, &["current_period_end"]).unwrap_or_default();
    let cancel_at_period_end = extract_bool(sub, &["cancel_at_period_end"]).unwrap_or(false);

    let first_item = jget(sub, &["items", "data"])
        .and_then(|items| items.as_array())
        .and_then(|items| items.first());
    let plan = first_item.and_then(|item| {
        item.get("plan")
            .filter(|p| p.is_object())
            .or_else(|| item.get("price").filter(|p| p.is_object()))
            .and_then(plan_metadata_from_value)
    });

    Some(SubscriptionInfo {
        id,
        customer,
        status,
        current_period_start,
        current_period_end,
        cancel_at_period_end,
        plan,
    })
}

#[derive(Clone, Debug)]
pub enum BillingEvent {
    SubscriptionCreated(SubscriptionInfo),
    SubscriptionUpdated(SubscriptionInfo),
    SubscriptionDeleted(SubscriptionInfo),
    /// Any event we do not act on, kept by type for logging.
    Unhandled(String),
}

#[derive(Debug, thiserror::Error)]
#[error("{event_type} event {event_id} carries no readable subscription")]
pub struct MalformedEvent {
    pub event_id: String,
    pub event_type: String,
}

impl BillingEvent {
    pub fn from_stripe_event(evt: &StripeEvent) -> Result<Self, MalformedEvent> {
        let wrap: fn(SubscriptionInfo) -> BillingEvent = match evt.r#type.as_str() {
            SUBSCRIPTION_CREATED => BillingEvent::SubscriptionCreated,
            SUBSCRIPTION_UPDATED => BillingEvent::SubscriptionUpdated,
            SUBSCRIPTION_DELETED => BillingEvent::SubscriptionDeleted,
            other => return Ok(BillingEvent::Unhandled(other.to_string())),
        };

        jget(&evt.payload, &["data", "object"])
            .and_then(subscription_from_value)
            .map(wrap)
            .ok_or_else(|| MalformedEvent {
                event_id: evt.id.clone(),
                event_type: evt.r#type.clone(),
            })
    }

    pub fn event_type(&self) -> &str {
        match self {
            BillingEvent::SubscriptionCreated(_) => SUBSCRIPTION_CREATED,
            BillingEvent::SubscriptionUpdated(_) => SUBSCRIPTION_UPDATED,
            BillingEvent::SubscriptionDeleted(_) => SUBSCRIPTION_DELETED,
            BillingEvent::Unhandled(ty) => ty.as_str(),
        }
    }
}
