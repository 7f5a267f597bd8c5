// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stripe webhook verification and subscription-to-plan mapping.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{Plan, Subscription};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`).
///
/// The signed payload is `"{t}.{raw_body}"`. Any matching `v1` signature is
/// accepted, compared in constant time.
pub fn verify_stripe_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    now: i64,
) -> Result<(), AppError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }

    let timestamp_raw =
        timestamp.ok_or_else(|| AppError::Validation("Signature missing timestamp".to_string()))?;
    let signed_at: i64 = timestamp_raw
        .parse()
        .map_err(|_| AppError::Validation("Signature timestamp invalid".to_string()))?;

    if (now - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::Validation(
            "Signature timestamp outside tolerance".to_string(),
        ));
    }
    if signatures.is_empty() {
        return Err(AppError::Validation("No v1 signature".to_string()));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(timestamp_raw.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    let matched = signatures
        .iter()
        .any(|sig| sig.len() == expected.len() && bool::from(sig.as_bytes().ct_eq(expected.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(AppError::Validation("Signature mismatch".to_string()))
    }
}

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CheckoutSession {
    customer: Option<String>,
    subscription: Option<String>,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StripeSubscription {
    id: String,
    customer: Option<String>,
    #[serde(default)]
    status: String,
    current_period_end: Option<i64>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
    #[serde(default)]
    items: SubscriptionItems,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionItem {
    price: Price,
}

#[derive(Debug, Clone, Deserialize)]
struct Price {
    id: String,
}

/// What a webhook event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied { user_id: String, plan: Plan },
    Ignored(&'static str),
}

/// Applies billing events to stored subscriptions.
#[derive(Clone)]
pub struct BillingService {
    db: Arc<dyn Store>,
    price_pro: String,
    price_business: String,
}

impl BillingService {
    pub fn new(db: Arc<dyn Store>, price_pro: String, price_business: String) -> Self {
        Self {
            db,
            price_pro,
            price_business,
        }
    }

    /// Plan for a subscription status and price.
    pub fn plan_for(&self, status: &str, price_id: Option<&str>) -> Plan {
        match status {
            "active" | "trialing" => match price_id {
                Some(p) if !self.price_business.is_empty() && p == self.price_business => {
                    Plan::Business
                }
                Some(p) if !self.price_pro.is_empty() && p == self.price_pro => Plan::Pro,
                _ => Plan::Pro,
            },
            _ => Plan::Free,
        }
    }

    /// Apply a verified event.
    pub async fn handle_event(&self, event: &StripeEvent) -> Result<EventOutcome, AppError> {
        match event.event_type.as_str() {
            "checkout.session.completed" => self.handle_checkout(event).await,
            "customer.subscription.created"
            | "customer.subscription.updated"
            | "customer.subscription.deleted" => self.handle_subscription(event).await,
            _ => Ok(EventOutcome::Ignored("unhandled event type")),
        }
    }

    async fn handle_checkout(&self, event: &StripeEvent) -> Result<EventOutcome, AppError> {
        let session: CheckoutSession = serde_json::from_value(event.data.object.clone())
            .map_err(|e| AppError::Validation(format!("Checkout session: {}", e)))?;

        let Some(user_id) = session
            .metadata
            .get("user_id")
            .cloned()
            .or(session.client_reference_id)
        else {
            return Ok(EventOutcome::Ignored("checkout without user"));
        };

        let now = Utc::now();
        let mut subscription = self
            .db
            .get_subscription(&user_id)
            .await?
            .unwrap_or_else(|| empty_subscription(&user_id, now));

        subscription.stripe_customer_id = session.customer.or(subscription.stripe_customer_id);
        subscription.stripe_subscription_id = session
            .subscription
            .or(subscription.stripe_subscription_id);
        subscription.updated_at = now;

        self.db.set_subscription(&subscription).await?;
        tracing::info!(user_id, event_id = %event.id, "Checkout linked to customer");

        Ok(EventOutcome::Applied {
            user_id,
            plan: subscription.plan,
        })
    }

    async fn handle_subscription(&self, event: &StripeEvent) -> Result<EventOutcome, AppError> {
        let remote: StripeSubscription = serde_json::from_value(event.data.object.clone())
            .map_err(|e| AppError::Validation(format!("Subscription object: {}", e)))?;

        let existing = match (remote.metadata.get("user_id"), remote.customer.as_deref()) {
            (Some(user_id), _) => Some(
                self.db
                    .get_subscription(user_id)
                    .await?
                    .unwrap_or_else(|| empty_subscription(user_id, Utc::now())),
            ),
            (None, Some(customer)) => self.db.find_subscription_by_customer(customer).await?,
            (None, None) => None,
        };

        let Some(mut subscription) = existing else {
            tracing::warn!(event_id = %event.id, "Subscription event for unknown customer");
            return Ok(EventOutcome::Ignored("unknown customer"));
        };

        let deleted = event.event_type == "customer.subscription.deleted";
        let price_id = remote.items.data.first().map(|i| i.price.id.as_str());
        let plan = if deleted {
            Plan::Free
        } else {
            self.plan_for(&remote.status, price_id)
        };

        subscription.stripe_customer_id = remote.customer.or(subscription.stripe_customer_id);
        subscription.stripe_subscription_id = Some(remote.id);
        subscription.status = if deleted {
            "canceled".to_string()
        } else {
            remote.status
        };
        subscription.plan = plan;
        subscription.current_period_end = remote
            .current_period_end
            .and_then(|t| DateTime::from_timestamp(t, 0));
        subscription.updated_at = Utc::now();

        self.db.set_subscription(&subscription).await?;
        tracing::info!(
            user_id = %subscription.user_id,
            event_id = %event.id,
            status = %subscription.status,
            plan = ?plan,
            "Subscription updated"
        );

        Ok(EventOutcome::Applied {
            user_id: subscription.user_id,
            plan,
        })
    }
}

fn empty_subscription(user_id: &str, now: DateTime<Utc>) -> Subscription {
    Subscription {
        user_id: user_id.to_string(),
        stripe_customer_id: None,
        stripe_subscription_id: None,
        status: "none".to_string(),
        plan: Plan::Free,
        current_period_end: None,
        updated_at: now,
    }
}

/// Sign a payload the way Stripe does. Used by tests and local tooling.
pub fn sign_payload(body: &[u8], secret: &str, timestamp: i64) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;

    const SECRET: &str = "whsec_test";

    fn service(db: Arc<MemoryDb>) -> BillingService {
        BillingService::new(db, "price_pro".to_string(), "price_business".to_string())
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"id":"evt_1"}"#;
        let header = sign_payload(body, SECRET, 1_700_000_000).unwrap();
        assert!(verify_stripe_signature(&header, body, SECRET, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign_payload(b"original", SECRET, 1_700_000_000).unwrap();
        assert!(verify_stripe_signature(&header, b"tampered", SECRET, 1_700_000_000).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let header = sign_payload(b"x", SECRET, 1_700_000_000).unwrap();
        assert!(verify_stripe_signature(&header, b"x", SECRET, 1_700_000_301).is_err());
    }

    #[test]
    fn test_any_v1_signature_may_match() {
        let good = sign_payload(b"x", SECRET, 1_700_000_000).unwrap();
        let v1 = good.split_once("v1=").unwrap().1;
        let header = format!("t=1700000000,v1=deadbeef,v0=abc,v1={}", v1);
        assert!(verify_stripe_signature(&header, b"x", SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_missing_parts_rejected() {
        assert!(verify_stripe_signature("v1=abc", b"x", SECRET, 0).is_err());
        assert!(verify_stripe_signature("t=0", b"x", SECRET, 0).is_err());
        assert!(verify_stripe_signature("garbage", b"x", SECRET, 0).is_err());
    }

    #[test]
    fn test_plan_mapping() {
        let svc = service(Arc::new(MemoryDb::new()));
        assert_eq!(svc.plan_for("active", Some("price_business")), Plan::Business);
        assert_eq!(svc.plan_for("trialing", Some("price_pro")), Plan::Pro);
        assert_eq!(svc.plan_for("active", Some("price_unknown")), Plan::Pro);
        assert_eq!(svc.plan_for("past_due", Some("price_business")), Plan::Free);
        assert_eq!(svc.plan_for("canceled", None), Plan::Free);
    }

    fn event(event_type: &str, object: serde_json::Value) -> StripeEvent {
        StripeEvent {
            id: "evt_1".to_string(),
            event_type: event_type.to_string(),
            data: StripeEventData { object },
        }
    }

    #[tokio::test]
    async fn test_checkout_then_subscription_by_customer() {
        let db = Arc::new(MemoryDb::new());
        let svc = service(db.clone());

        svc.handle_event(&event(
            "checkout.session.completed",
            serde_json::json!({
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": { "user_id": "u1" }
            }),
        ))
        .await
        .unwrap();

        let outcome = svc
            .handle_event(&event(
                "customer.subscription.updated",
                serde_json::json!({
                    "id": "sub_1",
                    "customer": "cus_1",
                    "status": "active",
                    "current_period_end": 1_800_000_000,
                    "items": { "data": [ { "price": { "id": "price_business" } } ] }
                }),
            ))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EventOutcome::Applied {
                user_id: "u1".to_string(),
                plan: Plan::Business
            }
        );

        let stored = db.get_subscription("u1").await.unwrap().unwrap();
        assert_eq!(stored.plan, Plan::Business);
        assert_eq!(stored.status, "active");

        svc.handle_event(&event(
            "customer.subscription.deleted",
            serde_json::json!({ "id": "sub_1", "customer": "cus_1", "status": "active" }),
        ))
        .await
        .unwrap();
        assert_eq!(
            db.get_subscription("u1").await.unwrap().unwrap().plan,
            Plan::Free
        );
    }

    #[tokio::test]
    async fn test_unknown_customer_ignored() {
        let svc = service(Arc::new(MemoryDb::new()));
        let outcome = svc
            .handle_event(&event(
                "customer.subscription.updated",
                serde_json::json!({ "id": "sub_9", "customer": "cus_9", "status": "active" }),
            ))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Ignored("unknown customer"));
    }

    #[tokio::test]
    async fn test_unhandled_event_ignored() {
        let svc = service(Arc::new(MemoryDb::new()));
        let outcome = svc
            .handle_event(&event("invoice.paid", serde_json::json!({})))
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Ignored(_)));
    }
}
