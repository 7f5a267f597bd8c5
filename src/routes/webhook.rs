// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Stripe billing events.

use crate::error::AppError;
use crate::services::billing::verify_stripe_signature;
use crate::services::{EventOutcome, StripeEvent};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/stripe", post(handle_event))
}

#[derive(Serialize)]
struct WebhookAck {
    received: bool,
}

/// Receive a Stripe event (POST).
///
/// The signature covers the raw body, so the body is taken as bytes and only
/// parsed after verification. Events we do not handle are acknowledged with
/// 200 so Stripe stops retrying them.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
    else {
        tracing::warn!("Security Alert: Stripe webhook without signature header");
        return AppError::Validation("Missing Stripe-Signature header".to_string())
            .into_response();
    };

    let now = chrono::Utc::now().timestamp();
    if let Err(e) =
        verify_stripe_signature(signature, &body, &state.config.stripe_webhook_secret, now)
    {
        tracing::warn!(error = %e, "Security Alert: Stripe webhook signature rejected");
        return e.into_response();
    }

    let event: StripeEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable Stripe event");
            return AppError::Validation("Malformed event".to_string()).into_response();
        }
    };

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Received Stripe event");

    match state.billing().handle_event(&event).await {
        Ok(EventOutcome::Applied { user_id, plan }) => {
            tracing::info!(event_id = %event.id, user_id = %user_id, plan = ?plan, "Subscription updated");
        }
        Ok(EventOutcome::Ignored(reason)) => {
            tracing::debug!(event_id = %event.id, reason, "Stripe event ignored");
        }
        Err(e) => {
            // Non-2xx makes Stripe redeliver the event
            tracing::error!(event_id = %event.id, error = %e, "Failed to apply Stripe event");
            return e.into_response();
        }
    }

    (StatusCode::OK, Json(WebhookAck { received: true })).into_response()
}
