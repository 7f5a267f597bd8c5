// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription plan and usage models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Billing plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Business,
}

/// Monthly reply allowances. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub manual_replies: Option<u32>,
    pub ai_replies: Option<u32>,
}

impl Plan {
    pub fn limits(&self) -> PlanLimits {
        match self {
            Plan::Free => PlanLimits {
                manual_replies: Some(10),
                ai_replies: Some(5),
            },
            Plan::Pro => PlanLimits {
                manual_replies: Some(200),
                ai_replies: Some(100),
            },
            Plan::Business => PlanLimits {
                manual_replies: None,
                ai_replies: None,
            },
        }
    }
}

/// Billing state of a user, keyed by user ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    /// Raw provider status (`active`, `past_due`, ...)
    pub status: String,
    pub plan: Plan,
    pub current_period_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Manual-reply counter for one user and one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub user_id: String,
    /// `YYYY-MM`
    pub month: String,
    pub manual_replies: u32,
}

impl UsageCounter {
    pub fn key(user_id: &str, month: &str) -> String {
        format!("{}_{}", user_id, month)
    }
}
