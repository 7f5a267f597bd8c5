//! Notification preferences and in-app notification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Delivery channels a user has enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannels {
    pub in_app: bool,
    pub browser: bool,
    /// Placeholder: email delivery is only logged
    pub email: bool,
}

impl Default for NotificationChannels {
    fn default() -> Self {
        Self {
            in_app: true,
            browser: false,
            email: false,
        }
    }
}

/// Per-user notification filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NotificationPreferences {
    /// Notify on every new review
    pub notify_all: bool,
    /// Notify on reviews at or below `low_rating_threshold`
    pub notify_low_rating: bool,
    #[validate(range(min = 1, max = 5))]
    pub low_rating_threshold: u8,
    #[serde(default)]
    pub channels: NotificationChannels,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            notify_all: true,
            notify_low_rating: true,
            low_rating_threshold: 2,
            channels: NotificationChannels::default(),
        }
    }
}

/// Why a review produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationReason {
    LowRating,
    NewReview,
}

/// A notification about one newly ingested review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// `{review_id}` (one notification per review at most)
    pub id: String,
    pub user_id: String,
    pub review_id: String,
    pub location_id: String,
    pub author: String,
    pub rating: u8,
    /// First characters of the review comment
    pub excerpt: Option<String>,
    pub reason: NotificationReason,
    pub created_at: DateTime<Utc>,
}
