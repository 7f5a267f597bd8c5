//! Database layer.
//!
//! [`Store`] is the persistence seam used by every service. Production runs on
//! [`FirestoreDb`]; tests and local development use [`MemoryDb`].

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use self::memory::MemoryDb;

use crate::error::AppError;
use crate::models::{
    Credential, Location, Notification, NotificationPreferences, Provider, Reply, Review,
    Subscription, UsageCounter, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CREDENTIALS: &str = "credentials";
    pub const LOCATIONS: &str = "locations";
    /// Keyed by external review ID (globally unique)
    pub const REVIEWS: &str = "reviews";
    /// Keyed by `{user_id}_{YYYY-MM}`
    pub const USAGE: &str = "usage";
    pub const NOTIFICATION_PREFERENCES: &str = "notification_preferences";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
}

/// Filter for review listings. Results are ordered newest first.
#[derive(Debug, Clone)]
pub struct ReviewQuery {
    pub user_id: String,
    pub location_id: Option<String>,
    pub replied: Option<bool>,
    pub limit: u32,
    pub offset: u32,
}

/// A review written by [`Store::merge_synced_review`].
#[derive(Debug, Clone)]
pub struct MergedReview {
    pub review: Review,
    /// No review was stored under this ID before the write.
    pub created: bool,
}

/// Typed persistence operations.
///
/// All writes are row-scoped. Review documents are keyed by their external ID,
/// which gives upserts their idempotence.
#[async_trait]
pub trait Store: Send + Sync {
    // ─── Users ───────────────────────────────────────────────────
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError>;
    async fn upsert_user(&self, user: &User) -> Result<(), AppError>;

    // ─── Credentials ─────────────────────────────────────────────
    async fn get_credential(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<Credential>, AppError>;
    /// Create or replace the single credential of a user/provider pair.
    async fn set_credential(&self, credential: &Credential) -> Result<(), AppError>;

    // ─── Locations ───────────────────────────────────────────────
    async fn get_location(&self, location_id: &str) -> Result<Option<Location>, AppError>;
    async fn upsert_location(&self, location: &Location) -> Result<(), AppError>;
    async fn list_locations_for_user(&self, user_id: &str) -> Result<Vec<Location>, AppError>;
    async fn list_active_locations(&self) -> Result<Vec<Location>, AppError>;
    async fn touch_location_synced(
        &self,
        location_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    // ─── Reviews ─────────────────────────────────────────────────
    async fn get_review(&self, external_id: &str) -> Result<Option<Review>, AppError>;
    /// Read, merge and write one review atomically.
    ///
    /// `merge` gets the stored review, if any, and returns the document to
    /// store. A reply recorded by [`Store::mark_review_replied`] is either
    /// seen by `merge` or lands after the write, never in between.
    async fn merge_synced_review(
        &self,
        external_id: &str,
        merge: &(dyn Fn(Option<Review>) -> Review + Send + Sync),
    ) -> Result<MergedReview, AppError>;
    async fn list_reviews(&self, query: &ReviewQuery) -> Result<Vec<Review>, AppError>;
    /// Write all reply fields of a review in one update.
    ///
    /// Returns `false` without writing when the review is missing or already
    /// replied.
    async fn mark_review_replied(&self, reply: &Reply) -> Result<bool, AppError>;

    // ─── Usage ───────────────────────────────────────────────────
    /// Increment the manual reply counter and return the new value.
    async fn increment_manual_replies(&self, user_id: &str, month: &str)
        -> Result<u32, AppError>;
    async fn get_usage(&self, user_id: &str, month: &str)
        -> Result<Option<UsageCounter>, AppError>;

    // ─── Notifications ───────────────────────────────────────────
    async fn get_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationPreferences>, AppError>;
    async fn set_preferences(
        &self,
        user_id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<(), AppError>;
    async fn insert_notification(&self, notification: &Notification) -> Result<(), AppError>;
    async fn list_notifications(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Notification>, AppError>;

    // ─── Billing ─────────────────────────────────────────────────
    async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>, AppError>;
    async fn set_subscription(&self, subscription: &Subscription) -> Result<(), AppError>;
    async fn find_subscription_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<Subscription>, AppError>;
}
