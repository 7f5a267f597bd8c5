// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store backed by concurrent maps.
//!
//! Same semantics as Firestore for every [`Store`] operation. Used by tests and
//! by local development (`DATASTORE=memory`).

use crate::db::{MergedReview, ReviewQuery, Store};
use crate::error::AppError;
use crate::models::{
    Credential, Location, Notification, NotificationPreferences, Provider, Reply, Review,
    Subscription, UsageCounter, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// In-memory database.
#[derive(Default)]
pub struct MemoryDb {
    users: DashMap<String, User>,
    credentials: DashMap<String, Credential>,
    locations: DashMap<String, Location>,
    reviews: DashMap<String, Review>,
    usage: DashMap<String, UsageCounter>,
    preferences: DashMap<String, NotificationPreferences>,
    notifications: DashMap<String, Notification>,
    subscriptions: DashMap<String, Subscription>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reviews.
    pub fn review_count(&self) -> usize {
        self.reviews.len()
    }
}

#[async_trait]
impl Store for MemoryDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn get_credential(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<Credential>, AppError> {
        Ok(self
            .credentials
            .get(&Credential::key(user_id, provider))
            .map(|c| c.clone()))
    }

    async fn set_credential(&self, credential: &Credential) -> Result<(), AppError> {
        self.credentials
            .insert(credential.doc_id(), credential.clone());
        Ok(())
    }

    async fn get_location(&self, location_id: &str) -> Result<Option<Location>, AppError> {
        Ok(self.locations.get(location_id).map(|l| l.clone()))
    }

    async fn upsert_location(&self, location: &Location) -> Result<(), AppError> {
        self.locations.insert(location.id.clone(), location.clone());
        Ok(())
    }

    async fn list_locations_for_user(&self, user_id: &str) -> Result<Vec<Location>, AppError> {
        let mut locations: Vec<Location> = self
            .locations
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.clone())
            .collect();
        locations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(locations)
    }

    async fn list_active_locations(&self) -> Result<Vec<Location>, AppError> {
        Ok(self
            .locations
            .iter()
            .filter(|l| l.is_active)
            .map(|l| l.clone())
            .collect())
    }

    async fn touch_location_synced(
        &self,
        location_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        match self.locations.get_mut(location_id) {
            Some(mut location) => {
                location.last_synced_at = Some(at);
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Location {}", location_id))),
        }
    }

    async fn get_review(&self, external_id: &str) -> Result<Option<Review>, AppError> {
        Ok(self.reviews.get(external_id).map(|r| r.clone()))
    }

    async fn merge_synced_review(
        &self,
        external_id: &str,
        merge: &(dyn Fn(Option<Review>) -> Review + Send + Sync),
    ) -> Result<MergedReview, AppError> {
        // The entry holds the shard lock that mark_review_replied also takes.
        let merged = match self.reviews.entry(external_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let review = merge(Some(entry.get().clone()));
                entry.insert(review.clone());
                MergedReview {
                    review,
                    created: false,
                }
            }
            Entry::Vacant(entry) => {
                let review = merge(None);
                entry.insert(review.clone());
                MergedReview {
                    review,
                    created: true,
                }
            }
        };
        Ok(merged)
    }

    async fn list_reviews(&self, query: &ReviewQuery) -> Result<Vec<Review>, AppError> {
        let mut reviews: Vec<Review> = self
            .reviews
            .iter()
            .filter(|r| r.user_id == query.user_id)
            .filter(|r| {
                query
                    .location_id
                    .as_deref()
                    .map_or(true, |id| r.location_id == id)
            })
            .filter(|r| query.replied.map_or(true, |replied| r.replied == replied))
            .map(|r| r.clone())
            .collect();

        reviews.sort_by(|a, b| {
            b.review_date
                .cmp(&a.review_date)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });

        Ok(reviews
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn mark_review_replied(&self, reply: &Reply) -> Result<bool, AppError> {
        // The shard lock held by get_mut makes check-and-set atomic.
        match self.reviews.get_mut(&reply.review_id) {
            Some(mut review) if !review.replied => {
                review.apply_reply(reply);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_manual_replies(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<u32, AppError> {
        let mut entry = self
            .usage
            .entry(UsageCounter::key(user_id, month))
            .or_insert_with(|| UsageCounter {
                user_id: user_id.to_string(),
                month: month.to_string(),
                manual_replies: 0,
            });
        entry.manual_replies += 1;
        Ok(entry.manual_replies)
    }

    async fn get_usage(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<Option<UsageCounter>, AppError> {
        Ok(self
            .usage
            .get(&UsageCounter::key(user_id, month))
            .map(|u| u.clone()))
    }

    async fn get_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationPreferences>, AppError> {
        Ok(self.preferences.get(user_id).map(|p| p.clone()))
    }

    async fn set_preferences(
        &self,
        user_id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<(), AppError> {
        self.preferences
            .insert(user_id.to_string(), preferences.clone());
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), AppError> {
        self.notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Notification>, AppError> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.clone())
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications.truncate(limit as usize);
        Ok(notifications)
    }

    async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>, AppError> {
        Ok(self.subscriptions.get(user_id).map(|s| s.clone()))
    }

    async fn set_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        self.subscriptions
            .insert(subscription.user_id.clone(), subscription.clone());
        Ok(())
    }

    async fn find_subscription_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        Ok(self
            .subscriptions
            .iter()
            .find(|s| s.stripe_customer_id.as_deref() == Some(customer_id))
            .map(|s| s.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReplySource;

    async fn store(db: &MemoryDb, review: Review) {
        let id = review.external_id.clone();
        db.merge_synced_review(&id, &move |_: Option<Review>| review.clone())
            .await
            .unwrap();
    }

    fn review(id: &str, user: &str, minutes_ago: i64) -> Review {
        let now = Utc::now();
        Review {
            external_id: id.to_string(),
            location_id: "loc_a".to_string(),
            user_id: user.to_string(),
            author: "Bob".to_string(),
            rating: 4,
            comment: None,
            review_date: now - chrono::Duration::minutes(minutes_ago),
            replied: false,
            reply_text: None,
            reply_source: None,
            replied_at: None,
            first_seen_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_mark_review_replied_only_once() {
        let db = MemoryDb::new();
        store(&db, review("r1", "u1", 0)).await;

        let first = Reply {
            review_id: "r1".to_string(),
            text: "Thanks".to_string(),
            source: ReplySource::Manual,
            replied_at: Utc::now(),
        };
        let second = Reply {
            text: "Overwrite".to_string(),
            ..first.clone()
        };

        assert!(db.mark_review_replied(&first).await.unwrap());
        assert!(!db.mark_review_replied(&second).await.unwrap());

        let stored = db.get_review("r1").await.unwrap().unwrap();
        assert_eq!(stored.reply_text.as_deref(), Some("Thanks"));
    }

    #[tokio::test]
    async fn test_merge_sees_stored_reply() {
        let db = MemoryDb::new();
        store(&db, review("r1", "u1", 0)).await;
        let reply = Reply {
            review_id: "r1".to_string(),
            text: "Merci".to_string(),
            source: ReplySource::Ai,
            replied_at: Utc::now(),
        };
        assert!(db.mark_review_replied(&reply).await.unwrap());

        let merged = db
            .merge_synced_review("r1", &|existing: Option<Review>| {
                let mut r = existing.unwrap();
                r.rating = 1;
                r
            })
            .await
            .unwrap();

        assert!(!merged.created);
        assert_eq!(merged.review.rating, 1);
        let stored = db.get_review("r1").await.unwrap().unwrap();
        assert_eq!(stored.reply_text.as_deref(), Some("Merci"));
        assert_eq!(stored.reply_source, Some(ReplySource::Ai));
    }

    #[tokio::test]
    async fn test_mark_missing_review_is_noop() {
        let db = MemoryDb::new();
        let reply = Reply {
            review_id: "missing".to_string(),
            text: "x".to_string(),
            source: ReplySource::Manual,
            replied_at: Utc::now(),
        };
        assert!(!db.mark_review_replied(&reply).await.unwrap());
        assert_eq!(db.review_count(), 0);
    }

    #[tokio::test]
    async fn test_list_reviews_scoped_and_ordered() {
        let db = MemoryDb::new();
        store(&db, review("old", "u1", 60)).await;
        store(&db, review("new", "u1", 1)).await;
        store(&db, review("other", "u2", 0)).await;

        let reviews = db
            .list_reviews(&ReviewQuery {
                user_id: "u1".to_string(),
                location_id: None,
                replied: Some(false),
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();

        let ids: Vec<&str> = reviews.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_usage_counter_increments() {
        let db = MemoryDb::new();
        assert_eq!(db.increment_manual_replies("u1", "2026-10").await.unwrap(), 1);
        assert_eq!(db.increment_manual_replies("u1", "2026-10").await.unwrap(), 2);
        assert_eq!(db.increment_manual_replies("u1", "2026-11").await.unwrap(), 1);
    }
}
