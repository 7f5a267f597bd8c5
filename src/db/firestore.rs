// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users and their Google credentials
//! - Locations and their reviews
//! - Usage counters, notification settings and notifications
//! - Billing subscriptions

use crate::db::{collections, MergedReview, ReviewQuery, Store};
use crate::error::AppError;
use crate::models::{
    Credential, Location, Notification, NotificationPreferences, Provider, Reply, Review,
    Subscription, UsageCounter, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Commit attempts for a contended read-modify-write.
const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    /// A view of this client whose reads join `transaction`.
    fn reading_in(&self, transaction: &firestore::FirestoreTransaction<'_>) -> Self {
        Self {
            client: self.client.clone_with_consistency_selector(
                firestore::FirestoreConsistencySelector::Transaction(
                    transaction.transaction_id().clone(),
                ),
            ),
        }
    }

    /// One transactional attempt of [`Store::merge_synced_review`].
    async fn try_merge_review(
        &self,
        external_id: &str,
        merge: &(dyn Fn(Option<Review>) -> Review + Send + Sync),
    ) -> Result<MergedReview, AppError> {
        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let existing: Option<Review> = self
            .reading_in(&transaction)
            .get_doc(collections::REVIEWS, external_id)
            .await?;
        let created = existing.is_none();
        let review = merge(existing);

        self.client
            .fluent()
            .update()
            .in_col(collections::REVIEWS)
            .document_id(external_id)
            .object(&review)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add review to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(MergedReview { review, created })
    }

    /// Fetch one document by ID.
    async fn get_doc<T>(&self, collection: &str, id: &str) -> Result<Option<T>, AppError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        self.client
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or overwrite one document.
    async fn set_doc<T>(&self, collection: &str, id: &str, object: &T) -> Result<(), AppError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Sync + Send,
    {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Store for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_doc(collections::USERS, user_id).await
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.set_doc(collections::USERS, &user.user_id, user).await
    }

    // ─── Credential Operations ───────────────────────────────────

    async fn get_credential(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> Result<Option<Credential>, AppError> {
        self.get_doc(collections::CREDENTIALS, &Credential::key(user_id, provider))
            .await
    }

    async fn set_credential(&self, credential: &Credential) -> Result<(), AppError> {
        self.set_doc(collections::CREDENTIALS, &credential.doc_id(), credential)
            .await
    }

    // ─── Location Operations ─────────────────────────────────────

    async fn get_location(&self, location_id: &str) -> Result<Option<Location>, AppError> {
        self.get_doc(collections::LOCATIONS, location_id).await
    }

    async fn upsert_location(&self, location: &Location) -> Result<(), AppError> {
        self.set_doc(collections::LOCATIONS, &location.id, location)
            .await
    }

    async fn list_locations_for_user(&self, user_id: &str) -> Result<Vec<Location>, AppError> {
        let user_id = user_id.to_string();
        self.client
            .fluent()
            .select()
            .from(collections::LOCATIONS)
            .filter(move |q| q.field("user_id").eq(user_id.clone()))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_active_locations(&self) -> Result<Vec<Location>, AppError> {
        self.client
            .fluent()
            .select()
            .from(collections::LOCATIONS)
            .filter(|q| q.field("is_active").eq(true))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn touch_location_synced(
        &self,
        location_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        // Fetch-modify-write to preserve other fields
        let Some(mut location) = self.get_location(location_id).await? else {
            return Err(AppError::NotFound(format!("Location {}", location_id)));
        };
        location.last_synced_at = Some(at);
        self.upsert_location(&location).await
    }

    // ─── Review Operations ───────────────────────────────────────

    async fn get_review(&self, external_id: &str) -> Result<Option<Review>, AppError> {
        self.get_doc(collections::REVIEWS, external_id).await
    }

    async fn merge_synced_review(
        &self,
        external_id: &str,
        merge: &(dyn Fn(Option<Review>) -> Review + Send + Sync),
    ) -> Result<MergedReview, AppError> {
        let mut attempt = 1;
        loop {
            match self.try_merge_review(external_id, merge).await {
                Ok(merged) => return Ok(merged),
                Err(e) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(review_id = external_id, attempt, error = %e, "Review merge conflicted, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn list_reviews(&self, query: &ReviewQuery) -> Result<Vec<Review>, AppError> {
        let user_id = query.user_id.clone();
        let location_id = query.location_id.clone();
        let replied = query.replied;

        self.client
            .fluent()
            .select()
            .from(collections::REVIEWS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    location_id
                        .clone()
                        .and_then(|id| q.field("location_id").eq(id)),
                    replied.and_then(|r| q.field("replied").eq(r)),
                ])
            })
            .order_by([(
                "review_date",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .limit(query.limit)
            .offset(query.offset)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn mark_review_replied(&self, reply: &Reply) -> Result<bool, AppError> {
        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Read inside the transaction so a concurrent reply aborts the commit
        let in_txn = self.reading_in(&transaction);
        let Some(mut review) = in_txn.get_review(&reply.review_id).await? else {
            let _ = transaction.rollback().await;
            return Ok(false);
        };

        if review.replied {
            tracing::debug!(review_id = %reply.review_id, "Review already replied, not overwriting");
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        // All reply fields live in the same document, so one write covers them.
        review.apply_reply(reply);
        self.client
            .fluent()
            .update()
            .in_col(collections::REVIEWS)
            .document_id(&review.external_id)
            .object(&review)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add reply to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;
        Ok(true)
    }

    // ─── Usage Operations ────────────────────────────────────────

    async fn increment_manual_replies(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<u32, AppError> {
        let key = UsageCounter::key(user_id, month);

        let mut transaction = self
            .client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let in_txn = self.reading_in(&transaction);
        let mut usage: UsageCounter = in_txn
            .get_doc(collections::USAGE, &key)
            .await?
            .unwrap_or_else(|| UsageCounter {
                user_id: user_id.to_string(),
                month: month.to_string(),
                manual_replies: 0,
            });
        usage.manual_replies += 1;

        self.client
            .fluent()
            .update()
            .in_col(collections::USAGE)
            .document_id(&key)
            .object(&usage)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add usage to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;
        Ok(usage.manual_replies)
    }

    async fn get_usage(
        &self,
        user_id: &str,
        month: &str,
    ) -> Result<Option<UsageCounter>, AppError> {
        self.get_doc(collections::USAGE, &UsageCounter::key(user_id, month))
            .await
    }

    // ─── Notification Operations ─────────────────────────────────

    async fn get_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<NotificationPreferences>, AppError> {
        self.get_doc(collections::NOTIFICATION_PREFERENCES, user_id)
            .await
    }

    async fn set_preferences(
        &self,
        user_id: &str,
        preferences: &NotificationPreferences,
    ) -> Result<(), AppError> {
        self.set_doc(collections::NOTIFICATION_PREFERENCES, user_id, preferences)
            .await
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<(), AppError> {
        self.set_doc(collections::NOTIFICATIONS, &notification.id, notification)
            .await
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Notification>, AppError> {
        let user_id = user_id.to_string();
        self.client
            .fluent()
            .select()
            .from(collections::NOTIFICATIONS)
            .filter(move |q| q.field("user_id").eq(user_id.clone()))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Billing Operations ──────────────────────────────────────

    async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>, AppError> {
        self.get_doc(collections::SUBSCRIPTIONS, user_id).await
    }

    async fn set_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        self.set_doc(
            collections::SUBSCRIPTIONS,
            &subscription.user_id,
            subscription,
        )
        .await
    }

    async fn find_subscription_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let customer_id = customer_id.to_string();
        let matches: Vec<Subscription> = self
            .client
            .fluent()
            .select()
            .from(collections::SUBSCRIPTIONS)
            .filter(move |q| q.field("stripe_customer_id").eq(customer_id.clone()))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(matches.into_iter().next())
    }
}
