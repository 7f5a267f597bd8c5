// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Review ingestion: page through a location's reviews and upsert them.
//!
//! A sync:
//! 1. Gets a valid access token (Business Profile locations only)
//! 2. Fetches pages until there is no continuation token or the page ceiling
//! 3. Normalizes each review and merges it into the one stored under its
//!    external ID, in a single atomic read-modify-write
//! 4. Touches the location's `last_synced_at`, whatever happened
//! 5. Hands newly added reviews to the notification dispatcher

use crate::db::Store;
use crate::error::AppError;
use crate::models::{Location, LocationSource, Reply, ReplySource, Review, SyncResult};
use crate::services::credentials::CredentialService;
use crate::services::google::ReviewPlatform;
use crate::services::normalize::NormalizedReview;
use crate::services::notify::NotificationDispatcher;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of a sync: the counters plus the reviews seen for the first time.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub result: SyncResult,
    pub new_reviews: Vec<Review>,
}

/// Review ingestor for one invocation.
#[derive(Clone)]
pub struct ReviewIngestor {
    db: Arc<dyn Store>,
    platform: Arc<dyn ReviewPlatform>,
    credentials: CredentialService,
    notifier: NotificationDispatcher,
    max_pages: u32,
}

impl ReviewIngestor {
    pub fn new(
        db: Arc<dyn Store>,
        platform: Arc<dyn ReviewPlatform>,
        notifier: NotificationDispatcher,
        max_pages: u32,
    ) -> Self {
        Self {
            credentials: CredentialService::new(db.clone(), platform.clone()),
            db,
            platform,
            notifier,
            max_pages: max_pages.max(1),
        }
    }

    /// Sync one location.
    ///
    /// Page failures end the loop early and come back as a partial result.
    /// Failures before the first page (unparseable location, missing or expired
    /// credential) are returned as errors. Either way `last_synced_at` is
    /// updated.
    pub async fn sync(&self, location: &Location) -> Result<SyncOutcome, AppError> {
        let started_at = Utc::now();
        let outcome = self.sync_pages(location, started_at).await;

        if let Err(e) = self.db.touch_location_synced(&location.id, started_at).await {
            tracing::warn!(location_id = %location.id, error = %e, "Failed to update last_synced_at");
        }

        let outcome = outcome?;

        tracing::info!(
            location_id = %location.id,
            added = outcome.result.added,
            updated = outcome.result.updated,
            total_fetched = outcome.result.total_fetched,
            partial = outcome.result.partial,
            "Sync finished"
        );

        // Fire-and-forget: never affects the sync result
        self.notifier
            .dispatch(&location.user_id, outcome.new_reviews.clone());

        Ok(outcome)
    }

    async fn sync_pages(
        &self,
        location: &Location,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, AppError> {
        let source = location.source().ok_or_else(|| {
            AppError::Validation(format!("Unsupported location id {}", location.external_id))
        })?;

        let access_token = match source {
            LocationSource::BusinessProfile { .. } => {
                self.credentials
                    .get_valid_access_token(&location.user_id)
                    .await?
            }
            LocationSource::Places { .. } => String::new(),
        };

        let mut outcome = SyncOutcome::default();
        let mut page_token: Option<String> = None;

        for page in 0..self.max_pages {
            let fetched = self
                .platform
                .list_reviews(&access_token, &source, page_token.as_deref())
                .await;

            let reviews_page = match fetched {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(location_id = %location.id, page, error = %e, "Review page fetch failed");
                    outcome.result.partial = true;
                    outcome.result.error = Some(e.to_string());
                    break;
                }
            };

            outcome.result.total_fetched += reviews_page.reviews.len() as u32;

            for remote in &reviews_page.reviews {
                let normalized = remote.normalize(&location.external_id);
                if let Err(e) = self.ingest_one(location, normalized, now, &mut outcome).await {
                    tracing::warn!(location_id = %location.id, page, error = %e, "Review upsert failed");
                    outcome.result.partial = true;
                    outcome.result.error = Some(e.to_string());
                    return Ok(outcome);
                }
            }

            page_token = reviews_page.next_page_token;
            if page_token.is_none() {
                break;
            }
            if page + 1 == self.max_pages {
                tracing::warn!(
                    location_id = %location.id,
                    max_pages = self.max_pages,
                    "Page ceiling reached, remaining reviews left for next sync"
                );
            }
        }

        Ok(outcome)
    }

    async fn ingest_one(
        &self,
        location: &Location,
        normalized: NormalizedReview,
        now: DateTime<Utc>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), AppError> {
        // Re-seeing a review never counts as added.
        let merged = self
            .db
            .merge_synced_review(&normalized.external_id, &|existing: Option<Review>| {
                merge_review(existing, normalized.clone(), location, now)
            })
            .await?;

        if merged.created {
            outcome.result.added += 1;
            outcome.new_reviews.push(merged.review);
        } else {
            outcome.result.updated += 1;
        }
        Ok(())
    }
}

/// Combine a stored review (if any) with a freshly fetched one.
///
/// Content fields follow the platform. A remote reply is adopted when the
/// local review has none, or when its text differs and it is newer than the
/// local one. Local reply provenance is otherwise kept, and a missing remote
/// reply never clears a local one.
pub fn merge_review(
    existing: Option<Review>,
    normalized: NormalizedReview,
    location: &Location,
    now: DateTime<Utc>,
) -> Review {
    let NormalizedReview {
        external_id,
        author,
        rating,
        comment,
        review_date,
        remote_reply,
    } = normalized;

    let mut review = match existing {
        Some(mut r) => {
            r.author = author;
            r.rating = rating;
            r.comment = comment;
            r.review_date = review_date;
            r.updated_at = now;
            r
        }
        None => Review {
            external_id: external_id.clone(),
            location_id: location.id.clone(),
            user_id: location.user_id.clone(),
            author,
            rating,
            comment,
            review_date,
            replied: false,
            reply_text: None,
            reply_source: None,
            replied_at: None,
            first_seen_at: now,
            updated_at: now,
        },
    };

    if let Some(remote) = remote_reply {
        let adopt = if !review.replied {
            true
        } else {
            let differs = review.reply_text.as_deref() != Some(remote.text.as_str());
            let newer = match (remote.updated_at, review.replied_at) {
                (Some(remote_at), Some(local_at)) => remote_at > local_at,
                (Some(_), None) => true,
                (None, _) => false,
            };
            differs && newer
        };

        if adopt {
            review.apply_reply(&Reply {
                review_id: external_id,
                text: remote.text,
                source: ReplySource::Google,
                replied_at: remote.updated_at.unwrap_or(now),
            });
        }
    }

    review
}
