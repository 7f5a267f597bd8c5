// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reply submission.
//!
//! The platform accepts one owner reply per review, so a second reply is
//! rejected before any external call. The local record only changes after the
//! platform accepted the reply, and then all reply fields change together.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{Reply, ReplySource};
use crate::services::credentials::CredentialService;
use crate::services::google::ReviewPlatform;
use crate::time_utils::month_key;
use chrono::Utc;
use std::sync::Arc;

/// Longest accepted reply, in characters.
pub const MAX_REPLY_CHARS: usize = 4096;

/// Reply submitter for one invocation.
#[derive(Clone)]
pub struct ReplySubmitter {
    db: Arc<dyn Store>,
    platform: Arc<dyn ReviewPlatform>,
    credentials: CredentialService,
}

impl ReplySubmitter {
    pub fn new(db: Arc<dyn Store>, platform: Arc<dyn ReviewPlatform>) -> Self {
        Self {
            credentials: CredentialService::new(db.clone(), platform.clone()),
            db,
            platform,
        }
    }

    /// Post a reply to a review owned by `user_id`.
    pub async fn reply(
        &self,
        user_id: &str,
        review_id: &str,
        text: &str,
        source: ReplySource,
    ) -> Result<Reply, AppError> {
        let text = text.trim();
        if text.is_empty() || text.chars().count() > MAX_REPLY_CHARS {
            return Err(AppError::Validation(format!(
                "Reply text must be 1 to {} characters",
                MAX_REPLY_CHARS
            )));
        }
        if source == ReplySource::Google {
            return Err(AppError::Validation(
                "Reply source must be manual or ai".to_string(),
            ));
        }

        let review = self
            .db
            .get_review(review_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Review {}", review_id)))?;

        if review.user_id != user_id {
            tracing::warn!(user_id, review_id, "Reply attempted on another user's review");
            return Err(AppError::Forbidden);
        }

        if review.replied {
            return Err(AppError::AlreadyReplied);
        }

        let location = self
            .db
            .get_location(&review.location_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Location {}", review.location_id)))?;

        let location_source = location
            .source()
            .filter(|s| s.supports_replies())
            .ok_or_else(|| {
                AppError::Validation("Replies are not supported for this location".to_string())
            })?;

        let access_token = self.credentials.get_valid_access_token(user_id).await?;

        // Nothing is written locally unless this succeeds.
        self.platform
            .put_reply(&access_token, &location_source, review_id, text)
            .await
            .inspect_err(|e| {
                tracing::warn!(review_id, error = %e, "Platform rejected reply, local record unchanged")
            })?;

        let now = Utc::now();
        let reply = Reply {
            review_id: review_id.to_string(),
            text: text.to_string(),
            source,
            replied_at: now,
        };

        if !self.db.mark_review_replied(&reply).await? {
            // A concurrent request (or sync) recorded a reply in between.
            tracing::warn!(review_id, "Review was replied concurrently, keeping stored reply");
            return Err(AppError::AlreadyReplied);
        }

        if source != ReplySource::Ai {
            match self
                .db
                .increment_manual_replies(user_id, &month_key(now))
                .await
            {
                Ok(count) => tracing::debug!(user_id, count, "Manual reply counted"),
                Err(e) => tracing::warn!(user_id, error = %e, "Failed to count manual reply"),
            }
        }

        tracing::info!(user_id, review_id, source = source.as_str(), "Reply posted");
        Ok(reply)
    }
}
