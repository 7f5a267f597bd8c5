// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! New-review notifications.
//!
//! [`NotificationDispatcher::dispatch`] never blocks and never fails: jobs go
//! onto a bounded queue with `try_send`, and a full queue drops the job. A
//! single background worker loads preferences, selects which reviews qualify
//! and delivers them. Delivery is at most once.

use crate::db::Store;
use crate::models::{
    Notification, NotificationChannels, NotificationPreferences, NotificationReason, Review,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Queued jobs before new ones are dropped.
pub const QUEUE_CAPACITY: usize = 256;

/// Buffered live events per subscriber before the slowest one lags.
const LIVE_CAPACITY: usize = 64;

const EXCERPT_CHARS: usize = 140;

/// Newly added reviews of one user, from one sync.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub user_id: String,
    pub reviews: Vec<Review>,
}

/// Handle to the notification queue and live subscriber channel.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<NotificationJob>,
    live: broadcast::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Start the delivery worker. Must be called inside a Tokio runtime.
    pub fn start(db: Arc<dyn Store>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<NotificationJob>(capacity.max(1));
        let (live, _) = broadcast::channel(LIVE_CAPACITY);

        let worker_live = live.clone();
        tokio::spawn(async move {
            tracing::info!("Notification worker started");
            while let Some(job) = rx.recv().await {
                deliver_job(db.as_ref(), &worker_live, job).await;
            }
            tracing::info!("Notification worker stopped");
        });

        Self { tx, live }
    }

    /// Enqueue newly added reviews. Never blocks the caller.
    pub fn dispatch(&self, user_id: &str, reviews: Vec<Review>) {
        if reviews.is_empty() {
            return;
        }

        let count = reviews.len();
        let job = NotificationJob {
            user_id: user_id.to_string(),
            reviews,
        };

        match self.tx.try_send(job) {
            Ok(()) => tracing::debug!(user_id, count, "Notification job queued"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user_id, count, "Notification queue full, dropping job")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(user_id, count, "Notification worker gone, dropping job")
            }
        }
    }

    /// Live notifications for one user.
    ///
    /// The underlying subscription lives exactly as long as the returned stream.
    pub fn subscribe(&self, user_id: &str) -> impl Stream<Item = Notification> + Send + 'static {
        let user_id = user_id.to_string();
        BroadcastStream::new(self.live.subscribe()).filter_map(move |event| match event {
            Ok(n) if n.user_id == user_id => Some(n),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Live notification subscriber lagged");
                None
            }
        })
    }

    /// Number of open live subscriptions.
    pub fn live_subscribers(&self) -> usize {
        self.live.receiver_count()
    }
}

/// Decide which reviews qualify under the user's preferences.
///
/// A review at or below the threshold always qualifies when low-rating
/// notifications are on, whatever `notify_all` says.
pub fn select_notifications(
    user_id: &str,
    preferences: &NotificationPreferences,
    reviews: &[Review],
    now: DateTime<Utc>,
) -> Vec<Notification> {
    reviews
        .iter()
        .filter_map(|review| {
            let reason = if preferences.notify_low_rating
                && review.rating <= preferences.low_rating_threshold
            {
                NotificationReason::LowRating
            } else if preferences.notify_all {
                NotificationReason::NewReview
            } else {
                return None;
            };

            Some(Notification {
                id: review.external_id.clone(),
                user_id: user_id.to_string(),
                review_id: review.external_id.clone(),
                location_id: review.location_id.clone(),
                author: review.author.clone(),
                rating: review.rating,
                excerpt: review
                    .comment
                    .as_deref()
                    .map(|c| c.chars().take(EXCERPT_CHARS).collect()),
                reason,
                created_at: now,
            })
        })
        .collect()
}

async fn deliver_job(db: &dyn Store, live: &broadcast::Sender<Notification>, job: NotificationJob) {
    let preferences = match db.get_preferences(&job.user_id).await {
        Ok(p) => p.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(user_id = %job.user_id, error = %e, "Failed to load preferences, dropping job");
            return;
        }
    };

    let notifications = select_notifications(&job.user_id, &preferences, &job.reviews, Utc::now());
    tracing::debug!(
        user_id = %job.user_id,
        candidates = job.reviews.len(),
        selected = notifications.len(),
        "Delivering notifications"
    );

    for notification in notifications {
        deliver(db, live, preferences.channels, &notification).await;
    }
}

async fn deliver(
    db: &dyn Store,
    live: &broadcast::Sender<Notification>,
    channels: NotificationChannels,
    notification: &Notification,
) {
    if channels.in_app {
        if let Err(e) = db.insert_notification(notification).await {
            tracing::warn!(review_id = %notification.review_id, error = %e, "In-app notification failed");
        }
    }

    // No receivers is not an error
    if channels.browser {
        let _ = live.send(notification.clone());
    }

    if channels.email {
        tracing::info!(
            user_id = %notification.user_id,
            review_id = %notification.review_id,
            rating = notification.rating,
            "Email notification (not sent, no mail provider configured)"
        );
    }
}
