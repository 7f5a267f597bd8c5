// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use review_desk::config::Config;
use review_desk::db::{MemoryDb, Store};
use review_desk::error::AppError;
use review_desk::middleware::auth::create_jwt;
use review_desk::models::{Credential, Location, Provider, ReplySource, Review, User};
use review_desk::routes::create_router;
use review_desk::services::normalize::v4;
use review_desk::services::{
    AiReplyService, GoogleUserInfo, NotificationDispatcher, RemoteReply, RemoteReview,
    ReviewPlatform, ReviewsPage, TokenResponse,
};
use review_desk::models::LocationSource;
use review_desk::AppState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_USER: &str = "google-sub-1";
pub const OTHER_USER: &str = "google-sub-2";
pub const TEST_LOCATION: &str = "accounts/111/locations/222";

/// Scripted stand-in for the Google APIs.
///
/// `list_reviews` serves `pages` in order, linking them with `page-{n}` tokens.
/// With `endless` set every page advertises a next page.
#[derive(Default)]
pub struct FakePlatform {
    pub pages: Mutex<Vec<Vec<RemoteReview>>>,
    pub endless: AtomicBool,
    /// Page index whose fetch fails with `UpstreamUnavailable`
    pub fail_page: Mutex<Option<usize>>,
    pub refresh_rejected: AtomicBool,
    pub put_reply_fails: AtomicBool,
    pub refresh_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub put_reply_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakePlatform {
    pub fn with_pages(pages: Vec<Vec<RemoteReview>>) -> Self {
        let fake = Self::default();
        *fake.pages.lock().unwrap() = pages;
        fake
    }

    pub fn set_pages(&self, pages: Vec<Vec<RemoteReview>>) {
        *self.pages.lock().unwrap() = pages;
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn put_reply_count(&self) -> usize {
        self.put_reply_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewPlatform for FakePlatform {
    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenResponse, AppError> {
        if code != "good-code" {
            return Err(AppError::Upstream {
                status: 400,
                message: "invalid_grant".to_string(),
            });
        }
        Ok(TokenResponse {
            access_token: "access-from-code".to_string(),
            expires_in: 3600,
            refresh_token: Some("refresh-from-code".to_string()),
            scope: Some("openid email".to_string()),
        })
    }

    async fn refresh_access_token(&self, _refresh_token: &str) -> Result<TokenResponse, AppError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.refresh_rejected.load(Ordering::SeqCst) {
            return Err(AppError::AuthExpired);
        }
        Ok(TokenResponse {
            access_token: "refreshed-access".to_string(),
            expires_in: 3600,
            refresh_token: None,
            scope: None,
        })
    }

    async fn fetch_user_info(&self, _access_token: &str) -> Result<GoogleUserInfo, AppError> {
        Ok(GoogleUserInfo {
            sub: TEST_USER.to_string(),
            email: Some("owner@example.com".to_string()),
            name: Some("Owner".to_string()),
        })
    }

    async fn list_reviews(
        &self,
        _access_token: &str,
        _source: &LocationSource,
        page_token: Option<&str>,
    ) -> Result<ReviewsPage, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let index = match page_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| AppError::Validation("bad page token".to_string()))?,
        };

        if *self.fail_page.lock().unwrap() == Some(index) {
            return Err(AppError::UpstreamUnavailable("HTTP 503".to_string()));
        }

        if self.endless.load(Ordering::SeqCst) {
            return Ok(ReviewsPage {
                reviews: vec![v4_review(&format!("endless-{}", index), "FOUR", None)],
                next_page_token: Some(format!("page-{}", index + 1)),
            });
        }

        let pages = self.pages.lock().unwrap();
        let reviews = pages.get(index).cloned().unwrap_or_default();
        let next_page_token = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(ReviewsPage {
            reviews,
            next_page_token,
        })
    }

    async fn put_reply(
        &self,
        _access_token: &str,
        _source: &LocationSource,
        _review_id: &str,
        comment: &str,
    ) -> Result<RemoteReply, AppError> {
        self.put_reply_calls.fetch_add(1, Ordering::SeqCst);
        if self.put_reply_fails.load(Ordering::SeqCst) {
            return Err(AppError::UpstreamUnavailable("HTTP 500".to_string()));
        }
        Ok(RemoteReply {
            text: comment.to_string(),
            updated_at: Some(Utc::now()),
        })
    }
}

/// Business Profile review with a fixed creation time.
#[allow(dead_code)]
pub fn v4_review(id: &str, stars: &str, reply: Option<(&str, &str)>) -> RemoteReview {
    RemoteReview::BusinessProfileV4(v4::Review {
        name: Some(format!("{}/reviews/{}", TEST_LOCATION, id)),
        review_id: Some(id.to_string()),
        reviewer: v4::Reviewer {
            display_name: Some(format!("Reviewer {}", id)),
            is_anonymous: false,
        },
        star_rating: Some(serde_json::Value::String(stars.to_string())),
        comment: Some(format!("Comment on {}", id)),
        create_time: Some("2026-03-01T10:00:00Z".to_string()),
        update_time: Some("2026-03-01T10:00:00Z".to_string()),
        review_reply: reply.map(|(comment, update_time)| v4::ReviewReply {
            comment: comment.to_string(),
            update_time: Some(update_time.to_string()),
        }),
    })
}

/// Create a test app on an in-memory store and a fake platform.
#[allow(dead_code)]
pub fn create_test_app_with(
    platform: FakePlatform,
) -> (axum::Router, Arc<AppState>, Arc<MemoryDb>, Arc<FakePlatform>) {
    let config = Config::test_default();
    let memory = Arc::new(MemoryDb::new());
    let db: Arc<dyn Store> = memory.clone();
    let platform = Arc::new(platform);

    let ai = AiReplyService::new(
        config.llm_api_url.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        std::time::Duration::from_secs(1),
    )
    .expect("AI client");

    let notifier = NotificationDispatcher::start(db.clone(), 16);

    let state = Arc::new(AppState {
        config,
        db,
        platform: platform.clone(),
        ai,
        notifier,
    });

    (create_router(state.clone()), state, memory, platform)
}

#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MemoryDb>, Arc<FakePlatform>) {
    create_test_app_with(FakePlatform::default())
}

/// Session token for `user_id` signed with the test key.
#[allow(dead_code)]
pub fn create_test_jwt(state: &AppState, user_id: &str) -> String {
    create_jwt(user_id, &state.config.jwt_signing_key).expect("jwt")
}

/// Store a user and a Google credential expiring at `expires_at`.
#[allow(dead_code)]
pub async fn seed_user(db: &MemoryDb, user_id: &str, expires_at: DateTime<Utc>) {
    let now = Utc::now();
    db.upsert_user(&User {
        user_id: user_id.to_string(),
        email: Some(format!("{}@example.com", user_id)),
        display_name: None,
        created_at: now,
        last_active: now,
    })
    .await
    .unwrap();

    db.set_credential(&Credential {
        user_id: user_id.to_string(),
        provider: Provider::Google,
        access_token: "stored-access".to_string(),
        refresh_token: Some("stored-refresh".to_string()),
        expires_at,
        scopes: vec![],
        updated_at: now,
    })
    .await
    .unwrap();
}

/// User whose access token is good for another hour.
#[allow(dead_code)]
pub async fn seed_fresh_user(db: &MemoryDb, user_id: &str) {
    seed_user(db, user_id, Utc::now() + Duration::hours(1)).await;
}

#[allow(dead_code)]
pub async fn seed_location(db: &MemoryDb, user_id: &str, external_id: &str) -> Location {
    let location = Location {
        id: Location::id_for(external_id),
        external_id: external_id.to_string(),
        user_id: user_id.to_string(),
        name: Some("Café du Port".to_string()),
        last_synced_at: None,
        is_active: true,
        created_at: Utc::now(),
    };
    db.upsert_location(&location).await.unwrap();
    location
}

/// Store an unreplied review directly, bypassing sync.
#[allow(dead_code)]
pub async fn seed_review(db: &MemoryDb, location: &Location, external_id: &str) -> Review {
    let now = Utc::now();
    let review = Review {
        external_id: external_id.to_string(),
        location_id: location.id.clone(),
        user_id: location.user_id.clone(),
        author: "Jeanne".to_string(),
        rating: 5,
        comment: Some("Très bon accueil".to_string()),
        review_date: now - Duration::days(1),
        replied: false,
        reply_text: None,
        reply_source: None,
        replied_at: None,
        first_seen_at: now,
        updated_at: now,
    };
    let stored = review.clone();
    db.merge_synced_review(external_id, &move |_: Option<Review>| stored.clone())
        .await
        .unwrap();
    review
}

/// Assert the four reply fields agree with each other.
#[allow(dead_code)]
pub fn assert_reply_consistent(review: &Review) {
    assert!(
        review.reply_state_consistent(),
        "inconsistent reply state: {:?}",
        review
    );
    if review.replied {
        assert!(review.replied_at.is_some());
        assert_ne!(review.reply_source, None::<ReplySource>);
    }
}
