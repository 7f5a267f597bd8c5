// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::db::ReviewQuery;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{
    Location, LocationSource, Notification, NotificationPreferences, Plan, Provider, Reply,
    ReplySource, Review,
};
use crate::services::ReplyPrompt;
use crate::time_utils::{format_utc_rfc3339, month_key};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/locations", get(list_locations).post(create_location))
        .route("/api/locations/{id}", patch(update_location))
        .route("/api/locations/{id}/sync", post(sync_location))
        .route("/api/reviews", get(list_reviews))
        .route("/api/reviews/{external_id}/reply", post(reply_to_review))
        .route("/api/ai/generate-reply", post(generate_reply))
        .route("/api/notifications", get(list_notifications))
        .route(
            "/api/notifications/preferences",
            get(get_preferences).put(put_preferences),
        )
        .route("/api/notifications/stream", get(notification_stream))
        .route("/api/usage", get(get_usage))
}

/// Load a location and check it belongs to the caller.
async fn owned_location(state: &AppState, user_id: &str, location_id: &str) -> Result<Location> {
    let location = state
        .db
        .get_location(location_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Location {}", location_id)))?;

    if location.user_id != user_id {
        tracing::warn!(user_id, location_id, "Access to another user's location");
        return Err(AppError::Forbidden);
    }
    Ok(location)
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// A Google credential is on file
    pub google_connected: bool,
    pub plan: Plan,
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .db
        .get_user(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", user.user_id)))?;

    let google_connected = state
        .db
        .get_credential(&user.user_id, Provider::Google)
        .await?
        .is_some();

    let plan = state
        .db
        .get_subscription(&user.user_id)
        .await?
        .map(|s| s.plan)
        .unwrap_or_default();

    Ok(Json(UserResponse {
        user_id: profile.user_id,
        email: profile.email,
        display_name: profile.display_name,
        google_connected,
        plan,
    }))
}

// ─── Locations ───────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LocationResponse {
    pub id: String,
    pub external_id: String,
    pub name: Option<String>,
    pub last_synced_at: Option<String>,
    pub is_active: bool,
    /// Replies can be posted from this app
    pub supports_replies: bool,
}

impl From<Location> for LocationResponse {
    fn from(l: Location) -> Self {
        let supports_replies = l.source().is_some_and(|s| s.supports_replies());
        Self {
            id: l.id,
            external_id: l.external_id,
            name: l.name,
            last_synced_at: l.last_synced_at.map(format_utc_rfc3339),
            is_active: l.is_active,
            supports_replies,
        }
    }
}

#[derive(Deserialize, Validate)]
struct CreateLocationRequest {
    #[validate(length(min = 1, max = 300))]
    external_id: String,
    #[validate(length(max = 200))]
    name: Option<String>,
}

async fn list_locations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<LocationResponse>>> {
    let locations = state.db.list_locations_for_user(&user.user_id).await?;
    Ok(Json(locations.into_iter().map(Into::into).collect()))
}

/// Register a location. Registering the same location again is a no-op.
async fn create_location(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): WithRejection<Json<CreateLocationRequest>, AppError>,
) -> Result<Json<LocationResponse>> {
    body.validate()?;

    let source = LocationSource::parse(body.external_id.trim()).ok_or_else(|| {
        AppError::Validation(
            "external_id must be accounts/{a}/locations/{l} or a Places place id".to_string(),
        )
    })?;

    if matches!(source, LocationSource::Places { .. }) && state.config.google_places_api_key.is_none() {
        return Err(AppError::Validation(
            "Place-id locations are not enabled on this server".to_string(),
        ));
    }

    let external_id = source.canonical_id();
    let id = Location::id_for(&external_id);

    if let Some(existing) = state.db.get_location(&id).await? {
        if existing.user_id != user.user_id {
            tracing::warn!(user_id = %user.user_id, location_id = %id, "Location owned by another user");
            return Err(AppError::Forbidden);
        }
        return Ok(Json(existing.into()));
    }

    let location = Location {
        id,
        external_id,
        user_id: user.user_id.clone(),
        name: body
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        last_synced_at: None,
        is_active: true,
        created_at: chrono::Utc::now(),
    };
    state.db.upsert_location(&location).await?;

    tracing::info!(user_id = %user.user_id, location_id = %location.id, "Location registered");
    Ok(Json(location.into()))
}

#[derive(Deserialize)]
struct UpdateLocationRequest {
    is_active: bool,
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<UpdateLocationRequest>, AppError>,
) -> Result<Json<LocationResponse>> {
    let mut location = owned_location(&state, &user.user_id, &id).await?;
    location.is_active = body.is_active;
    state.db.upsert_location(&location).await?;
    Ok(Json(location.into()))
}

/// Sync response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncResponse {
    /// False when the sync stopped early
    pub success: bool,
    pub added: u32,
    pub updated: u32,
    pub total_fetched: u32,
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<crate::models::SyncResult> for SyncResponse {
    fn from(r: crate::models::SyncResult) -> Self {
        Self {
            success: !r.partial,
            added: r.added,
            updated: r.updated,
            total_fetched: r.total_fetched,
            partial: r.partial,
            error: r.error,
        }
    }
}

/// Sync one of the caller's locations now.
async fn sync_location(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SyncResponse>> {
    let location = owned_location(&state, &user.user_id, &id).await?;
    if !location.is_active {
        return Err(AppError::Validation("Location is inactive".to_string()));
    }

    tracing::info!(user_id = %user.user_id, location_id = %id, "Manual sync requested");
    let outcome = state.ingestor().sync(&location).await?;
    Ok(Json(outcome.result.into()))
}

// ─── Reviews ─────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
struct ReviewsQuery {
    location_id: Option<String>,
    replied: Option<bool>,
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    page: u32,
    #[serde(default = "default_per_page")]
    #[validate(range(min = 1, max = 100))]
    per_page: u32,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    20
}

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReviewSummary {
    pub external_id: String,
    pub location_id: String,
    pub author: String,
    pub rating: u8,
    pub comment: Option<String>,
    pub review_date: String,
    pub replied: bool,
    pub reply_text: Option<String>,
    pub reply_source: Option<ReplySource>,
    pub replied_at: Option<String>,
}

impl From<Review> for ReviewSummary {
    fn from(r: Review) -> Self {
        Self {
            external_id: r.external_id,
            location_id: r.location_id,
            author: r.author,
            rating: r.rating,
            comment: r.comment,
            review_date: format_utc_rfc3339(r.review_date),
            replied: r.replied,
            reply_text: r.reply_text,
            reply_source: r.reply_source,
            replied_at: r.replied_at.map(format_utc_rfc3339),
        }
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReviewsResponse {
    pub reviews: Vec<ReviewSummary>,
    pub page: u32,
    pub per_page: u32,
}

/// List the caller's reviews, newest first.
async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ReviewsQuery>,
) -> Result<Json<ReviewsResponse>> {
    params.validate()?;

    if let Some(location_id) = params.location_id.as_deref() {
        owned_location(&state, &user.user_id, location_id).await?;
    }

    let offset = (params.page - 1)
        .checked_mul(params.per_page)
        .ok_or_else(|| AppError::Validation("Page number causes overflow".to_string()))?;

    let reviews = state
        .db
        .list_reviews(&ReviewQuery {
            user_id: user.user_id.clone(),
            location_id: params.location_id,
            replied: params.replied,
            limit: params.per_page,
            offset,
        })
        .await?;

    Ok(Json(ReviewsResponse {
        reviews: reviews.into_iter().map(Into::into).collect(),
        page: params.page,
        per_page: params.per_page,
    }))
}

#[derive(Deserialize, Validate)]
struct ReplyRequest {
    #[validate(length(min = 1, max = 4096))]
    text: String,
    #[serde(default)]
    source: Option<ReplySource>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReplyResponse {
    pub success: bool,
    pub review_id: String,
    pub reply_text: String,
    pub reply_source: ReplySource,
    pub replied_at: String,
}

impl From<Reply> for ReplyResponse {
    fn from(r: Reply) -> Self {
        Self {
            success: true,
            review_id: r.review_id,
            reply_text: r.text,
            reply_source: r.source,
            replied_at: format_utc_rfc3339(r.replied_at),
        }
    }
}

async fn reply_to_review(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(external_id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<ReplyRequest>, AppError>,
) -> Result<Json<ReplyResponse>> {
    body.validate()?;

    let reply = state
        .replies()
        .reply(
            &user.user_id,
            &external_id,
            &body.text,
            body.source.unwrap_or(ReplySource::Manual),
        )
        .await?;

    Ok(Json(reply.into()))
}

// ─── AI Replies ──────────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct GenerateReplyRequest {
    #[serde(default)]
    #[validate(length(max = 5000))]
    review_text: String,
    #[validate(range(min = 1, max = 5))]
    rating: u8,
    #[validate(length(max = 200))]
    reviewer_name: Option<String>,
    #[validate(length(max = 200))]
    business_name: Option<String>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GenerateReplyResponse {
    pub success: bool,
    pub reply: String,
}

async fn generate_reply(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): WithRejection<Json<GenerateReplyRequest>, AppError>,
) -> Result<Json<GenerateReplyResponse>> {
    body.validate()?;

    tracing::debug!(user_id = %user.user_id, rating = body.rating, "Generating reply draft");

    let reply = state
        .ai
        .generate_reply(&ReplyPrompt {
            review_text: &body.review_text,
            rating: body.rating,
            reviewer_name: body.reviewer_name.as_deref(),
            business_name: body.business_name.as_deref(),
        })
        .await?;

    Ok(Json(GenerateReplyResponse {
        success: true,
        reply,
    }))
}

// ─── Notifications ───────────────────────────────────────────

const NOTIFICATION_LIST_LIMIT: u32 = 50;

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Notification>>> {
    let notifications = state
        .db
        .list_notifications(&user.user_id, NOTIFICATION_LIST_LIMIT)
        .await?;
    Ok(Json(notifications))
}

async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<NotificationPreferences>> {
    let preferences = state
        .db
        .get_preferences(&user.user_id)
        .await?
        .unwrap_or_default();
    Ok(Json(preferences))
}

async fn put_preferences(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    WithRejection(Json(body), _): WithRejection<Json<NotificationPreferences>, AppError>,
) -> Result<Json<NotificationPreferences>> {
    body.validate()?;
    state.db.set_preferences(&user.user_id, &body).await?;
    Ok(Json(body))
}

/// Live notifications for the caller, as Server-Sent Events.
///
/// The broadcast subscription is dropped with the connection.
async fn notification_stream(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    tracing::debug!(user_id = %user.user_id, "Notification stream opened");

    let stream = state
        .notifier
        .subscribe(&user.user_id)
        .filter_map(|notification| {
            Event::default()
                .event("notification")
                .json_data(&notification)
                .ok()
                .map(Ok)
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ─── Usage ───────────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UsageResponse {
    /// `YYYY-MM`
    pub month: String,
    pub manual_replies: u32,
    pub plan: Plan,
    /// `null` means unlimited
    pub manual_reply_limit: Option<u32>,
    pub ai_reply_limit: Option<u32>,
}

async fn get_usage(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UsageResponse>> {
    let month = month_key(chrono::Utc::now());

    let manual_replies = state
        .db
        .get_usage(&user.user_id, &month)
        .await?
        .map_or(0, |u| u.manual_replies);

    let plan = state
        .db
        .get_subscription(&user.user_id)
        .await?
        .map(|s| s.plan)
        .unwrap_or_default();
    let limits = plan.limits();

    Ok(Json(UsageResponse {
        month,
        manual_replies,
        plan,
        manual_reply_limit: limits.manual_replies,
        ai_reply_limit: limits.ai_replies,
    }))
}
