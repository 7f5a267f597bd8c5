// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google API client for OAuth, review listing and reply posting.
//!
//! Handles:
//! - Authorization code exchange and token refresh
//! - Business Profile (v4) review pages and reply updates
//! - Places (legacy) review lookups for place-id locations
//! - Mapping HTTP failures onto retryable / non-retryable errors

use crate::error::AppError;
use crate::models::LocationSource;
use crate::services::normalize::{self, places, v4, RemoteReply, ReviewsPage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const BUSINESS_API_URL: &str = "https://mybusiness.googleapis.com/v4";
const PLACES_DETAILS_URL: &str = "https://maps.googleapis.com/maps/api/place/details/json";

/// Reviews requested per Business Profile page.
pub const REVIEWS_PAGE_SIZE: u32 = 50;

/// Token endpoint response (code exchange or refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Only sent on first consent (and not always on refresh)
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// OpenID Connect userinfo.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// External review platform operations.
///
/// Implemented by [`GoogleClient`] in production; tests substitute a fake.
#[async_trait]
pub trait ReviewPlatform: Send + Sync {
    async fn exchange_code(&self, code: &str, redirect_uri: &str)
        -> Result<TokenResponse, AppError>;

    /// Fails with [`AppError::AuthExpired`] when the refresh token is rejected.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError>;

    async fn fetch_user_info(&self, access_token: &str) -> Result<GoogleUserInfo, AppError>;

    /// Fetch one page of reviews. `access_token` is unused for Places sources.
    async fn list_reviews(
        &self,
        access_token: &str,
        source: &LocationSource,
        page_token: Option<&str>,
    ) -> Result<ReviewsPage, AppError>;

    /// Create or replace the owner reply on a review.
    async fn put_reply(
        &self,
        access_token: &str,
        source: &LocationSource,
        review_id: &str,
        comment: &str,
    ) -> Result<RemoteReply, AppError>;
}

/// Google API client.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    places_api_key: Option<String>,
}

impl GoogleClient {
    /// Create a new client with OAuth credentials and a per-request timeout.
    pub fn new(
        client_id: String,
        client_secret: String,
        places_api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            client_id,
            client_secret,
            places_api_key,
        })
    }

    /// Post to the token endpoint.
    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| AppError::UpstreamUnavailable(format!("Token response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();

        // Revoked or expired grants come back as 400 invalid_grant (sometimes 401)
        if matches!(status.as_u16(), 400 | 401) {
            tracing::warn!(status = %status, "Google token request rejected");
            if body.contains("invalid_grant") || status.as_u16() == 401 {
                return Err(AppError::AuthExpired);
            }
        }

        Err(status_error(status, body))
    }

    async fn list_business_reviews(
        &self,
        access_token: &str,
        account: &str,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<ReviewsPage, AppError> {
        let url = format!(
            "{}/accounts/{}/locations/{}/reviews",
            BUSINESS_API_URL, account, location
        );

        let mut query = vec![("pageSize", REVIEWS_PAGE_SIZE.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;

        let body: v4::ListReviewsResponse = check_response_json(response).await?;
        Ok(normalize::page_from_v4(body))
    }

    async fn list_place_reviews(&self, place_id: &str) -> Result<ReviewsPage, AppError> {
        let key = self.places_api_key.as_deref().ok_or_else(|| {
            AppError::Validation("Place-id locations require a Places API key".to_string())
        })?;

        let response = self
            .http
            .get(PLACES_DETAILS_URL)
            .query(&[
                ("place_id", place_id),
                ("fields", "reviews"),
                ("reviews_sort", "newest"),
                ("key", key),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let body: places::DetailsResponse = check_response_json(response).await?;

        // The legacy API reports errors in-band with HTTP 200
        match body.status.as_str() {
            "OK" | "ZERO_RESULTS" => Ok(normalize::page_from_places(
                body.result.unwrap_or_default(),
            )),
            "NOT_FOUND" | "INVALID_REQUEST" => {
                Err(AppError::NotFound(format!("Place {}", place_id)))
            }
            "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR" => Err(AppError::UpstreamUnavailable(
                format!("Places API status {}", body.status),
            )),
            other => Err(AppError::Upstream {
                status: 403,
                message: body
                    .error_message
                    .unwrap_or_else(|| format!("Places API status {}", other)),
            }),
        }
    }
}

#[async_trait]
impl ReviewPlatform for GoogleClient {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AppError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<GoogleUserInfo, AppError> {
        let response = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        check_response_json(response).await
    }

    async fn list_reviews(
        &self,
        access_token: &str,
        source: &LocationSource,
        page_token: Option<&str>,
    ) -> Result<ReviewsPage, AppError> {
        match source {
            LocationSource::BusinessProfile { account, location } => {
                self.list_business_reviews(access_token, account, location, page_token)
                    .await
            }
            LocationSource::Places { place_id } => self.list_place_reviews(place_id).await,
        }
    }

    async fn put_reply(
        &self,
        access_token: &str,
        source: &LocationSource,
        review_id: &str,
        comment: &str,
    ) -> Result<RemoteReply, AppError> {
        let LocationSource::BusinessProfile { account, location } = source else {
            return Err(AppError::Validation(
                "Replies are not supported for this location".to_string(),
            ));
        };

        let url = format!(
            "{}/accounts/{}/locations/{}/reviews/{}/reply",
            BUSINESS_API_URL,
            account,
            location,
            urlencoding::encode(review_id)
        );

        let response = self
            .http
            .put(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "comment": comment }))
            .send()
            .await
            .map_err(transport_error)?;

        let reply: v4::ReviewReply = check_response_json(response).await?;
        Ok(RemoteReply {
            text: if reply.comment.is_empty() {
                comment.to_string()
            } else {
                reply.comment
            },
            updated_at: reply
                .update_time
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
        })
    }
}

/// Timeouts and connection failures are retryable.
fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::UpstreamUnavailable("Request timed out".to_string())
    } else {
        AppError::UpstreamUnavailable(e.to_string())
    }
}

/// Map a non-success HTTP status.
fn status_error(status: reqwest::StatusCode, body: String) -> AppError {
    match status.as_u16() {
        429 => {
            tracing::warn!("Google rate limit hit (429)");
            AppError::UpstreamUnavailable("Rate limited".to_string())
        }
        401 => AppError::AuthExpired,
        404 => AppError::NotFound("Upstream resource".to_string()),
        s if status.is_server_error() => AppError::UpstreamUnavailable(format!("HTTP {}", s)),
        s => AppError::Upstream {
            status: s,
            message: body,
        },
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, body));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Upstream {
            status: status.as_u16(),
            message: format!("JSON parse error: {}", e),
        })
}
