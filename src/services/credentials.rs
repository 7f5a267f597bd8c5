// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential lifecycle: OAuth connect and silent token refresh.
//!
//! Every outbound Google call goes through [`CredentialService::get_valid_access_token`].
//! No token is cached in-process: each invocation reads the stored credential,
//! refreshes at most once and persists the result once.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{Credential, Provider, User};
use crate::services::google::{ReviewPlatform, TokenResponse};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Clock-skew tolerance before expiry at which we refresh.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 10;

/// Scopes requested on connect.
pub const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/business.manage",
    "openid",
    "email",
    "profile",
];

/// Result of handling an OAuth callback.
#[derive(Debug, Clone)]
pub struct OAuthResult {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Token refresher and OAuth callback handler.
#[derive(Clone)]
pub struct CredentialService {
    db: Arc<dyn Store>,
    platform: Arc<dyn ReviewPlatform>,
}

impl CredentialService {
    pub fn new(db: Arc<dyn Store>, platform: Arc<dyn ReviewPlatform>) -> Self {
        Self { db, platform }
    }

    /// Get a usable access token for the user, refreshing first if it is stale.
    ///
    /// - no stored credential: [`AppError::AuthMissing`]
    /// - stale with no refresh token, or refresh rejected: [`AppError::AuthExpired`]
    /// - transport failure during refresh: [`AppError::UpstreamUnavailable`]
    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<String, AppError> {
        let credential = self
            .db
            .get_credential(user_id, Provider::Google)
            .await?
            .ok_or(AppError::AuthMissing)?;

        let now = Utc::now();
        if !credential.needs_refresh(now, Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)) {
            return Ok(credential.access_token);
        }

        let Some(refresh_token) = credential.refresh_token.clone() else {
            tracing::info!(user_id, "Access token expired and no refresh token on file");
            return Err(AppError::AuthExpired);
        };

        tracing::info!(user_id, "Access token expired, refreshing");

        let tokens = match self.platform.refresh_access_token(&refresh_token).await {
            Ok(t) => t,
            Err(AppError::AuthExpired) => {
                tracing::warn!(user_id, "Refresh token rejected, reconnect required");
                return Err(AppError::AuthExpired);
            }
            Err(e) => return Err(e),
        };

        let refreshed = apply_tokens(Some(credential), user_id, tokens);
        self.db.set_credential(&refreshed).await?;

        tracing::info!(user_id, expires_at = %refreshed.expires_at, "Token refreshed");
        Ok(refreshed.access_token)
    }

    /// Exchange an authorization code, then store the user and the credential.
    pub async fn handle_oauth_callback(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthResult, AppError> {
        let tokens = self.platform.exchange_code(code, redirect_uri).await?;
        let info = self.platform.fetch_user_info(&tokens.access_token).await?;

        let user_id = info.sub.clone();
        let now = Utc::now();

        let existing_user = self.db.get_user(&user_id).await?;
        let user = User {
            user_id: user_id.clone(),
            email: info.email.clone(),
            display_name: info.name.clone(),
            created_at: existing_user.as_ref().map_or(now, |u| u.created_at),
            last_active: now,
        };

        if let Err(e) = self.db.upsert_user(&user).await {
            tracing::warn!(error = %e, "Failed to store user profile, continuing anyway");
        }

        // Google omits the refresh token on re-consent; keep the one we have.
        let existing = self.db.get_credential(&user_id, Provider::Google).await?;
        let credential = apply_tokens(existing, &user_id, tokens);
        if credential.refresh_token.is_none() {
            tracing::warn!(user_id, "Connected without a refresh token");
        }
        self.db.set_credential(&credential).await?;

        tracing::info!(user_id, "OAuth callback handled, user and credential stored");

        Ok(OAuthResult {
            user_id,
            email: info.email,
            display_name: info.name,
        })
    }
}

/// Build the credential to persist from a token response.
fn apply_tokens(previous: Option<Credential>, user_id: &str, tokens: TokenResponse) -> Credential {
    let now = Utc::now();
    let (previous_refresh, previous_scopes) = previous
        .map(|c| (c.refresh_token, c.scopes))
        .unwrap_or_default();

    Credential {
        user_id: user_id.to_string(),
        provider: Provider::Google,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token.or(previous_refresh),
        expires_at: now + Duration::seconds(tokens.expires_in.max(0)),
        scopes: tokens
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or(previous_scopes),
        updated_at: now,
    }
}
