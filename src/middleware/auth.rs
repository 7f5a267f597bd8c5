// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session tokens for the dashboard.
//!
//! A session is an HS256 JWT whose subject is the Google account ID. The
//! browser sends it as the `review_desk_token` cookie; scripts and tests may
//! send it as a bearer token instead.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "review_desk_token";

const SESSION_TTL_SECS: usize = 30 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Google account ID (OpenID `sub`)
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Account the request is made for, inserted as a request extension.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Reject requests without a valid session with a 401 error envelope.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(&jar, request.headers()).ok_or(AppError::Unauthorized)?;
    let user_id =
        verify_session(&token, &state.config.jwt_signing_key).ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(request).await)
}

/// The cookie wins over the `Authorization` header.
fn session_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Account ID of a valid, unexpired session token.
pub fn verify_session(token: &str, signing_key: &[u8]) -> Option<String> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(signing_key),
        &Validation::new(Algorithm::HS256),
    )
    .ok()?;

    Some(data.claims.sub).filter(|sub| !sub.is_empty())
}

/// Sign a session for `user_id`.
pub fn create_jwt(user_id: &str, signing_key: &[u8]) -> anyhow::Result<String> {
    let now = chrono::Utc::now().timestamp().max(0) as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + SESSION_TTL_SECS,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const KEY: &[u8] = b"test_signing_key";

    #[test]
    fn test_session_round_trip() {
        let token = create_jwt("google-sub-1", KEY).unwrap();
        assert_eq!(verify_session(&token, KEY).as_deref(), Some("google-sub-1"));
        assert_eq!(verify_session(&token, b"other_key"), None);
    }

    #[test]
    fn test_empty_subject_rejected() {
        let token = create_jwt("", KEY).unwrap();
        assert_eq!(verify_session(&token, KEY), None);
    }

    #[test]
    fn test_cookie_preferred_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("review_desk_token=from-cookie"),
        );
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(session_token(&jar, &headers).as_deref(), Some("from-cookie"));

        headers.remove(header::COOKIE);
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(session_token(&jar, &headers).as_deref(), Some("from-header"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(session_token(&jar, &headers), None);
    }
}
