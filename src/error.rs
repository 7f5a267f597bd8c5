// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Every failure leaves the service as `{ "success": false, "error": ... }` so the
//! front end can show a recoverable message (and prompt a reconnect on
//! `auth_expired`).

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Refresh token rejected by the provider. The user must reconnect.
    #[error("Authorization expired, reconnect required")]
    AuthExpired,

    /// No credential on file for the user.
    #[error("No connected account")]
    AuthMissing,

    /// Network failure, timeout, 429 or 5xx from an external API. Retryable.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Non-retryable rejection from an external API.
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Review already replied")]
    AlreadyReplied,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid request: {0}")]
    Validation(String),

    /// Missing or invalid session.
    #[error("Authentication required")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::UpstreamUnavailable(_))
    }

    /// Stable machine-readable code used in JSON responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::AuthExpired => "auth_expired",
            AppError::AuthMissing => "auth_missing",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::Upstream { .. } => "upstream_error",
            AppError::AlreadyReplied => "already_replied",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden => "forbidden",
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized => "unauthorized",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::AuthExpired | AppError::AuthMissing | AppError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            AppError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::AlreadyReplied => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Malformed or mistyped JSON bodies.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    reconnect_required: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let details = match &self {
            AppError::NotFound(msg) | AppError::Validation(msg) => Some(msg.clone()),
            AppError::UpstreamUnavailable(msg) => {
                tracing::warn!(error = %msg, "Upstream unavailable");
                None
            }
            AppError::Upstream { status, message } => {
                tracing::warn!(status, error = %message, "Upstream rejected request");
                None
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                None
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                None
            }
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: self.code(),
            details,
            reconnect_required: matches!(self, AppError::AuthExpired),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
