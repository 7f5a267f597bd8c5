// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scheduler authentication middleware.

use crate::config::TASKS_SECRET_HEADER;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Require the shared scheduler secret for `/tasks/*` routes.
pub async fn require_tasks_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = request
        .headers()
        .get(TASKS_SECRET_HEADER)
        .map(|h| h.as_bytes())
        .unwrap_or_default();

    let expected = state.config.tasks_shared_secret.as_bytes();

    // ct_eq is false for slices of different lengths
    let valid = !expected.is_empty() && bool::from(provided.ct_eq(expected));

    if !valid {
        tracing::warn!(
            header_present = !provided.is_empty(),
            "Blocked tasks request with invalid shared secret"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
