// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Scheduler task routes.
//!
//! These endpoints are called by Cloud Scheduler, not directly by users, and
//! are protected by the shared secret checked in `require_tasks_auth`.

use crate::error::{AppError, Result};
use crate::models::{Location, SyncResult};
use crate::AppState;
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use axum_extra::extract::WithRejection;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Locations synced concurrently by `/tasks/sync-all`.
const SYNC_ALL_CONCURRENCY: usize = 4;

/// Task handler routes (called by the scheduler).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/sync-location", post(sync_location))
        .route("/tasks/sync-all", post(sync_all))
}

#[derive(Debug, Deserialize)]
pub struct SyncLocationPayload {
    pub location_id: String,
}

/// Result for one location of a scheduled run.
#[derive(Debug, Serialize)]
pub struct LocationSyncReport {
    pub location_id: String,
    #[serde(flatten)]
    pub result: Option<SyncResult>,
    /// Set when the sync could not start (missing credential, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncAllResponse {
    pub locations: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub reports: Vec<LocationSyncReport>,
}

/// Sync one location by ID.
async fn sync_location(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<SyncLocationPayload>, AppError>,
) -> Result<Json<SyncResult>> {
    let location = state
        .db
        .get_location(&payload.location_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Location {}", payload.location_id)))?;

    if !location.is_active {
        return Err(AppError::Validation("Location is inactive".to_string()));
    }

    tracing::info!(location_id = %location.id, "Scheduled sync of one location");
    let outcome = state.ingestor().sync(&location).await?;
    Ok(Json(outcome.result))
}

/// Sync every active location, a few at a time.
///
/// One location failing does not stop the others; failures are reported per
/// location and the response is still 200.
async fn sync_all(State(state): State<Arc<AppState>>) -> Result<Json<SyncAllResponse>> {
    let locations = state.db.list_active_locations().await?;
    tracing::info!(count = locations.len(), "Scheduled sync of all active locations");

    let reports: Vec<LocationSyncReport> = stream::iter(locations)
        .map(|location| {
            let state = state.clone();
            async move { sync_one(&state, location).await }
        })
        .buffer_unordered(SYNC_ALL_CONCURRENCY)
        .collect()
        .await;

    let failed = reports
        .iter()
        .filter(|r| r.failure.is_some() || r.result.as_ref().is_some_and(|s| s.partial))
        .count();

    tracing::info!(
        locations = reports.len(),
        failed,
        "Scheduled sync finished"
    );

    Ok(Json(SyncAllResponse {
        locations: reports.len(),
        succeeded: reports.len() - failed,
        failed,
        reports,
    }))
}

async fn sync_one(state: &AppState, location: Location) -> LocationSyncReport {
    match state.ingestor().sync(&location).await {
        Ok(outcome) => LocationSyncReport {
            location_id: location.id,
            result: Some(outcome.result),
            failure: None,
        },
        Err(e) => {
            tracing::warn!(location_id = %location.id, error = %e, "Location sync failed");
            LocationSyncReport {
                location_id: location.id,
                result: None,
                failure: Some(e.code().to_string()),
            }
        }
    }
}
