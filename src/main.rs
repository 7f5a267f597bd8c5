// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Review Desk API Server
//!
//! Keeps Google reviews of small-business locations in sync, drafts replies
//! with an LLM and posts owner replies back to Google.

use review_desk::{
    config::{Config, DatastoreKind},
    db::{FirestoreDb, MemoryDb, Store},
    services::{notify::QUEUE_CAPACITY, AiReplyService, GoogleClient, NotificationDispatcher},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Review Desk API");

    let db: Arc<dyn Store> = match config.datastore {
        DatastoreKind::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        DatastoreKind::Memory => {
            tracing::warn!("Using in-memory datastore, data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    let timeout = Duration::from_secs(config.http_timeout_secs);

    let platform = Arc::new(GoogleClient::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        config.google_places_api_key.clone(),
        timeout,
    )?);

    let ai = AiReplyService::new(
        config.llm_api_url.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        timeout,
    )?;
    tracing::info!(model = %config.llm_model, "LLM client initialized");

    let notifier = NotificationDispatcher::start(db.clone(), QUEUE_CAPACITY);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        platform,
        ai,
        notifier,
    });

    // Build router
    let app = review_desk::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("review_desk=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
