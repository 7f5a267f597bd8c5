// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Review Desk: review management backend for small businesses
//!
//! This crate provides the backend API that connects a Google Business
//! Profile, keeps its reviews in sync and posts owner replies.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::{
    AiReplyService, BillingService, CredentialService, NotificationDispatcher, ReplySubmitter,
    ReviewIngestor, ReviewPlatform,
};
use std::sync::Arc;

/// Shared application state.
///
/// Holds only clients and configuration. Services are built per request from
/// these, so no user data lives in the process between invocations.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Store>,
    pub platform: Arc<dyn ReviewPlatform>,
    pub ai: AiReplyService,
    pub notifier: NotificationDispatcher,
}

impl AppState {
    pub fn credentials(&self) -> CredentialService {
        CredentialService::new(self.db.clone(), self.platform.clone())
    }

    pub fn ingestor(&self) -> ReviewIngestor {
        ReviewIngestor::new(
            self.db.clone(),
            self.platform.clone(),
            self.notifier.clone(),
            self.config.sync_max_pages,
        )
    }

    pub fn replies(&self) -> ReplySubmitter {
        ReplySubmitter::new(self.db.clone(), self.platform.clone())
    }

    pub fn billing(&self) -> BillingService {
        BillingService::new(
            self.db.clone(),
            self.config.stripe_price_pro.clone(),
            self.config.stripe_price_business.clone(),
        )
    }
}
