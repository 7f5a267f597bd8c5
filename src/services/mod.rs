// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod ai;
pub mod billing;
pub mod credentials;
pub mod google;
pub mod ingest;
pub mod normalize;
pub mod notify;
pub mod replies;

pub use ai::{AiReplyService, ReplyPrompt};
pub use billing::{BillingService, EventOutcome, StripeEvent};
pub use credentials::{CredentialService, OAuthResult};
pub use google::{GoogleClient, GoogleUserInfo, ReviewPlatform, TokenResponse};
pub use ingest::{ReviewIngestor, SyncOutcome};
pub use normalize::{NormalizedReview, RemoteReply, RemoteReview, ReviewsPage};
pub use notify::NotificationDispatcher;
pub use replies::ReplySubmitter;
