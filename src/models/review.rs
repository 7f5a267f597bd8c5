// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Review model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Who authored a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    /// Typed by the owner in our UI
    Manual,
    /// Generated by the LLM, possibly edited
    Ai,
    /// Found on the platform during sync
    Google,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplySource::Manual => "manual",
            ReplySource::Ai => "ai",
            ReplySource::Google => "google",
        }
    }
}

/// A reply attached to a review. The four reply fields of [`Review`] are only
/// ever written from one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub review_id: String,
    pub text: String,
    pub source: ReplySource,
    pub replied_at: DateTime<Utc>,
}

/// Stored review record (document ID = external review ID).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Provider review ID, or a deterministic synthetic one
    pub external_id: String,
    /// Internal location ID
    pub location_id: String,
    /// Owning user
    pub user_id: String,
    /// Reviewer display name
    pub author: String,
    /// Star rating, 1..=5
    pub rating: u8,
    pub comment: Option<String>,
    pub review_date: DateTime<Utc>,
    pub replied: bool,
    pub reply_text: Option<String>,
    pub reply_source: Option<ReplySource>,
    pub replied_at: Option<DateTime<Utc>>,
    /// First time this review was ingested
    pub first_seen_at: DateTime<Utc>,
    /// Last time any field was written
    pub updated_at: DateTime<Utc>,
}

impl Review {
    /// Mark as replied, writing all reply fields together.
    pub fn apply_reply(&mut self, reply: &Reply) {
        self.replied = true;
        self.reply_text = Some(reply.text.clone());
        self.reply_source = Some(reply.source);
        self.replied_at = Some(reply.replied_at);
        self.updated_at = reply.replied_at.max(self.updated_at);
    }

    /// `replied` holds exactly when reply text and source are present.
    pub fn reply_state_consistent(&self) -> bool {
        self.replied == self.reply_text.is_some() && self.replied == self.reply_source.is_some()
    }

    /// The stored reply, if any.
    pub fn reply(&self) -> Option<Reply> {
        match (&self.reply_text, self.reply_source, self.replied_at) {
            (Some(text), Some(source), Some(replied_at)) if self.replied => Some(Reply {
                review_id: self.external_id.clone(),
                text: text.clone(),
                source,
                replied_at,
            }),
            _ => None,
        }
    }
}

/// Outcome of one ingestion run (not persisted).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncResult {
    /// Reviews inserted for the first time
    pub added: u32,
    /// Reviews that already existed and were rewritten
    pub updated: u32,
    /// Remote reviews seen across all fetched pages
    pub total_fetched: u32,
    /// A page failed and the remaining pages were skipped
    pub partial: bool,
    pub error: Option<String>,
}
