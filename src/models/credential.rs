// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth credential model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External OAuth provider a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
        }
    }
}

/// Access/refresh token pair for one user and one provider.
///
/// Stored under `credentials/{user_id}_{provider}` so a user can never hold two
/// active credentials for the same provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted
    pub expires_at: DateTime<Utc>,
    /// Granted OAuth scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Document key for a user/provider pair.
    pub fn key(user_id: &str, provider: Provider) -> String {
        format!("{}_{}", user_id, provider.as_str())
    }

    pub fn doc_id(&self) -> String {
        Self::key(&self.user_id, self.provider)
    }

    /// True once `now` has reached the expiry, less the skew margin.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

// Tokens are secrets; keep them out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
