// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Business location model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A business location whose reviews are synchronized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Internal ID (also used as document ID)
    pub id: String,
    /// Business Profile resource name or Places place ID
    pub external_id: String,
    /// Owning user
    pub user_id: String,
    /// Display name
    pub name: Option<String>,
    /// Last sync attempt (successful or not)
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Location {
    /// Internal ID derived from the external ID, so one external location maps
    /// to exactly one document.
    pub fn id_for(external_id: &str) -> String {
        let digest = Sha256::digest(external_id.as_bytes());
        format!("loc_{}", &hex::encode(digest)[..16])
    }

    pub fn source(&self) -> Option<LocationSource> {
        LocationSource::parse(&self.external_id)
    }
}

/// Where the reviews of a location come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationSource {
    /// `accounts/{account}/locations/{location}` (OAuth, paginated, replies allowed)
    BusinessProfile { account: String, location: String },
    /// Places place ID (API key, read-only, no pagination)
    Places { place_id: String },
}

impl LocationSource {
    /// Parse an external location identifier.
    pub fn parse(external_id: &str) -> Option<Self> {
        let parts: Vec<&str> = external_id.split('/').collect();
        match parts.as_slice() {
            ["accounts", account, "locations", location]
                if is_resource_segment(account) && is_resource_segment(location) =>
            {
                Some(LocationSource::BusinessProfile {
                    account: account.to_string(),
                    location: location.to_string(),
                })
            }
            ["places", place_id] if is_place_id(place_id) => Some(LocationSource::Places {
                place_id: place_id.to_string(),
            }),
            [place_id] if is_place_id(place_id) => Some(LocationSource::Places {
                place_id: place_id.to_string(),
            }),
            _ => None,
        }
    }

    /// Canonical external ID (`places/` prefix dropped).
    pub fn canonical_id(&self) -> String {
        match self {
            LocationSource::BusinessProfile { account, location } => {
                format!("accounts/{}/locations/{}", account, location)
            }
            LocationSource::Places { place_id } => place_id.clone(),
        }
    }

    /// Whether replies can be posted for reviews from this source.
    pub fn supports_replies(&self) -> bool {
        matches!(self, LocationSource::BusinessProfile { .. })
    }
}

fn is_resource_segment(s: &str) -> bool {
    !s.is_empty() && s.len() <= 64 && s.chars().all(|c| c.is_ascii_digit())
}

fn is_place_id(s: &str) -> bool {
    (10..=256).contains(&s.len())
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
