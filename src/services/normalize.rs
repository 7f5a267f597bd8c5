// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Upstream review payloads and their normalization.
//!
//! Each provider response version gets its own record type. Everything past
//! [`RemoteReview::normalize`] only sees [`NormalizedReview`], so schema drift
//! upstream stays inside this module.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Rating used when the provider sends something we do not recognize.
pub const NEUTRAL_RATING: u8 = 3;

/// Business Profile (My Business v4) review payloads.
pub mod v4 {
    use serde::Deserialize;

    /// `GET accounts/{a}/locations/{l}/reviews`
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListReviewsResponse {
        #[serde(default)]
        pub reviews: Vec<Review>,
        pub next_page_token: Option<String>,
        pub average_rating: Option<f64>,
        pub total_review_count: Option<u32>,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Review {
        /// Resource name `accounts/{a}/locations/{l}/reviews/{id}`
        pub name: Option<String>,
        pub review_id: Option<String>,
        #[serde(default)]
        pub reviewer: Reviewer,
        /// `ONE`..`FIVE` or `STAR_RATING_UNSPECIFIED`
        pub star_rating: Option<serde_json::Value>,
        pub comment: Option<String>,
        pub create_time: Option<String>,
        pub update_time: Option<String>,
        pub review_reply: Option<ReviewReply>,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Reviewer {
        pub display_name: Option<String>,
        #[serde(default)]
        pub is_anonymous: bool,
    }

    /// Also the response body of `PUT .../reviews/{id}/reply`.
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ReviewReply {
        #[serde(default)]
        pub comment: String,
        pub update_time: Option<String>,
    }
}

/// Places API (legacy Place Details) review payloads.
pub mod places {
    use serde::Deserialize;

    /// `GET place/details/json?fields=reviews`
    #[derive(Debug, Clone, Deserialize)]
    pub struct DetailsResponse {
        pub status: String,
        pub result: Option<PlaceResult>,
        pub error_message: Option<String>,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct PlaceResult {
        #[serde(default)]
        pub reviews: Vec<PlaceReview>,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct PlaceReview {
        pub author_name: Option<String>,
        /// Numeric 1..=5
        pub rating: Option<serde_json::Value>,
        pub text: Option<String>,
        /// Unix seconds
        pub time: Option<i64>,
        pub language: Option<String>,
    }
}

/// A review as returned by one provider response version.
#[derive(Debug, Clone)]
pub enum RemoteReview {
    BusinessProfileV4(v4::Review),
    PlacesLegacy(places::PlaceReview),
}

/// One page of a reviews listing.
#[derive(Debug, Clone, Default)]
pub struct ReviewsPage {
    pub reviews: Vec<RemoteReview>,
    /// Continuation token; `None` on the last page
    pub next_page_token: Option<String>,
}

/// Reply found on the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReply {
    pub text: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Provider-independent review.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReview {
    pub external_id: String,
    pub author: String,
    pub rating: u8,
    pub comment: Option<String>,
    pub review_date: DateTime<Utc>,
    pub remote_reply: Option<RemoteReply>,
}

impl RemoteReview {
    /// Normalize against the external ID of the location it was fetched for.
    pub fn normalize(&self, location_external_id: &str) -> NormalizedReview {
        match self {
            RemoteReview::BusinessProfileV4(r) => {
                let author = match (&r.reviewer.display_name, r.reviewer.is_anonymous) {
                    (Some(name), false) if !name.trim().is_empty() => name.trim().to_string(),
                    _ => "Anonymous".to_string(),
                };
                let raw_time = r
                    .create_time
                    .as_deref()
                    .or(r.update_time.as_deref())
                    .unwrap_or_default();

                let external_id = r
                    .review_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .or_else(|| {
                        r.name
                            .as_deref()
                            .and_then(|n| n.rsplit_once("/reviews/"))
                            .map(|(_, id)| id)
                            .filter(|id| !id.is_empty())
                    })
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        let discriminator = if raw_time.is_empty() {
                            r.comment.as_deref().unwrap_or_default().trim()
                        } else {
                            raw_time
                        };
                        synthesize_review_id(location_external_id, &author, discriminator)
                    });

                NormalizedReview {
                    external_id,
                    author,
                    rating: r
                        .star_rating
                        .as_ref()
                        .map(rating_from_json)
                        .unwrap_or(NEUTRAL_RATING),
                    comment: non_empty(r.comment.as_deref()),
                    review_date: parse_rfc3339(raw_time).unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    remote_reply: r
                        .review_reply
                        .as_ref()
                        .filter(|reply| !reply.comment.trim().is_empty())
                        .map(|reply| RemoteReply {
                            text: reply.comment.clone(),
                            updated_at: reply.update_time.as_deref().and_then(parse_rfc3339),
                        }),
                }
            }
            RemoteReview::PlacesLegacy(r) => {
                let author = r
                    .author_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .unwrap_or("Anonymous")
                    .to_string();
                let time = r.time.unwrap_or_default();
                let discriminator = match r.time {
                    Some(t) => t.to_string(),
                    None => r.text.as_deref().unwrap_or_default().trim().to_string(),
                };

                NormalizedReview {
                    external_id: synthesize_review_id(
                        location_external_id,
                        &author,
                        &discriminator,
                    ),
                    author,
                    rating: r
                        .rating
                        .as_ref()
                        .map(rating_from_json)
                        .unwrap_or(NEUTRAL_RATING),
                    comment: non_empty(r.text.as_deref()),
                    review_date: DateTime::from_timestamp(time, 0)
                        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    remote_reply: None,
                }
            }
        }
    }
}

/// Map a textual star rating (`ONE`..`FIVE`) to 1..=5.
pub fn rating_from_text(raw: &str) -> u8 {
    match raw.trim().to_ascii_uppercase().as_str() {
        "ONE" => 1,
        "TWO" => 2,
        "THREE" => 3,
        "FOUR" => 4,
        "FIVE" => 5,
        other => other
            .parse::<f64>()
            .map(rating_from_number)
            .unwrap_or(NEUTRAL_RATING),
    }
}

/// Map a numeric rating to 1..=5. Non-integral or out-of-range values are neutral.
pub fn rating_from_number(value: f64) -> u8 {
    if value.fract() == 0.0 && (1.0..=5.0).contains(&value) {
        value as u8
    } else {
        NEUTRAL_RATING
    }
}

/// Map whatever representation the provider used.
pub fn rating_from_json(value: &serde_json::Value) -> u8 {
    match value {
        serde_json::Value::String(s) => rating_from_text(s),
        serde_json::Value::Number(n) => n.as_f64().map(rating_from_number).unwrap_or(NEUTRAL_RATING),
        _ => NEUTRAL_RATING,
    }
}

/// Deterministic ID for reviews the provider does not identify.
///
/// Depends only on location, author and review time (the review text when
/// there is no time), so a retried sync maps the same review to the same
/// document.
pub fn synthesize_review_id(location_external_id: &str, author: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(location_external_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(author.as_bytes());
    hasher.update(b"\n");
    hasher.update(timestamp.as_bytes());
    format!("synth_{}", &hex::encode(hasher.finalize())[..32])
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Decode a Business Profile reviews page.
pub fn page_from_v4(response: v4::ListReviewsResponse) -> ReviewsPage {
    ReviewsPage {
        reviews: response
            .reviews
            .into_iter()
            .map(RemoteReview::BusinessProfileV4)
            .collect(),
        next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
    }
}

/// Decode a Place Details response (always a single page).
pub fn page_from_places(result: places::PlaceResult) -> ReviewsPage {
    ReviewsPage {
        reviews: result
            .reviews
            .into_iter()
            .map(RemoteReview::PlacesLegacy)
            .collect(),
        next_page_token: None,
    }
}
