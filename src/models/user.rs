//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business owner profile stored in the `users` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable Google account subject (also used as document ID)
    pub user_id: String,
    /// Email address (may be None if not shared)
    pub email: Option<String>,
    /// Display name from the Google profile
    pub display_name: Option<String>,
    /// When the user first connected
    pub created_at: DateTime<Utc>,
    /// Last sign-in
    pub last_active: DateTime<Utc>,
}
