//! Application configuration loaded from environment variables.
//!
//! On Cloud Run secrets are injected as environment variables by secret
//! bindings, so everything is read from the environment once at startup.

use std::env;

/// Header carrying the shared secret on `/tasks/*` scheduler calls.
pub const TASKS_SECRET_HEADER: &str = "x-tasks-secret";

/// Which datastore backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatastoreKind {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID (public)
    pub google_client_id: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// Public URL of this API (OAuth callback base)
    pub api_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Datastore backend
    pub datastore: DatastoreKind,
    /// Server port
    pub port: u16,
    /// Timeout applied to every outbound HTTP call
    pub http_timeout_secs: u64,
    /// Hard ceiling on review pages fetched per sync
    pub sync_max_pages: u32,
    /// Chat-completions endpoint base URL
    pub llm_api_url: String,
    /// Model used for reply generation
    pub llm_model: String,
    /// Stripe price ID of the Pro plan
    pub stripe_price_pro: String,
    /// Stripe price ID of the Business plan
    pub stripe_price_business: String,

    // --- Secrets ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// Places API key for place-id locations
    pub google_places_api_key: Option<String>,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
    /// Shared secret expected from the scheduler on `/tasks/*`
    pub tasks_shared_secret: String,
    /// Stripe webhook signing secret (`whsec_...`)
    pub stripe_webhook_secret: String,
    /// LLM provider API key
    pub llm_api_key: String,
}

impl Config {
    /// Config for testing only.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test_client_id".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            datastore: DatastoreKind::Memory,
            port: 8080,
            http_timeout_secs: 10,
            sync_max_pages: 10,
            llm_api_url: "http://127.0.0.1:9".to_string(),
            llm_model: "test-model".to_string(),
            stripe_price_pro: "price_pro".to_string(),
            stripe_price_business: "price_business".to_string(),
            google_client_secret: "test_secret".to_string(),
            google_places_api_key: None,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
            tasks_shared_secret: "test_tasks_secret".to_string(),
            stripe_webhook_secret: "whsec_test".to_string(),
            llm_api_key: "test_llm_key".to_string(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let datastore = match env::var("DATASTORE").as_deref() {
            Ok("memory") => DatastoreKind::Memory,
            Ok("firestore") | Err(_) => DatastoreKind::Firestore,
            Ok(_) => return Err(ConfigError::Invalid("DATASTORE")),
        };

        Ok(Self {
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            datastore,
            port: parse_or("PORT", 8080)?,
            http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", 10)?,
            sync_max_pages: parse_or("SYNC_MAX_PAGES", 10)?,
            llm_api_url: env::var("LLM_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            stripe_price_pro: env::var("STRIPE_PRICE_PRO").unwrap_or_default(),
            stripe_price_business: env::var("STRIPE_PRICE_BUSINESS").unwrap_or_default(),

            google_client_secret: required("GOOGLE_CLIENT_SECRET")?,
            google_places_api_key: env::var("GOOGLE_PLACES_API_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            oauth_state_key: required("OAUTH_STATE_KEY")?.into_bytes(),
            tasks_shared_secret: required("TASKS_SHARED_SECRET")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            llm_api_key: required("LLM_API_KEY")?,
        })
    }
}

/// Read a required variable, trimming stray whitespace from secret bindings.
fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
