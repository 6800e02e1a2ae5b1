//! SDK construction options
//!
//! Options can be assembled in code or loaded from the environment.
//!
//! ## Environment Variables
//! - `RELAY_SERVER`: API origin (required)
//! - `RELAY_CLIENT_ID`: OAuth client id (required)
//! - `RELAY_CLIENT_SECRET`: OAuth client secret (required)
//! - `RELAY_REDIRECT_URI`: Redirect URI registered for the client
//! - `RELAY_REFRESH_DELAY_MS`: Delay before a token refresh is sent
//! - `RELAY_HANDLE_RATE_LIMIT`: Retry once on HTTP 429 (true/false)
//! - `RELAY_CACHE_PREFIX`: Key prefix for the in-memory cache

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::cache::CacheStore;
use crate::error::{Result, SdkError};

/// Default delay before a refresh request is dispatched
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(100);

/// Default wait after HTTP 429 when the server sends no `Retry-After`
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

/// Default cache key prefix
pub const DEFAULT_CACHE_PREFIX: &str = "rc-";

/// Options used to construct an [`Sdk`](crate::Sdk)
#[derive(Clone)]
pub struct SdkOptions {
    /// API origin every request path is joined onto
    pub server: String,

    /// OAuth client id
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Redirect URI registered for the client
    pub redirect_uri: Option<String>,

    /// Wait applied before each token refresh
    pub refresh_delay: Duration,

    /// Retry once after HTTP 429
    pub handle_rate_limit: bool,

    /// Wait after HTTP 429 when no `Retry-After` header is present
    pub rate_limit_delay: Duration,

    /// Prefix applied to cache keys
    pub cache_prefix: String,

    /// HTTP client used for every dispatch; a default client is built when
    /// absent
    pub http_client: Option<reqwest::Client>,

    /// Cache store; a [`MemoryCache`](crate::cache::MemoryCache) is used when
    /// absent
    pub cache: Option<Arc<dyn CacheStore>>,
}

impl fmt::Debug for SdkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkOptions")
            .field("server", &self.server)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("refresh_delay", &self.refresh_delay)
            .field("handle_rate_limit", &self.handle_rate_limit)
            .field("rate_limit_delay", &self.rate_limit_delay)
            .field("cache_prefix", &self.cache_prefix)
            .field("http_client", &self.http_client.is_some())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl SdkOptions {
    /// Create options with default tuning for the given server and client
    #[must_use]
    pub fn new(
        server: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            refresh_delay: DEFAULT_REFRESH_DELAY,
            handle_rate_limit: true,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            http_client: None,
            cache: None,
        }
    }

    /// Load options from environment variables
    ///
    /// A `.env` file in the working directory is read first if present.
    ///
    /// # Errors
    /// Returns `SdkError::Config` if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "No .env file loaded");
        }

        let mut options = Self::new(
            env_var("RELAY_SERVER")?,
            env_var("RELAY_CLIENT_ID")?,
            env_var("RELAY_CLIENT_SECRET")?,
        );

        options.redirect_uri = std::env::var("RELAY_REDIRECT_URI").ok();

        if let Ok(raw) = std::env::var("RELAY_REFRESH_DELAY_MS") {
            let millis = raw.parse::<u64>().map_err(|e| {
                SdkError::Config(format!("Invalid RELAY_REFRESH_DELAY_MS '{raw}': {e}"))
            })?;
            options.refresh_delay = Duration::from_millis(millis);
        }

        options.handle_rate_limit = env_bool("RELAY_HANDLE_RATE_LIMIT", true);

        if let Ok(prefix) = std::env::var("RELAY_CACHE_PREFIX") {
            options.cache_prefix = prefix;
        }

        Ok(options)
    }

    /// Check that the options can produce a working SDK
    ///
    /// # Errors
    /// Returns `SdkError::Config` if the server is not an absolute URL or the
    /// client id is empty.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.server)
            .map_err(|e| SdkError::Config(format!("Invalid server URL '{}': {e}", self.server)))?;

        if self.client_id.trim().is_empty() {
            return Err(SdkError::Config("Client id must not be empty".to_string()));
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| SdkError::Config(format!("Missing environment variable: {name}")))
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name).map_or(default, |v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}
