//! Builds SDK instances wired to a [`MockRegistry`]

use std::sync::Arc;
use std::time::Duration;

use relay_sdk::{CacheStore, Sdk, SdkOptions};

use crate::registry::MockRegistry;

/// Placeholder OAuth client id
pub const CLIENT_ID: &str = "whatever";
/// Placeholder OAuth client secret
pub const CLIENT_SECRET: &str = "whatever";
/// Fixed redirect URI
pub const REDIRECT_URI: &str = "http://foo";
/// Refresh delay short enough to keep tests fast
pub const REFRESH_DELAY: Duration = Duration::from_millis(1);

/// Caller-supplied options layered over the test defaults
///
/// Every `Some` field wins over the corresponding default.
#[derive(Debug, Clone, Default)]
pub struct SdkOverrides {
    /// API origin
    pub server: Option<String>,
    /// OAuth client id
    pub client_id: Option<String>,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Redirect URI
    pub redirect_uri: Option<String>,
    /// Delay before each refresh
    pub refresh_delay: Option<Duration>,
    /// Retry once on HTTP 429
    pub handle_rate_limit: Option<bool>,
    /// Wait after HTTP 429 without `Retry-After`
    pub rate_limit_delay: Option<Duration>,
    /// Cache key prefix
    pub cache_prefix: Option<String>,
    /// HTTP client; the registry client by default
    pub http_client: Option<reqwest::Client>,
    /// Cache store
    pub cache: Option<Arc<dyn CacheStore>>,
}

impl SdkOverrides {
    /// Apply the overrides on top of `base`
    #[must_use]
    pub fn apply(self, mut base: SdkOptions) -> SdkOptions {
        if let Some(v) = self.server {
            base.server = v;
        }
        if let Some(v) = self.client_id {
            base.client_id = v;
        }
        if let Some(v) = self.client_secret {
            base.client_secret = v;
        }
        if let Some(v) = self.redirect_uri {
            base.redirect_uri = Some(v);
        }
        if let Some(v) = self.refresh_delay {
            base.refresh_delay = v;
        }
        if let Some(v) = self.handle_rate_limit {
            base.handle_rate_limit = v;
        }
        if let Some(v) = self.rate_limit_delay {
            base.rate_limit_delay = v;
        }
        if let Some(v) = self.cache_prefix {
            base.cache_prefix = v;
        }
        if let Some(v) = self.http_client {
            base.http_client = Some(v);
        }
        if let Some(v) = self.cache {
            base.cache = Some(v);
        }
        base
    }
}

/// Default options for tests against `registry`
#[must_use]
pub fn default_options(registry: &MockRegistry) -> SdkOptions {
    let mut options = SdkOptions::new(registry.base_url(), CLIENT_ID, CLIENT_SECRET);
    options.redirect_uri = Some(REDIRECT_URI.to_string());
    options.refresh_delay = REFRESH_DELAY;
    options.handle_rate_limit = false;
    options.http_client = Some(registry.http_client());
    options
}

/// Build an SDK whose HTTP traffic is served by `registry`
///
/// Construction only; nothing is registered and no request is sent.
///
/// # Errors
/// Returns the SDK's configuration error if the merged options are invalid.
pub fn create_sdk(registry: &MockRegistry, overrides: SdkOverrides) -> relay_sdk::Result<Sdk> {
    Sdk::new(overrides.apply(default_options(registry)))
}
