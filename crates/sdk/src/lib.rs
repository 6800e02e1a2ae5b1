//! Relay SDK: an HTTP client for an OAuth-protected REST API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │       Sdk       │  Built from SdkOptions
//! └────────┬────────┘
//!          │
//!          ├──► Platform   (login / refresh / logout / authorized send)
//!          │       │
//!          │       └──► ApiClient  (dispatch, error mapping, 429 retry)
//!          │
//!          └──► CacheStore (session state, cleaned on logout / teardown)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use relay_sdk::{LoginCredentials, Sdk, SdkOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sdk = Sdk::new(SdkOptions::from_env()?)?;
//!     sdk.platform().login(&LoginCredentials::new("user", "password")).await?;
//!     sdk.platform().logout().await?;
//!     sdk.cache().clean().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod error;
pub mod options;
pub mod platform;

use std::sync::Arc;

pub use auth::{AuthData, LoginCredentials, TokenResponse};
pub use cache::{CacheStore, MemoryCache};
pub use client::{ApiClient, ApiRequest, ApiResponse, RequestBody};
pub use error::{CacheError, Result, SdkError};
pub use options::SdkOptions;
pub use platform::{Platform, AUTH_CACHE_KEY, REVOKE_ENDPOINT, TOKEN_ENDPOINT};

/// SDK instance: one platform session plus its cache
#[derive(Debug)]
pub struct Sdk {
    options: SdkOptions,
    cache: Arc<dyn CacheStore>,
    platform: Platform,
}

impl Sdk {
    /// Build an SDK from options
    ///
    /// # Errors
    /// Returns `SdkError::Config` if the options fail validation, or
    /// `SdkError::Http` if a default HTTP client cannot be built.
    pub fn new(options: SdkOptions) -> Result<Self> {
        options.validate()?;

        let http = match &options.http_client {
            Some(client) => client.clone(),
            None => reqwest::Client::builder().build()?,
        };
        let cache: Arc<dyn CacheStore> = match &options.cache {
            Some(cache) => Arc::clone(cache),
            None => Arc::new(MemoryCache::new(options.cache_prefix.clone())),
        };

        let client = ApiClient::new(
            options.server.clone(),
            http,
            options.handle_rate_limit,
            options.rate_limit_delay,
        );
        let platform = Platform::new(
            client,
            Arc::clone(&cache),
            options.client_id.clone(),
            options.client_secret.clone(),
            options.redirect_uri.clone(),
            options.refresh_delay,
        );

        tracing::debug!(server = %options.server, "sdk created");
        Ok(Self { options, cache, platform })
    }

    /// OAuth session and authorized calls
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Session cache
    #[must_use]
    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    /// Options this instance was built from
    #[must_use]
    pub const fn options(&self) -> &SdkOptions {
        &self.options
    }
}
