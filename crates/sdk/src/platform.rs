//! Authentication lifecycle and authorized calls
//!
//! The platform owns the OAuth flows against the server:
//! - password login against the token endpoint
//! - refresh-token exchange (serialized, delayed by `refresh_delay`)
//! - revocation on logout
//!
//! Auth state lives in the SDK cache under [`AUTH_CACHE_KEY`] so that a
//! cache clean logs the platform out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{AuthData, LoginCredentials, TokenResponse};
use crate::cache::CacheStore;
use crate::client::{ApiClient, ApiRequest, ApiResponse};
use crate::error::{Result, SdkError};

/// Token endpoint path
pub const TOKEN_ENDPOINT: &str = "/restapi/oauth/token";

/// Revocation endpoint path
pub const REVOKE_ENDPOINT: &str = "/restapi/oauth/revoke";

/// Cache key holding [`AuthData`]
pub const AUTH_CACHE_KEY: &str = "platform";

/// OAuth session bound to one SDK instance
#[derive(Debug)]
pub struct Platform {
    client: ApiClient,
    cache: Arc<dyn CacheStore>,
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
    refresh_delay: Duration,
    refresh_lock: Mutex<()>,
}

impl Platform {
    /// Session over `client`, storing auth in `cache`
    #[must_use]
    pub fn new(
        client: ApiClient,
        cache: Arc<dyn CacheStore>,
        client_id: String,
        client_secret: String,
        redirect_uri: Option<String>,
        refresh_delay: Duration,
    ) -> Self {
        Self {
            client,
            cache,
            client_id,
            client_secret,
            redirect_uri,
            refresh_delay,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Log in with the password grant and store the issued tokens
    ///
    /// # Errors
    /// Returns `SdkError::Api` if the server rejects the credentials, or a
    /// transport/parse/cache error.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthData> {
        let request = self.token_request([
            ("grant_type", "password".to_string()),
            ("username", credentials.username.clone()),
            ("password", credentials.password.clone()),
        ]);

        let auth = self.exchange(&request).await?;
        info!(username = %credentials.username, "logged in");
        Ok(auth)
    }

    /// Exchange the stored refresh token for a new token pair
    ///
    /// Concurrent callers are serialized; each waits `refresh_delay` before
    /// the request goes out.
    ///
    /// # Errors
    /// Returns `SdkError::NotAuthenticated` without stored auth,
    /// `SdkError::NoRefreshToken` if the refresh token is missing or expired,
    /// and `SdkError::Api` if the server rejects the exchange.
    pub async fn refresh(&self) -> Result<AuthData> {
        let _guard = self.refresh_lock.lock().await;

        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }

        let current = self.auth().await?.ok_or(SdkError::NotAuthenticated)?;
        if !current.refresh_token_valid() {
            return Err(SdkError::NoRefreshToken);
        }
        let refresh_token = current.refresh_token.ok_or(SdkError::NoRefreshToken)?;

        let request = self.token_request([
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
        ]);

        match self.exchange(&request).await {
            Ok(auth) => {
                debug!("access token refreshed");
                Ok(auth)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                Err(e)
            }
        }
    }

    /// Revoke the access token and forget stored auth
    ///
    /// # Errors
    /// Returns `SdkError::NotAuthenticated` without stored auth, or the
    /// revocation failure. Stored auth is kept when revocation fails.
    pub async fn logout(&self) -> Result<()> {
        let current = self.auth().await?.ok_or(SdkError::NotAuthenticated)?;

        let request = ApiRequest::post(REVOKE_ENDPOINT)
            .form([("token", current.access_token)])
            .basic_auth(self.client_id.as_str(), self.client_secret.as_str());
        self.client.send(&request).await?;

        self.cache.remove(AUTH_CACHE_KEY).await?;
        info!("logged out");
        Ok(())
    }

    /// Stored auth, if any
    ///
    /// # Errors
    /// Returns a cache error, or `SdkError::Parse` if the stored value is
    /// corrupt.
    pub async fn auth(&self) -> Result<Option<AuthData>> {
        match self.cache.get(AUTH_CACHE_KEY).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SdkError::Parse(format!("stored auth data: {e}"))),
            None => Ok(None),
        }
    }

    /// Whether a usable access token is stored
    ///
    /// # Errors
    /// Returns a cache error.
    pub async fn logged_in(&self) -> Result<bool> {
        Ok(self.auth().await?.is_some_and(|auth| auth.access_token_valid()))
    }

    /// Send an authorized request, refreshing an expired access token first
    ///
    /// # Errors
    /// Returns `SdkError::NotAuthenticated` without stored auth, any refresh
    /// failure, or the request failure.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut auth = self.auth().await?.ok_or(SdkError::NotAuthenticated)?;
        if !auth.access_token_valid() {
            debug!(path = %request.path, "access token expired, refreshing before request");
            auth = self.refresh().await?;
        }

        let request = request.header("Authorization", auth.authorization_header());
        self.client.send(&request).await
    }

    /// Redirect URI configured for this client
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    fn token_request<const N: usize>(&self, fields: [(&str, String); N]) -> ApiRequest {
        ApiRequest::post(TOKEN_ENDPOINT)
            .form(fields)
            .basic_auth(self.client_id.as_str(), self.client_secret.as_str())
    }

    async fn exchange(&self, request: &ApiRequest) -> Result<AuthData> {
        let response = self.client.send(request).await?;
        let token: TokenResponse = response.json()?;
        let auth = AuthData::from_response(token, Utc::now().timestamp_millis());

        let value = serde_json::to_value(&auth).map_err(|e| SdkError::Parse(e.to_string()))?;
        self.cache.set(AUTH_CACHE_KEY, value).await?;
        Ok(auth)
    }
}
