//! OAuth token types
//!
//! [`TokenResponse`] mirrors what the token endpoint returns; [`AuthData`] is
//! what the platform keeps in its cache between calls.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Token endpoint response
///
/// Some servers also return an absolute `expireTime`; when present it wins
/// over the value computed from `expires_in`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer credential for API calls
    pub access_token: String,
    /// Scheme used in the `Authorization` header
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Credential for the refresh grant
    pub refresh_token: Option<String>,
    /// Refresh token lifetime in seconds
    pub refresh_token_expires_in: Option<i64>,
    /// Space-separated granted scopes
    pub scope: Option<String>,
    /// Absolute access token expiry, milliseconds since the Unix epoch
    #[serde(rename = "expireTime")]
    pub expire_time: Option<i64>,
}

/// Stored authentication state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    /// Bearer credential for API calls
    pub access_token: String,

    /// Scheme used in the `Authorization` header
    pub token_type: String,

    /// Access token lifetime in seconds
    pub expires_in: i64,

    /// Absolute access token expiry, milliseconds since the Unix epoch
    #[serde(rename = "expireTime")]
    pub expire_time: i64,

    /// Credential for the refresh grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Refresh token lifetime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_in: Option<i64>,

    /// Absolute refresh token expiry, milliseconds since the Unix epoch
    #[serde(rename = "refreshTokenExpireTime", skip_serializing_if = "Option::is_none")]
    pub refresh_token_expire_time: Option<i64>,

    /// Space-separated granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl AuthData {
    /// Build stored state from a token response, stamping expiries against
    /// `now_ms`
    #[must_use]
    pub fn from_response(response: TokenResponse, now_ms: i64) -> Self {
        let expire_time =
            response.expire_time.unwrap_or_else(|| expiry_after(now_ms, response.expires_in));
        let refresh_token_expire_time =
            response.refresh_token_expires_in.map(|secs| expiry_after(now_ms, secs));

        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            expire_time,
            refresh_token: response.refresh_token,
            refresh_token_expires_in: response.refresh_token_expires_in,
            refresh_token_expire_time,
            scope: response.scope,
        }
    }

    /// Whether the access token is still usable
    #[must_use]
    pub fn access_token_valid(&self) -> bool {
        !self.access_token.is_empty() && Utc::now().timestamp_millis() < self.expire_time
    }

    /// Whether a refresh token is present and not known to be expired
    #[must_use]
    pub fn refresh_token_valid(&self) -> bool {
        match (&self.refresh_token, self.refresh_token_expire_time) {
            (Some(token), Some(expiry)) => {
                !token.is_empty() && Utc::now().timestamp_millis() < expiry
            }
            (Some(token), None) => !token.is_empty(),
            (None, _) => false,
        }
    }

    /// Value for the `Authorization` header
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Absolute expiry in ms for a lifetime in seconds; saturates on absurd
/// server values
const fn expiry_after(now_ms: i64, lifetime_secs: i64) -> i64 {
    now_ms.saturating_add(lifetime_secs.saturating_mul(1000))
}

/// Resource owner credentials for the password grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    /// Account login name
    pub username: String,
    /// Account password
    pub password: String,
}

impl LoginCredentials {
    /// Bundle a username and password
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}
