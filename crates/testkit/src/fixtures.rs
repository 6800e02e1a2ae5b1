//! Canned OAuth responses
//!
//! Each fixture produces a POST expectation against the token or revoke
//! endpoint. Bodies are rebuilt on every call, so the authentication
//! fixture's `expireTime` is always stamped against the current clock.

use chrono::Utc;
use relay_sdk::{REVOKE_ENDPOINT, TOKEN_ENDPOINT};
use reqwest::Method;
use serde_json::{json, Value};

use crate::registry::{MockRegistry, ResponseSpec};

/// Access token issued by the login fixture
pub const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
/// Refresh token issued by the login fixture
pub const REFRESH_TOKEN: &str = "REFRESH_TOKEN";
/// Access token issued by the refresh fixture
pub const ACCESS_TOKEN_FROM_REFRESH: &str = "ACCESS_TOKEN_FROM_REFRESH";
/// Refresh token issued by the refresh fixture
pub const REFRESH_TOKEN_FROM_REFRESH: &str = "REFRESH_TOKEN_FROM_REFRESH";
/// Token scheme in every token fixture
pub const TOKEN_TYPE: &str = "bearer";
/// Granted scopes in every token fixture
pub const SCOPE: &str = "SMS RCM Foo Boo";
/// Access token lifetime in seconds
pub const EXPIRES_IN: i64 = 3600;
/// Refresh token lifetime in seconds
pub const REFRESH_TOKEN_EXPIRES_IN: i64 = 60480;
/// Message carried by the refresh failure fixture
pub const WRONG_TOKEN: &str = "Wrong token";

/// Named response templates for the simulated OAuth flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixture {
    /// Successful password login
    Authenticate,
    /// Successful token revocation
    Logout,
    /// Successful refresh-token exchange
    TokenRefresh,
    /// Rejected refresh-token exchange
    TokenRefreshFailure,
}

impl Fixture {
    /// Endpoint the fixture answers
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Logout => REVOKE_ENDPOINT,
            Self::Authenticate | Self::TokenRefresh | Self::TokenRefreshFailure => TOKEN_ENDPOINT,
        }
    }

    /// HTTP status the fixture answers with
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::TokenRefreshFailure => 400,
            Self::Authenticate | Self::Logout | Self::TokenRefresh => 200,
        }
    }

    /// Fresh response body
    #[must_use]
    pub fn body(self) -> Value {
        match self {
            Self::Authenticate => json!({
                "access_token": ACCESS_TOKEN,
                "token_type": TOKEN_TYPE,
                "expires_in": EXPIRES_IN,
                "refresh_token": REFRESH_TOKEN,
                "refresh_token_expires_in": REFRESH_TOKEN_EXPIRES_IN,
                "scope": SCOPE,
                "expireTime": Utc::now().timestamp_millis() + EXPIRES_IN * 1000,
            }),
            Self::Logout => json!({}),
            Self::TokenRefresh => json!({
                "access_token": ACCESS_TOKEN_FROM_REFRESH,
                "token_type": TOKEN_TYPE,
                "expires_in": EXPIRES_IN,
                "refresh_token": REFRESH_TOKEN_FROM_REFRESH,
                "refresh_token_expires_in": REFRESH_TOKEN_EXPIRES_IN,
                "scope": SCOPE,
            }),
            Self::TokenRefreshFailure => json!({
                "message": WRONG_TOKEN,
                "error_description": WRONG_TOKEN,
                "description": WRONG_TOKEN,
            }),
        }
    }

    /// Response specification for this fixture
    #[must_use]
    pub fn response(self) -> ResponseSpec {
        let spec = ResponseSpec::json(self.body()).status(self.status());
        if self.status() == 400 {
            spec.status_text("Bad Request")
        } else {
            spec
        }
    }

    /// Register the fixture as a single-use expectation
    pub async fn register(self, registry: &MockRegistry) {
        registry.register_once(Method::POST, self.path(), self.response()).await;
    }
}

/// Expect one successful login
pub async fn authentication(registry: &MockRegistry) {
    Fixture::Authenticate.register(registry).await;
}

/// Expect one successful revocation
pub async fn logout(registry: &MockRegistry) {
    Fixture::Logout.register(registry).await;
}

/// Expect one refresh-token exchange, successful unless `failure`
pub async fn token_refresh(registry: &MockRegistry, failure: bool) {
    let fixture = if failure { Fixture::TokenRefreshFailure } else { Fixture::TokenRefresh };
    fixture.register(registry).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_body_stamps_expiry() {
        let before = Utc::now().timestamp_millis();
        let body = Fixture::Authenticate.body();
        let after = Utc::now().timestamp_millis();

        let expire = body["expireTime"].as_i64().unwrap();
        assert!(expire >= before + 3_600_000 && expire <= after + 3_600_000);
        assert_eq!(body["access_token"], ACCESS_TOKEN);
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["expires_in"], 3600);
        assert_eq!(body["refresh_token_expires_in"], 60480);
    }

    #[test]
    fn refresh_body_has_new_tokens_and_no_expire_time() {
        let body = Fixture::TokenRefresh.body();
        let initial = Fixture::Authenticate.body();

        assert_eq!(body["access_token"], ACCESS_TOKEN_FROM_REFRESH);
        assert_ne!(body["access_token"], initial["access_token"]);
        assert_ne!(body["refresh_token"], initial["refresh_token"]);
        assert_eq!(body["scope"], initial["scope"]);
        assert!(body.get("expireTime").is_none());
        assert_eq!(Fixture::TokenRefresh.status(), 200);
    }

    #[test]
    fn refresh_failure_sets_every_message_field() {
        let body = Fixture::TokenRefreshFailure.body();
        for field in ["message", "error_description", "description"] {
            assert_eq!(body[field], WRONG_TOKEN);
        }
        assert_eq!(Fixture::TokenRefreshFailure.status(), 400);
        assert_eq!(Fixture::TokenRefreshFailure.response().status_text, "Bad Request");
    }

    #[test]
    fn logout_targets_revoke_endpoint() {
        assert_eq!(Fixture::Logout.path(), "/restapi/oauth/revoke");
        assert_eq!(Fixture::Logout.body(), json!({}));
        assert_eq!(Fixture::Authenticate.path(), "/restapi/oauth/token");
    }

    #[tokio::test]
    async fn helpers_register_post_expectations() {
        let registry = MockRegistry::start().await.unwrap();
        authentication(&registry).await;
        token_refresh(&registry, true).await;
        logout(&registry).await;

        let registered = registry.expectations();
        assert_eq!(registered.len(), 3);
        assert!(registered.iter().all(|e| e.method == Method::POST && e.repeat == 1));
        assert_eq!(registered[1].response.status, 400);
        assert_eq!(registered[2].path.to_string(), REVOKE_ENDPOINT);
    }
}
