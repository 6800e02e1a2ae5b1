//! Error types for SDK operations

use thiserror::Error;

/// Errors produced by a [`CacheStore`](crate::cache::CacheStore)
#[derive(Error, Debug)]
pub enum CacheError {
    /// A value could not be converted to or from JSON
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage behind the cache failed
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Main error type for SDK operations
#[derive(Error, Debug)]
pub enum SdkError {
    /// The server answered with a non-success status.
    ///
    /// Displays the server-provided message verbatim so callers can match on
    /// the wording the API returned.
    #[error("{message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Most specific message the response carried
        message: String,
    },

    /// Transport failure before a response was read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Session cache failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Response or stored state could not be decoded
    #[error("Invalid response: {0}")]
    Parse(String),

    /// Options are missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// No usable refresh token is stored
    #[error("Refresh token is missing")]
    NoRefreshToken,

    /// No session is stored
    #[error("Not authenticated")]
    NotAuthenticated,
}

impl SdkError {
    /// HTTP status of an API error, if this is one
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;
