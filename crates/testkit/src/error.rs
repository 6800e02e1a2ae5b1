//! Harness error taxonomy

use relay_sdk::SdkError;
use thiserror::Error;

/// Failures reported by the harness to the outer test runner
#[derive(Error, Debug)]
pub enum HarnessError {
    /// SDK construction, residual cache cleanup or login failed before the
    /// test body ran
    #[error("Harness setup failed: {0}")]
    Setup(#[source] SdkError),

    /// The mocking engine could not answer a query
    #[error("Mock registry error: {0}")]
    Registry(String),

    /// The body finished but registered expectations were never matched
    #[error("Mocks not done: {} expectation(s) pending: {}", pending.len(), pending.join(", "))]
    MocksNotDone {
        /// Descriptions of the unconsumed expectations
        pending: Vec<String>,
    },

    /// Error returned by the test body, reported unchanged
    #[error(transparent)]
    Body(anyhow::Error),

    /// The action under `expect_throws` completed successfully
    #[error("Action did not throw; expected an error containing \"{expected}\"")]
    DidNotThrow {
        /// Substring the error should have contained
        expected: String,
    },

    /// The action failed with a message lacking the expected substring
    #[error("Error message \"{actual}\" does not contain \"{expected}\"")]
    ErrorMismatch {
        /// Substring the error should have contained
        expected: String,
        /// Message the error actually carried
        actual: String,
    },

    /// The caller's follow-up assertion on a caught error failed
    #[error(transparent)]
    OnCaught(anyhow::Error),

    /// Cache cleanup during teardown failed
    #[error("Teardown failed: {0}")]
    Teardown(#[source] SdkError),
}

/// Result type alias for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mocks_not_done_lists_pending() {
        let err = HarnessError::MocksNotDone {
            pending: vec!["POST /a (0/1)".to_string(), "GET /b (1/2)".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Mocks not done: 2 expectation(s)"));
        assert!(msg.contains("POST /a (0/1), GET /b (1/2)"));
    }

    #[test]
    fn body_error_is_transparent() {
        let err = HarnessError::Body(anyhow::anyhow!("assertion exploded"));
        assert_eq!(err.to_string(), "assertion exploded");
    }

    #[test]
    fn setup_error_keeps_source() {
        let err = HarnessError::Setup(SdkError::NotAuthenticated);
        assert_eq!(err.to_string(), "Harness setup failed: Not authenticated");
        assert!(std::error::Error::source(&err).is_some());
    }
}
