//! Expected-failure assertions

use std::fmt::Display;
use std::future::Future;

use crate::error::{HarnessError, HarnessResult};

/// Await `action` and require it to fail with a message containing
/// `expected`
///
/// Matching is by substring so assertions survive rewording around the key
/// phrase. An empty `expected` accepts any error. Returns the caught error
/// for further inspection.
///
/// # Errors
/// - `HarnessError::DidNotThrow` if the action succeeds
/// - `HarnessError::ErrorMismatch` if the message lacks `expected`
///
/// # Examples
///
/// ```
/// # use relay_testkit::expect_throws;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), relay_testkit::HarnessError> {
/// let failing = async { Err::<(), _>("Wrong token supplied") };
/// let caught = expect_throws(failing, "Wrong token").await?;
/// assert_eq!(caught, "Wrong token supplied");
/// # Ok(())
/// # }
/// ```
pub async fn expect_throws<T, E, Fut>(action: Fut, expected: &str) -> HarnessResult<E>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match action.await {
        Ok(_) => Err(HarnessError::DidNotThrow { expected: expected.to_string() }),
        Err(caught) => {
            let actual = caught.to_string();
            if actual.contains(expected) {
                Ok(caught)
            } else {
                Err(HarnessError::ErrorMismatch { expected: expected.to_string(), actual })
            }
        }
    }
}

/// Like [`expect_throws`], then hand the caught error to `on_caught`
///
/// # Errors
/// Everything [`expect_throws`] returns, plus `HarnessError::OnCaught`
/// carrying the callback's own failure.
pub async fn expect_throws_with<T, E, Fut, C, CFut>(
    action: Fut,
    expected: &str,
    on_caught: C,
) -> HarnessResult<()>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    C: FnOnce(E) -> CFut,
    CFut: Future<Output = anyhow::Result<()>>,
{
    let caught = expect_throws(action, expected).await?;
    on_caught(caught).await.map_err(HarnessError::OnCaught)
}
