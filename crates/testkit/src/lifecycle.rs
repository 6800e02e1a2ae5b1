//! Per-test lifecycle
//!
//! A test moves through `Init → Authenticated → Running → TornDown`:
//!
//! 1. **Init → Authenticated**: restore the registry, clean the SDK cache,
//!    register the authentication fixture and log in.
//! 2. **Authenticated → Running**: hand the [`TestContext`] to the test body.
//! 3. **Running → TornDown**: require every expectation to be consumed, then
//!    tear down.
//!
//! Teardown (registry restore + cache clean) runs exactly once whether the
//! body returns `Ok`, returns `Err`, or panics. A teardown failure never
//! replaces an earlier failure; it is logged and the original is reported.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use relay_sdk::{LoginCredentials, Sdk, SdkError};
use tracing::{debug, error, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::factory::{create_sdk, SdkOverrides};
use crate::fixtures;
use crate::logging::init_test_tracing;
use crate::registry::MockRegistry;

/// Placeholder username used for the bootstrap login
pub const USERNAME: &str = "whatever";

/// Placeholder password used for the bootstrap login
pub const PASSWORD: &str = "whatever";

/// Lifecycle phase of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// SDK built, not yet logged in
    Init,
    /// Bootstrap login succeeded
    Authenticated,
    /// Test body is executing
    Running,
    /// Registry restored and cache cleaned
    TornDown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Authenticated => "authenticated",
            Self::Running => "running",
            Self::TornDown => "torn-down",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct ContextInner {
    sdk: Sdk,
    registry: MockRegistry,
    phase: Mutex<Phase>,
    torn_down: AtomicBool,
}

/// Binding between one SDK instance and one registry for a single test
///
/// Clones share state, so the body may keep its copy past the call.
#[derive(Debug, Clone)]
pub struct TestContext {
    inner: Arc<ContextInner>,
}

impl TestContext {
    fn new(sdk: Sdk, registry: MockRegistry) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                sdk,
                registry,
                phase: Mutex::new(Phase::Init),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// SDK under test
    #[must_use]
    pub fn sdk(&self) -> &Sdk {
        &self.inner.sdk
    }

    /// Registry serving the SDK's HTTP traffic
    #[must_use]
    pub fn registry(&self) -> &MockRegistry {
        &self.inner.registry
    }

    /// Current lifecycle phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.inner.phase.lock()
    }

    /// Whether teardown has already run
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }

    /// Restore the registry and clean the SDK cache
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    /// The cache is cleaned even when nothing was registered.
    ///
    /// # Errors
    /// Returns `HarnessError::Teardown` if the cache clean fails. The registry
    /// is restored regardless.
    pub async fn teardown(&self) -> HarnessResult<()> {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            debug!("teardown already ran");
            return Ok(());
        }

        self.inner.registry.restore().await;
        let cleaned = self.inner.sdk.cache().clean().await;
        self.set_phase(Phase::TornDown);

        cleaned.map_err(|e| HarnessError::Teardown(SdkError::Cache(e)))
    }

    fn set_phase(&self, next: Phase) {
        let mut phase = self.inner.phase.lock();
        let previous = *phase;
        debug!(from = %previous, to = %next, "test phase changed");
        *phase = next;
    }
}

/// Configurable entry point for one harnessed test
#[derive(Debug, Default)]
pub struct Harness {
    registry: Option<MockRegistry>,
    overrides: SdkOverrides,
    credentials: Option<LoginCredentials>,
}

impl Harness {
    /// Harness with a fresh registry, default options and placeholder
    /// credentials
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing registry instead of starting a new one
    #[must_use]
    pub fn with_registry(mut self, registry: MockRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Options layered over the SDK test defaults
    #[must_use]
    pub fn with_overrides(mut self, overrides: SdkOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Credentials for the bootstrap login
    #[must_use]
    pub fn with_credentials(mut self, credentials: LoginCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Run `body` inside a fully managed test context
    ///
    /// A panic in the body is caught long enough to tear down, then resumed.
    ///
    /// # Errors
    /// - `HarnessError::Setup` if SDK construction, cache cleanup or login
    ///   fails
    /// - `HarnessError::MocksNotDone` if registered expectations went unused
    /// - the body's own error, unchanged (a `HarnessError` raised inside the
    ///   body is passed through as itself; anything else as
    ///   `HarnessError::Body`)
    /// - `HarnessError::Teardown` if only teardown failed
    pub async fn run<F, Fut>(self, body: F) -> HarnessResult<()>
    where
        F: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        init_test_tracing();

        let registry = match self.registry {
            Some(registry) => registry,
            None => MockRegistry::start().await?,
        };
        let sdk = create_sdk(&registry, self.overrides).map_err(HarnessError::Setup)?;
        let ctx = TestContext::new(sdk, registry);
        let credentials =
            self.credentials.unwrap_or_else(|| LoginCredentials::new(USERNAME, PASSWORD));

        let outcome = AssertUnwindSafe(drive(&ctx, &credentials, body)).catch_unwind().await;
        let teardown = ctx.teardown().await;

        match outcome {
            Ok(Ok(())) => teardown,
            Ok(Err(err)) => {
                if let Err(secondary) = teardown {
                    warn!(error = %secondary, "teardown failed after test failure");
                }
                error!(error = %err, "harnessed test failed");
                Err(err)
            }
            Err(panic) => {
                if let Err(secondary) = teardown {
                    warn!(error = %secondary, "teardown failed after test panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Run `body` with default harness settings
///
/// # Errors
/// See [`Harness::run`].
pub async fn async_test<F, Fut>(body: F) -> HarnessResult<()>
where
    F: FnOnce(TestContext) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    Harness::new().run(body).await
}

async fn drive<F, Fut>(
    ctx: &TestContext,
    credentials: &LoginCredentials,
    body: F,
) -> HarnessResult<()>
where
    F: FnOnce(TestContext) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    // Leftovers from a registry shared with an earlier test must not match
    ctx.registry().restore().await;
    ctx.sdk().cache().clean().await.map_err(|e| HarnessError::Setup(SdkError::Cache(e)))?;

    fixtures::authentication(ctx.registry()).await;
    ctx.sdk().platform().login(credentials).await.map_err(HarnessError::Setup)?;
    ctx.set_phase(Phase::Authenticated);

    ctx.set_phase(Phase::Running);
    body(ctx.clone())
        .await
        .map_err(|e| e.downcast::<HarnessError>().unwrap_or_else(HarnessError::Body))?;

    let pending = ctx.registry().pending().await?;
    if !pending.is_empty() {
        return Err(HarnessError::MocksNotDone { pending });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names() {
        assert_eq!(Phase::Init.to_string(), "init");
        assert_eq!(Phase::TornDown.to_string(), "torn-down");
    }

    #[tokio::test]
    async fn body_runs_authenticated() {
        let result = async_test(|ctx| async move {
            assert_eq!(ctx.phase(), Phase::Running);
            let auth = ctx.sdk().platform().auth().await?.expect("logged in");
            assert_eq!(auth.access_token, fixtures::ACCESS_TOKEN);
            Ok(())
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let registry = MockRegistry::start().await.unwrap();
        let sdk = create_sdk(&registry, SdkOverrides::default()).unwrap();
        let ctx = TestContext::new(sdk, registry.clone());

        ctx.teardown().await.unwrap();
        ctx.teardown().await.unwrap();

        assert!(ctx.is_torn_down());
        assert_eq!(ctx.phase(), Phase::TornDown);
        assert_eq!(registry.restore_count(), 1);
    }
}
