//! Integration tests for the managed test lifecycle
//!
//! **Coverage:**
//! - OAuth flows driven through fixtures: refresh success and failure, logout
//! - Unconsumed expectations fail the test after the body finishes
//! - Teardown runs exactly once on success, failure and panic
//! - Teardown failures never mask the body's failure
//! - Setup cleans residual cache state and fails fast when login fails
//! - Same-route expectations are served in registration order
//! - Relative and query-bearing paths are credited once served
//!
//! **Infrastructure:**
//! - One `MockRegistry` (wiremock server) per test
//! - `CountingCache` records how often the SDK cache is cleaned

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use relay_sdk::{ApiRequest, CacheError, CacheStore, MemoryCache, SdkError};
use relay_testkit::fixtures::{self, ACCESS_TOKEN_FROM_REFRESH, REFRESH_TOKEN_FROM_REFRESH};
use relay_testkit::{
    async_test, expect_throws, expect_throws_with, Harness, HarnessError, MockRegistry, Phase,
    ResponseSpec, SdkOverrides, TestContext,
};
use reqwest::Method;
use serde_json::{json, Value};

// ============================================================================
// Counting cache
// ============================================================================

#[derive(Debug)]
struct CountingCache {
    inner: MemoryCache,
    cleans: AtomicUsize,
    fail_clean: AtomicBool,
}

impl CountingCache {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCache::new("rc-"),
            cleans: AtomicUsize::new(0),
            fail_clean: AtomicBool::new(false),
        })
    }

    fn cleans(&self) -> usize {
        self.cleans.load(Ordering::SeqCst)
    }

    fn fail_next_clean(&self) {
        self.fail_clean.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStore for CountingCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key).await
    }

    async fn clean(&self) -> Result<(), CacheError> {
        self.cleans.fetch_add(1, Ordering::SeqCst);
        if self.fail_clean.swap(false, Ordering::SeqCst) {
            return Err(CacheError::Backend("storage unavailable".to_string()));
        }
        self.inner.clean().await
    }
}

/// Harness over a fresh registry and a counting cache, with handles to both
async fn counting_harness() -> (Harness, MockRegistry, Arc<CountingCache>) {
    let registry = MockRegistry::start().await.unwrap();
    let cache = CountingCache::new();
    let overrides = SdkOverrides {
        cache: Some(cache.clone() as Arc<dyn CacheStore>),
        ..SdkOverrides::default()
    };
    let harness = Harness::new().with_registry(registry.clone()).with_overrides(overrides);
    (harness, registry, cache)
}

// ============================================================================
// OAuth flows
// ============================================================================

#[tokio::test]
async fn refresh_swaps_in_new_tokens() {
    async_test(|ctx| async move {
        fixtures::token_refresh(ctx.registry(), false).await;

        let auth = ctx.sdk().platform().refresh().await?;

        assert_eq!(auth.access_token, ACCESS_TOKEN_FROM_REFRESH);
        assert_eq!(auth.refresh_token.as_deref(), Some(REFRESH_TOKEN_FROM_REFRESH));
        Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn refresh_failure_surfaces_server_message() {
    async_test(|ctx| async move {
        fixtures::token_refresh(ctx.registry(), true).await;

        expect_throws_with(ctx.sdk().platform().refresh(), "Wrong token", |e: SdkError| async move {
            assert_eq!(e.status(), Some(400));
            Ok::<_, anyhow::Error>(())
        })
        .await?;
        Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn logout_revokes_and_forgets_auth() {
    async_test(|ctx| async move {
        fixtures::logout(ctx.registry()).await;

        ctx.sdk().platform().logout().await?;

        assert!(ctx.sdk().platform().auth().await?.is_none());
        Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn authorized_call_reaches_registered_route() {
    async_test(|ctx| async move {
        ctx.registry()
            .register_once(
                Method::GET,
                "/restapi/v1.0/account/~",
                ResponseSpec::json(json!({"id": "~"})),
            )
            .await;

        let response =
            ctx.sdk().platform().send(ApiRequest::get("/restapi/v1.0/account/~")).await?;

        assert_eq!(response.status, 200);
        assert_eq!(response.json::<Value>()?["id"], "~");
        Ok(())
    })
    .await
    .unwrap();
}

// ============================================================================
// Expectation bookkeeping
// ============================================================================

#[tokio::test]
async fn unconsumed_expectation_fails_the_test() {
    let (harness, registry, _cache) = counting_harness().await;

    let result = harness
        .run(|ctx| async move {
            ctx.registry()
                .register_once(Method::GET, "/restapi/v1.0/account/~", ResponseSpec::json(json!({})))
                .await;
            Ok(())
        })
        .await;

    match result {
        Err(HarnessError::MocksNotDone { pending }) => {
            assert_eq!(pending, vec!["GET /restapi/v1.0/account/~ (0/1)".to_string()]);
        }
        other => panic!("expected MocksNotDone, got {other:?}"),
    }
    assert_eq!(registry.restore_count(), 2);
    assert!(registry.expectations().is_empty());
}

#[tokio::test]
async fn same_route_is_served_in_registration_order() {
    async_test(|ctx| async move {
        let registry = ctx.registry();
        registry.register_call(Method::GET, "/items", ResponseSpec::json(json!({"n": 1})), 2).await;
        registry.register_once(Method::GET, "/items", ResponseSpec::json(json!({"n": 2}))).await;

        let mut seen = Vec::new();
        for _ in 0..3 {
            let response = ctx.sdk().platform().send(ApiRequest::get("/items")).await?;
            seen.push(response.json::<Value>()?["n"].as_i64());
        }

        assert_eq!(seen, vec![Some(1), Some(1), Some(2)]);
        assert!(registry.all_consumed().await?);
        Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn relative_path_with_query_is_credited() {
    async_test(|ctx| async move {
        ctx.registry()
            .register_once(
                Method::GET,
                "restapi/v1.0/account/~/extension?status=Enabled&page=2",
                ResponseSpec::json(json!({"records": []})),
            )
            .await;

        let response = ctx
            .sdk()
            .platform()
            .send(ApiRequest::get("restapi/v1.0/account/~/extension?page=2&status=Enabled"))
            .await?;

        assert_eq!(response.status, 200);
        Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn rate_limit_override_retries_once() {
    let overrides = SdkOverrides {
        handle_rate_limit: Some(true),
        rate_limit_delay: Some(Duration::from_millis(5)),
        ..SdkOverrides::default()
    };

    Harness::new()
        .with_overrides(overrides)
        .run(|ctx| async move {
            let registry = ctx.registry();
            registry
                .register_once(Method::GET, "/limited", ResponseSpec::raw("").status(429))
                .await;
            registry.register_once(Method::GET, "/limited", ResponseSpec::json(json!({}))).await;

            let response = ctx.sdk().platform().send(ApiRequest::get("/limited")).await?;

            assert_eq!(response.status, 200);
            Ok(())
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn shared_registry_does_not_leak_between_tests() {
    let registry = MockRegistry::start().await.unwrap();

    let first = Harness::new()
        .with_registry(registry.clone())
        .run(|ctx| async move {
            fixtures::logout(ctx.registry()).await;
            Ok(())
        })
        .await;
    assert!(matches!(first, Err(HarnessError::MocksNotDone { .. })));

    Harness::new().with_registry(registry.clone()).run(|_ctx| async { Ok(()) }).await.unwrap();
    assert_eq!(registry.restore_count(), 4);
}

// ============================================================================
// Teardown guarantees
// ============================================================================

#[tokio::test]
async fn teardown_runs_once_after_success() {
    let (harness, registry, cache) = counting_harness().await;
    let kept: Arc<Mutex<Option<TestContext>>> = Arc::new(Mutex::new(None));
    let slot = kept.clone();

    harness
        .run(|ctx| async move {
            *slot.lock() = Some(ctx);
            Ok(())
        })
        .await
        .unwrap();

    // one restore and clean in setup, one in teardown
    assert_eq!(registry.restore_count(), 2);
    assert_eq!(cache.cleans(), 2);

    let ctx = kept.lock().take().unwrap();
    assert!(ctx.is_torn_down());
    assert_eq!(ctx.phase(), Phase::TornDown);
    ctx.teardown().await.unwrap();
    assert_eq!(registry.restore_count(), 2);
}

#[tokio::test]
async fn body_error_is_reported_unchanged() {
    let (harness, registry, cache) = counting_harness().await;

    let result = harness.run(|_ctx| async { Err(anyhow::anyhow!("assertion exploded")) }).await;

    match result {
        Err(HarnessError::Body(err)) => assert_eq!(err.to_string(), "assertion exploded"),
        other => panic!("expected Body, got {other:?}"),
    }
    assert_eq!(registry.restore_count(), 2);
    assert_eq!(cache.cleans(), 2);
}

#[tokio::test]
async fn harness_error_raised_in_body_passes_through() {
    let result = async_test(|_ctx| async {
        expect_throws(async { Ok::<_, SdkError>(()) }, "Wrong token").await?;
        Ok(())
    })
    .await;

    assert!(matches!(result, Err(HarnessError::DidNotThrow { ref expected }) if expected == "Wrong token"));
}

#[tokio::test]
async fn body_panic_is_resumed_after_teardown() {
    let (harness, registry, cache) = counting_harness().await;

    let outcome = AssertUnwindSafe(harness.run(|ctx| async move {
        if ctx.phase() == Phase::Running {
            panic!("body blew up");
        }
        Ok(())
    }))
    .catch_unwind()
    .await;

    let payload = outcome.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"body blew up"));
    assert_eq!(registry.restore_count(), 2);
    assert_eq!(cache.cleans(), 2);
}

#[tokio::test]
async fn teardown_failure_does_not_mask_body_error() {
    let (harness, _registry, cache) = counting_harness().await;
    let failing = cache.clone();

    let result = harness
        .run(|_ctx| async move {
            failing.fail_next_clean();
            Err(anyhow::anyhow!("primary failure"))
        })
        .await;

    match result {
        Err(HarnessError::Body(err)) => assert_eq!(err.to_string(), "primary failure"),
        other => panic!("expected Body, got {other:?}"),
    }
    assert_eq!(cache.cleans(), 2);
}

#[tokio::test]
async fn teardown_failure_is_reported_when_body_passes() {
    let (harness, registry, cache) = counting_harness().await;
    let failing = cache.clone();

    let result = harness
        .run(|_ctx| async move {
            failing.fail_next_clean();
            Ok(())
        })
        .await;

    assert!(matches!(result, Err(HarnessError::Teardown(SdkError::Cache(_)))));
    assert_eq!(registry.restore_count(), 2);
}

// ============================================================================
// Setup
// ============================================================================

#[tokio::test]
async fn setup_cleans_residual_cache() {
    let cache = Arc::new(MemoryCache::new("rc-"));
    cache.set("stale", json!({"left": "over"})).await.unwrap();
    let overrides = SdkOverrides {
        cache: Some(cache.clone() as Arc<dyn CacheStore>),
        ..SdkOverrides::default()
    };
    let probe = cache.clone();

    Harness::new()
        .with_overrides(overrides)
        .run(|_ctx| async move {
            assert!(probe.get("stale").await?.is_none());
            Ok(())
        })
        .await
        .unwrap();

    assert!(cache.is_empty());
}

#[tokio::test]
async fn login_failure_aborts_before_body() {
    let registry = MockRegistry::start().await.unwrap();
    let elsewhere = MockRegistry::start().await.unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();

    // SDK points at a server with nothing registered, so login gets a 404
    let overrides =
        SdkOverrides { server: Some(elsewhere.base_url()), ..SdkOverrides::default() };
    let result = Harness::new()
        .with_registry(registry.clone())
        .with_overrides(overrides)
        .run(|_ctx| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

    match result {
        Err(HarnessError::Setup(err)) => assert_eq!(err.status(), Some(404)),
        other => panic!("expected Setup, got {other:?}"),
    }
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(registry.restore_count(), 2);
}
