//! Relay testkit: scripted HTTP expectations and a managed per-test
//! lifecycle for code built on `relay-sdk`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   creates    ┌──────────────┐
//! │   Harness    │ ───────────► │ TestContext  │──► Sdk (via factory)
//! └──────┬───────┘              └──────┬───────┘
//!        │ setup / teardown            │
//!        ▼                             ▼
//! ┌──────────────┐   mounts     ┌──────────────┐
//! │   Fixtures   │ ───────────► │ MockRegistry │──► wiremock::MockServer
//! └──────────────┘              └──────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use relay_testkit::{async_test, expect_throws, fixtures};
//!
//! #[tokio::test]
//! async fn refresh_failure_surfaces_message() {
//!     async_test(|ctx| async move {
//!         fixtures::token_refresh(ctx.registry(), true).await;
//!         expect_throws(ctx.sdk().platform().refresh(), "Wrong token").await?;
//!         Ok(())
//!     })
//!     .await
//!     .unwrap();
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod assertions;
pub mod error;
pub mod factory;
pub mod fixtures;
pub mod lifecycle;
pub mod logging;
pub mod registry;

pub use assertions::{expect_throws, expect_throws_with};
pub use error::{HarnessError, HarnessResult};
pub use factory::{create_sdk, default_options, SdkOverrides};
pub use fixtures::Fixture;
pub use lifecycle::{async_test, Harness, Phase, TestContext};
pub use logging::init_test_tracing;
pub use registry::{Expectation, MockRegistry, PathMatcher, Payload, ResponseSpec};
