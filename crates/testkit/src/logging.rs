//! Test log output
//!
//! `RUST_LOG` selects the level (default `warn`). Output goes through the
//! test writer so `cargo test` captures it per test.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the global test subscriber once per process
///
/// Later calls are no-ops, as is the first one when another subscriber is
/// already installed.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}
