//! Tracing initialisation for tests.
//!
//! [`init_test_tracing`] routes events through the test-harness writer so
//! they show up only for failing tests (or with `--nocapture`).

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset: transport internals at debug.
const DEFAULT_TEST_FILTER: &str = "info,localsock_core=debug";

/// Install a test-writer subscriber honouring `RUST_LOG`.
///
/// Idempotent; later calls in the same process are ignored.
///
/// # Example
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     localsock_test_utils::tracing_setup::init_test_tracing();
///     // ...
/// }
/// ```
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
