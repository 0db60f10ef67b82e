//! Tracing setup for tests.

/// Install a test-writer subscriber. Safe to call from every test; only the
/// first call in a process takes effect.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
