//! Shared test helpers for the scenario tests under `tests/`.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a `tracing-subscriber` `EnvFilter` fmt subscriber once per
/// process, so scenario tests can log without each one racing to
/// install its own global subscriber.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
