//! Tracing setup shared by exporter services and tests.

use std::sync::Once;

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TEST_TRACING: Once = Once::new();

/// Installs the global tracing subscriber for a service.
///
/// The filter is read from `RUST_LOG` and falls back to `<service_name>=info` when unset.
pub fn init_tracing(service_name: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{service_name}=info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}

/// Installs a subscriber that writes through the test harness, once per process.
///
/// Output is only shown for failing tests or with `--nocapture`. Set `RUST_LOG` to change the
/// level, which defaults to `debug`.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        // Another subscriber may already be installed by the test binary.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
