//! Tracing initialization shared by exchange services and tests.

use std::sync::Once;

use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable that turns on log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

/// Filter applied when `RUST_LOG` is not set.
const DEFAULT_LOG_LEVEL: &str = "info";

static INIT_TEST_TRACING: Once = Once::new();

/// Installs the global tracing subscriber for a service.
///
/// The filter is read from `RUST_LOG` and falls back to `{app_name}=info,exchange=info`. Fails
/// when a global subscriber is already installed.
pub fn init_tracing(app_name: &str) -> Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{app_name}={DEFAULT_LOG_LEVEL},exchange={DEFAULT_LOG_LEVEL}"
        ))
    });

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer()),
    )
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
///
/// Tests call this unconditionally; output stays silent unless explicitly requested, which keeps
/// `cargo test` logs readable.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var(ENABLE_TRACING_ENV_NAME).is_err() {
            return;
        }

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

        // Another test harness may have installed a subscriber already.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
