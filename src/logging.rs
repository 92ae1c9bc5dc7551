//! Logging initialisation.
//!
//! Events go to stderr so command output on stdout stays pipeable.

use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Install the global subscriber. `RUST_LOG` overrides `level` when set.
///
/// Later calls are no-ops.
pub fn init_logging(level: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        // Another subscriber (e.g. a test harness) may already be installed.
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init();
    });
}
