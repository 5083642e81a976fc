//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level so operators can turn up a
//! single module without editing the config file.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wallet_relay={},tower_http=info", default_level)));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();

    if result.is_ok() {
        tracing::debug!(default_level, "Tracing initialized");
    }
}
