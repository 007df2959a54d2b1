//! Tracing setup for embedders.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ClientConfig;

/// Install a global subscriber: `RUST_LOG` if set, otherwise
/// `default_filter`, formatted to stderr.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

/// Install a global subscriber using the configured `log_filter` as the
/// fallback when `RUST_LOG` is unset.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_from(config: &ClientConfig) -> bool {
    init(&config.log_filter)
}
