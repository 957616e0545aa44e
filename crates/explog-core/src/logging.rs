//! Tracing setup for programs embedding explog.

use tracing_subscriber::EnvFilter;

/// Installs a compact fmt subscriber. `RUST_LOG` overrides `default_level`.
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .try_init();
}
