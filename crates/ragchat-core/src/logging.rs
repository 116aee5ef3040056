//! Tracing subscriber bootstrap for presentation layers embedding the core.

use tracing_subscriber::EnvFilter;

/// Install a formatted tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. Returns `false` when a
/// global subscriber was already installed, so calling this more than once
/// is harmless.
pub fn init_tracing(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting rag-chat core v{}", env!("CARGO_PKG_VERSION"));
    }
    installed
}
