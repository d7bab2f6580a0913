//! Tracing initialization shared by any binary embedding this runtime.
//!
//! Not used internally — the library never initializes a global
//! subscriber on its own behalf — but kept here so every embedder gets
//! the same default filter instead of reinventing it.

use tracing_subscriber::EnvFilter;

/// Install a `tracing_subscriber::fmt` subscriber. `RUST_LOG` overrides the
/// default filter, which quiets noisy dependency crates at `info` level.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vox_runtime=info,tokio=warn")),
        )
        .init();
}
