//! Process-wide tracing/logging setup shared by tests and benches.

use tracing_subscriber::EnvFilter;

/// Initialize JSON logging, filtered via `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops, so every test
/// and bench entry point can call it unconditionally.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_target(false)
        .try_init();
}
