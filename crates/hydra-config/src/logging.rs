// SPDX-License-Identifier: MIT
use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber from the given level string
/// (e.g. "info", "debug,hydra_cache=trace"). Safe to call once per process;
/// subsequent calls are no-ops.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
