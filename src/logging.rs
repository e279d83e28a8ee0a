//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber so the scheduler and its
//! components emit leveled, structured logs instead of bare stdout
//! writes.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. Call once from `main` before
/// the scheduler starts. Honors `RUST_LOG`, defaulting to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
