//! Tracing initialization.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `level` seeds the filter when `RUST_LOG`
/// is unset; `json` switches the human format for line-delimited JSON.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
