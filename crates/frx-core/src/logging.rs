#![forbid(unsafe_code)]

//! Structured JSON log output (feature `tracing-json`).

use tracing_subscriber::EnvFilter;

/// Filter used when `FRX_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "frx_core=warn";

/// Install a global JSON `tracing` subscriber filtered by `FRX_LOG`
/// (`EnvFilter` syntax, e.g. `frx_core=debug`).
///
/// Fails if a global subscriber is already installed.
pub fn init_json_subscriber() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter =
        EnvFilter::try_from_env("FRX_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .try_init()
}
