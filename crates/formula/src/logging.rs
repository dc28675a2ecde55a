#![forbid(unsafe_code)]

//! Log output setup.
//!
//! Every crate in the workspace emits `tracing` events named
//! `formula.<area>.<event>`; nothing is printed until the host installs a
//! subscriber. This module, enabled by the `tracing-json` feature, provides
//! one.

/// Install a global JSON subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` when a global subscriber was already set.
pub fn init_json_subscriber() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_current_span(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(message = "formula.logging.init", format = "json");
    }
    installed
}
