//! Tracing initialisation for Patchwright binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON instead of human-readable lines.
/// * `level`: default verbosity when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    if installed.is_ok() {
        tracing::debug!(json, level = %level, "tracing initialised");
    }
}
