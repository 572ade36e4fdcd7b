//! Tracing bootstrap for the client and CLI.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Build the filter directives string for a logging config.
///
/// The `DUOLENS_LOG` environment variable takes precedence over the
/// configured level, mirroring the usual `RUST_LOG` behavior.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env("DUOLENS_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()))
}

/// Install the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored (useful when
/// tests initialize logging more than once).
pub fn init_logging(config: &LoggingConfig) {
    let filter = build_filter(config);

    let result = match config.format {
        LogFormat::Pretty => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Logging already initialized");
    }
}
