//! Subscriber initialization for the REST server.
//!
//! `RUST_LOG` wins when set; otherwise `logging.level` from the config is used.
//!
//! # Example
//! ```no_run
//! use postbridge_rest::tracing_init;
//! use postbridge_service::LoggingConfig;
//!
//! tracing_init::init_tracing(&LoggingConfig::default()).expect("Failed to initialize tracing");
//! ```

use postbridge_service::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Builds the filter: `RUST_LOG` if present and valid, else `level`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Installs the global subscriber, JSON or human-readable per `logging.format`.
///
/// # Errors
/// Fails when a global subscriber is already set.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = env_filter(&logging.level);

    if logging.format == "json" {
        Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    }
}
