//! Local tracing setup
//!
//! Installs a global `tracing` subscriber for the process. Output always goes
//! to stderr: a session running over [`StdioTransport`](tandem_transport::StdioTransport)
//! owns stdout for framing.
//!
//! ```rust,no_run
//! use tandem_session::{SessionConfig, observability};
//!
//! let config = SessionConfig::default();
//! observability::init_tracing(&config.logging)?;
//! # Ok::<(), observability::ObservabilityError>(())
//! ```

use tracing::info;
use tracing_subscriber::{
    Registry, filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::LoggingConfig;

/// Errors installing the tracing subscriber
#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    /// Failed to initialize the subscriber
    #[error("Failed to initialize observability: {0}")]
    InitializationFailed(String),

    /// The configured filter directive does not parse
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Build the filter: `RUST_LOG` wins, then the configured directive
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ObservabilityError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ObservabilityError::ConfigurationError(format!("Invalid log level: {e}")))
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ObservabilityError> {
    let filter = env_filter(config)?;

    let json = config.structured.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .json()
    });
    let plain = (!config.structured).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
    });

    Registry::default()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init()
        .map_err(|e| {
            ObservabilityError::InitializationFailed(format!("Tracing subscriber: {e}"))
        })?;

    info!(
        level = %config.level,
        structured = config.structured,
        "Tandem tracing initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_directive_is_configuration_error() {
        let config = LoggingConfig {
            level: "tandem_session=notalevel".to_string(),
            ..LoggingConfig::default()
        };
        // RUST_LOG may be set by the test runner; only assert when it is not.
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(
                env_filter(&config),
                Err(ObservabilityError::ConfigurationError(_))
            ));
        }
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(ObservabilityError::InitializationFailed(_))
        ));
    }
}
