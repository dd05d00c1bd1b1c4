//! Process logging setup

use dots_core::{DotsError, DotsResult, ServiceConfig};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `level`. Fails if a subscriber is
/// already installed.
pub fn init_tracing(level: &str) -> DotsResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| DotsError::config(format!("Invalid log filter '{level}': {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| DotsError::config(format!("Failed to install tracing subscriber: {e}")))
}

/// Install the global subscriber at the configured log level
pub fn init_from_config(config: &ServiceConfig) -> DotsResult<()> {
    init_tracing(config.log_filter())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_initialisation_fails() {
        let _ = init_tracing("debug");
        assert!(matches!(init_tracing("info"), Err(DotsError::Config(_))));
    }
}
