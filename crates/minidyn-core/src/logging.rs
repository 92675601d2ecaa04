//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::MiniDynConfig;

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to `config.log_level`.
/// Calling it again after a subscriber is installed does nothing.
pub fn init_tracing(config: &MiniDynConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid log level filter: {}", config.log_level))?,
    };

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_reject_invalid_log_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = MiniDynConfig::builder().log_level("minidyn=loud".to_owned()).build();
        let err = init_tracing(&config).unwrap_err();
        assert!(err.to_string().contains("invalid log level filter"));
    }

    #[test]
    fn test_should_allow_repeated_initialization() {
        let config = MiniDynConfig::builder().log_level("warn".to_owned()).build();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }
}
