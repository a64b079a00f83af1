//! Structured logging

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Build the log filter from `service.log_level`, falling back to `info`
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a JSON `fmt` subscriber
///
/// Installing twice is not an error; the first subscriber stays active.
pub fn init_tracing(config: &Config) -> Result<()> {
    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(&config.service.log_level))
        .try_init();

    match installed {
        Ok(()) => tracing::info!(
            service = %config.service.name,
            environment = %config.service.environment,
            backend = %config.storage.backend,
            "Tracing initialized"
        ),
        Err(e) => tracing::debug!("Tracing subscriber already installed: {}", e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        let config = Config::default();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }

    #[test]
    fn test_level_becomes_filter() {
        assert_eq!(env_filter("debug").to_string(), "debug");
    }
}
