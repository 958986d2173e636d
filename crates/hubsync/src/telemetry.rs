//! Tracing initialisation.

use tracing_subscriber::EnvFilter;

use crate::error::{HubError, Result};

/// Install a fmt subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Fails if a global subscriber is already set.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| HubError::Config(format!("log filter: {}", e)))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| HubError::Config(format!("tracing: {}", e)))
}
