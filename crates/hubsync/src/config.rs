//! Hub configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hubsync_core::{Family, Network};
use hubsync_sync::SyncConfig;

use crate::error::{HubError, Result};

/// Per-family limits on add rows kept per owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneLimits {
    pub cast: usize,
    pub reaction: usize,
    pub link: usize,
    pub verification: usize,
    pub user_data: usize,
    pub username_proof: usize,
}

impl Default for PruneLimits {
    fn default() -> Self {
        let limit = |family: Family| family.descriptor().prune_limit;
        Self {
            cast: limit(Family::Cast),
            reaction: limit(Family::Reaction),
            link: limit(Family::Link),
            verification: limit(Family::Verification),
            user_data: limit(Family::UserData),
            username_proof: limit(Family::UsernameProof),
        }
    }
}

impl PruneLimits {
    pub fn get(&self, family: Family) -> usize {
        match family {
            Family::Cast => self.cast,
            Family::Reaction => self.reaction,
            Family::Link => self.link,
            Family::Verification => self.verification,
            Family::UserData => self.user_data,
            Family::UsernameProof => self.username_proof,
        }
    }
}

/// Configuration for a Hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Messages for other networks are rejected.
    pub network: Network,
    /// SQLite database file. `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
    pub prune_limits: PruneLimits,
    /// Persisted hub events older than this are dropped by `Hub::prune_events`.
    pub event_retention_secs: u64,
    pub sync: SyncConfig,
}

/// Default event retention: three days.
pub const DEFAULT_EVENT_RETENTION_SECS: u64 = 3 * 24 * 60 * 60;

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            network: Network::Devnet,
            db_path: None,
            log_filter: "info".into(),
            prune_limits: PruneLimits::default(),
            event_retention_secs: DEFAULT_EVENT_RETENTION_SECS,
            sync: SyncConfig::default(),
        }
    }
}

impl HubConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: HubConfig =
            toml::from_str(content).map_err(|e| HubError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.max_concurrent_syncs == 0 {
            return Err(HubError::Config("sync.max_concurrent_syncs must be at least 1".into()));
        }
        if self.sync.hashes_per_fetch == 0 {
            return Err(HubError::Config("sync.hashes_per_fetch must be at least 1".into()));
        }
        if self.event_retention_secs == 0 {
            return Err(HubError::Config("event_retention_secs must be at least 1".into()));
        }
        if Family::ALL.iter().any(|f| self.prune_limits.get(*f) == 0) {
            return Err(HubError::Config("prune limits must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(HubConfig::from_toml_str("").unwrap(), HubConfig::default());
    }

    #[test]
    fn test_partial_overrides() {
        let config = HubConfig::from_toml_str(
            r#"
            network = "Testnet"
            db_path = "/var/lib/hub.db"

            [prune_limits]
            cast = 10

            [sync]
            rpc_timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.prune_limits.get(Family::Cast), 10);
        assert_eq!(config.prune_limits.get(Family::Link), 2500);
        assert_eq!(config.sync.rpc_timeout_ms, 500);
        assert_eq!(config.sync.hashes_per_fetch, 64);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(HubConfig::from_toml_str("[sync]\nmax_concurrent_syncs = 0").is_err());
        assert!(HubConfig::from_toml_str("event_retention_secs = 0").is_err());
        assert!(HubConfig::from_toml_str("network = 7").is_err());
    }
}
