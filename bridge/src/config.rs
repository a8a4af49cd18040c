// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::{read_key, CryptoProvider};
use crate::quorum::validate_quorum;
use crate::types::RelayerAddress;
use anyhow::anyhow;
use relay_bridge_config::Config;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StateMachineConfig {
    // Interval between two steps of the state machine.
    pub polling_interval_ms: u64,
    // Polls of `was_proposed` before the flow restarts from the pending batch.
    pub max_retries_on_was_proposed: u64,
    // Polls of the on-chain signer count before the flow restarts.
    pub max_quorum_retries: u64,
    // Polls of `was_executed` before the flow restarts.
    pub max_retries_on_was_executed: u64,
}

impl StateMachineConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    fn validate(&self, direction: &str) -> anyhow::Result<()> {
        if self.polling_interval_ms == 0 {
            anyhow::bail!("{direction}: polling-interval-ms must be positive");
        }
        if self.max_retries_on_was_proposed == 0
            || self.max_quorum_retries == 0
            || self.max_retries_on_was_executed == 0
        {
            anyhow::bail!("{direction}: retry budgets must be positive");
        }
        Ok(())
    }
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 6_000,
            max_retries_on_was_proposed: 50,
            max_quorum_retries: 50,
            max_retries_on_was_executed: 50,
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TopologyConfig {
    // Length of a leader window. Must be at least one second.
    pub window_length_secs: u64,
    // Correction applied to the local clock, e.g. the measured NTP drift.
    #[serde(default)]
    pub clock_offset_ms: i64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            window_length_secs: 60,
            clock_offset_ms: 0,
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    // Path of the file where the relayer ed25519 key (hex) is stored.
    pub relayer_key_path: PathBuf,
    // Number of distinct relayer signatures an action needs.
    pub quorum: u64,
    // Public keys (hex) of every relayer allowed to sign.
    pub whitelisted_relayers: Vec<RelayerAddress>,
    pub source_to_destination: StateMachineConfig,
    pub destination_to_source: StateMachineConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
    // Interval between two refreshes of the whitelist.
    pub role_refresh_interval_ms: u64,
}

impl Config for RelayerConfig {}

/// Configuration after validation, with the relayer key loaded.
#[derive(Debug)]
pub struct RelayerSettings {
    pub crypto: Arc<CryptoProvider>,
    pub quorum: u64,
    pub whitelisted_relayers: Vec<RelayerAddress>,
    pub source_to_destination: StateMachineConfig,
    pub destination_to_source: StateMachineConfig,
    pub window_length: Duration,
    pub clock_offset_ms: i64,
    pub role_refresh_interval: Duration,
}

impl RelayerConfig {
    pub fn validate(&self) -> anyhow::Result<RelayerSettings> {
        info!("Starting config validation");
        let crypto = read_key(&self.relayer_key_path).map_err(|e| {
            anyhow!(
                "Failed to read relayer key from {:?}: {e}",
                self.relayer_key_path
            )
        })?;
        let settings = self.validate_with_key(crypto)?;
        info!("Config validation complete");
        Ok(settings)
    }

    /// Validates everything but the key file.
    pub fn validate_with_key(&self, crypto: CryptoProvider) -> anyhow::Result<RelayerSettings> {
        if self.whitelisted_relayers.is_empty() {
            anyhow::bail!("whitelisted-relayers must not be empty");
        }
        if !self.whitelisted_relayers.contains(crypto.public_key()) {
            anyhow::bail!(
                "Relayer key {} is not part of whitelisted-relayers",
                crypto.public_key()
            );
        }
        validate_quorum(self.quorum, self.whitelisted_relayers.len() as u64)?;
        self.source_to_destination.validate("source-to-destination")?;
        self.destination_to_source.validate("destination-to-source")?;
        if self.topology.window_length_secs == 0 {
            anyhow::bail!("topology.window-length-secs must be positive");
        }
        if self.role_refresh_interval_ms == 0 {
            anyhow::bail!("role-refresh-interval-ms must be positive");
        }
        Ok(RelayerSettings {
            crypto: Arc::new(crypto),
            quorum: self.quorum,
            whitelisted_relayers: self.whitelisted_relayers.clone(),
            source_to_destination: self.source_to_destination.clone(),
            destination_to_source: self.destination_to_source.clone(),
            window_length: Duration::from_secs(self.topology.window_length_secs),
            clock_offset_ms: self.topology.clock_offset_ms,
            role_refresh_interval: Duration::from_millis(self.role_refresh_interval_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::write_key;

    fn config_for(keys: &[&CryptoProvider], key_path: PathBuf) -> RelayerConfig {
        RelayerConfig {
            relayer_key_path: key_path,
            quorum: keys.len() as u64,
            whitelisted_relayers: keys.iter().map(|k| k.public_key().clone()).collect(),
            source_to_destination: StateMachineConfig::default(),
            destination_to_source: StateMachineConfig::default(),
            topology: TopologyConfig::default(),
            role_refresh_interval_ms: 60_000,
        }
    }

    #[test]
    fn test_validate_loads_key() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("relayer.key");
        let me = CryptoProvider::generate();
        let peer = CryptoProvider::generate();
        write_key(&key_path, &me).unwrap();

        let config = config_for(&[&me, &peer], key_path);
        let settings = config.validate().unwrap();
        assert_eq!(settings.crypto.public_key(), me.public_key());
        assert_eq!(settings.quorum, 2);
        assert_eq!(settings.window_length, Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let me = CryptoProvider::generate();
        let peer = CryptoProvider::generate();
        let base = config_for(&[&me, &peer], PathBuf::from("/unused"));
        let secret = me.secret_bytes();
        let key = || CryptoProvider::from_secret_bytes(&secret).unwrap();

        let mut config = base.clone();
        config.quorum = 3;
        assert!(config.validate_with_key(key()).is_err());

        let mut config = base.clone();
        config.quorum = 0;
        assert!(config.validate_with_key(key()).is_err());

        let mut config = base.clone();
        config.source_to_destination.polling_interval_ms = 0;
        assert!(config.validate_with_key(key()).is_err());

        let mut config = base.clone();
        config.destination_to_source.max_quorum_retries = 0;
        assert!(config.validate_with_key(key()).is_err());

        let mut config = base.clone();
        config.topology.window_length_secs = 0;
        assert!(config.validate_with_key(key()).is_err());

        let mut config = base.clone();
        config.whitelisted_relayers = vec![peer.public_key().clone()];
        config.quorum = 1;
        assert!(config.validate_with_key(key()).is_err());

        base.validate_with_key(key()).unwrap();
        assert!(base.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip_uses_kebab_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relayer.yaml");
        let me = CryptoProvider::generate();
        let config = config_for(&[&me], PathBuf::from("relayer.key"));
        config.save(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("max-retries-on-was-proposed"));
        assert!(content.contains("window-length-secs"));
        assert_eq!(RelayerConfig::load(&path).unwrap(), config);
    }
}
