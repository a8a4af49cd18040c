// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::action_id::{content_hash, derive_action_id};
use crate::config::{RelayerConfig, StateMachineConfig, TopologyConfig};
use crate::crypto::{read_key, write_key, CryptoProvider};
use crate::types::{ActionContent, ActionId, Batch};
use anyhow::anyhow;
use relay_bridge_config::Config;
use std::path::{Path, PathBuf};

// Generate a relayer key (ed25519) and write it to a file as hex encoded secret.
pub fn generate_relayer_key_and_write_to_file(path: &Path) -> anyhow::Result<CryptoProvider> {
    if path.exists() {
        anyhow::bail!("Refusing to overwrite existing key file {:?}", path);
    }
    let provider = CryptoProvider::generate();
    println!("Relayer public key: {}", provider.public_key());
    write_key(path, &provider)?;
    Ok(provider)
}

// Read a relayer key file and print its public key.
pub fn examine_key(path: &Path) -> anyhow::Result<()> {
    let provider = read_key(path)?;
    println!("Ed25519 key:");
    println!("Corresponding PublicKey: {}", provider.public_key());
    Ok(())
}

// Generate a relayer config template and write it to a file.
pub fn generate_relayer_config_and_write_to_file(path: &PathBuf) -> anyhow::Result<()> {
    let config = RelayerConfig {
        relayer_key_path: PathBuf::from("/path/to/your/relayer_key"),
        quorum: 1,
        whitelisted_relayers: vec![],
        source_to_destination: StateMachineConfig::default(),
        destination_to_source: StateMachineConfig::default(),
        topology: TopologyConfig::default(),
        role_refresh_interval_ms: 60_000,
    };
    config.save(path)
}

/// Action id and content hash of the transfer action of a batch stored as JSON.
pub fn transfer_action_id_from_file(path: &Path) -> anyhow::Result<(ActionId, [u8; 32])> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read batch file {:?}: {e}", path))?;
    let batch: Batch = serde_json::from_str(&content)
        .map_err(|e| anyhow!("Failed to parse batch file {:?}: {e}", path))?;
    let content = ActionContent::Transfer(batch);
    Ok((derive_action_id(&content), content_hash(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::batch_with_transfers;

    #[test]
    fn test_generate_and_examine_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relayer.key");
        let provider = generate_relayer_key_and_write_to_file(&path).unwrap();
        assert_eq!(read_key(&path).unwrap().public_key(), provider.public_key());
        examine_key(&path).unwrap();
        assert!(generate_relayer_key_and_write_to_file(&path).is_err());
    }

    #[test]
    fn test_config_template_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relayer.yaml");
        generate_relayer_config_and_write_to_file(&path).unwrap();
        let config = RelayerConfig::load(&path).unwrap();
        assert_eq!(config.quorum, 1);
        assert_eq!(config.topology.window_length_secs, 60);
    }

    #[test]
    fn test_transfer_action_id_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        let batch = batch_with_transfers(12, 2);
        std::fs::write(&path, serde_json::to_string(&batch).unwrap()).unwrap();
        let (action_id, _) = transfer_action_id_from_file(&path).unwrap();
        assert_eq!(action_id, derive_action_id(&ActionContent::Transfer(batch)));
    }
}
