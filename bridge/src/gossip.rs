// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::action_id::ContentHash;
use crate::error::BridgeResult;
use crate::types::RelayerAddress;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::sync::Arc;

/// Signature of one relayer over an action content hash, as exchanged on
/// the gossip layer.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SignatureMessage {
    pub public_key: RelayerAddress,
    #[serde_as(as = "Hex")]
    pub message_hash: ContentHash,
    #[serde_as(as = "Hex")]
    pub signature: Vec<u8>,
}

/// Receives signatures delivered by the gossip layer.
pub trait SignatureProcessor: Send + Sync {
    fn process_new_message(&self, message: &SignatureMessage) -> BridgeResult<()>;
}

/// Source of the current relayer public key set, sorted lexicographically.
pub trait PublicKeysProvider: Send + Sync {
    fn sorted_public_keys(&self) -> Vec<RelayerAddress>;
}

/// Gossip transport between relayers. Only the capability set the relayer
/// needs is modelled here; peer discovery and wire format belong to the
/// implementation.
#[async_trait]
pub trait Broadcaster: PublicKeysProvider {
    async fn register_on_topics(&self) -> BridgeResult<()>;

    /// Announces this relayer's public key to the peer set.
    async fn broadcast_join_topic(&self) -> BridgeResult<()>;

    async fn broadcast_signature(
        &self,
        signature: Vec<u8>,
        message_hash: ContentHash,
    ) -> BridgeResult<()>;

    fn add_signature_processor(&self, processor: Arc<dyn SignatureProcessor>) -> BridgeResult<()>;

    async fn close(&self) -> BridgeResult<()>;
}

/// Fixed public key set, sorted on construction.
#[derive(Clone, Debug, Default)]
pub struct StaticPublicKeys(Vec<RelayerAddress>);

impl StaticPublicKeys {
    pub fn new(mut keys: Vec<RelayerAddress>) -> Self {
        keys.sort();
        keys.dedup();
        Self(keys)
    }
}

impl PublicKeysProvider for StaticPublicKeys {
    fn sorted_public_keys(&self) -> Vec<RelayerAddress> {
        self.0.clone()
    }
}
