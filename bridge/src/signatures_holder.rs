// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::action_id::ContentHash;
use crate::crypto::CryptoProvider;
use crate::error::{BridgeError, BridgeResult};
use crate::gossip::{SignatureMessage, SignatureProcessor};
use crate::metrics::BridgeMetrics;
use crate::role_provider::RoleProvider;
use crate::types::RelayerAddress;
use lru::LruCache;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

// Content hashes tracked at once. Hashes of flows that are over, or that
// were never ours, age out.
const MAX_TRACKED_HASHES: usize = 1000;

type SignatureSet = BTreeMap<RelayerAddress, Vec<u8>>;

/// Collects signatures over action content hashes, from gossip and from this
/// relayer. Only verified signatures of whitelisted relayers are stored.
pub struct SignaturesHolder {
    role_provider: Arc<dyn RoleProvider>,
    signatures: Mutex<LruCache<ContentHash, SignatureSet>>,
    metrics: Arc<BridgeMetrics>,
}

impl SignaturesHolder {
    pub fn new(role_provider: Arc<dyn RoleProvider>, metrics: Arc<BridgeMetrics>) -> Self {
        Self::with_capacity(role_provider, metrics, MAX_TRACKED_HASHES)
    }

    pub fn with_capacity(
        role_provider: Arc<dyn RoleProvider>,
        metrics: Arc<BridgeMetrics>,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            role_provider,
            signatures: Mutex::new(LruCache::new(capacity)),
            metrics,
        }
    }

    fn verify(&self, message: &SignatureMessage) -> BridgeResult<()> {
        if !self.role_provider.is_whitelisted(&message.public_key) {
            return Err(BridgeError::NotWhitelisted(message.public_key.to_string()));
        }
        CryptoProvider::verify(
            message.public_key.as_bytes(),
            &message.message_hash,
            &message.signature,
        )
    }

    pub fn signatures(&self, hash: &ContentHash) -> Vec<(RelayerAddress, Vec<u8>)> {
        let guard = self.signatures.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .peek(hash)
            .map(|set| set.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, hash: &ContentHash) -> usize {
        let guard = self.signatures.lock().unwrap_or_else(|e| e.into_inner());
        guard.peek(hash).map(|set| set.len()).unwrap_or(0)
    }

    pub fn has_signed(&self, hash: &ContentHash, public_key: &RelayerAddress) -> bool {
        let guard = self.signatures.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .peek(hash)
            .map(|set| set.contains_key(public_key))
            .unwrap_or(false)
    }

    /// Drops everything collected for a content hash once its flow is over.
    pub fn clear(&self, hash: &ContentHash) {
        let mut guard = self.signatures.lock().unwrap_or_else(|e| e.into_inner());
        guard.pop(hash);
    }

    /// Number of content hashes currently tracked.
    pub fn len(&self) -> usize {
        let guard = self.signatures.lock().unwrap_or_else(|e| e.into_inner());
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SignatureProcessor for SignaturesHolder {
    fn process_new_message(&self, message: &SignatureMessage) -> BridgeResult<()> {
        if let Err(e) = self.verify(message) {
            let reason = match e {
                BridgeError::NotWhitelisted(_) => "not_whitelisted",
                _ => "invalid_signature",
            };
            warn!(
                public_key = %message.public_key,
                "Dropping gossiped signature: {:?}", e
            );
            self.metrics
                .gossip_signatures_rejected
                .with_label_values(&[reason])
                .inc();
            return Err(e);
        }
        let mut guard = self.signatures.lock().unwrap_or_else(|e| e.into_inner());
        let set = guard.get_or_insert_mut(message.message_hash, SignatureSet::new);
        if set
            .insert(message.public_key.clone(), message.signature.clone())
            .is_none()
        {
            debug!(
                public_key = %message.public_key,
                hash = %hex::encode(message.message_hash),
                signatures = set.len(),
                "Stored signature"
            );
            self.metrics.gossip_signatures_accepted.inc();
        }
        Ok(())
    }
}
