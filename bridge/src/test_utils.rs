// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::action_id::ContentHash;
use crate::crypto::CryptoProvider;
use crate::error::BridgeResult;
use crate::gossip::{Broadcaster, PublicKeysProvider, SignatureMessage, SignatureProcessor};
use crate::types::{
    BalanceSnapshot, Batch, BatchId, DecimalConversion, RelayerAddress, TokenId, Transfer,
    TransferStatus,
};
use async_trait::async_trait;
use num_bigint::BigUint;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub const TEST_SOURCE_TOKEN: &[u8] = b"SRC-TOKEN";
pub const TEST_DESTINATION_TOKEN: &[u8] = b"DST-TOKEN";

pub fn source_token() -> TokenId {
    TokenId::new(TEST_SOURCE_TOKEN)
}

pub fn destination_token() -> TokenId {
    TokenId::new(TEST_DESTINATION_TOKEN)
}

pub fn test_transfer(deposit_nonce: u64, amount: u64) -> Transfer {
    Transfer {
        deposit_nonce,
        from: vec![0x0a, deposit_nonce as u8],
        to: vec![0x0b, deposit_nonce as u8],
        source_token: source_token(),
        destination_token: destination_token(),
        amount: BigUint::from(amount),
        converted_amount: None,
        extra_data: None,
        status: TransferStatus::Pending,
    }
}

/// Batch of `count` transfers of 1000 units each, nonces starting at 1.
pub fn batch_with_transfers(id: BatchId, count: u64) -> Batch {
    Batch {
        id,
        transfers: (1..=count).map(|nonce| test_transfer(nonce, 1000)).collect(),
    }
}

pub fn native_balance(total: u64) -> BalanceSnapshot {
    BalanceSnapshot {
        total_balance: BigUint::from(total),
        is_native: true,
        decimal_conversion: DecimalConversion::identity(),
        ..Default::default()
    }
}

pub fn mint_burn_balance(minted: u64, burned: u64) -> BalanceSnapshot {
    BalanceSnapshot {
        minted: BigUint::from(minted),
        burned: BigUint::from(burned),
        is_mint_burn: true,
        decimal_conversion: DecimalConversion::identity(),
        ..Default::default()
    }
}

#[derive(Default)]
struct NetworkState {
    members: BTreeSet<RelayerAddress>,
    processors: Vec<(RelayerAddress, Arc<dyn SignatureProcessor>)>,
    delivered: u64,
}

/// Gossip network shared by in-process relayers. Messages are delivered
/// synchronously to every processor except the sender's own.
#[derive(Clone, Default)]
pub struct InMemoryGossipNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl InMemoryGossipNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcaster(&self, crypto: Arc<CryptoProvider>) -> Arc<InMemoryBroadcaster> {
        Arc::new(InMemoryBroadcaster {
            network: self.clone(),
            crypto,
        })
    }

    pub fn delivered_messages(&self) -> u64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).delivered
    }
}

pub struct InMemoryBroadcaster {
    network: InMemoryGossipNetwork,
    crypto: Arc<CryptoProvider>,
}

impl PublicKeysProvider for InMemoryBroadcaster {
    fn sorted_public_keys(&self) -> Vec<RelayerAddress> {
        let state = self.network.state.lock().unwrap_or_else(|e| e.into_inner());
        state.members.iter().cloned().collect()
    }
}

#[async_trait]
impl Broadcaster for InMemoryBroadcaster {
    async fn register_on_topics(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn broadcast_join_topic(&self) -> BridgeResult<()> {
        let mut state = self.network.state.lock().unwrap_or_else(|e| e.into_inner());
        state.members.insert(self.crypto.public_key().clone());
        Ok(())
    }

    async fn broadcast_signature(
        &self,
        signature: Vec<u8>,
        message_hash: ContentHash,
    ) -> BridgeResult<()> {
        let message = SignatureMessage {
            public_key: self.crypto.public_key().clone(),
            message_hash,
            signature,
        };
        let processors: Vec<_> = {
            let mut state = self.network.state.lock().unwrap_or_else(|e| e.into_inner());
            state.delivered += 1;
            state
                .processors
                .iter()
                .filter(|(owner, _)| owner != self.crypto.public_key())
                .map(|(_, p)| p.clone())
                .collect()
        };
        for processor in processors {
            if let Err(e) = processor.process_new_message(&message) {
                warn!("Peer dropped gossiped signature: {:?}", e);
            }
        }
        Ok(())
    }

    fn add_signature_processor(&self, processor: Arc<dyn SignatureProcessor>) -> BridgeResult<()> {
        let mut state = self.network.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .processors
            .push((self.crypto.public_key().clone(), processor));
        Ok(())
    }

    async fn close(&self) -> BridgeResult<()> {
        let mut state = self.network.state.lock().unwrap_or_else(|e| e.into_inner());
        let me = self.crypto.public_key().clone();
        state.members.remove(&me);
        state.processors.retain(|(owner, _)| *owner != me);
        Ok(())
    }
}
