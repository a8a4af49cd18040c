// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_client::ChainClient;
use crate::error::{BridgeError, BridgeResult};
use crate::types::ActionId;
use std::sync::Arc;
use tracing::debug;

/// Counts on-chain signatures for actions on one chain. Nothing is cached:
/// every query reads through to the chain.
#[derive(Clone)]
pub struct QuorumTracker {
    chain: Arc<dyn ChainClient>,
    quorum: u64,
}

impl QuorumTracker {
    pub fn new(chain: Arc<dyn ChainClient>, quorum: u64, relayers: u64) -> BridgeResult<Self> {
        validate_quorum(quorum, relayers)?;
        Ok(Self { chain, quorum })
    }

    pub fn quorum(&self) -> u64 {
        self.quorum
    }

    pub async fn signer_count(&self, action_id: ActionId) -> BridgeResult<u64> {
        self.chain.signer_count(action_id).await
    }

    pub async fn quorum_reached(&self, action_id: ActionId) -> BridgeResult<bool> {
        let signers = self.signer_count(action_id).await?;
        debug!(
            %action_id,
            signers,
            quorum = self.quorum,
            "Checked quorum"
        );
        Ok(signers >= self.quorum)
    }
}

pub fn validate_quorum(quorum: u64, relayers: u64) -> BridgeResult<()> {
    if quorum == 0 || quorum > relayers {
        return Err(BridgeError::InvalidQuorum { quorum, relayers });
    }
    Ok(())
}
