// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::BridgeResult;
use crate::types::{
    ActionContent, ActionId, BalanceSnapshot, Batch, BatchId, RelayerAddress, StatusUpdate, TokenId,
    TransferStatus, TxHash,
};
use async_trait::async_trait;
use num_bigint::BigUint;

/// Access to one chain's bridge contract. Implementations own transaction
/// encoding, signing, nonce management and RPC polling. Any error returned
/// here is treated as transient by the caller and retried on the next tick.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Oldest batch on this chain whose statuses are not yet finalized.
    async fn fetch_pending_batch(&self) -> BridgeResult<Option<Batch>>;

    async fn propose_transfer(&self, batch: &Batch) -> BridgeResult<TxHash>;

    async fn propose_status(&self, update: &StatusUpdate) -> BridgeResult<TxHash>;

    async fn was_proposed(&self, content: &ActionContent) -> BridgeResult<bool>;

    /// Action id the contract assigned to proposed content.
    async fn get_action_id(&self, content: &ActionContent) -> BridgeResult<ActionId>;

    async fn sign(&self, action_id: ActionId) -> BridgeResult<TxHash>;

    /// Whether this client's relayer already signed the action on chain.
    async fn was_signed(&self, action_id: ActionId) -> BridgeResult<bool>;

    /// Number of distinct relayers that signed the action on chain.
    async fn signer_count(&self, action_id: ActionId) -> BridgeResult<u64>;

    async fn execute(&self, action_id: ActionId) -> BridgeResult<TxHash>;

    async fn was_executed(&self, action_id: ActionId) -> BridgeResult<bool>;

    async fn get_balance_snapshot(&self, token: &TokenId) -> BridgeResult<BalanceSnapshot>;

    /// Amounts of this token locked in batches that were proposed on the
    /// counterpart chain but not executed yet, in source token decimals.
    /// The batch currently pending on this chain is not included.
    async fn get_inflight_amounts(&self, token: &TokenId) -> BridgeResult<Vec<BigUint>>;

    /// Statuses the contract recorded for an executed incoming batch.
    async fn get_transfer_statuses(&self, batch_id: BatchId) -> BridgeResult<Vec<TransferStatus>>;

    fn relayer_address(&self) -> RelayerAddress;

    async fn close(&self) -> BridgeResult<()>;
}
