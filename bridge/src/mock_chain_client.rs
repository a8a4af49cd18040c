// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory bridge contract and the per-relayer clients that talk to it.

use crate::action_id::derive_action_id;
use crate::chain_client::ChainClient;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{
    ActionContent, ActionId, BalanceSnapshot, Batch, BatchId, RelayerAddress, StatusUpdate,
    TokenId, TransferStatus, TxHash,
};
use async_trait::async_trait;
use num_bigint::BigUint;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct LedgerState {
    // Outgoing batches still waiting for their statuses.
    pending_batches: BTreeMap<BatchId, Batch>,
    proposals: HashMap<ActionId, ActionContent>,
    signers: HashMap<ActionId, BTreeSet<RelayerAddress>>,
    executed: BTreeSet<ActionId>,
    executed_contents: Vec<ActionContent>,
    // Statuses of incoming batches executed on this chain.
    incoming_statuses: HashMap<BatchId, Vec<TransferStatus>>,
    // Statuses written back for this chain's outgoing batches.
    finalized_statuses: BTreeMap<BatchId, Vec<TransferStatus>>,
    balances: HashMap<TokenId, BalanceSnapshot>,
    inflight: HashMap<TokenId, Vec<BigUint>>,
    injected_failures: HashMap<String, u64>,
    rejected_duplicate_proposals: u64,
}

/// One chain's bridge contract. Enforces the quorum at execution time and
/// treats re-proposals of identical content as duplicates.
pub struct MockLedger {
    quorum: u64,
    state: Mutex<LedgerState>,
    tx_counter: AtomicU64,
}

impl MockLedger {
    pub fn new(quorum: u64) -> Arc<Self> {
        Arc::new(Self {
            quorum,
            state: Mutex::new(LedgerState::default()),
            tx_counter: AtomicU64::new(0),
        })
    }

    pub fn client(self: &Arc<Self>, relayer: RelayerAddress) -> Arc<MockChainClient> {
        Arc::new(MockChainClient {
            ledger: self.clone(),
            relayer,
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_tx_hash(&self) -> TxHash {
        format!("0x{:064x}", self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn add_pending_batch(&self, batch: Batch) {
        self.state().pending_batches.insert(batch.id, batch);
    }

    pub fn set_balance(&self, token: TokenId, snapshot: BalanceSnapshot) {
        self.state().balances.insert(token, snapshot);
    }

    pub fn set_inflight_amounts(&self, token: TokenId, amounts: Vec<BigUint>) {
        self.state().inflight.insert(token, amounts);
    }

    pub fn set_transfer_statuses(&self, batch_id: BatchId, statuses: Vec<TransferStatus>) {
        self.state().incoming_statuses.insert(batch_id, statuses);
    }

    /// Makes the next `count` calls of `operation` fail with a transient error.
    pub fn fail_next(&self, operation: &str, count: u64) {
        self.state()
            .injected_failures
            .insert(operation.to_string(), count);
    }

    fn check_injected_failure(&self, operation: &str) -> BridgeResult<()> {
        let mut state = self.state();
        if let Some(remaining) = state.injected_failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BridgeError::TransientProviderError(format!(
                    "injected failure on {operation}"
                )));
            }
        }
        Ok(())
    }

    pub fn proposal_count(&self) -> usize {
        self.state().proposals.len()
    }

    pub fn proposals(&self) -> Vec<ActionContent> {
        self.state().proposals.values().cloned().collect()
    }

    pub fn rejected_duplicate_proposals(&self) -> u64 {
        self.state().rejected_duplicate_proposals
    }

    pub fn executed_contents(&self) -> Vec<ActionContent> {
        self.state().executed_contents.clone()
    }

    pub fn signers_of(&self, action_id: ActionId) -> Vec<RelayerAddress> {
        self.state()
            .signers
            .get(&action_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn finalized_statuses(&self, batch_id: BatchId) -> Option<Vec<TransferStatus>> {
        self.state().finalized_statuses.get(&batch_id).cloned()
    }

    pub fn pending_batch_count(&self) -> usize {
        self.state().pending_batches.len()
    }

    pub fn balance(&self, token: &TokenId) -> Option<BalanceSnapshot> {
        self.state().balances.get(token).cloned()
    }

    fn propose(&self, content: ActionContent) -> BridgeResult<TxHash> {
        let action_id = derive_action_id(&content);
        let mut state = self.state();
        if state.proposals.contains_key(&action_id) {
            state.rejected_duplicate_proposals += 1;
            return Err(BridgeError::ActionAlreadyProposed(action_id));
        }
        state.proposals.insert(action_id, content);
        drop(state);
        Ok(self.next_tx_hash())
    }

    fn apply(state: &mut LedgerState, content: &ActionContent) {
        match content {
            ActionContent::Transfer(batch) => {
                for transfer in &batch.transfers {
                    if let Some(snapshot) = state.balances.get_mut(&transfer.destination_token) {
                        let amount = transfer
                            .converted_amount
                            .clone()
                            .unwrap_or_else(|| transfer.amount.clone());
                        if snapshot.is_mint_burn {
                            snapshot.minted += amount;
                        } else if snapshot.total_balance >= amount {
                            snapshot.total_balance -= amount;
                        }
                    }
                }
                state
                    .incoming_statuses
                    .insert(batch.id, batch.statuses(TransferStatus::Executed));
            }
            ActionContent::SetStatus(update) => {
                state
                    .finalized_statuses
                    .insert(update.batch_id, update.statuses.clone());
                state.pending_batches.remove(&update.batch_id);
            }
        }
    }
}

/// A relayer's view of a `MockLedger`: signs and submits as `relayer`.
pub struct MockChainClient {
    ledger: Arc<MockLedger>,
    relayer: RelayerAddress,
}

impl MockChainClient {
    pub fn ledger(&self) -> &Arc<MockLedger> {
        &self.ledger
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn fetch_pending_batch(&self) -> BridgeResult<Option<Batch>> {
        self.ledger.check_injected_failure("fetch_pending_batch")?;
        Ok(self
            .ledger
            .state()
            .pending_batches
            .values()
            .next()
            .cloned())
    }

    async fn propose_transfer(&self, batch: &Batch) -> BridgeResult<TxHash> {
        self.ledger.check_injected_failure("propose_transfer")?;
        self.ledger.propose(ActionContent::Transfer(batch.clone()))
    }

    async fn propose_status(&self, update: &StatusUpdate) -> BridgeResult<TxHash> {
        self.ledger.check_injected_failure("propose_status")?;
        self.ledger.propose(ActionContent::SetStatus(update.clone()))
    }

    async fn was_proposed(&self, content: &ActionContent) -> BridgeResult<bool> {
        self.ledger.check_injected_failure("was_proposed")?;
        Ok(self
            .ledger
            .state()
            .proposals
            .contains_key(&derive_action_id(content)))
    }

    async fn get_action_id(&self, content: &ActionContent) -> BridgeResult<ActionId> {
        self.ledger.check_injected_failure("get_action_id")?;
        let action_id = derive_action_id(content);
        if !self.ledger.state().proposals.contains_key(&action_id) {
            return Err(BridgeError::ActionNotProposed(action_id));
        }
        Ok(action_id)
    }

    async fn sign(&self, action_id: ActionId) -> BridgeResult<TxHash> {
        self.ledger.check_injected_failure("sign")?;
        let mut state = self.ledger.state();
        if !state.proposals.contains_key(&action_id) {
            return Err(BridgeError::ActionNotProposed(action_id));
        }
        if state.executed.contains(&action_id) {
            return Err(BridgeError::ActionAlreadyExecuted(action_id));
        }
        state
            .signers
            .entry(action_id)
            .or_default()
            .insert(self.relayer.clone());
        drop(state);
        Ok(self.ledger.next_tx_hash())
    }

    async fn was_signed(&self, action_id: ActionId) -> BridgeResult<bool> {
        self.ledger.check_injected_failure("was_signed")?;
        Ok(self
            .ledger
            .state()
            .signers
            .get(&action_id)
            .map(|s| s.contains(&self.relayer))
            .unwrap_or(false))
    }

    async fn signer_count(&self, action_id: ActionId) -> BridgeResult<u64> {
        self.ledger.check_injected_failure("signer_count")?;
        Ok(self
            .ledger
            .state()
            .signers
            .get(&action_id)
            .map(|s| s.len() as u64)
            .unwrap_or(0))
    }

    async fn execute(&self, action_id: ActionId) -> BridgeResult<TxHash> {
        self.ledger.check_injected_failure("execute")?;
        let mut state = self.ledger.state();
        let content = state
            .proposals
            .get(&action_id)
            .cloned()
            .ok_or(BridgeError::ActionNotProposed(action_id))?;
        if state.executed.contains(&action_id) {
            return Err(BridgeError::ActionAlreadyExecuted(action_id));
        }
        let signers = state
            .signers
            .get(&action_id)
            .map(|s| s.len() as u64)
            .unwrap_or(0);
        if signers < self.ledger.quorum {
            return Err(BridgeError::QuorumNotReached {
                action_id,
                signers,
                quorum: self.ledger.quorum,
            });
        }
        state.executed.insert(action_id);
        MockLedger::apply(&mut state, &content);
        state.executed_contents.push(content);
        drop(state);
        Ok(self.ledger.next_tx_hash())
    }

    async fn was_executed(&self, action_id: ActionId) -> BridgeResult<bool> {
        self.ledger.check_injected_failure("was_executed")?;
        Ok(self.ledger.state().executed.contains(&action_id))
    }

    async fn get_balance_snapshot(&self, token: &TokenId) -> BridgeResult<BalanceSnapshot> {
        self.ledger.check_injected_failure("get_balance_snapshot")?;
        // Unknown tokens read as unconfigured, which validation rejects.
        Ok(self
            .ledger
            .state()
            .balances
            .get(token)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_inflight_amounts(&self, token: &TokenId) -> BridgeResult<Vec<BigUint>> {
        self.ledger.check_injected_failure("get_inflight_amounts")?;
        Ok(self
            .ledger
            .state()
            .inflight
            .get(token)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_transfer_statuses(&self, batch_id: BatchId) -> BridgeResult<Vec<TransferStatus>> {
        self.ledger.check_injected_failure("get_transfer_statuses")?;
        self.ledger
            .state()
            .incoming_statuses
            .get(&batch_id)
            .cloned()
            .ok_or(BridgeError::StatusesNotAvailable(batch_id))
    }

    fn relayer_address(&self) -> RelayerAddress {
        self.relayer.clone()
    }

    async fn close(&self) -> BridgeResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::batch_with_transfers;

    #[tokio::test]
    async fn test_duplicate_proposal_is_rejected() {
        let ledger = MockLedger::new(1);
        let client = ledger.client(RelayerAddress::new(vec![1]));
        let batch = batch_with_transfers(3, 1);
        client.propose_transfer(&batch).await.unwrap();
        assert!(matches!(
            client.propose_transfer(&batch).await,
            Err(BridgeError::ActionAlreadyProposed(_))
        ));
        assert_eq!(ledger.proposal_count(), 1);
        assert_eq!(ledger.rejected_duplicate_proposals(), 1);
    }

    #[tokio::test]
    async fn test_execute_enforces_quorum_once() {
        let ledger = MockLedger::new(2);
        let a = ledger.client(RelayerAddress::new(vec![1]));
        let b = ledger.client(RelayerAddress::new(vec![2]));
        let batch = batch_with_transfers(4, 2);
        a.propose_transfer(&batch).await.unwrap();
        let action_id = a
            .get_action_id(&ActionContent::Transfer(batch.clone()))
            .await
            .unwrap();

        a.sign(action_id).await.unwrap();
        a.sign(action_id).await.unwrap();
        assert!(matches!(
            a.execute(action_id).await,
            Err(BridgeError::QuorumNotReached { signers: 1, .. })
        ));

        b.sign(action_id).await.unwrap();
        a.execute(action_id).await.unwrap();
        assert!(b.was_executed(action_id).await.unwrap());
        assert!(matches!(
            b.execute(action_id).await,
            Err(BridgeError::ActionAlreadyExecuted(_))
        ));
        assert_eq!(
            a.get_transfer_statuses(4).await.unwrap(),
            vec![TransferStatus::Executed; 2]
        );
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let ledger = MockLedger::new(1);
        let client = ledger.client(RelayerAddress::new(vec![1]));
        ledger.fail_next("fetch_pending_batch", 1);
        assert!(client.fetch_pending_batch().await.is_err());
        assert_eq!(client.fetch_pending_batch().await.unwrap(), None);
    }
}
