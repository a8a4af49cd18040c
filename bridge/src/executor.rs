// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-direction orchestration of the relay protocol. The executor holds the
//! flow state of the batch currently being relayed and exposes the chain,
//! gossip and validation operations the steps are made of.

use crate::action_id::{content_hash, derive_action_id, ContentHash};
use crate::balance_validator::{BalanceValidator, BatchValidation};
use crate::chain_client::ChainClient;
use crate::config::StateMachineConfig;
use crate::crypto::CryptoProvider;
use crate::error::{BridgeError, BridgeResult};
use crate::gossip::{Broadcaster, SignatureMessage, SignatureProcessor};
use crate::metrics::BridgeMetrics;
use crate::quorum::QuorumTracker;
use crate::signatures_holder::SignaturesHolder;
use crate::topology::TopologyProvider;
use crate::types::{
    ActionContent, ActionId, Batch, BatchId, Direction, RelayerAddress, StatusUpdate,
    TransferStatus,
};
use std::sync::Arc;
use strum_macros::Display;
use tap::TapFallible;
use tracing::{debug, info, warn};

/// The two on-chain actions every batch goes through.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum ActionKind {
    // Executes the batch transfers on the destination chain.
    Transfer,
    // Writes the final transfer statuses back on the source chain.
    SetStatus,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum RetryCounter {
    WasProposed,
    Quorum,
    WasExecuted,
}

#[derive(Debug, Default)]
struct FlowState {
    batch: Option<Batch>,
    status_update: Option<StatusUpdate>,
    transfer_action_id: Option<ActionId>,
    status_action_id: Option<ActionId>,
    gossiped_hashes: Vec<ContentHash>,
    retries_on_was_proposed: u64,
    retries_on_quorum: u64,
    retries_on_was_executed: u64,
}

pub struct BridgeExecutorArgs {
    pub direction: Direction,
    // Chain batches are read from and statuses are written back to.
    pub source: Arc<dyn ChainClient>,
    // Chain transfers are executed on.
    pub destination: Arc<dyn ChainClient>,
    pub topology: Arc<dyn TopologyProvider>,
    pub crypto: Arc<CryptoProvider>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub signatures: Arc<SignaturesHolder>,
    pub config: StateMachineConfig,
    pub quorum: u64,
    pub relayer_count: u64,
    pub metrics: Arc<BridgeMetrics>,
}

pub struct BridgeExecutor {
    direction: Direction,
    source: Arc<dyn ChainClient>,
    destination: Arc<dyn ChainClient>,
    topology: Arc<dyn TopologyProvider>,
    crypto: Arc<CryptoProvider>,
    broadcaster: Arc<dyn Broadcaster>,
    signatures: Arc<SignaturesHolder>,
    transfer_quorum: QuorumTracker,
    status_quorum: QuorumTracker,
    balance_validator: BalanceValidator,
    config: StateMachineConfig,
    last_batch_id: Option<BatchId>,
    flow: FlowState,
    metrics: Arc<BridgeMetrics>,
}

impl BridgeExecutor {
    pub fn new(args: BridgeExecutorArgs) -> BridgeResult<Self> {
        let BridgeExecutorArgs {
            direction,
            source,
            destination,
            topology,
            crypto,
            broadcaster,
            signatures,
            config,
            quorum,
            relayer_count,
            metrics,
        } = args;
        if config.max_retries_on_was_proposed == 0
            || config.max_quorum_retries == 0
            || config.max_retries_on_was_executed == 0
        {
            return Err(BridgeError::InvalidArgument(
                "retry budgets must be positive".to_string(),
            ));
        }
        let transfer_quorum = QuorumTracker::new(destination.clone(), quorum, relayer_count)?;
        let status_quorum = QuorumTracker::new(source.clone(), quorum, relayer_count)?;
        let balance_validator =
            BalanceValidator::new(direction, source.clone(), destination.clone());
        Ok(Self {
            direction,
            source,
            destination,
            topology,
            crypto,
            broadcaster,
            signatures,
            transfer_quorum,
            status_quorum,
            balance_validator,
            config,
            last_batch_id: None,
            flow: FlowState::default(),
            metrics,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn label(&self) -> &'static str {
        self.direction.label()
    }

    pub fn public_key(&self) -> &RelayerAddress {
        self.crypto.public_key()
    }

    pub fn is_leader(&self) -> bool {
        self.topology.is_leader(self.crypto.public_key())
    }

    pub fn last_batch_id(&self) -> Option<BatchId> {
        self.last_batch_id
    }

    pub fn batch(&self) -> BridgeResult<&Batch> {
        self.flow.batch.as_ref().ok_or(BridgeError::NoBatchInFlow)
    }

    pub fn batch_id(&self) -> Option<BatchId> {
        self.flow.batch.as_ref().map(|b| b.id)
    }

    pub fn status_update(&self) -> Option<&StatusUpdate> {
        self.flow.status_update.as_ref()
    }

    fn target_chain(&self, kind: ActionKind) -> &Arc<dyn ChainClient> {
        match kind {
            ActionKind::Transfer => &self.destination,
            ActionKind::SetStatus => &self.source,
        }
    }

    fn quorum_tracker(&self, kind: ActionKind) -> &QuorumTracker {
        match kind {
            ActionKind::Transfer => &self.transfer_quorum,
            ActionKind::SetStatus => &self.status_quorum,
        }
    }

    pub fn content(&self, kind: ActionKind) -> BridgeResult<ActionContent> {
        match kind {
            ActionKind::Transfer => Ok(ActionContent::Transfer(self.batch()?.clone())),
            ActionKind::SetStatus => self
                .flow
                .status_update
                .clone()
                .map(ActionContent::SetStatus)
                .ok_or(BridgeError::StatusUpdateNotResolved),
        }
    }

    pub fn action_id(&self, kind: ActionKind) -> BridgeResult<ActionId> {
        match kind {
            ActionKind::Transfer => self.flow.transfer_action_id,
            ActionKind::SetStatus => self.flow.status_action_id,
        }
        .ok_or(BridgeError::ActionIdNotResolved)
    }

    fn set_action_id(&mut self, kind: ActionKind, action_id: ActionId) {
        match kind {
            ActionKind::Transfer => self.flow.transfer_action_id = Some(action_id),
            ActionKind::SetStatus => self.flow.status_action_id = Some(action_id),
        }
    }

    /// Drops the flow of the previous batch, including the gossiped
    /// signatures collected for it.
    pub fn reset_flow(&mut self) {
        for hash in self.flow.gossiped_hashes.drain(..) {
            self.signatures.clear(&hash);
        }
        self.flow = FlowState::default();
    }

    pub async fn fetch_pending_batch(&self) -> BridgeResult<Option<Batch>> {
        self.source.fetch_pending_batch().await
    }

    /// Makes `batch` the batch of the current flow. Batches older than the
    /// last processed one are refused.
    pub fn store_batch(&mut self, batch: Batch) -> BridgeResult<()> {
        if let Some(last) = self.last_batch_id {
            if batch.id < last {
                return Err(BridgeError::InvalidArgument(format!(
                    "batch {} is older than last processed batch {last}",
                    batch.id
                )));
            }
        }
        info!(
            direction = %self.direction,
            batch_id = batch.id,
            transfers = batch.transfers.len(),
            "Picked up pending batch"
        );
        self.last_batch_id = Some(batch.id);
        self.metrics
            .last_processed_batch_id
            .with_label_values(&[self.label()])
            .set(batch.id as i64);
        self.flow.batch = Some(batch);
        Ok(())
    }

    /// Restart recovery: whether the transfer action of the stored batch has
    /// already been executed on the destination chain.
    pub async fn was_transfer_already_executed(&mut self) -> BridgeResult<bool> {
        let action_id = derive_action_id(&self.content(ActionKind::Transfer)?);
        let executed = self.destination.was_executed(action_id).await?;
        if executed {
            self.set_action_id(ActionKind::Transfer, action_id);
        }
        Ok(executed)
    }

    pub async fn validate_batch(&self) -> BridgeResult<BatchValidation> {
        self.balance_validator.validate(self.batch()?).await
    }

    /// Marks every transfer of the current batch as rejected.
    pub fn reject_batch(&mut self, reason: &str) -> BridgeResult<()> {
        let batch = self.batch()?;
        let update = StatusUpdate {
            batch_id: batch.id,
            statuses: batch.statuses(TransferStatus::Rejected),
        };
        warn!(
            direction = %self.direction,
            batch_id = update.batch_id,
            "Rejecting batch: {reason}"
        );
        self.metrics
            .batches_rejected
            .with_label_values(&[self.label()])
            .inc();
        self.flow.status_update = Some(update);
        Ok(())
    }

    /// Reads the statuses the destination chain recorded for the executed batch.
    pub async fn resolve_statuses(&mut self) -> BridgeResult<()> {
        let batch = self.batch()?;
        let batch_id = batch.id;
        let expected = batch.transfers.len();
        let statuses = self.destination.get_transfer_statuses(batch_id).await?;
        if statuses.len() != expected {
            return Err(BridgeError::InternalError(format!(
                "batch {batch_id} has {expected} transfers but {} statuses",
                statuses.len()
            )));
        }
        if statuses.contains(&TransferStatus::Pending) {
            return Err(BridgeError::StatusesNotAvailable(batch_id));
        }
        debug!(direction = %self.direction, batch_id, ?statuses, "Resolved statuses");
        self.flow.status_update = Some(StatusUpdate { batch_id, statuses });
        Ok(())
    }

    pub async fn was_proposed(&self, kind: ActionKind) -> BridgeResult<bool> {
        let content = self.content(kind)?;
        self.target_chain(kind).was_proposed(&content).await
    }

    pub async fn propose(&self, kind: ActionKind) -> BridgeResult<()> {
        let content = self.content(kind)?;
        let chain = self.target_chain(kind);
        let result = match &content {
            ActionContent::Transfer(batch) => chain.propose_transfer(batch).await,
            ActionContent::SetStatus(update) => chain.propose_status(update).await,
        };
        match result {
            Ok(tx_hash) => {
                info!(
                    direction = %self.direction,
                    batch_id = content.batch_id(),
                    action = %kind,
                    %tx_hash,
                    "Proposed action"
                );
                self.metrics
                    .proposals_submitted
                    .with_label_values(&[self.label(), &kind.to_string()])
                    .inc();
                Ok(())
            }
            // Another relayer got there first; identical content is fine.
            Err(BridgeError::ActionAlreadyProposed(action_id)) => {
                info!(
                    direction = %self.direction,
                    %action_id,
                    action = %kind,
                    "Action already proposed"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Fetches the action id assigned on chain and checks it against the
    /// locally derived one.
    pub async fn resolve_action_id(&mut self, kind: ActionKind) -> BridgeResult<ActionId> {
        let content = self.content(kind)?;
        let local = derive_action_id(&content);
        let chain = self.target_chain(kind).get_action_id(&content).await?;
        if chain != local {
            return Err(BridgeError::ActionIdMismatch { local, chain });
        }
        self.set_action_id(kind, chain);
        Ok(chain)
    }

    /// Signs the action on chain unless already done, then gossips the
    /// signature over the action content hash.
    pub async fn sign(&mut self, kind: ActionKind) -> BridgeResult<()> {
        let action_id = self.action_id(kind)?;
        let chain = self.target_chain(kind).clone();
        if !chain.was_signed(action_id).await? {
            let tx_hash = chain.sign(action_id).await?;
            info!(
                direction = %self.direction,
                %action_id,
                action = %kind,
                %tx_hash,
                "Signed action"
            );
            self.metrics
                .actions_signed
                .with_label_values(&[self.label(), &kind.to_string()])
                .inc();
        }

        let hash = content_hash(&self.content(kind)?);
        if self.signatures.has_signed(&hash, self.crypto.public_key()) {
            return Ok(());
        }
        let signature = self.crypto.sign(&hash);
        self.signatures
            .process_new_message(&SignatureMessage {
                public_key: self.crypto.public_key().clone(),
                message_hash: hash,
                signature: signature.clone(),
            })
            .tap_err(|e| warn!("Own signature was not stored: {:?}", e))
            .ok();
        self.flow.gossiped_hashes.push(hash);
        self.broadcaster.broadcast_signature(signature, hash).await
    }

    pub async fn quorum_reached(&self, kind: ActionKind) -> BridgeResult<bool> {
        let action_id = self.action_id(kind)?;
        self.quorum_tracker(kind).quorum_reached(action_id).await
    }

    /// Executes the action. The signer count is checked first even though
    /// the chain enforces it too.
    pub async fn perform(&self, kind: ActionKind) -> BridgeResult<()> {
        let action_id = self.action_id(kind)?;
        let tracker = self.quorum_tracker(kind);
        let signers = tracker.signer_count(action_id).await?;
        if signers < tracker.quorum() {
            return Err(BridgeError::QuorumNotReached {
                action_id,
                signers,
                quorum: tracker.quorum(),
            });
        }
        match self.target_chain(kind).execute(action_id).await {
            Ok(tx_hash) => {
                info!(
                    direction = %self.direction,
                    %action_id,
                    action = %kind,
                    %tx_hash,
                    "Performed action"
                );
                self.metrics
                    .actions_performed
                    .with_label_values(&[self.label(), &kind.to_string()])
                    .inc();
                Ok(())
            }
            Err(BridgeError::ActionAlreadyExecuted(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn was_executed(&self, kind: ActionKind) -> BridgeResult<bool> {
        let action_id = self.action_id(kind)?;
        self.target_chain(kind).was_executed(action_id).await
    }

    pub fn complete_batch(&mut self) {
        info!(
            direction = %self.direction,
            batch_id = ?self.batch_id(),
            statuses = ?self.flow.status_update.as_ref().map(|u| &u.statuses),
            "Batch completed"
        );
        self.metrics
            .batches_completed
            .with_label_values(&[self.label()])
            .inc();
    }

    /// Counts one more unsuccessful poll. Returns true once the budget of
    /// `counter` is used up, in which case the flow must restart.
    pub fn retry_budget_exhausted(&mut self, counter: RetryCounter) -> bool {
        let (retries, max) = match counter {
            RetryCounter::WasProposed => (
                &mut self.flow.retries_on_was_proposed,
                self.config.max_retries_on_was_proposed,
            ),
            RetryCounter::Quorum => (
                &mut self.flow.retries_on_quorum,
                self.config.max_quorum_retries,
            ),
            RetryCounter::WasExecuted => (
                &mut self.flow.retries_on_was_executed,
                self.config.max_retries_on_was_executed,
            ),
        };
        *retries += 1;
        let exhausted = *retries >= max;
        if exhausted {
            warn!(
                direction = %self.direction,
                batch_id = ?self.flow.batch.as_ref().map(|b| b.id),
                %counter,
                max,
                "Retry budget exhausted, restarting flow"
            );
            self.metrics
                .retry_budget_resets
                .with_label_values(&[self.direction.label(), &counter.to_string()])
                .inc();
        }
        exhausted
    }

    pub fn reset_retries(&mut self) {
        self.flow.retries_on_was_proposed = 0;
        self.flow.retries_on_quorum = 0;
        self.flow.retries_on_was_executed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_chain_client::MockLedger;
    use crate::role_provider::{CachedRoleProvider, RoleProvider, StaticRelayerRegistry};
    use crate::test_utils::{
        batch_with_transfers, destination_token, native_balance, source_token,
        InMemoryGossipNetwork,
    };
    use crate::topology::{ManualTimeSource, TimeBasedTopology};
    use std::time::Duration;

    struct Setup {
        source: Arc<MockLedger>,
        destination: Arc<MockLedger>,
        executor: BridgeExecutor,
    }

    async fn setup(max_retries: u64) -> Setup {
        let crypto = Arc::new(CryptoProvider::generate());
        let metrics = Arc::new(BridgeMetrics::new_for_testing());
        let source = MockLedger::new(1);
        let destination = MockLedger::new(1);
        source.set_balance(source_token(), native_balance(0));
        destination.set_balance(destination_token(), native_balance(10_000));

        let network = InMemoryGossipNetwork::new();
        let broadcaster = network.broadcaster(crypto.clone());
        broadcaster.broadcast_join_topic().await.unwrap();
        let role_provider = Arc::new(CachedRoleProvider::new(
            Arc::new(StaticRelayerRegistry::new(vec![crypto.public_key().clone()])),
            metrics.clone(),
        ));
        role_provider.execute().await.unwrap();
        let topology = Arc::new(
            TimeBasedTopology::new(
                broadcaster.clone(),
                Arc::new(ManualTimeSource::new(0)),
                Duration::from_secs(60),
            )
            .unwrap(),
        );
        let executor = BridgeExecutor::new(BridgeExecutorArgs {
            direction: Direction::SourceToDestination,
            source: source.client(crypto.public_key().clone()),
            destination: destination.client(crypto.public_key().clone()),
            topology,
            crypto,
            broadcaster,
            signatures: Arc::new(SignaturesHolder::new(role_provider, metrics.clone())),
            config: StateMachineConfig {
                polling_interval_ms: 10,
                max_retries_on_was_proposed: max_retries,
                max_quorum_retries: max_retries,
                max_retries_on_was_executed: max_retries,
            },
            quorum: 1,
            relayer_count: 1,
            metrics,
        })
        .unwrap();
        Setup {
            source,
            destination,
            executor,
        }
    }

    #[tokio::test]
    async fn test_store_batch_refuses_older_ids() {
        let Setup { mut executor, .. } = setup(5).await;
        assert!(matches!(executor.batch(), Err(BridgeError::NoBatchInFlow)));
        executor.store_batch(batch_with_transfers(4, 1)).unwrap();
        assert_eq!(executor.last_batch_id(), Some(4));

        executor.reset_flow();
        assert!(executor.store_batch(batch_with_transfers(3, 1)).is_err());
        executor.store_batch(batch_with_transfers(4, 1)).unwrap();
        assert_eq!(executor.batch_id(), Some(4));
    }

    #[tokio::test]
    async fn test_retry_budget_counts_until_max() {
        let Setup { mut executor, .. } = setup(3).await;
        assert!(!executor.retry_budget_exhausted(RetryCounter::Quorum));
        assert!(!executor.retry_budget_exhausted(RetryCounter::Quorum));
        // Counters are independent.
        assert!(!executor.retry_budget_exhausted(RetryCounter::WasExecuted));
        assert!(executor.retry_budget_exhausted(RetryCounter::Quorum));

        executor.reset_retries();
        assert!(!executor.retry_budget_exhausted(RetryCounter::Quorum));
    }

    #[tokio::test]
    async fn test_propose_is_idempotent() {
        let Setup {
            mut executor,
            destination,
            ..
        } = setup(5).await;
        executor.store_batch(batch_with_transfers(1, 2)).unwrap();
        assert!(!executor.was_proposed(ActionKind::Transfer).await.unwrap());
        executor.propose(ActionKind::Transfer).await.unwrap();
        executor.propose(ActionKind::Transfer).await.unwrap();
        assert!(executor.was_proposed(ActionKind::Transfer).await.unwrap());
        assert_eq!(destination.proposal_count(), 1);

        let action_id = executor
            .resolve_action_id(ActionKind::Transfer)
            .await
            .unwrap();
        assert_eq!(
            action_id,
            derive_action_id(&executor.content(ActionKind::Transfer).unwrap())
        );
    }

    #[tokio::test]
    async fn test_perform_requires_quorum() {
        let Setup {
            mut executor,
            destination,
            ..
        } = setup(5).await;
        executor.store_batch(batch_with_transfers(1, 1)).unwrap();
        executor.propose(ActionKind::Transfer).await.unwrap();
        executor
            .resolve_action_id(ActionKind::Transfer)
            .await
            .unwrap();
        assert!(matches!(
            executor.perform(ActionKind::Transfer).await,
            Err(BridgeError::QuorumNotReached { signers: 0, .. })
        ));

        executor.sign(ActionKind::Transfer).await.unwrap();
        // Signing twice neither signs on chain again nor fails.
        executor.sign(ActionKind::Transfer).await.unwrap();
        assert!(executor.quorum_reached(ActionKind::Transfer).await.unwrap());
        executor.perform(ActionKind::Transfer).await.unwrap();
        executor.perform(ActionKind::Transfer).await.unwrap();
        assert!(executor.was_executed(ActionKind::Transfer).await.unwrap());
        assert_eq!(destination.executed_contents().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_statuses_and_reject() {
        let Setup {
            mut executor,
            destination,
            source,
        } = setup(5).await;
        assert!(matches!(
            executor.content(ActionKind::SetStatus),
            Err(BridgeError::NoBatchInFlow) | Err(BridgeError::StatusUpdateNotResolved)
        ));
        executor.store_batch(batch_with_transfers(2, 2)).unwrap();
        assert!(matches!(
            executor.resolve_statuses().await,
            Err(BridgeError::StatusesNotAvailable(2))
        ));

        destination.set_transfer_statuses(2, vec![TransferStatus::Executed]);
        assert!(executor.resolve_statuses().await.is_err());

        destination.set_transfer_statuses(
            2,
            vec![TransferStatus::Executed, TransferStatus::Pending],
        );
        assert!(executor.resolve_statuses().await.is_err());

        destination.set_transfer_statuses(
            2,
            vec![TransferStatus::Executed, TransferStatus::Rejected],
        );
        executor.resolve_statuses().await.unwrap();
        assert_eq!(
            executor.status_update().unwrap().statuses,
            vec![TransferStatus::Executed, TransferStatus::Rejected]
        );

        executor.reject_batch("test").unwrap();
        assert_eq!(
            executor.status_update().unwrap().statuses,
            vec![TransferStatus::Rejected; 2]
        );
        // The status action targets the source chain.
        executor.propose(ActionKind::SetStatus).await.unwrap();
        assert_eq!(source.proposal_count(), 1);
        assert_eq!(destination.proposal_count(), 0);
    }
}
