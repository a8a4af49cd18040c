// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Steps shared by the transfer and the set-status actions. Each step is
//! parameterized by the action it drives.

use super::{retry_or_restart, BridgeStep};
use crate::balance_validator::BatchValidation;
use crate::error::{BridgeError, BridgeResult};
use crate::executor::{ActionKind, BridgeExecutor, RetryCounter};
use crate::state_machine::Step;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ProposeStep {
    pub kind: ActionKind,
}

#[async_trait]
impl Step<BridgeExecutor, BridgeStep> for ProposeStep {
    fn identifier(&self) -> BridgeStep {
        self.kind.propose_step()
    }

    async fn execute(
        &self,
        bridge: &mut BridgeExecutor,
        cancel: &CancellationToken,
    ) -> BridgeResult<BridgeStep> {
        if bridge.batch().is_err() {
            return Ok(BridgeStep::GetPending);
        }
        let next = self.kind.wait_for_proposal_step();
        // A transfer paid out by peers has drained the liquidity it was
        // validated against, so its outcome is read back instead.
        if self.kind == ActionKind::Transfer && bridge.was_transfer_already_executed().await? {
            info!(
                direction = %bridge.direction(),
                batch_id = ?bridge.batch_id(),
                "Transfer executed by peers, resolving statuses"
            );
            return Ok(BridgeStep::ResolveSetStatus);
        }
        if bridge.was_proposed(self.kind).await? {
            debug!(direction = %bridge.direction(), action = %self.kind, "Already proposed");
            return Ok(next);
        }
        if self.kind == ActionKind::Transfer {
            // Only content nobody proposed yet is validated. Every relayer
            // validates, so a rejection is agreed on by all.
            if let BatchValidation::Rejected(reason) = bridge.validate_batch().await? {
                bridge.reject_batch(&reason)?;
                return Ok(ActionKind::SetStatus.propose_step());
            }
        }
        if !bridge.is_leader() {
            debug!(direction = %bridge.direction(), action = %self.kind, "Not leader, skipping proposal");
            return Ok(next);
        }
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        bridge.propose(self.kind).await?;
        Ok(next)
    }
}

pub struct WaitForProposalStep {
    pub kind: ActionKind,
}

#[async_trait]
impl Step<BridgeExecutor, BridgeStep> for WaitForProposalStep {
    fn identifier(&self) -> BridgeStep {
        self.kind.wait_for_proposal_step()
    }

    async fn execute(
        &self,
        bridge: &mut BridgeExecutor,
        _cancel: &CancellationToken,
    ) -> BridgeResult<BridgeStep> {
        if bridge.was_proposed(self.kind).await? {
            let action_id = match bridge.resolve_action_id(self.kind).await {
                Ok(action_id) => action_id,
                Err(e) => return retry_or_restart(bridge, RetryCounter::WasProposed, e),
            };
            info!(
                direction = %bridge.direction(),
                batch_id = ?bridge.batch_id(),
                %action_id,
                action = %self.kind,
                "Proposal observed on chain"
            );
            bridge.reset_retries();
            return Ok(self.kind.sign_step());
        }
        if bridge.retry_budget_exhausted(RetryCounter::WasProposed) {
            return Ok(BridgeStep::GetPending);
        }
        Ok(self.identifier())
    }
}

pub struct SignStep {
    pub kind: ActionKind,
}

#[async_trait]
impl Step<BridgeExecutor, BridgeStep> for SignStep {
    fn identifier(&self) -> BridgeStep {
        self.kind.sign_step()
    }

    async fn execute(
        &self,
        bridge: &mut BridgeExecutor,
        cancel: &CancellationToken,
    ) -> BridgeResult<BridgeStep> {
        // Peers may have reached quorum and executed without this signature.
        if bridge.was_executed(self.kind).await? {
            return Ok(self.kind.wait_for_execution_step());
        }
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        bridge.sign(self.kind).await?;
        Ok(self.kind.wait_for_quorum_step())
    }
}

pub struct WaitForQuorumStep {
    pub kind: ActionKind,
}

#[async_trait]
impl Step<BridgeExecutor, BridgeStep> for WaitForQuorumStep {
    fn identifier(&self) -> BridgeStep {
        self.kind.wait_for_quorum_step()
    }

    async fn execute(
        &self,
        bridge: &mut BridgeExecutor,
        _cancel: &CancellationToken,
    ) -> BridgeResult<BridgeStep> {
        if bridge.quorum_reached(self.kind).await? {
            info!(
                direction = %bridge.direction(),
                action_id = %bridge.action_id(self.kind)?,
                action = %self.kind,
                "Quorum reached"
            );
            bridge.reset_retries();
            return Ok(self.kind.perform_step());
        }
        if bridge.retry_budget_exhausted(RetryCounter::Quorum) {
            return Ok(BridgeStep::GetPending);
        }
        Ok(self.identifier())
    }
}

pub struct PerformStep {
    pub kind: ActionKind,
}

#[async_trait]
impl Step<BridgeExecutor, BridgeStep> for PerformStep {
    fn identifier(&self) -> BridgeStep {
        self.kind.perform_step()
    }

    async fn execute(
        &self,
        bridge: &mut BridgeExecutor,
        cancel: &CancellationToken,
    ) -> BridgeResult<BridgeStep> {
        let next = self.kind.wait_for_execution_step();
        if bridge.was_executed(self.kind).await? {
            return Ok(next);
        }
        if !bridge.is_leader() {
            debug!(direction = %bridge.direction(), action = %self.kind, "Not leader, skipping execution");
            return Ok(next);
        }
        if !bridge.quorum_reached(self.kind).await? {
            warn!(
                direction = %bridge.direction(),
                action = %self.kind,
                "Signer count dropped below quorum before execution"
            );
            return Ok(self.kind.wait_for_quorum_step());
        }
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        bridge.perform(self.kind).await?;
        Ok(next)
    }
}

pub struct WaitForExecutionStep {
    pub kind: ActionKind,
}

#[async_trait]
impl Step<BridgeExecutor, BridgeStep> for WaitForExecutionStep {
    fn identifier(&self) -> BridgeStep {
        self.kind.wait_for_execution_step()
    }

    async fn execute(
        &self,
        bridge: &mut BridgeExecutor,
        _cancel: &CancellationToken,
    ) -> BridgeResult<BridgeStep> {
        if bridge.was_executed(self.kind).await? {
            bridge.reset_retries();
            return Ok(match self.kind {
                ActionKind::Transfer => BridgeStep::ResolveSetStatus,
                ActionKind::SetStatus => {
                    bridge.complete_batch();
                    BridgeStep::GetPending
                }
            });
        }
        if bridge.retry_budget_exhausted(RetryCounter::WasExecuted) {
            return Ok(BridgeStep::GetPending);
        }
        Ok(self.identifier())
    }
}
