// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Steps of the relay flow. A batch goes through the transfer action on the
//! destination chain, then through the status action on the source chain:
//!
//! `GetPending -> ProposeTransfer -> WaitForQuorumOnProposal -> Sign ->
//! WaitForQuorumOnSignatures -> PerformAction -> WaitForExecution ->
//! ResolveSetStatus -> ProposeSetStatus -> WaitForSetStatusProposal ->
//! SignSetStatus -> WaitForQuorumOnSetStatus -> PerformSetStatus ->
//! WaitForSetStatusExecution -> GetPending`

mod action;
mod pending;

use crate::error::{BridgeError, BridgeResult};
use crate::executor::{ActionKind, BridgeExecutor, RetryCounter};
use crate::metrics::BridgeMetrics;
use crate::state_machine::{StateMachine, Step, StepIdentifier};
use std::sync::Arc;
use strum_macros::Display;
use tracing::warn;

pub use action::{
    PerformStep, ProposeStep, SignStep, WaitForExecutionStep, WaitForProposalStep,
    WaitForQuorumStep,
};
pub use pending::{GetPendingStep, ResolveSetStatusStep};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum BridgeStep {
    GetPending,
    ProposeTransfer,
    WaitForQuorumOnProposal,
    Sign,
    WaitForQuorumOnSignatures,
    PerformAction,
    WaitForExecution,
    ResolveSetStatus,
    ProposeSetStatus,
    WaitForSetStatusProposal,
    SignSetStatus,
    WaitForQuorumOnSetStatus,
    PerformSetStatus,
    WaitForSetStatusExecution,
}

impl StepIdentifier for BridgeStep {
    fn ordinal(&self) -> i64 {
        *self as i64
    }
}

impl ActionKind {
    pub fn propose_step(&self) -> BridgeStep {
        match self {
            ActionKind::Transfer => BridgeStep::ProposeTransfer,
            ActionKind::SetStatus => BridgeStep::ProposeSetStatus,
        }
    }

    pub fn wait_for_proposal_step(&self) -> BridgeStep {
        match self {
            ActionKind::Transfer => BridgeStep::WaitForQuorumOnProposal,
            ActionKind::SetStatus => BridgeStep::WaitForSetStatusProposal,
        }
    }

    pub fn sign_step(&self) -> BridgeStep {
        match self {
            ActionKind::Transfer => BridgeStep::Sign,
            ActionKind::SetStatus => BridgeStep::SignSetStatus,
        }
    }

    pub fn wait_for_quorum_step(&self) -> BridgeStep {
        match self {
            ActionKind::Transfer => BridgeStep::WaitForQuorumOnSignatures,
            ActionKind::SetStatus => BridgeStep::WaitForQuorumOnSetStatus,
        }
    }

    pub fn perform_step(&self) -> BridgeStep {
        match self {
            ActionKind::Transfer => BridgeStep::PerformAction,
            ActionKind::SetStatus => BridgeStep::PerformSetStatus,
        }
    }

    pub fn wait_for_execution_step(&self) -> BridgeStep {
        match self {
            ActionKind::Transfer => BridgeStep::WaitForExecution,
            ActionKind::SetStatus => BridgeStep::WaitForSetStatusExecution,
        }
    }
}

/// Charges a failed poll to `counter`. Once its budget is spent the flow
/// restarts from `GetPending` instead of failing on the same step forever.
fn retry_or_restart(
    bridge: &mut BridgeExecutor,
    counter: RetryCounter,
    error: BridgeError,
) -> BridgeResult<BridgeStep> {
    if bridge.retry_budget_exhausted(counter) {
        warn!(
            direction = %bridge.direction(),
            batch_id = ?bridge.batch_id(),
            "Dropping flow after repeated failures: {:?}", error
        );
        return Ok(BridgeStep::GetPending);
    }
    Err(error)
}

pub type BridgeStateMachine = StateMachine<BridgeExecutor, BridgeStep>;

pub fn create_bridge_steps() -> Vec<Box<dyn Step<BridgeExecutor, BridgeStep>>> {
    let mut steps: Vec<Box<dyn Step<BridgeExecutor, BridgeStep>>> =
        vec![Box::new(GetPendingStep), Box::new(ResolveSetStatusStep)];
    for kind in [ActionKind::Transfer, ActionKind::SetStatus] {
        steps.push(Box::new(ProposeStep { kind }));
        steps.push(Box::new(WaitForProposalStep { kind }));
        steps.push(Box::new(SignStep { kind }));
        steps.push(Box::new(WaitForQuorumStep { kind }));
        steps.push(Box::new(PerformStep { kind }));
        steps.push(Box::new(WaitForExecutionStep { kind }));
    }
    steps
}

pub fn new_bridge_state_machine(
    executor: BridgeExecutor,
    metrics: Arc<BridgeMetrics>,
) -> BridgeResult<BridgeStateMachine> {
    let name = executor.label();
    StateMachine::new(
        name,
        create_bridge_steps(),
        BridgeStep::GetPending,
        executor,
        metrics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_every_step_is_registered_once() {
        let ids: Vec<BridgeStep> = create_bridge_steps()
            .iter()
            .map(|s| s.identifier())
            .collect();
        let unique: BTreeSet<_> = ids.iter().copied().collect();
        assert_eq!(ids.len(), 14);
        assert_eq!(unique.len(), 14);
    }

    #[test]
    fn test_action_kinds_map_to_distinct_steps() {
        assert_eq!(
            ActionKind::Transfer.wait_for_proposal_step(),
            BridgeStep::WaitForQuorumOnProposal
        );
        assert_eq!(
            ActionKind::SetStatus.wait_for_execution_step(),
            BridgeStep::WaitForSetStatusExecution
        );
        assert_ne!(
            ActionKind::Transfer.sign_step(),
            ActionKind::SetStatus.sign_step()
        );
    }
}
