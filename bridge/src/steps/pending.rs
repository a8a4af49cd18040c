// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{retry_or_restart, BridgeStep};
use crate::error::BridgeResult;
use crate::executor::{ActionKind, BridgeExecutor, RetryCounter};
use crate::state_machine::Step;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct GetPendingStep;

#[async_trait]
impl Step<BridgeExecutor, BridgeStep> for GetPendingStep {
    fn identifier(&self) -> BridgeStep {
        BridgeStep::GetPending
    }

    async fn execute(
        &self,
        bridge: &mut BridgeExecutor,
        _cancel: &CancellationToken,
    ) -> BridgeResult<BridgeStep> {
        bridge.reset_flow();
        let Some(batch) = bridge.fetch_pending_batch().await? else {
            debug!(direction = %bridge.direction(), "No pending batch");
            return Ok(BridgeStep::GetPending);
        };
        if batch.is_empty() {
            debug!(direction = %bridge.direction(), batch_id = batch.id, "Skipping empty batch");
            return Ok(BridgeStep::GetPending);
        }
        if let Some(last) = bridge.last_batch_id() {
            if batch.id < last {
                warn!(
                    direction = %bridge.direction(),
                    batch_id = batch.id,
                    last_batch_id = last,
                    "Pending batch is older than the last processed batch"
                );
                return Ok(BridgeStep::GetPending);
            }
        }
        bridge.store_batch(batch)?;

        if bridge.was_transfer_already_executed().await? {
            info!(
                direction = %bridge.direction(),
                batch_id = ?bridge.batch_id(),
                "Transfer already executed, resolving statuses"
            );
            return Ok(BridgeStep::ResolveSetStatus);
        }
        Ok(ActionKind::Transfer.propose_step())
    }
}

pub struct ResolveSetStatusStep;

#[async_trait]
impl Step<BridgeExecutor, BridgeStep> for ResolveSetStatusStep {
    fn identifier(&self) -> BridgeStep {
        BridgeStep::ResolveSetStatus
    }

    async fn execute(
        &self,
        bridge: &mut BridgeExecutor,
        _cancel: &CancellationToken,
    ) -> BridgeResult<BridgeStep> {
        if bridge.batch().is_err() {
            return Ok(BridgeStep::GetPending);
        }
        if let Err(e) = bridge.resolve_statuses().await {
            return retry_or_restart(bridge, RetryCounter::WasExecuted, e);
        }
        bridge.reset_retries();
        Ok(ActionKind::SetStatus.propose_step())
    }
}
