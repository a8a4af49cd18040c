// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_vec_with_registry, IntCounter, IntCounterVec, IntGaugeVec, Registry,
};

#[derive(Clone, Debug)]
pub struct BridgeMetrics {
    pub(crate) current_step: IntGaugeVec,
    pub(crate) step_errors: IntCounterVec,
    pub(crate) step_transitions: IntCounterVec,
    pub(crate) retry_budget_resets: IntCounterVec,

    pub(crate) proposals_submitted: IntCounterVec,
    pub(crate) actions_signed: IntCounterVec,
    pub(crate) actions_performed: IntCounterVec,
    pub(crate) batches_completed: IntCounterVec,
    pub(crate) batches_rejected: IntCounterVec,
    pub(crate) last_processed_batch_id: IntGaugeVec,

    pub(crate) gossip_signatures_accepted: IntCounter,
    pub(crate) gossip_signatures_rejected: IntCounterVec,
    pub(crate) role_refreshes: IntCounter,
    pub(crate) role_refresh_errors: IntCounter,
}

impl BridgeMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            current_step: register_int_gauge_vec_with_registry!(
                "bridge_relayer_current_step",
                "Ordinal of the step each direction's state machine is in",
                &["direction"],
                registry,
            )
            .unwrap(),
            step_errors: register_int_counter_vec_with_registry!(
                "bridge_relayer_step_errors",
                "Total number of step executions that returned an error",
                &["direction", "step"],
                registry,
            )
            .unwrap(),
            step_transitions: register_int_counter_vec_with_registry!(
                "bridge_relayer_step_transitions",
                "Total number of transitions into a step",
                &["direction", "step"],
                registry,
            )
            .unwrap(),
            retry_budget_resets: register_int_counter_vec_with_registry!(
                "bridge_relayer_retry_budget_resets",
                "Total number of flow resets caused by an exhausted retry budget",
                &["direction", "counter"],
                registry,
            )
            .unwrap(),
            proposals_submitted: register_int_counter_vec_with_registry!(
                "bridge_relayer_proposals_submitted",
                "Total number of proposals submitted by this relayer",
                &["direction", "action"],
                registry,
            )
            .unwrap(),
            actions_signed: register_int_counter_vec_with_registry!(
                "bridge_relayer_actions_signed",
                "Total number of actions signed by this relayer",
                &["direction", "action"],
                registry,
            )
            .unwrap(),
            actions_performed: register_int_counter_vec_with_registry!(
                "bridge_relayer_actions_performed",
                "Total number of actions executed by this relayer",
                &["direction", "action"],
                registry,
            )
            .unwrap(),
            batches_completed: register_int_counter_vec_with_registry!(
                "bridge_relayer_batches_completed",
                "Total number of batches whose statuses were finalized",
                &["direction"],
                registry,
            )
            .unwrap(),
            batches_rejected: register_int_counter_vec_with_registry!(
                "bridge_relayer_batches_rejected",
                "Total number of batches rejected by balance validation",
                &["direction"],
                registry,
            )
            .unwrap(),
            last_processed_batch_id: register_int_gauge_vec_with_registry!(
                "bridge_relayer_last_processed_batch_id",
                "Id of the latest batch picked up by each direction",
                &["direction"],
                registry,
            )
            .unwrap(),
            gossip_signatures_accepted: register_int_counter_with_registry!(
                "bridge_relayer_gossip_signatures_accepted",
                "Total number of gossiped signatures stored",
                registry,
            )
            .unwrap(),
            gossip_signatures_rejected: register_int_counter_vec_with_registry!(
                "bridge_relayer_gossip_signatures_rejected",
                "Total number of gossiped signatures dropped",
                &["reason"],
                registry,
            )
            .unwrap(),
            role_refreshes: register_int_counter_with_registry!(
                "bridge_relayer_role_refreshes",
                "Total number of successful whitelist refreshes",
                registry,
            )
            .unwrap(),
            role_refresh_errors: register_int_counter_with_registry!(
                "bridge_relayer_role_refresh_errors",
                "Total number of failed whitelist refreshes",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}
