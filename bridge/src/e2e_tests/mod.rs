// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! End to end tests running several relayers against in-memory chains and
//! an in-memory gossip network.


use crate::config::{RelayerSettings, StateMachineConfig};
use crate::crypto::CryptoProvider;
use crate::executor::{BridgeExecutor, BridgeExecutorArgs};
use crate::gossip::Broadcaster;
use crate::metrics::BridgeMetrics;
use crate::mock_chain_client::MockLedger;
use crate::role_provider::{CachedRoleProvider, RoleProvider, StaticRelayerRegistry};
use crate::signatures_holder::SignaturesHolder;
use crate::steps::{new_bridge_state_machine, BridgeStateMachine, BridgeStep};
use crate::test_utils::{
    destination_token, native_balance, source_token, InMemoryBroadcaster, InMemoryGossipNetwork,
};
use crate::topology::{ManualTimeSource, TimeBasedTopology};
use crate::types::{Direction, RelayerAddress};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) const WINDOW_SECS: u64 = 60;

pub(crate) fn state_machine_config(max_retries: u64) -> StateMachineConfig {
    StateMachineConfig {
        polling_interval_ms: 10,
        max_retries_on_was_proposed: max_retries,
        max_quorum_retries: max_retries,
        max_retries_on_was_executed: max_retries,
    }
}

/// Relayer whose state machines are ticked by the test instead of timers.
pub(crate) struct SteppedRelayer {
    pub crypto: Arc<CryptoProvider>,
    pub machines: Vec<BridgeStateMachine>,
}

impl SteppedRelayer {
    pub async fn tick(&mut self, cancel: &CancellationToken) {
        for machine in self.machines.iter_mut() {
            let _ = machine.execute_one_step(cancel).await;
        }
    }
}

pub(crate) struct TestEnv {
    pub source: Arc<MockLedger>,
    pub destination: Arc<MockLedger>,
    pub network: InMemoryGossipNetwork,
    pub time: Arc<ManualTimeSource>,
    pub keys: Vec<Arc<CryptoProvider>>,
    pub quorum: u64,
}

impl TestEnv {
    /// Two chains with a native destination token holding `liquidity`
    /// and `relayers` whitelisted relayers that already joined gossip.
    pub async fn new(relayers: usize, quorum: u64, liquidity: u64) -> Self {
        telemetry_subscribers::init_for_testing();
        let source = MockLedger::new(quorum);
        let destination = MockLedger::new(quorum);
        source.set_balance(source_token(), native_balance(0));
        destination.set_balance(destination_token(), native_balance(liquidity));
        let network = InMemoryGossipNetwork::new();
        let keys: Vec<_> = (0..relayers)
            .map(|_| Arc::new(CryptoProvider::generate()))
            .collect();
        for key in &keys {
            network
                .broadcaster(key.clone())
                .broadcast_join_topic()
                .await
                .unwrap();
        }
        Self {
            source,
            destination,
            network,
            time: Arc::new(ManualTimeSource::new(0)),
            keys,
            quorum,
        }
    }

    pub fn whitelist(&self) -> Vec<RelayerAddress> {
        self.keys.iter().map(|k| k.public_key().clone()).collect()
    }

    /// Moves the clock into a window led by `key`.
    pub fn make_leader(&self, key: &RelayerAddress) {
        let mut sorted = self.network_keys();
        sorted.sort();
        let position = sorted
            .iter()
            .position(|k| k == key)
            .expect("key joined the network") as u64;
        self.time.set(position * WINDOW_SECS * 1000);
    }

    pub fn network_keys(&self) -> Vec<RelayerAddress> {
        use crate::gossip::PublicKeysProvider;
        self.network
            .broadcaster(self.keys[0].clone())
            .sorted_public_keys()
    }

    pub fn settings(&self, index: usize, max_retries: u64) -> RelayerSettings {
        RelayerSettings {
            crypto: self.keys[index].clone(),
            quorum: self.quorum,
            whitelisted_relayers: self.whitelist(),
            source_to_destination: state_machine_config(max_retries),
            destination_to_source: state_machine_config(max_retries),
            window_length: Duration::from_secs(WINDOW_SECS),
            clock_offset_ms: 0,
            role_refresh_interval: Duration::from_millis(50),
        }
    }

    /// Builds both directions' state machines for relayer `index`.
    pub async fn stepped_relayer(&self, index: usize, max_retries: u64) -> SteppedRelayer {
        let crypto = self.keys[index].clone();
        let metrics = Arc::new(BridgeMetrics::new_for_testing());
        let broadcaster: Arc<InMemoryBroadcaster> = self.network.broadcaster(crypto.clone());
        let role_provider = Arc::new(CachedRoleProvider::new(
            Arc::new(StaticRelayerRegistry::new(self.whitelist())),
            metrics.clone(),
        ));
        role_provider.execute().await.unwrap();
        let signatures = Arc::new(SignaturesHolder::new(role_provider, metrics.clone()));
        broadcaster
            .add_signature_processor(signatures.clone())
            .unwrap();
        let topology = Arc::new(
            TimeBasedTopology::new(
                broadcaster.clone(),
                self.time.clone(),
                Duration::from_secs(WINDOW_SECS),
            )
            .unwrap(),
        );
        let source = self.source.client(crypto.public_key().clone());
        let destination = self.destination.client(crypto.public_key().clone());

        let mut machines = vec![];
        for (direction, from, to) in [
            (
                Direction::SourceToDestination,
                source.clone(),
                destination.clone(),
            ),
            (Direction::DestinationToSource, destination, source),
        ] {
            let executor = BridgeExecutor::new(BridgeExecutorArgs {
                direction,
                source: from,
                destination: to,
                topology: topology.clone(),
                crypto: crypto.clone(),
                broadcaster: broadcaster.clone(),
                signatures: signatures.clone(),
                config: state_machine_config(max_retries),
                quorum: self.quorum,
                relayer_count: self.keys.len() as u64,
                metrics: metrics.clone(),
            })
            .unwrap();
            machines.push(new_bridge_state_machine(executor, metrics.clone()).unwrap());
        }
        SteppedRelayer { crypto, machines }
    }
}

pub(crate) async fn run_rounds(relayers: &mut [SteppedRelayer], rounds: usize) {
    let cancel = CancellationToken::new();
    for _ in 0..rounds {
        for relayer in relayers.iter_mut() {
            relayer.tick(&cancel).await;
        }
    }
}

/// Ticks `machine` until it sits on `step`, giving up after `max_ticks`.
pub(crate) async fn advance_to(machine: &mut BridgeStateMachine, step: BridgeStep, max_ticks: usize) {
    let cancel = CancellationToken::new();
    for _ in 0..max_ticks {
        if machine.current_step() == step {
            return;
        }
        let _ = machine.execute_one_step(&cancel).await;
    }
    assert_eq!(machine.current_step(), step);
}
