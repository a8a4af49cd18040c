// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::anyhow;
use prometheus::Registry;
use relay_bridge::config::{RelayerSettings, StateMachineConfig};
use relay_bridge::crypto::CryptoProvider;
use relay_bridge::metrics::BridgeMetrics;
use relay_bridge::mock_chain_client::MockLedger;
use relay_bridge::relayer::{Relayer, RelayerArgs};
use relay_bridge::role_provider::StaticRelayerRegistry;
use relay_bridge::test_utils::{
    batch_with_transfers, destination_token, native_balance, source_token, InMemoryGossipNetwork,
};
use relay_bridge::types::{BatchId, RelayerAddress, TransferStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(clap::Args, Clone, Debug)]
#[clap(rename_all = "kebab-case")]
pub struct SimulateArgs {
    #[clap(long, default_value = "3")]
    pub relayers: usize,
    #[clap(long, default_value = "3")]
    pub quorum: u64,
    // Number of batches queued on the source chain
    #[clap(long, default_value = "1")]
    pub batches: u64,
    #[clap(long, default_value = "2")]
    pub transfers_per_batch: u64,
    // Native liquidity of the destination token
    #[clap(long, default_value = "1000000")]
    pub liquidity: u64,
    #[clap(long, default_value = "100")]
    pub polling_interval_ms: u64,
    #[clap(long, default_value = "30")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BatchOutcome {
    pub batch_id: BatchId,
    pub statuses: Option<Vec<TransferStatus>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationReport {
    pub relayers: usize,
    pub quorum: u64,
    pub batches: Vec<BatchOutcome>,
    pub destination_executions: usize,
    pub duplicate_proposals: u64,
    pub timed_out: bool,
}

fn simulation_settings(
    crypto: Arc<CryptoProvider>,
    whitelist: Vec<RelayerAddress>,
    args: &SimulateArgs,
) -> RelayerSettings {
    let state_machine = StateMachineConfig {
        polling_interval_ms: args.polling_interval_ms,
        ..StateMachineConfig::default()
    };
    RelayerSettings {
        crypto,
        quorum: args.quorum,
        whitelisted_relayers: whitelist,
        source_to_destination: state_machine.clone(),
        destination_to_source: state_machine,
        window_length: Duration::from_secs(5),
        clock_offset_ms: 0,
        role_refresh_interval: Duration::from_secs(10),
    }
}

/// Runs `args.relayers` relayers until every queued batch has been settled
/// on the source chain or the timeout expires.
pub async fn run_simulation(args: SimulateArgs) -> anyhow::Result<SimulationReport> {
    if args.relayers == 0 {
        return Err(anyhow!("at least one relayer is required"));
    }
    let source = MockLedger::new(args.quorum);
    let destination = MockLedger::new(args.quorum);
    source.set_balance(source_token(), native_balance(0));
    destination.set_balance(destination_token(), native_balance(args.liquidity));
    for id in 1..=args.batches {
        source.add_pending_batch(batch_with_transfers(id, args.transfers_per_batch));
    }

    let keys: Vec<_> = (0..args.relayers)
        .map(|_| Arc::new(CryptoProvider::generate()))
        .collect();
    let whitelist: Vec<_> = keys.iter().map(|k| k.public_key().clone()).collect();
    let network = InMemoryGossipNetwork::new();
    let registry = Registry::new();
    let metrics = Arc::new(BridgeMetrics::new(&registry));

    let mut relayers = vec![];
    for key in &keys {
        let settings = simulation_settings(key.clone(), whitelist.clone(), &args);
        let relayer = Relayer::new(RelayerArgs {
            settings,
            source_chain: source.client(key.public_key().clone()),
            destination_chain: destination.client(key.public_key().clone()),
            broadcaster: network.broadcaster(key.clone()),
            relayer_registry: Arc::new(StaticRelayerRegistry::new(whitelist.clone())),
            time_source: None,
            metrics: metrics.clone(),
        })?;
        relayers.push(relayer);
    }
    for relayer in relayers.iter_mut() {
        relayer.start().await?;
        info!(
            relayer = %relayer.source_relayer_address(),
            "Simulated relayer started"
        );
    }

    let wait = async {
        while source.pending_batch_count() > 0 {
            tokio::time::sleep(Duration::from_millis(args.polling_interval_ms)).await;
        }
    };
    let timed_out = tokio::time::timeout(Duration::from_secs(args.timeout_secs), wait)
        .await
        .is_err();

    for relayer in relayers.iter_mut() {
        relayer.close().await?;
    }

    Ok(SimulationReport {
        relayers: args.relayers,
        quorum: args.quorum,
        batches: (1..=args.batches)
            .map(|batch_id| BatchOutcome {
                batch_id,
                statuses: source.finalized_statuses(batch_id),
            })
            .collect(),
        destination_executions: destination.executed_contents().len(),
        duplicate_proposals: source.rejected_duplicate_proposals()
            + destination.rejected_duplicate_proposals(),
        timed_out,
    })
}
