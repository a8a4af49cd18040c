// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::*;
use relay_bridge::utils::{
    examine_key, generate_relayer_config_and_write_to_file,
    generate_relayer_key_and_write_to_file, transfer_action_id_from_file,
};
use relay_bridge_cli::{Args, BridgeCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let (_guard, _filter_handle) = telemetry_subscribers::TelemetryConfig::new()
        .with_env()
        .init();
    let args = Args::parse();

    match args.command {
        BridgeCommand::CreateRelayerKey { path } => {
            generate_relayer_key_and_write_to_file(&path)?;
            println!("Relayer key generated at {}", path.display());
        }
        BridgeCommand::ExamineKey { path } => {
            examine_key(&path)?;
        }
        BridgeCommand::CreateRelayerConfigTemplate { path } => {
            generate_relayer_config_and_write_to_file(&path)?;
            println!("Relayer config template generated at {}", path.display());
        }
        BridgeCommand::ActionId { path } => {
            let (action_id, content_hash) = transfer_action_id_from_file(&path)?;
            println!("Action id: {}", action_id);
            println!("Content hash: 0x{}", hex::encode(content_hash));
        }
        #[cfg(feature = "simulate")]
        BridgeCommand::Simulate(simulate_args) => {
            let report = relay_bridge_cli::simulate::run_simulation(simulate_args).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.timed_out {
                anyhow::bail!("Simulation timed out before every batch was settled");
            }
        }
    }
    Ok(())
}

