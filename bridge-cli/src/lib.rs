// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::*;
use std::path::PathBuf;

// Runs relayers against in-memory chains, so it is only built with the
// `simulate` feature.
#[cfg(any(test, feature = "simulate"))]
pub mod simulate;

#[cfg(any(test, feature = "simulate"))]
use simulate::SimulateArgs;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
pub struct Args {
    #[clap(subcommand)]
    pub command: BridgeCommand,
}

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
pub enum BridgeCommand {
    #[clap(name = "create-relayer-key")]
    CreateRelayerKey { path: PathBuf },
    // Read a relayer key from a file and print its public key
    #[clap(name = "examine-key")]
    ExamineKey { path: PathBuf },
    #[clap(name = "create-relayer-config-template")]
    CreateRelayerConfigTemplate { path: PathBuf },
    // Print the action id of the transfer action of a batch stored as JSON
    #[clap(name = "action-id")]
    ActionId { path: PathBuf },
    // Relay batches between two in-memory chains with in-process relayers
    #[cfg(any(test, feature = "simulate"))]
    #[clap(name = "simulate")]
    Simulate(SimulateArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate_command() {
        let args = Args::try_parse_from([
            "relay-bridge-cli",
            "simulate",
            "--relayers",
            "4",
            "--quorum",
            "3",
        ])
        .unwrap();
        match args.command {
            BridgeCommand::Simulate(args) => {
                assert_eq!(args.relayers, 4);
                assert_eq!(args.quorum, 3);
                assert_eq!(args.transfers_per_batch, 2);
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_parse_action_id_command() {
        let args = Args::try_parse_from(["relay-bridge-cli", "action-id", "batch.json"]).unwrap();
        assert!(matches!(
            args.command,
            BridgeCommand::ActionId { path } if path == PathBuf::from("batch.json")
        ));
    }
}
