// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_client::ChainClient;
use crate::config::RelayerSettings;
use crate::error::{BridgeError, BridgeResult};
use crate::executor::{BridgeExecutor, BridgeExecutorArgs};
use crate::gossip::{Broadcaster, PublicKeysProvider};
use crate::metrics::BridgeMetrics;
use crate::polling::{spawn_polling_task, PollingTask};
use crate::retry_with_max_elapsed_time;
use crate::role_provider::{CachedRoleProvider, RelayerRegistry, RoleProvider};
use crate::signatures_holder::SignaturesHolder;
use crate::steps::{new_bridge_state_machine, BridgeStateMachine};
use crate::topology::{SystemTimeSource, TimeBasedTopology, TimeSource, TopologyProvider};
use crate::types::{Direction, RelayerAddress};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const BOOTSTRAP_MAX_ELAPSED_TIME: Duration = Duration::from_secs(60);

pub struct RelayerArgs {
    pub settings: RelayerSettings,
    pub source_chain: Arc<dyn ChainClient>,
    pub destination_chain: Arc<dyn ChainClient>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub relayer_registry: Arc<dyn RelayerRegistry>,
    // Clock used for leader rotation. Defaults to the system clock
    // corrected by the configured offset.
    pub time_source: Option<Arc<dyn TimeSource>>,
    pub metrics: Arc<BridgeMetrics>,
}

/// Periodically refreshes the relayer whitelist.
struct RoleRefresher {
    role_provider: Arc<dyn RoleProvider>,
}

#[async_trait]
impl PollingTask for RoleRefresher {
    fn name(&self) -> String {
        "role_provider".to_string()
    }

    async fn poll(&mut self, _cancel: &CancellationToken) {
        // Failures are logged and counted by the provider.
        let _ = self.role_provider.execute().await;
    }
}

/// One relayer: two state machines (one per direction) plus the role
/// refresh loop, sharing chain clients, gossip and collected signatures.
pub struct Relayer {
    source_chain: Arc<dyn ChainClient>,
    destination_chain: Arc<dyn ChainClient>,
    broadcaster: Arc<dyn Broadcaster>,
    role_provider: Arc<CachedRoleProvider>,
    signatures: Arc<SignaturesHolder>,
    topology: Arc<TimeBasedTopology>,
    state_machines: Vec<(BridgeStateMachine, Duration)>,
    role_refresh_interval: Duration,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    started: bool,
}

impl Relayer {
    pub fn new(args: RelayerArgs) -> BridgeResult<Self> {
        let RelayerArgs {
            settings,
            source_chain,
            destination_chain,
            broadcaster,
            relayer_registry,
            time_source,
            metrics,
        } = args;
        if settings.role_refresh_interval.is_zero() {
            return Err(BridgeError::InvalidArgument(
                "role refresh interval must be positive".to_string(),
            ));
        }
        let relayer_count = settings.whitelisted_relayers.len() as u64;

        let role_provider = Arc::new(CachedRoleProvider::new(relayer_registry, metrics.clone()));
        let signatures = Arc::new(SignaturesHolder::new(
            role_provider.clone(),
            metrics.clone(),
        ));
        broadcaster.add_signature_processor(signatures.clone())?;

        let public_keys: Arc<dyn PublicKeysProvider> = Arc::new(BroadcasterKeys(broadcaster.clone()));
        let time_source: Arc<dyn TimeSource> = match time_source {
            Some(time_source) => time_source,
            None => Arc::new(SystemTimeSource::new(settings.clock_offset_ms)),
        };
        let topology = Arc::new(TimeBasedTopology::new(
            public_keys,
            time_source,
            settings.window_length,
        )?);

        let mut state_machines = vec![];
        for (direction, source, destination, config) in [
            (
                Direction::SourceToDestination,
                source_chain.clone(),
                destination_chain.clone(),
                settings.source_to_destination.clone(),
            ),
            (
                Direction::DestinationToSource,
                destination_chain.clone(),
                source_chain.clone(),
                settings.destination_to_source.clone(),
            ),
        ] {
            if config.polling_interval_ms == 0 {
                return Err(BridgeError::InvalidArgument(format!(
                    "{direction}: polling interval must be positive"
                )));
            }
            let polling_interval = config.polling_interval();
            let executor = BridgeExecutor::new(BridgeExecutorArgs {
                direction,
                source,
                destination,
                topology: topology.clone(),
                crypto: settings.crypto.clone(),
                broadcaster: broadcaster.clone(),
                signatures: signatures.clone(),
                config,
                quorum: settings.quorum,
                relayer_count,
                metrics: metrics.clone(),
            })?;
            state_machines.push((
                new_bridge_state_machine(executor, metrics.clone())?,
                polling_interval,
            ));
        }

        Ok(Self {
            source_chain,
            destination_chain,
            broadcaster,
            role_provider,
            signatures,
            topology,
            state_machines,
            role_refresh_interval: settings.role_refresh_interval,
            cancel: CancellationToken::new(),
            handles: vec![],
            started: false,
        })
    }

    /// Address this relayer signs with on the source chain.
    pub fn source_relayer_address(&self) -> RelayerAddress {
        self.source_chain.relayer_address()
    }

    /// Address this relayer signs with on the destination chain.
    pub fn destination_relayer_address(&self) -> RelayerAddress {
        self.destination_chain.relayer_address()
    }

    pub fn signatures(&self) -> &Arc<SignaturesHolder> {
        &self.signatures
    }

    pub fn current_leader(&self) -> Option<RelayerAddress> {
        self.topology.current_leader()
    }

    /// Joins the gossip topic, loads the whitelist and starts the polling
    /// loops. Nothing is spawned if any bootstrap call fails.
    pub async fn start(&mut self) -> BridgeResult<()> {
        if self.started {
            return Err(BridgeError::AlreadyStarted);
        }
        let broadcaster = self.broadcaster.clone();
        let Ok(Ok(())) = retry_with_max_elapsed_time!(
            broadcaster.register_on_topics(),
            BOOTSTRAP_MAX_ELAPSED_TIME
        ) else {
            return Err(BridgeError::TransientProviderError(
                "failed to register on gossip topics".to_string(),
            ));
        };
        let Ok(Ok(())) = retry_with_max_elapsed_time!(
            broadcaster.broadcast_join_topic(),
            BOOTSTRAP_MAX_ELAPSED_TIME
        ) else {
            return Err(BridgeError::TransientProviderError(
                "failed to join gossip topic".to_string(),
            ));
        };
        let role_provider = self.role_provider.clone();
        let Ok(Ok(())) = retry_with_max_elapsed_time!(
            role_provider.execute(),
            BOOTSTRAP_MAX_ELAPSED_TIME
        ) else {
            return Err(BridgeError::TransientProviderError(
                "failed to load relayer whitelist".to_string(),
            ));
        };

        self.started = true;
        for (state_machine, interval) in self.state_machines.drain(..) {
            info!(machine = state_machine.name(), "Starting state machine");
            self.handles
                .push(spawn_polling_task(state_machine, interval, self.cancel.clone()));
        }
        self.handles.push(spawn_polling_task(
            RoleRefresher {
                role_provider: self.role_provider.clone(),
            },
            self.role_refresh_interval,
            self.cancel.clone(),
        ));
        info!("Relayer started");
        Ok(())
    }

    /// Stops every loop and closes chain clients and gossip. All resources
    /// are closed even if one fails; the first error is returned.
    pub async fn close(&mut self) -> BridgeResult<()> {
        self.cancel.cancel();
        let mut first_error = None;
        for result in join_all(self.handles.drain(..)).await {
            if let Err(e) = result {
                error!("Relayer task did not stop cleanly: {:?}", e);
                first_error.get_or_insert(BridgeError::InternalError(e.to_string()));
            }
        }
        for (name, result) in [
            ("source chain client", self.source_chain.close().await),
            ("destination chain client", self.destination_chain.close().await),
            ("broadcaster", self.broadcaster.close().await),
        ] {
            if let Err(e) = result {
                warn!("Failed to close {name}: {:?}", e);
                first_error.get_or_insert(e);
            }
        }
        info!("Relayer closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Exposes the broadcaster's peer keys to the topology.
struct BroadcasterKeys(Arc<dyn Broadcaster>);

impl PublicKeysProvider for BroadcasterKeys {
    fn sorted_public_keys(&self) -> Vec<RelayerAddress> {
        self.0.sorted_public_keys()
    }
}
