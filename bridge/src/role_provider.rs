// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::BridgeResult;
use crate::metrics::BridgeMetrics;
use crate::types::RelayerAddress;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tap::TapFallible;
use tracing::{debug, info, warn};

/// Answers whether an address belongs to the relayer whitelist.
#[async_trait]
pub trait RoleProvider: Send + Sync {
    fn is_whitelisted(&self, address: &RelayerAddress) -> bool;

    /// Refreshes the whitelist from its source of truth.
    async fn execute(&self) -> BridgeResult<()>;
}

/// Authoritative list of whitelisted relayers, usually read from a chain.
#[async_trait]
pub trait RelayerRegistry: Send + Sync {
    async fn get_all_relayers(&self) -> BridgeResult<Vec<RelayerAddress>>;
}

/// Registry backed by a fixed list, used when the relayer set comes from
/// configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticRelayerRegistry {
    relayers: Vec<RelayerAddress>,
}

impl StaticRelayerRegistry {
    pub fn new(relayers: Vec<RelayerAddress>) -> Self {
        Self { relayers }
    }
}

#[async_trait]
impl RelayerRegistry for StaticRelayerRegistry {
    async fn get_all_relayers(&self) -> BridgeResult<Vec<RelayerAddress>> {
        Ok(self.relayers.clone())
    }
}

/// Keeps the last whitelist fetched from a `RelayerRegistry`. Lookups never
/// block on the refresh.
pub struct CachedRoleProvider {
    registry: Arc<dyn RelayerRegistry>,
    whitelist: ArcSwap<BTreeSet<RelayerAddress>>,
    metrics: Arc<BridgeMetrics>,
}

impl CachedRoleProvider {
    pub fn new(registry: Arc<dyn RelayerRegistry>, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            registry,
            whitelist: ArcSwap::from_pointee(BTreeSet::new()),
            metrics,
        }
    }

    pub fn whitelisted_relayers(&self) -> Vec<RelayerAddress> {
        self.whitelist.load().iter().cloned().collect()
    }
}

#[async_trait]
impl RoleProvider for CachedRoleProvider {
    fn is_whitelisted(&self, address: &RelayerAddress) -> bool {
        self.whitelist.load().contains(address)
    }

    async fn execute(&self) -> BridgeResult<()> {
        let relayers = self
            .registry
            .get_all_relayers()
            .await
            .tap_err(|e| {
                warn!("Failed to refresh relayer whitelist: {:?}", e);
                self.metrics.role_refresh_errors.inc();
            })?;
        let new_set: BTreeSet<RelayerAddress> = relayers.into_iter().collect();
        if **self.whitelist.load() != new_set {
            info!(relayers = new_set.len(), "Relayer whitelist updated");
        } else {
            debug!("Relayer whitelist unchanged");
        }
        self.whitelist.store(Arc::new(new_set));
        self.metrics.role_refreshes.inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use std::sync::Mutex;

    struct FlakyRegistry {
        responses: Mutex<Vec<BridgeResult<Vec<RelayerAddress>>>>,
    }

    #[async_trait]
    impl RelayerRegistry for FlakyRegistry {
        async fn get_all_relayers(&self) -> BridgeResult<Vec<RelayerAddress>> {
            self.responses.lock().unwrap().remove(0)
        }
    }

    #[tokio::test]
    async fn test_cached_role_provider_refresh() {
        let a = RelayerAddress::new(vec![1]);
        let b = RelayerAddress::new(vec![2]);
        let registry = Arc::new(FlakyRegistry {
            responses: Mutex::new(vec![
                Ok(vec![a.clone()]),
                Err(BridgeError::TransientProviderError("rpc down".into())),
                Ok(vec![b.clone()]),
            ]),
        });
        let provider = CachedRoleProvider::new(registry, Arc::new(BridgeMetrics::new_for_testing()));
        assert!(!provider.is_whitelisted(&a));

        provider.execute().await.unwrap();
        assert!(provider.is_whitelisted(&a));

        // A failed refresh keeps serving the last known whitelist.
        assert!(provider.execute().await.is_err());
        assert!(provider.is_whitelisted(&a));

        provider.execute().await.unwrap();
        assert!(!provider.is_whitelisted(&a));
        assert_eq!(provider.whitelisted_relayers(), vec![b]);
    }
}
