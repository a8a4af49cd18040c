// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Leader rotation used to throttle duplicate submissions. Leadership is
//! recomputed from the clock on every call and carries no safety weight:
//! the chain enforces quorum and idempotency regardless of who submits.

use crate::error::{BridgeError, BridgeResult};
use crate::gossip::PublicKeysProvider;
use crate::types::RelayerAddress;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait TimeSource: Send + Sync {
    /// Milliseconds since the unix epoch.
    fn now_unix_millis(&self) -> u64;
}

/// Wall clock corrected by a fixed offset, e.g. the measured drift
/// against an NTP server.
#[derive(Clone, Debug, Default)]
pub struct SystemTimeSource {
    offset_ms: i64,
}

impl SystemTimeSource {
    pub fn new(offset_ms: i64) -> Self {
        Self { offset_ms }
    }
}

impl TimeSource for SystemTimeSource {
    fn now_unix_millis(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        now.saturating_add(self.offset_ms).max(0) as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now_ms: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_unix_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

pub trait TopologyProvider: Send + Sync {
    fn current_leader(&self) -> Option<RelayerAddress>;

    fn is_leader(&self, address: &RelayerAddress) -> bool {
        self.current_leader().as_ref() == Some(address)
    }
}

/// `sorted_keys[floor(unix_seconds / window_secs) mod len]`.
pub fn leader_for_time(
    sorted_keys: &[RelayerAddress],
    unix_seconds: u64,
    window_secs: u64,
) -> Option<RelayerAddress> {
    if sorted_keys.is_empty() || window_secs == 0 {
        return None;
    }
    let window_index = unix_seconds / window_secs;
    let position = (window_index % sorted_keys.len() as u64) as usize;
    sorted_keys.get(position).cloned()
}

pub struct TimeBasedTopology {
    public_keys: Arc<dyn PublicKeysProvider>,
    time_source: Arc<dyn TimeSource>,
    window_secs: u64,
}

impl TimeBasedTopology {
    pub fn new(
        public_keys: Arc<dyn PublicKeysProvider>,
        time_source: Arc<dyn TimeSource>,
        window_length: Duration,
    ) -> BridgeResult<Self> {
        let window_secs = window_length.as_secs();
        if window_secs == 0 || window_length.subsec_nanos() != 0 {
            return Err(BridgeError::InvalidArgument(format!(
                "topology window length must be a whole number of seconds, got {window_length:?}"
            )));
        }
        Ok(Self {
            public_keys,
            time_source,
            window_secs,
        })
    }
}

impl TopologyProvider for TimeBasedTopology {
    fn current_leader(&self) -> Option<RelayerAddress> {
        // All relayers must index the same ordering.
        let mut keys = self.public_keys.sorted_public_keys();
        keys.sort();
        let unix_seconds = self.time_source.now_unix_millis() / 1000;
        leader_for_time(&keys, unix_seconds, self.window_secs)
    }
}
