// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Work executed once per tick of a polling loop.
#[async_trait]
pub trait PollingTask: Send {
    fn name(&self) -> String;

    async fn poll(&mut self, cancel: &CancellationToken);

    async fn on_stop(&mut self) {}
}

/// Runs `task` every `interval` until `cancel` fires. An in-flight poll is
/// dropped at its next suspension point when cancellation is requested.
pub fn spawn_polling_task<T>(
    mut task: T,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    T: PollingTask + 'static,
{
    tokio::spawn(async move {
        let name = task.name();
        info!(task = %name, ?interval, "Starting polling task");
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(task = %name, "Aborting in-flight poll");
                    break;
                }
                _ = task.poll(&cancel) => {}
            }
        }
        task.on_stop().await;
        info!(task = %name, "Polling task stopped");
    })
}
