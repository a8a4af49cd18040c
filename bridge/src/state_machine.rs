// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Generic engine driving a set of named steps. Each tick executes the
//! current step once; the step returns the id of the next step. A failed
//! step is logged and retried on the next tick.

use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::polling::PollingTask;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub trait StepIdentifier: Copy + Ord + Debug + Display + Send + Sync + 'static {
    /// Numeric form reported to metrics.
    fn ordinal(&self) -> i64;
}

#[async_trait]
pub trait Step<C, I>: Send + Sync
where
    C: Send,
    I: StepIdentifier,
{
    fn identifier(&self) -> I;

    async fn execute(&self, context: &mut C, cancel: &CancellationToken) -> BridgeResult<I>;
}

pub struct StateMachine<C, I>
where
    C: Send,
    I: StepIdentifier,
{
    name: String,
    steps: BTreeMap<I, Box<dyn Step<C, I>>>,
    current_step: I,
    context: C,
    metrics: Arc<BridgeMetrics>,
}

impl<C, I> StateMachine<C, I>
where
    C: Send,
    I: StepIdentifier,
{
    pub fn new(
        name: &str,
        steps: Vec<Box<dyn Step<C, I>>>,
        start_step: I,
        context: C,
        metrics: Arc<BridgeMetrics>,
    ) -> BridgeResult<Self> {
        if steps.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "state machine needs at least one step".to_string(),
            ));
        }
        let mut registered = BTreeMap::new();
        for step in steps {
            let id = step.identifier();
            if registered.insert(id, step).is_some() {
                return Err(BridgeError::DuplicateStep(id.to_string()));
            }
        }
        if !registered.contains_key(&start_step) {
            return Err(BridgeError::StepNotFound(start_step.to_string()));
        }
        metrics
            .current_step
            .with_label_values(&[name])
            .set(start_step.ordinal());
        Ok(Self {
            name: name.to_string(),
            steps: registered,
            current_step: start_step,
            context,
            metrics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_step(&self) -> I {
        self.current_step
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// Runs the current step once and moves to the step it returns. On error
    /// the machine stays where it was.
    pub async fn execute_one_step(&mut self, cancel: &CancellationToken) -> BridgeResult<I> {
        let step = self
            .steps
            .get(&self.current_step)
            .ok_or_else(|| BridgeError::StepNotFound(self.current_step.to_string()))?;
        match step.execute(&mut self.context, cancel).await {
            Ok(next) => {
                if !self.steps.contains_key(&next) {
                    warn!(
                        machine = %self.name,
                        step = %self.current_step,
                        "Step returned unknown next step {next}"
                    );
                    return Err(BridgeError::StepNotFound(next.to_string()));
                }
                if next != self.current_step {
                    debug!(
                        machine = %self.name,
                        from = %self.current_step,
                        to = %next,
                        "Step transition"
                    );
                    self.metrics
                        .step_transitions
                        .with_label_values(&[&self.name, &next.to_string()])
                        .inc();
                    self.metrics
                        .current_step
                        .with_label_values(&[&self.name])
                        .set(next.ordinal());
                }
                self.current_step = next;
                Ok(next)
            }
            Err(e) => {
                warn!(
                    machine = %self.name,
                    step = %self.current_step,
                    "Step failed, retrying next tick: {:?}", e
                );
                self.metrics
                    .step_errors
                    .with_label_values(&[&self.name, &self.current_step.to_string()])
                    .inc();
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<C, I> PollingTask for StateMachine<C, I>
where
    C: Send + Sync,
    I: StepIdentifier,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn poll(&mut self, cancel: &CancellationToken) {
        let _ = self.execute_one_step(cancel).await;
    }

    async fn on_stop(&mut self) {
        info!(machine = %self.name, step = %self.current_step, "State machine stopped");
    }
}
