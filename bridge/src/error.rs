// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::types::{ActionId, BatchId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    // Invalid constructor argument or configuration value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid quorum {quorum} for {relayers} relayers")]
    InvalidQuorum { quorum: u64, relayers: u64 },
    #[error("decimal conversion divisor must not be zero")]
    ZeroDecimalDivisor,
    #[error("step {0} is not registered in the state machine")]
    StepNotFound(String),
    #[error("duplicate step {0} registered in the state machine")]
    DuplicateStep(String),
    // Operation needs a batch but the flow has none stored
    #[error("no batch stored for the current flow")]
    NoBatchInFlow,
    #[error("status update is not resolved for the current flow")]
    StatusUpdateNotResolved,
    #[error("action id is not resolved for the current flow")]
    ActionIdNotResolved,
    #[error("action id mismatch: local {local}, chain {chain}")]
    ActionIdMismatch { local: ActionId, chain: ActionId },
    #[error("action {0} was already proposed")]
    ActionAlreadyProposed(ActionId),
    #[error("action {0} was not proposed")]
    ActionNotProposed(ActionId),
    #[error("action {0} was already executed")]
    ActionAlreadyExecuted(ActionId),
    #[error("quorum not reached for action {action_id}: {signers}/{quorum}")]
    QuorumNotReached {
        action_id: ActionId,
        signers: u64,
        quorum: u64,
    },
    #[error("relayer {0} is not whitelisted")]
    NotWhitelisted(String),
    #[error("statuses for batch {0} are not available")]
    StatusesNotAvailable(BatchId),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("crypto error: {0}")]
    CryptoError(String),
    // Transient error reported by a chain client or transport
    #[error("transient provider error: {0}")]
    TransientProviderError(String),
    #[error("serialization error: {0}")]
    BridgeSerializationError(String),
    #[error("relayer already started")]
    AlreadyStarted,
    #[error("operation cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("{0}")]
    Generic(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Generic(e.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::BridgeSerializationError(e.to_string())
    }
}
