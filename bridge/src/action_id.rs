// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Canonical serialization of bridge actions and the identifiers derived from it.
//!
//! A transfer action serializes as
//! `proposeTransferBatch@hex(batchId)` followed, per transfer, by
//! `@hex(0)@hex(depositNonce)@hex(from)@hex(to)@hex(tokenId)@hex(amount)`,
//! where `tokenId` is the destination token. Integers are encoded as minimal
//! big-endian bytes with zero encoded as `00`. A status action serializes as
//! `proposeStatus@hex(batchId)` followed by one `@hex(status)` per transfer.

use crate::types::{ActionContent, ActionId, Batch, BatchId, StatusUpdate, TransferStatus};
use num_bigint::BigUint;
use sha3::{Digest, Keccak256};

pub const PROPOSE_TRANSFER_FUNCTION: &str = "proposeTransferBatch";
pub const PROPOSE_STATUS_FUNCTION: &str = "proposeStatus";

pub type ContentHash = [u8; 32];

/// Accumulates typed arguments of an action call and serializes them once.
#[derive(Clone, Debug, Default)]
pub struct ActionDataBuilder {
    function: String,
    args: Vec<String>,
}

impl ActionDataBuilder {
    pub fn new(function: &str) -> Self {
        Self {
            function: function.to_string(),
            args: vec![],
        }
    }

    pub fn arg_u64(mut self, value: u64) -> Self {
        self.args.push(hex::encode(minimal_be_bytes(value)));
        self
    }

    pub fn arg_u8(self, value: u8) -> Self {
        self.arg_u64(value as u64)
    }

    pub fn arg_big_uint(mut self, value: &BigUint) -> Self {
        // BigUint zero serializes to a single 0x00 byte.
        self.args.push(hex::encode(value.to_bytes_be()));
        self
    }

    pub fn arg_bytes(mut self, value: &[u8]) -> Self {
        self.args.push(hex::encode(value));
        self
    }

    pub fn build(&self) -> String {
        let mut data = self.function.clone();
        for arg in &self.args {
            data.push('@');
            data.push_str(arg);
        }
        data
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.build().into_bytes()
    }
}

fn minimal_be_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

pub fn transfer_action_data(batch: &Batch) -> ActionDataBuilder {
    let mut builder = ActionDataBuilder::new(PROPOSE_TRANSFER_FUNCTION).arg_u64(batch.id);
    for transfer in &batch.transfers {
        builder = builder
            .arg_u64(0)
            .arg_u64(transfer.deposit_nonce)
            .arg_bytes(&transfer.from)
            .arg_bytes(&transfer.to)
            .arg_bytes(&transfer.destination_token.0)
            .arg_big_uint(&transfer.amount);
    }
    builder
}

pub fn status_action_data(batch_id: BatchId, statuses: &[TransferStatus]) -> ActionDataBuilder {
    statuses.iter().fold(
        ActionDataBuilder::new(PROPOSE_STATUS_FUNCTION).arg_u64(batch_id),
        |builder, status| builder.arg_u8((*status).into()),
    )
}

pub fn action_data(content: &ActionContent) -> ActionDataBuilder {
    match content {
        ActionContent::Transfer(batch) => transfer_action_data(batch),
        ActionContent::SetStatus(StatusUpdate { batch_id, statuses }) => {
            status_action_data(*batch_id, statuses)
        }
    }
}

pub fn keccak256(data: &[u8]) -> ContentHash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash of the canonical serialization; this is what relayers sign and gossip.
pub fn content_hash(content: &ActionContent) -> ContentHash {
    keccak256(&action_data(content).to_bytes())
}

pub fn derive_action_id(content: &ActionContent) -> ActionId {
    action_id_from_hash(&content_hash(content))
}

pub fn action_id_from_hash(hash: &ContentHash) -> ActionId {
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash[..8]);
    ActionId(u64::from_be_bytes(prefix))
}
