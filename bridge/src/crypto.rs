// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{BridgeError, BridgeResult};
use crate::types::RelayerAddress;
use ed25519_consensus::{Signature, SigningKey, VerificationKey};
use rand::rngs::OsRng;
use std::path::Path;

pub const PUBLIC_KEY_LENGTH: usize = 32;
pub const SIGNATURE_LENGTH: usize = 64;

/// Ed25519 key of a relayer. Constructed once and handed to every component
/// that needs to sign or expose the relayer public key.
pub struct CryptoProvider {
    signing_key: SigningKey,
    public_key: RelayerAddress,
}

impl CryptoProvider {
    pub fn new(signing_key: SigningKey) -> Self {
        let public_key = RelayerAddress::new(signing_key.verification_key().to_bytes().to_vec());
        Self {
            signing_key,
            public_key,
        }
    }

    pub fn generate() -> Self {
        Self::new(SigningKey::new(OsRng))
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> BridgeResult<Self> {
        let secret: [u8; 32] = bytes.try_into().map_err(|_| {
            BridgeError::CryptoError(format!(
                "ed25519 secret key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::new(SigningKey::from(secret)))
    }

    pub fn public_key(&self) -> &RelayerAddress {
        &self.public_key
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> BridgeResult<()> {
        let public_key: [u8; PUBLIC_KEY_LENGTH] = public_key.try_into().map_err(|_| {
            BridgeError::InvalidSignature(format!("bad public key length {}", public_key.len()))
        })?;
        let signature: [u8; SIGNATURE_LENGTH] = signature.try_into().map_err(|_| {
            BridgeError::InvalidSignature(format!("bad signature length {}", signature.len()))
        })?;
        let verification_key = VerificationKey::try_from(public_key)
            .map_err(|e| BridgeError::InvalidSignature(e.to_string()))?;
        verification_key
            .verify(&Signature::from(signature), message)
            .map_err(|e| BridgeError::InvalidSignature(e.to_string()))
    }
}

impl std::fmt::Debug for CryptoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoProvider")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Reads a relayer key stored as hex encoded 32 byte ed25519 secret.
pub fn read_key(path: &Path) -> anyhow::Result<CryptoProvider> {
    if !path.exists() {
        anyhow::bail!("Key file not found at path: {:?}", path);
    }
    let contents = std::fs::read_to_string(path)?;
    let bytes = hex::decode(contents.trim())
        .map_err(|e| anyhow::anyhow!("Error decoding key file {:?}: {e}", path))?;
    Ok(CryptoProvider::from_secret_bytes(&bytes)?)
}

pub fn write_key(path: &Path, provider: &CryptoProvider) -> anyhow::Result<()> {
    std::fs::write(path, hex::encode(provider.secret_bytes()))
        .map_err(|err| anyhow::anyhow!("Failed to write encoded key to path {:?}: {err}", path))
}
