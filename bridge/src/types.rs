// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{BridgeError, BridgeResult};
use num_bigint::BigUint;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use num_traits::{CheckedSub, Zero};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr};
use std::fmt;
use strum_macros::Display;

pub type BatchId = u64;

/// Hash of a submitted chain transaction, as reported by the chain client.
pub type TxHash = String;

/// On-chain action identifier: the first 8 bytes (big-endian) of the
/// Keccak-256 hash over the canonical action serialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a relayer. On chain it is the signing address, on the gossip
/// layer it is the relayer public key; both are opaque byte strings here.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelayerAddress(#[serde(with = "hex")] Vec<u8>);

impl RelayerAddress {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_hex(s: &str) -> BridgeResult<Self> {
        hex::decode(s.trim_start_matches("0x"))
            .map(Self)
            .map_err(|e| BridgeError::InvalidArgument(format!("invalid relayer address {s}: {e}")))
    }
}

impl From<&[u8]> for RelayerAddress {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for RelayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for RelayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Token identifier as known by one chain's bridge contract.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(#[serde(with = "hex")] pub Vec<u8>);

impl TokenId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u8)]
pub enum TransferStatus {
    #[default]
    Pending = 0,
    Executed = 1,
    Rejected = 2,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Transfer {
    pub deposit_nonce: u64,
    #[serde_as(as = "Hex")]
    pub from: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub to: Vec<u8>,
    pub source_token: TokenId,
    pub destination_token: TokenId,
    #[serde_as(as = "DisplayFromStr")]
    pub amount: BigUint,
    // Amount expressed in destination token decimals, when the source chain
    // already computed it.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_amount: Option<BigUint>,
    // Not part of the action identity.
    #[serde_as(as = "Option<Hex>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<Vec<u8>>,
    #[serde(default)]
    pub status: TransferStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Batch {
    pub id: BatchId,
    pub transfers: Vec<Transfer>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn statuses(&self, status: TransferStatus) -> Vec<TransferStatus> {
        vec![status; self.transfers.len()]
    }
}

/// Final status vector written back on the chain a batch originated from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusUpdate {
    pub batch_id: BatchId,
    pub statuses: Vec<TransferStatus>,
}

/// Content of an on-chain action. Identical content always yields the
/// same action id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionContent {
    Transfer(Batch),
    SetStatus(StatusUpdate),
}

impl ActionContent {
    pub fn batch_id(&self) -> BatchId {
        match self {
            ActionContent::Transfer(batch) => batch.id,
            ActionContent::SetStatus(update) => update.batch_id,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum Direction {
    SourceToDestination,
    DestinationToSource,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::SourceToDestination => "source_to_destination",
            Direction::DestinationToSource => "destination_to_source",
        }
    }
}

/// Scales an amount between token decimal precisions:
/// `converted = floor(amount * multiplier / divisor)`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DecimalConversion {
    #[serde_as(as = "DisplayFromStr")]
    pub multiplier: BigUint,
    #[serde_as(as = "DisplayFromStr")]
    pub divisor: BigUint,
}

impl DecimalConversion {
    pub fn new(multiplier: BigUint, divisor: BigUint) -> BridgeResult<Self> {
        if divisor.is_zero() {
            return Err(BridgeError::ZeroDecimalDivisor);
        }
        Ok(Self {
            multiplier,
            divisor,
        })
    }

    pub fn identity() -> Self {
        Self {
            multiplier: BigUint::from(1u8),
            divisor: BigUint::from(1u8),
        }
    }

    pub fn convert(&self, amount: &BigUint) -> BridgeResult<BigUint> {
        if self.divisor.is_zero() {
            return Err(BridgeError::ZeroDecimalDivisor);
        }
        Ok(amount * &self.multiplier / &self.divisor)
    }
}

impl Default for DecimalConversion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Bridge-held balance of one token on one chain. Always read fresh.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BalanceSnapshot {
    #[serde_as(as = "DisplayFromStr")]
    pub total_balance: BigUint,
    #[serde_as(as = "DisplayFromStr")]
    pub minted: BigUint,
    #[serde_as(as = "DisplayFromStr")]
    pub burned: BigUint,
    pub is_native: bool,
    pub is_mint_burn: bool,
    pub decimal_conversion: DecimalConversion,
}

impl BalanceSnapshot {
    /// Liquidity the bridge can still release for this token, or the reason
    /// it cannot be determined.
    pub fn available_liquidity(&self) -> Result<BigUint, String> {
        if self.is_mint_burn {
            return self.minted.checked_sub(&self.burned).ok_or_else(|| {
                format!(
                    "burned amount {} exceeds minted amount {}",
                    self.burned, self.minted
                )
            });
        }
        if self.is_native {
            return Ok(self.total_balance.clone());
        }
        Err("token is neither native nor mint/burn".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_conversion_floors() {
        let conversion =
            DecimalConversion::new(BigUint::from(1u8), BigUint::from(10_000_000_000u64)).unwrap();
        let amount = BigUint::from(1_500_000_000_000_000_000u64);
        assert_eq!(
            conversion.convert(&amount).unwrap(),
            BigUint::from(150_000_000u64)
        );

        let conversion =
            DecimalConversion::new(BigUint::from(1u8), BigUint::from(1_000_000_000_000u64))
                .unwrap();
        assert_eq!(
            conversion.convert(&BigUint::from(999u64)).unwrap(),
            BigUint::zero()
        );
    }

    #[test]
    fn test_decimal_conversion_rejects_zero_divisor() {
        assert_eq!(
            DecimalConversion::new(BigUint::from(1u8), BigUint::zero()).unwrap_err(),
            BridgeError::ZeroDecimalDivisor
        );
        let conversion = DecimalConversion {
            multiplier: BigUint::from(1u8),
            divisor: BigUint::zero(),
        };
        assert!(conversion.convert(&BigUint::from(1u8)).is_err());
    }

    #[test]
    fn test_available_liquidity() {
        let mut snapshot = BalanceSnapshot {
            total_balance: BigUint::from(100u64),
            minted: BigUint::from(50u64),
            burned: BigUint::from(20u64),
            is_native: true,
            is_mint_burn: false,
            decimal_conversion: DecimalConversion::identity(),
        };
        assert_eq!(snapshot.available_liquidity().unwrap(), BigUint::from(100u64));

        snapshot.is_mint_burn = true;
        assert_eq!(snapshot.available_liquidity().unwrap(), BigUint::from(30u64));

        snapshot.burned = BigUint::from(51u64);
        assert!(snapshot.available_liquidity().is_err());

        snapshot.is_mint_burn = false;
        snapshot.is_native = false;
        assert!(snapshot.available_liquidity().is_err());
    }

    #[test]
    fn test_transfer_json_shape() {
        let transfer = Transfer {
            deposit_nonce: 7,
            from: vec![0xab],
            to: vec![0xcd],
            source_token: TokenId::new(b"SRC".to_vec()),
            destination_token: TokenId::new(b"DST".to_vec()),
            amount: BigUint::from(1_000u64),
            converted_amount: None,
            extra_data: None,
            status: TransferStatus::Pending,
        };
        let json = serde_json::to_value(&transfer).unwrap();
        assert_eq!(json["from"], "ab");
        assert_eq!(json["amount"], "1000");
        assert_eq!(json["destination-token"], "445354");
        assert!(json.get("converted-amount").is_none());
        let decoded: Transfer = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, transfer);
    }

    #[test]
    fn test_transfer_status_repr() {
        assert_eq!(u8::from(TransferStatus::Executed), 1);
        assert_eq!(
            TransferStatus::try_from(2u8).unwrap(),
            TransferStatus::Rejected
        );
        assert!(TransferStatus::try_from(9u8).is_err());
    }
}
