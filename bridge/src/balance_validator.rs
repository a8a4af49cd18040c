// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_client::ChainClient;
use crate::error::BridgeResult;
use crate::types::{Batch, DecimalConversion, Direction, TokenId};
use num_bigint::BigUint;
use num_traits::Zero;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchValidation {
    Valid,
    Rejected(String),
}

/// `liquidity >= requested + inflight`
pub fn has_enough_liquidity(liquidity: &BigUint, requested: &BigUint, inflight: &BigUint) -> bool {
    *liquidity >= requested + inflight
}

/// Checks that the destination chain can honour every transfer of a batch
/// before it is proposed. Chain errors are returned as errors so the step
/// retries; anything that cannot be proven safe is a rejection.
pub struct BalanceValidator {
    direction: Direction,
    source: Arc<dyn ChainClient>,
    destination: Arc<dyn ChainClient>,
}

impl BalanceValidator {
    pub fn new(
        direction: Direction,
        source: Arc<dyn ChainClient>,
        destination: Arc<dyn ChainClient>,
    ) -> Self {
        Self {
            direction,
            source,
            destination,
        }
    }

    /// Requested and inflight amounts are converted with the conversion of
    /// their own source token, then summed per destination token, so several
    /// source tokens drawing on one destination token share its liquidity.
    pub async fn validate(&self, batch: &Batch) -> BridgeResult<BatchValidation> {
        let mut conversions: BTreeMap<TokenId, DecimalConversion> = BTreeMap::new();
        for transfer in &batch.transfers {
            if conversions.contains_key(&transfer.source_token) {
                continue;
            }
            let snapshot = self
                .source
                .get_balance_snapshot(&transfer.source_token)
                .await?;
            if snapshot.decimal_conversion.divisor.is_zero() {
                return Ok(self.reject(
                    batch,
                    format!(
                        "token {} has a zero decimal divisor",
                        transfer.source_token
                    ),
                ));
            }
            conversions.insert(transfer.source_token.clone(), snapshot.decimal_conversion);
        }

        // destination token -> (requested, inflight)
        let mut totals: BTreeMap<TokenId, (BigUint, BigUint)> = BTreeMap::new();
        let mut routes: BTreeSet<(TokenId, TokenId)> = BTreeSet::new();
        for transfer in &batch.transfers {
            let Some(conversion) = conversions.get(&transfer.source_token) else {
                continue;
            };
            let converted = conversion.convert(&transfer.amount)?;
            if let Some(provided) = &transfer.converted_amount {
                if *provided != converted {
                    return Ok(self.reject(
                        batch,
                        format!(
                            "transfer {} converted amount {} disagrees with computed {}",
                            transfer.deposit_nonce, provided, converted
                        ),
                    ));
                }
            }
            totals
                .entry(transfer.destination_token.clone())
                .or_insert_with(|| (BigUint::zero(), BigUint::zero()))
                .0 += converted;
            routes.insert((
                transfer.source_token.clone(),
                transfer.destination_token.clone(),
            ));
        }

        for (source_token, destination_token) in routes {
            let Some(conversion) = conversions.get(&source_token) else {
                continue;
            };
            let mut inflight = BigUint::zero();
            for amount in self.source.get_inflight_amounts(&source_token).await? {
                inflight += conversion.convert(&amount)?;
            }
            if let Some(entry) = totals.get_mut(&destination_token) {
                entry.1 += inflight;
            }
        }

        for (destination_token, (requested, inflight)) in totals {
            let destination_snapshot = self
                .destination
                .get_balance_snapshot(&destination_token)
                .await?;
            let liquidity = match destination_snapshot.available_liquidity() {
                Ok(liquidity) => liquidity,
                Err(reason) => {
                    return Ok(self.reject(batch, format!("token {destination_token}: {reason}")))
                }
            };
            debug!(
                direction = %self.direction,
                batch_id = batch.id,
                token = %destination_token,
                %liquidity,
                %requested,
                %inflight,
                "Checked token liquidity"
            );
            if !has_enough_liquidity(&liquidity, &requested, &inflight) {
                return Ok(self.reject(
                    batch,
                    format!(
                        "insufficient liquidity for {destination_token}: available {liquidity}, requested {requested}, inflight {inflight}"
                    ),
                ));
            }
        }
        Ok(BatchValidation::Valid)
    }

    fn reject(&self, batch: &Batch, reason: String) -> BatchValidation {
        warn!(
            direction = %self.direction,
            batch_id = batch.id,
            "Batch failed balance validation: {reason}"
        );
        BatchValidation::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_chain_client::MockLedger;
    use crate::test_utils::{
        batch_with_transfers, destination_token, mint_burn_balance, native_balance, source_token,
    };
    use crate::types::RelayerAddress;

    fn setup() -> (Arc<MockLedger>, Arc<MockLedger>, BalanceValidator) {
        let source = MockLedger::new(1);
        let destination = MockLedger::new(1);
        let validator = BalanceValidator::new(
            Direction::SourceToDestination,
            source.client(RelayerAddress::new(vec![1])),
            destination.client(RelayerAddress::new(vec![1])),
        );
        source.set_balance(source_token(), native_balance(0));
        (source, destination, validator)
    }

    #[test]
    fn test_inflight_consumes_liquidity() {
        let liquidity = BigUint::from(500u64);
        let inflight = BigUint::from(500u64);
        assert!(has_enough_liquidity(&liquidity, &BigUint::zero(), &inflight));
        assert!(!has_enough_liquidity(&liquidity, &BigUint::from(1u64), &inflight));
    }

    #[tokio::test]
    async fn test_valid_batch_with_native_liquidity() {
        let (_source, destination, validator) = setup();
        destination.set_balance(destination_token(), native_balance(2000));
        assert_eq!(
            validator.validate(&batch_with_transfers(1, 2)).await.unwrap(),
            BatchValidation::Valid
        );
    }

    #[tokio::test]
    async fn test_insufficient_liquidity_with_inflight() {
        let (source, destination, validator) = setup();
        destination.set_balance(destination_token(), mint_burn_balance(3000, 1000));
        source.set_inflight_amounts(source_token(), vec![BigUint::from(1u64)]);
        assert!(matches!(
            validator.validate(&batch_with_transfers(1, 2)).await.unwrap(),
            BatchValidation::Rejected(_)
        ));
        source.set_inflight_amounts(source_token(), vec![]);
        assert_eq!(
            validator.validate(&batch_with_transfers(1, 2)).await.unwrap(),
            BatchValidation::Valid
        );
    }

    #[tokio::test]
    async fn test_fails_closed() {
        let (source, destination, validator) = setup();
        let batch = batch_with_transfers(1, 1);

        // Destination token is neither native nor mint/burn.
        assert!(matches!(
            validator.validate(&batch).await.unwrap(),
            BatchValidation::Rejected(_)
        ));

        destination.set_balance(destination_token(), mint_burn_balance(10, 20));
        assert!(matches!(
            validator.validate(&batch).await.unwrap(),
            BatchValidation::Rejected(_)
        ));

        destination.set_balance(destination_token(), native_balance(1_000_000));
        let mut zero_divisor = native_balance(0);
        zero_divisor.decimal_conversion = DecimalConversion {
            multiplier: BigUint::from(1u8),
            divisor: BigUint::zero(),
        };
        source.set_balance(source_token(), zero_divisor);
        assert!(matches!(
            validator.validate(&batch).await.unwrap(),
            BatchValidation::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_decimal_conversion_is_applied() {
        let (source, destination, validator) = setup();
        let mut snapshot = native_balance(0);
        snapshot.decimal_conversion =
            DecimalConversion::new(BigUint::from(1u8), BigUint::from(10u8)).unwrap();
        source.set_balance(source_token(), snapshot);
        // Two transfers of 1000 convert to 200 destination units.
        destination.set_balance(destination_token(), native_balance(200));
        let mut batch = batch_with_transfers(1, 2);
        assert_eq!(
            validator.validate(&batch).await.unwrap(),
            BatchValidation::Valid
        );

        batch.transfers[0].converted_amount = Some(BigUint::from(101u64));
        assert!(matches!(
            validator.validate(&batch).await.unwrap(),
            BatchValidation::Rejected(_)
        ));

        destination.set_balance(destination_token(), native_balance(199));
        batch.transfers[0].converted_amount = Some(BigUint::from(100u64));
        assert!(matches!(
            validator.validate(&batch).await.unwrap(),
            BatchValidation::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_chain_errors_are_not_rejections() {
        let (_source, destination, validator) = setup();
        destination.set_balance(destination_token(), native_balance(2000));
        destination.fail_next("get_balance_snapshot", 1);
        assert!(validator.validate(&batch_with_transfers(1, 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_source_tokens_share_destination_liquidity() {
        let (source, destination, validator) = setup();
        let other_source = TokenId::new(b"SRC2-TOKEN".to_vec());
        source.set_balance(other_source.clone(), native_balance(0));
        destination.set_balance(destination_token(), native_balance(1500));
        let mut batch = batch_with_transfers(1, 2);
        batch.transfers[1].source_token = other_source.clone();

        // 1000 + 1000 against 1500, even though each fits on its own.
        assert!(matches!(
            validator.validate(&batch).await.unwrap(),
            BatchValidation::Rejected(_)
        ));

        destination.set_balance(destination_token(), native_balance(2500));
        assert_eq!(
            validator.validate(&batch).await.unwrap(),
            BatchValidation::Valid
        );
        // Inflight of the second source token is counted against the same pool.
        source.set_inflight_amounts(other_source, vec![BigUint::from(501u64)]);
        assert!(matches!(
            validator.validate(&batch).await.unwrap(),
            BatchValidation::Rejected(_)
        ));
    }
}
