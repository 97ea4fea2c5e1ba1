use std::cmp::Reverse;

use tracing::debug;

use super::{
    insufficient_balance, min_change_lovelace, requested_total, Selection, UtxoSelector,
};
use crate::builder::TxBuilderError;
use crate::params::ProtocolParameters;
use crate::primitives::{AssetName, Output, PolicyId, Utxo, Value};

/// Deterministic selector: keeps drawing the largest candidate until the
/// request is covered.
///
/// Lovelace shortfalls draw by descending coin; an uncovered asset dimension
/// switches the ordering to descending holdings of that asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestFirst;

impl UtxoSelector for LargestFirst {
    fn select(
        &self,
        pool: Vec<Utxo>,
        requested: &[Output],
        pparams: &ProtocolParameters,
        limit: Option<usize>,
        include_max_fee: bool,
        respect_min_utxo: bool,
    ) -> Result<Selection, TxBuilderError> {
        let requested = requested_total(requested, pparams, include_max_fee);
        let mut remaining = pool;
        let mut chosen: Vec<Utxo> = vec![];
        let mut selected = Value::default();

        while !requested.less_or_equal(&selected) {
            if remaining.is_empty() || limit.is_some_and(|max| chosen.len() >= max) {
                return Err(insufficient_balance(&requested, &selected));
            }

            match unmet_asset(&requested, &selected) {
                None => {
                    remaining.sort_unstable_by_key(|utxo| Reverse(utxo.output.value.coin()));
                }
                Some((policy, name)) => {
                    remaining.sort_unstable_by_key(|utxo| {
                        Reverse(utxo.output.value.assets().get(&policy, &name))
                    });
                    if remaining[0].output.value.assets().get(&policy, &name) <= 0 {
                        // nothing in the pool carries the missing asset
                        return Err(insufficient_balance(&requested, &selected));
                    }
                }
            }

            let utxo = remaining.remove(0);
            selected = selected + utxo.output.value.clone();
            chosen.push(utxo);
        }

        if respect_min_utxo {
            loop {
                let leftover = selected.clone() - requested.clone();
                let min_coin = min_change_lovelace(&leftover, pparams);
                if leftover.coin() >= min_coin {
                    break;
                }
                if remaining.is_empty() || limit.is_some_and(|max| chosen.len() >= max) {
                    return Err(TxBuilderError::ChangeTooSmall {
                        coin: leftover.coin(),
                        min_coin,
                    });
                }

                remaining.sort_unstable_by_key(|utxo| Reverse(utxo.output.value.coin()));
                let utxo = remaining.remove(0);
                selected = selected + utxo.output.value.clone();
                chosen.push(utxo);
            }
        }

        debug!(inputs = chosen.len(), "largest-first selection complete");
        Ok(Selection {
            leftover: (selected - requested).remove_zero_assets(),
            chosen,
        })
    }
}

/// First asset dimension of the request the selection does not yet cover.
fn unmet_asset(requested: &Value, selected: &Value) -> Option<(PolicyId, AssetName)> {
    for (policy, assets) in requested.assets().iter() {
        for (name, amount) in assets {
            if selected.assets().get(policy, name) < *amount {
                return Some((*policy, name.clone()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use pallas::crypto::hash::Hash;

    use super::*;
    use crate::primitives::{Input, MultiAsset};
    use crate::selection::sizing_address;

    fn lovelace_utxo(index: u64, coin: i64) -> Utxo {
        Utxo::new(
            Input::new(Hash::from([index as u8; 32]), index),
            Output::lovelace_only(sizing_address(), coin),
        )
    }

    fn asset_utxo(index: u64, coin: i64, policy: u8, amount: i64) -> Utxo {
        Utxo::new(
            Input::new(Hash::from([index as u8; 32]), index),
            Output::lovelace_only(sizing_address(), coin).add_asset(
                Hash::from([policy; 28]),
                b"token".to_vec(),
                amount,
            ),
        )
    }

    fn request(coin: i64) -> Vec<Output> {
        vec![Output::lovelace_only(sizing_address(), coin)]
    }

    #[test]
    fn draws_largest_utxos_first() {
        let pool = vec![
            lovelace_utxo(1, 1_000_000),
            lovelace_utxo(2, 9_000_000),
            lovelace_utxo(3, 3_000_000),
        ];

        let selection = LargestFirst
            .select(
                pool,
                &request(8_000_000),
                &ProtocolParameters::for_tests(),
                None,
                false,
                false,
            )
            .expect("selection succeeds");

        assert_eq!(selection.chosen.len(), 1);
        assert_eq!(selection.chosen[0].input.index, 2);
        assert_eq!(selection.leftover.coin(), 1_000_000);
    }

    #[test]
    fn is_deterministic() {
        let pool = vec![
            lovelace_utxo(1, 2_000_000),
            lovelace_utxo(2, 2_500_000),
            lovelace_utxo(3, 4_000_000),
        ];

        let run = |pool: Vec<Utxo>| {
            LargestFirst
                .select(
                    pool,
                    &request(5_000_000),
                    &ProtocolParameters::for_tests(),
                    None,
                    false,
                    false,
                )
                .expect("selection succeeds")
        };

        assert_eq!(run(pool.clone()), run(pool));
    }

    #[test]
    fn switches_to_asset_ordering_on_asset_shortfall() {
        let pool = vec![
            lovelace_utxo(1, 50_000_000),
            asset_utxo(2, 2_000_000, 7, 4),
            asset_utxo(3, 1_500_000, 7, 10),
        ];

        let mut wanted = MultiAsset::new();
        wanted.set(Hash::from([7u8; 28]), b"token".to_vec(), 5);
        let requested = vec![Output::new(
            sizing_address(),
            Value::new(1_000_000, wanted),
        )];

        let selection = LargestFirst
            .select(
                pool,
                &requested,
                &ProtocolParameters::for_tests(),
                None,
                false,
                false,
            )
            .expect("selection succeeds");

        // the 10-token utxo covers the asset request on its own
        assert!(selection.chosen.iter().any(|u| u.input.index == 3));
        assert_eq!(
            selection.leftover.assets().get(&Hash::from([7u8; 28]), b"token"),
            5
        );
    }

    #[test]
    fn reports_shortfall_when_pool_is_too_small() {
        let pool = vec![lovelace_utxo(1, 2_000_000)];

        let err = LargestFirst
            .select(
                pool,
                &request(5_000_000),
                &ProtocolParameters::for_tests(),
                None,
                false,
                false,
            )
            .expect_err("selection must fail");

        match err {
            TxBuilderError::InsufficientUtxoBalance { shortfall } => {
                assert_eq!(shortfall.coin(), 3_000_000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn respects_min_utxo_for_the_leftover() {
        let pool = vec![lovelace_utxo(1, 5_000_000), lovelace_utxo(2, 5_000_000)];

        let selection = LargestFirst
            .select(
                pool,
                &request(4_999_999),
                &ProtocolParameters::for_tests(),
                None,
                false,
                true,
            )
            .expect("selection succeeds");

        // one lovelace of leftover is below min-utxo, so a second input must
        // have been drawn
        assert_eq!(selection.chosen.len(), 2);
    }
}
