use rand::Rng;
use tracing::debug;

use super::{
    insufficient_balance, min_change_lovelace, requested_total, Selection, UtxoSelector,
};
use crate::builder::TxBuilderError;
use crate::params::ProtocolParameters;
use crate::primitives::{Output, Utxo, Value};

/// CIP-2 style selector: per asset dimension, draw random utxos until the
/// request is covered, then keep drawing while doing so moves the selection
/// closer to an ideal of twice the request, never exceeding three times it.
///
/// Lovelace is handled as the last dimension so asset-driven draws get the
/// chance to cover it for free.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomImprove;

impl UtxoSelector for RandomImprove {
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
        let mut rng = rand::thread_rng();
        let mut remaining = pool;
        let mut chosen: Vec<Utxo> = vec![];
        let mut selected = Value::default();

        let dimensions: Vec<_> = requested
            .assets()
            .iter()
            .flat_map(|(policy, assets)| {
                assets
                    .iter()
                    .map(|(name, amount)| (*policy, name.clone(), *amount))
            })
            .collect();

        for (policy, name, amount) in dimensions {
            // random draws until the lower bound is met
            while selected.assets().get(&policy, &name) < amount {
                if limit.is_some_and(|max| chosen.len() >= max) {
                    return Err(insufficient_balance(&requested, &selected));
                }
                let Some(index) = pick_carrier(&mut rng, &remaining, |utxo| {
                    utxo.output.value.assets().get(&policy, &name) > 0
                }) else {
                    return Err(insufficient_balance(&requested, &selected));
                };

                let utxo = remaining.swap_remove(index);
                selected = selected + utxo.output.value.clone();
                chosen.push(utxo);
            }

            // improvement: keep drawing while it moves us toward 2x the
            // request without crossing 3x
            let ideal = 2 * amount;
            let upper = 3 * amount;
            while !limit.is_some_and(|max| chosen.len() >= max) {
                let Some(index) = pick_carrier(&mut rng, &remaining, |utxo| {
                    utxo.output.value.assets().get(&policy, &name) > 0
                }) else {
                    break;
                };

                let current = selected.assets().get(&policy, &name);
                let candidate =
                    current + remaining[index].output.value.assets().get(&policy, &name);
                let improves =
                    (ideal - candidate).abs() < (ideal - current).abs() && candidate <= upper;
                if !improves {
                    break;
                }

                let utxo = remaining.swap_remove(index);
                selected = selected + utxo.output.value.clone();
                chosen.push(utxo);
            }
        }

        // last dimension: lovelace
        while selected.coin() < requested.coin() {
            if remaining.is_empty() || limit.is_some_and(|max| chosen.len() >= max) {
                return Err(insufficient_balance(&requested, &selected));
            }
            let index = rng.gen_range(0..remaining.len());
            let utxo = remaining.swap_remove(index);
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
                let index = rng.gen_range(0..remaining.len());
                let utxo = remaining.swap_remove(index);
                selected = selected + utxo.output.value.clone();
                chosen.push(utxo);
            }
        }

        debug!(inputs = chosen.len(), "random-improve selection complete");
        Ok(Selection {
            leftover: (selected - requested).remove_zero_assets(),
            chosen,
        })
    }
}

/// Random index among the utxos satisfying the predicate.
fn pick_carrier<R: Rng>(
    rng: &mut R,
    pool: &[Utxo],
    carries: impl Fn(&Utxo) -> bool,
) -> Option<usize> {
    let carriers: Vec<usize> = pool
        .iter()
        .enumerate()
        .filter(|(_, utxo)| carries(utxo))
        .map(|(index, _)| index)
        .collect();

    if carriers.is_empty() {
        None
    } else {
        Some(carriers[rng.gen_range(0..carriers.len())])
    }
}

#[cfg(test)]
mod tests {
    use pallas::crypto::hash::Hash;

    use super::*;
    use crate::primitives::{Input, MultiAsset};
    use crate::selection::sizing_address;

    fn asset_utxo(index: u64, coin: i64, amount: i64) -> Utxo {
        Utxo::new(
            Input::new(Hash::from([index as u8; 32]), index),
            Output::lovelace_only(sizing_address(), coin).add_asset(
                Hash::from([7u8; 28]),
                b"token".to_vec(),
                amount,
            ),
        )
    }

    fn lovelace_utxo(index: u64, coin: i64) -> Utxo {
        Utxo::new(
            Input::new(Hash::from([index as u8; 32]), index),
            Output::lovelace_only(sizing_address(), coin),
        )
    }

    #[test]
    fn covers_every_dimension_of_a_mixed_request() {
        let pool = vec![
            asset_utxo(1, 2_000_000, 3),
            asset_utxo(2, 2_000_000, 4),
            lovelace_utxo(3, 10_000_000),
        ];

        let mut wanted = MultiAsset::new();
        wanted.set(Hash::from([7u8; 28]), b"token".to_vec(), 6);
        let requested = vec![Output::new(sizing_address(), Value::new(5_000_000, wanted))];

        let selection = RandomImprove
            .select(
                pool,
                &requested,
                &ProtocolParameters::for_tests(),
                None,
                false,
                false,
            )
            .expect("selection succeeds");

        let total: Value = selection
            .chosen
            .iter()
            .map(|u| u.output.value.clone())
            .sum();
        assert!(total.coin() >= 5_000_000);
        assert!(total.assets().get(&Hash::from([7u8; 28]), b"token") >= 6);
    }

    #[test]
    fn fails_when_no_utxo_carries_a_requested_asset() {
        let pool = vec![lovelace_utxo(1, 10_000_000)];

        let mut wanted = MultiAsset::new();
        wanted.set(Hash::from([7u8; 28]), b"token".to_vec(), 1);
        let requested = vec![Output::new(sizing_address(), Value::new(0, wanted))];

        let err = RandomImprove
            .select(
                pool,
                &requested,
                &ProtocolParameters::for_tests(),
                None,
                false,
                false,
            )
            .expect_err("selection must fail");

        assert!(matches!(
            err,
            TxBuilderError::InsufficientUtxoBalance { .. }
        ));
    }

    #[test]
    fn improvement_never_exceeds_three_times_the_request() {
        // plenty of single-token utxos: improvement may draw extras, but the
        // selected amount has to stay within the upper bound
        let pool: Vec<Utxo> = (1..=20).map(|i| asset_utxo(i, 1_500_000, 1)).collect();

        let mut wanted = MultiAsset::new();
        wanted.set(Hash::from([7u8; 28]), b"token".to_vec(), 4);
        let requested = vec![Output::new(sizing_address(), Value::new(0, wanted))];

        let selection = RandomImprove
            .select(
                pool,
                &requested,
                &ProtocolParameters::for_tests(),
                None,
                false,
                false,
            )
            .expect("selection succeeds");

        let total: Value = selection
            .chosen
            .iter()
            .map(|u| u.output.value.clone())
            .sum();
        let amount = total.assets().get(&Hash::from([7u8; 28]), b"token");
        assert!((4..=12).contains(&amount));
    }
}
