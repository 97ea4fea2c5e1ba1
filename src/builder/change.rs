use pallas::ledger::addresses::Address;
use pallas::ledger::primitives::Fragment;
use tracing::debug;

use super::{TransactionBuilder, TxBuilderError};
use crate::params::ProtocolParameters;
use crate::primitives::{AssetName, MultiAsset, Output, PolicyId, Utxo, Value};

/// Would committing `(name, amount)` to the bundle under construction push
/// the serialized value of the output past the protocol limit?
///
/// The probe sets the coin to the output's min-UTxO so the measured size is
/// the one the emitted change output will actually have.
fn adding_asset_overflows(
    committed: &MultiAsset,
    temp_assets: &MultiAsset,
    policy: PolicyId,
    name: &AssetName,
    amount: i64,
    address: &Address,
    max_val_size: u64,
    pparams: &ProtocolParameters,
) -> bool {
    let mut attempt = committed.clone() + temp_assets.clone();
    attempt.add_asset(policy, name.clone(), amount);

    let mut value = Value::new(0, attempt);
    let output = Output::new(address.clone(), value.clone());
    value.set_lovelace(output.min_lovelace(pparams));

    let size = value
        .to_pallas()
        .encode_fragment()
        .expect("failed to encode value fragment")
        .len();
    size as u64 > max_val_size
}

/// Split the asset bundle of a change value into chunks whose serialized
/// values stay below `max_val_size`.
pub(crate) fn pack_multiassets_for_change(
    change_address: &Address,
    change: &Value,
    max_val_size: u64,
    pparams: &ProtocolParameters,
) -> Vec<MultiAsset> {
    let mut bundles = vec![];
    let mut committed = MultiAsset::new();

    for (policy, assets) in change.assets().iter() {
        let mut temp = MultiAsset::new();
        for (name, amount) in assets {
            let overflows = adding_asset_overflows(
                &committed,
                &temp,
                *policy,
                name,
                *amount,
                change_address,
                max_val_size,
                pparams,
            );
            if overflows && !(committed.is_empty() && temp.is_empty()) {
                bundles.push(committed + temp);
                committed = MultiAsset::new();
                temp = MultiAsset::new();
            }
            temp.add_asset(*policy, name.clone(), *amount);
        }
        committed = committed + temp;
    }

    bundles.push(committed);
    debug!(outputs = bundles.len(), "packed change assets");
    bundles
}

impl<C> TransactionBuilder<C> {
    /// Compute the change outputs for a candidate fee.
    ///
    /// `provided - requested` must be strictly positive somewhere; the
    /// residual lovelace always lands on the last emitted output, while any
    /// earlier output carries exactly its min-UTxO.
    pub(crate) fn calc_change(
        &self,
        fee: i64,
        inputs: &[Utxo],
        outputs: &[Output],
        address: &Address,
        respect_min_utxo: bool,
        pparams: &ProtocolParameters,
    ) -> Result<Vec<Output>, TxBuilderError> {
        let mut requested = Value::from_lovelace(fee);
        for output in outputs {
            requested = requested + output.value.clone();
        }

        let mut provided: Value = inputs.iter().map(|utxo| utxo.output.value.clone()).sum();
        provided.add_assets(self.mint.clone());
        provided.add_lovelace(self.withdrawal_total());
        provided.sub_lovelace(self.total_key_deposit(pparams));

        if !requested.less_or_equal(&provided) {
            return Err(TxBuilderError::InvalidTransaction {
                inputs: inputs.to_vec(),
                outputs: outputs.to_vec(),
                fee,
            });
        }

        let mut change = (provided - requested).remove_zero_assets();
        let mut change_outputs = vec![];

        if change.is_zero() {
            return Ok(change_outputs);
        }

        if !change.has_assets() {
            let min_coin =
                Output::lovelace_only(address.clone(), change.coin()).min_lovelace(pparams);
            if respect_min_utxo && change.coin() < min_coin {
                return Err(TxBuilderError::ChangeTooSmall {
                    coin: change.coin(),
                    min_coin,
                });
            }
            change_outputs.push(Output::lovelace_only(address.clone(), change.coin()));
            return Ok(change_outputs);
        }

        let bundles =
            pack_multiassets_for_change(address, &change, pparams.max_val_size, pparams);
        let last = bundles.len() - 1;
        for (i, bundle) in bundles.into_iter().enumerate() {
            let mut value = Value::new(0, bundle);
            if i == last {
                value.set_lovelace(change.coin());
            } else {
                let min_coin = Output::new(address.clone(), value.clone()).min_lovelace(pparams);
                value.set_lovelace(min_coin);
            }

            let min_coin = Output::new(address.clone(), value.clone()).min_lovelace(pparams);
            if respect_min_utxo && value.coin() < min_coin {
                return Err(TxBuilderError::ChangeTooSmall {
                    coin: value.coin(),
                    min_coin,
                });
            }

            change = change - value.clone();
            change_outputs.push(Output::new(address.clone(), value));
        }

        Ok(change_outputs)
    }

    /// Fold freshly computed change into the output list, merging into the
    /// pre-existing change output when one was identified.
    pub(crate) fn merge_changes(&mut self, changes: Vec<Output>, change_output_index: Option<usize>) {
        match change_output_index {
            Some(index) if changes.len() == 1 => {
                let change = changes.into_iter().next().expect("length checked above");
                let merged = self.outputs[index].value.clone() + change.value;
                self.outputs[index].value = merged;
            }
            _ => self.outputs.extend(changes),
        }
    }
}

#[cfg(test)]
mod tests {
    use pallas::crypto::hash::Hash;

    use super::*;
    use crate::selection::sizing_address;

    fn many_assets(count: u8) -> MultiAsset {
        let mut assets = MultiAsset::new();
        for i in 0..count {
            assets.set(
                Hash::from([9u8; 28]),
                format!("token{i:03}").into_bytes(),
                1,
            );
        }
        assets
    }

    #[test]
    fn small_bundle_stays_in_one_output() {
        let pparams = ProtocolParameters::for_tests();
        let change = Value::new(5_000_000, many_assets(2));

        let bundles =
            pack_multiassets_for_change(&sizing_address(), &change, pparams.max_val_size, &pparams);

        assert_eq!(bundles.len(), 1);
    }

    #[test]
    fn oversized_bundle_is_split_and_preserved() {
        let pparams = ProtocolParameters::for_tests();
        // tighten the limit so sixty assets cannot fit one output
        let max_val_size = 500;
        let change = Value::new(50_000_000, many_assets(60));

        let bundles =
            pack_multiassets_for_change(&sizing_address(), &change, max_val_size, &pparams);

        assert!(bundles.len() >= 2);

        // every chunk fits, nothing was lost
        let mut total = MultiAsset::new();
        for bundle in &bundles {
            let mut value = Value::new(0, bundle.clone());
            let min = Output::new(sizing_address(), value.clone()).min_lovelace(&pparams);
            value.set_lovelace(min);
            let size = value
                .to_pallas()
                .encode_fragment()
                .expect("encode value")
                .len();
            assert!(size as u64 <= max_val_size);
            total = total + bundle.clone();
        }
        assert_eq!(total, many_assets(60));
    }
}
