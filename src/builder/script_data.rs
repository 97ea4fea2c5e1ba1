use std::collections::BTreeMap;

use pallas::crypto::hash::{Hash, Hasher};
use pallas::ledger::primitives::conway::{PlutusData, Redeemer as PallasRedeemer};
use pallas::ledger::primitives::Fragment;

/// Commitment binding the witness set to the transaction body: Blake2b-256
/// over the concatenated CBOR of the redeemer list, the datum list and the
/// active cost-models map.
///
/// The datum list must be supplied in datum-hash order; the builder's datum
/// map iterates that way, which keeps the digest reproducible. The cost
/// models map is expected to be empty when there are no redeemers.
pub fn script_data_hash(
    redeemers: &[PallasRedeemer],
    datums: &[PlutusData],
    cost_models: &BTreeMap<u64, Vec<i64>>,
) -> Hash<32> {
    let mut bytes = redeemers
        .to_vec()
        .encode_fragment()
        .expect("failed to encode redeemers");

    if !datums.is_empty() {
        bytes.extend(
            datums
                .to_vec()
                .encode_fragment()
                .expect("failed to encode datums"),
        );
    }

    bytes.extend(
        cost_models
            .encode_fragment()
            .expect("failed to encode cost models"),
    );

    Hasher::<256>::hash(&bytes)
}

#[cfg(test)]
mod tests {
    use pallas::ledger::primitives::conway::{ExUnits, RedeemerTag};

    use super::*;

    fn redeemer(index: u32) -> PallasRedeemer {
        PallasRedeemer {
            tag: RedeemerTag::Spend,
            index,
            data: PlutusData::BoundedBytes(vec![1, 2].into()),
            ex_units: ExUnits { mem: 10, steps: 20 },
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let datums = vec![PlutusData::BoundedBytes(vec![9].into())];
        let cost_models = BTreeMap::from([(1u64, vec![1, 2, 3])]);

        assert_eq!(
            script_data_hash(&[redeemer(0)], &datums, &cost_models),
            script_data_hash(&[redeemer(0)], &datums, &cost_models),
        );
    }

    #[test]
    fn hash_depends_on_every_section() {
        let datums = vec![PlutusData::BoundedBytes(vec![9].into())];
        let cost_models = BTreeMap::from([(1u64, vec![1, 2, 3])]);
        let base = script_data_hash(&[redeemer(0)], &datums, &cost_models);

        assert_ne!(
            base,
            script_data_hash(&[redeemer(1)], &datums, &cost_models)
        );
        assert_ne!(base, script_data_hash(&[redeemer(0)], &[], &cost_models));
        assert_ne!(
            base,
            script_data_hash(&[redeemer(0)], &datums, &BTreeMap::new())
        );
    }
}
