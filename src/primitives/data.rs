use pallas::crypto::hash::{Hash, Hasher};
use pallas::ledger::primitives::conway::{
    ExUnits as PallasExUnits, PlutusData, Redeemer as PallasRedeemer,
    RedeemerTag as PallasRedeemerTag,
};
use pallas::ledger::primitives::Fragment;

pub type DatumHash = Hash<32>;

/// Datum attachment of a transaction output: by hash or inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatumOption {
    Hash(DatumHash),
    Inline(PlutusData),
}

/// Blake2b-256 of the canonical CBOR encoding of a datum.
pub fn hash_plutus_data(data: &PlutusData) -> DatumHash {
    let bytes = data
        .encode_fragment()
        .expect("failed to encode plutus data");
    Hasher::<256>::hash(&bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RedeemerTag {
    Spend,
    Mint,
    Cert,
    Reward,
}

impl RedeemerTag {
    /// Name used in the `"tag:index"` keys of the execution-unit oracle.
    pub fn name(&self) -> &'static str {
        match self {
            RedeemerTag::Spend => "spend",
            RedeemerTag::Mint => "mint",
            RedeemerTag::Cert => "cert",
            RedeemerTag::Reward => "reward",
        }
    }

    pub fn to_pallas(self) -> PallasRedeemerTag {
        match self {
            RedeemerTag::Spend => PallasRedeemerTag::Spend,
            RedeemerTag::Mint => PallasRedeemerTag::Mint,
            RedeemerTag::Cert => PallasRedeemerTag::Cert,
            RedeemerTag::Reward => PallasRedeemerTag::Reward,
        }
    }
}

/// Script execution budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

impl ExUnits {
    pub fn add(&mut self, other: &ExUnits) {
        self.mem += other.mem;
        self.steps += other.steps;
    }
}

/// Witness data supplied at spend time for a Plutus script.
///
/// The `(tag, index)` pair identifies the redeemer to the ledger and to the
/// execution-unit oracle; the index is only meaningful once the builder has
/// fixed the ordering of the entity the tag refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redeemer {
    pub tag: RedeemerTag,
    pub index: u32,
    pub data: PlutusData,
    pub ex_units: ExUnits,
}

impl Redeemer {
    pub fn new(tag: RedeemerTag, data: PlutusData, ex_units: ExUnits) -> Self {
        Self {
            tag,
            index: 0,
            data,
            ex_units,
        }
    }

    /// Oracle key for this redeemer, e.g. `"spend:0"`.
    pub fn oracle_key(&self) -> String {
        format!("{}:{}", self.tag.name(), self.index)
    }

    pub fn to_pallas(&self) -> PallasRedeemer {
        PallasRedeemer {
            tag: self.tag.to_pallas(),
            index: self.index,
            data: self.data.clone(),
            ex_units: PallasExUnits {
                mem: self.ex_units.mem,
                steps: self.ex_units.steps,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_key_formats_tag_and_index() {
        let mut redeemer = Redeemer::new(
            RedeemerTag::Spend,
            PlutusData::BoundedBytes(vec![1, 2, 3].into()),
            ExUnits::default(),
        );
        redeemer.index = 4;

        assert_eq!(redeemer.oracle_key(), "spend:4");
    }

    #[test]
    fn datum_hash_is_stable() {
        let datum = PlutusData::BoundedBytes(vec![0xca, 0xfe].into());
        assert_eq!(hash_plutus_data(&datum), hash_plutus_data(&datum));
    }
}
