use pallas::crypto::hash::{Hash, Hasher};
use pallas::ledger::primitives::conway::{NativeScript, PlutusScript, ScriptRef};
use pallas::ledger::primitives::Fragment;

pub type ScriptHash = Hash<28>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Native,
    PlutusV1,
    PlutusV2,
}

/// A spending or minting script carried by the transaction.
///
/// Plutus scripts are opaque flat-encoded bytes; native scripts are kept in
/// their decoded form so the builder never has to re-parse them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    Native(NativeScript),
    PlutusV1(Vec<u8>),
    PlutusV2(Vec<u8>),
}

impl Script {
    pub fn kind(&self) -> ScriptKind {
        match self {
            Script::Native(_) => ScriptKind::Native,
            Script::PlutusV1(_) => ScriptKind::PlutusV1,
            Script::PlutusV2(_) => ScriptKind::PlutusV2,
        }
    }

    /// Ledger script hash: Blake2b-224 over the language tag byte followed
    /// by the script body.
    pub fn hash(&self) -> ScriptHash {
        let (tag, body) = match self {
            Script::Native(script) => (
                0u8,
                script
                    .encode_fragment()
                    .expect("failed to encode native script"),
            ),
            Script::PlutusV1(bytes) => (1u8, bytes.clone()),
            Script::PlutusV2(bytes) => (2u8, bytes.clone()),
        };

        let mut hasher = Hasher::<224>::new();
        hasher.input(&[tag]);
        hasher.input(&body);
        hasher.finalize()
    }

    pub fn to_script_ref(&self) -> ScriptRef {
        match self {
            Script::Native(script) => ScriptRef::NativeScript(script.clone().into()),
            Script::PlutusV1(bytes) => {
                ScriptRef::PlutusV1Script(PlutusScript::<1>(bytes.clone().into()))
            }
            Script::PlutusV2(bytes) => {
                ScriptRef::PlutusV2Script(PlutusScript::<2>(bytes.clone().into()))
            }
        }
    }
}
