use pallas::crypto::hash::Hash;
use pallas::ledger::primitives::conway::TransactionInput;
use pallas::ledger::primitives::Fragment;

use super::Output;

pub type TxHash = Hash<32>;

/// Reference to an output of a previous transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Input {
    pub tx_id: TxHash,
    pub index: u64,
}

impl Input {
    pub fn new(tx_id: TxHash, index: u64) -> Self {
        Self { tx_id, index }
    }

    pub fn to_pallas(&self) -> TransactionInput {
        TransactionInput {
            transaction_id: self.tx_id,
            index: self.index,
        }
    }
}

/// An unspent transaction output together with the reference that spends it.
///
/// Utxos are plain values; they are cloned freely between the builder, the
/// selectors and the chain-context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub input: Input,
    pub output: Output,
}

impl Utxo {
    pub fn new(input: Input, output: Output) -> Self {
        Self { input, output }
    }

    /// Canonical CBOR of the whole utxo, used as the key under which a spend
    /// redeemer is recorded until its index is known.
    pub fn cbor_key(&self) -> Vec<u8> {
        let mut bytes = self
            .input
            .to_pallas()
            .encode_fragment()
            .expect("failed to encode input fragment");
        bytes.extend(
            self.output
                .to_pallas()
                .encode_fragment()
                .expect("failed to encode output fragment"),
        );
        bytes
    }
}
