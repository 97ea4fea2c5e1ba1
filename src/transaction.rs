//! The thin wrapper around a built transaction: collect signatures, submit.

use std::collections::HashMap;

use pallas::ledger::primitives::conway::{Tx, VKeyWitness};
use pallas::ledger::primitives::{Fragment, NonEmptySet};

use crate::context::{ChainContext, ContextError};
use crate::primitives::TxHash;

/// Signs transaction hashes. The wallet behind it (software keys, hardware
/// device, remote service) is none of this crate's business.
pub trait TxSigner {
    fn public_key(&self) -> [u8; 32];
    fn sign(&self, payload: &[u8]) -> [u8; 64];
}

/// A fully balanced transaction waiting for signatures and submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub bytes: Vec<u8>,
    signatures: HashMap<[u8; 32], [u8; 64]>,
}

impl PendingTransaction {
    pub fn new(hash: TxHash, bytes: Vec<u8>) -> Self {
        Self {
            hash,
            bytes,
            signatures: HashMap::new(),
        }
    }

    pub fn cbor(&self) -> &[u8] {
        &self.bytes
    }

    pub fn cbor_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Add this signer's witness over the body hash and refresh the
    /// serialized transaction.
    pub fn sign<S: TxSigner>(mut self, signer: &S) -> Self {
        let signature = signer.sign(self.hash.as_ref());
        self.signatures.insert(signer.public_key(), signature);

        let vkey_witnesses: Vec<VKeyWitness> = self
            .signatures
            .iter()
            .map(|(public_key, signature)| VKeyWitness {
                vkey: public_key.to_vec().into(),
                signature: signature.to_vec().into(),
            })
            .collect();

        let bytes = {
            let mut tx = Tx::decode_fragment(&self.bytes)
                .expect("corrupted transaction bytes in pending transaction");
            tx.transaction_witness_set.vkeywitness = NonEmptySet::from_vec(vkey_witnesses);
            tx.encode_fragment()
                .expect("failed to encode signed transaction")
        };

        self.bytes = bytes;
        self
    }

    /// Broadcast through the chain-context, returning the transaction id.
    pub async fn submit<C: ChainContext>(&self, context: &C) -> Result<TxHash, ContextError> {
        context.submit_tx(&self.bytes).await
    }
}
