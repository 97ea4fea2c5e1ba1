//! The read-only chain capability the builder runs against.

use std::collections::BTreeMap;

use pallas::ledger::addresses::Address;

use crate::builder::fee;
use crate::params::{GenesisParameters, Network, ProtocolParameters};
use crate::primitives::{ExUnits, TxHash, Utxo};

mod blockfrost;

pub use blockfrost::BlockfrostContext;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not parse response: {0}")]
    Parse(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
}

impl From<reqwest::Error> for ContextError {
    fn from(err: reqwest::Error) -> Self {
        ContextError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ContextError {
    fn from(err: serde_json::Error) -> Self {
        ContextError::Parse(err.to_string())
    }
}

/// A view of the chain: utxo lookups, protocol parameters, the script
/// execution oracle and transaction submission.
///
/// All methods may perform network I/O and fail; the builder performs no
/// retries and surfaces every error as-is. Implementations are free to cache
/// slow-moving data (protocol parameters change at most once per epoch).
pub trait ChainContext {
    fn network(&self) -> Network;

    async fn epoch(&self) -> Result<u64, ContextError>;

    async fn last_block_slot(&self) -> Result<u64, ContextError>;

    async fn protocol_params(&self) -> Result<ProtocolParameters, ContextError>;

    async fn genesis_params(&self) -> Result<GenesisParameters, ContextError>;

    /// Fee of a transaction at the protocol size and execution maxima.
    async fn max_tx_fee(&self) -> Result<i64, ContextError> {
        Ok(fee::max_tx_fee(&self.protocol_params().await?))
    }

    /// Every unspent output sitting at `address`.
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>, ContextError>;

    /// Evaluate the scripts of a serialized transaction, returning execution
    /// budgets keyed `"tag:index"` (e.g. `"spend:0"`).
    async fn evaluate_tx(&self, cbor: &[u8]) -> Result<BTreeMap<String, ExUnits>, ContextError>;

    /// Broadcast a serialized transaction, returning its id.
    async fn submit_tx(&self, cbor: &[u8]) -> Result<TxHash, ContextError>;
}
