use crate::context::ContextError;
use crate::primitives::{Output, Utxo, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TxBuilderError {
    /// A utxo appears both among the selected inputs and the excluded set
    #[error("input is both selected and excluded")]
    InputExclusionConflict,
    /// The selectors could not cover the requested value from the pool
    #[error("utxo pool cannot cover the requested value (short by {shortfall:?})")]
    InsufficientUtxoBalance { shortfall: Value },
    /// After selection the transaction still requests more than it provides
    #[error("requested value exceeds the provided value at fee {fee}")]
    InvalidTransaction {
        inputs: Vec<Utxo>,
        outputs: Vec<Output>,
        fee: i64,
    },
    /// A change output fell below the ledger minimum for its size
    #[error("change output of {coin} lovelace is below the minimum of {min_coin}")]
    ChangeTooSmall { coin: i64, min_coin: i64 },
    #[error("transaction of {actual} bytes exceeds the protocol maximum of {maximum}")]
    TransactionTooBig { actual: usize, maximum: usize },
    /// Collateral inputs cannot cover the budget, or the return output would
    /// be below its ledger minimum
    #[error("collateral inputs hold {provided} lovelace but {required} are required")]
    InsufficientCollateral { provided: i64, required: i64 },
    /// Non-script address used as a script input, or the supplied datum does
    /// not hash to the hash declared by the spent output
    #[error("bad script input: {0}")]
    BadScriptInput(String),
    #[error(transparent)]
    Context(#[from] ContextError),
}
