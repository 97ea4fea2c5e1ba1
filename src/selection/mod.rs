//! Coin selection strategies.

use pallas::crypto::hash::Hash;
use pallas::ledger::addresses::{
    Address, Network, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart,
};

use crate::builder::{fee, TxBuilderError};
use crate::params::ProtocolParameters;
use crate::primitives::{Output, Utxo, Value};

mod largest_first;
mod random_improve;

pub use largest_first::LargestFirst;
pub use random_improve::RandomImprove;

/// Outcome of a selection run: the drawn utxos plus whatever they provide
/// beyond the request.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub chosen: Vec<Utxo>,
    pub leftover: Value,
}

/// A strategy for covering a requested value from a pool of candidate utxos.
///
/// Implementations are pure with respect to the pool and may assume it holds
/// no duplicates. `limit` caps the number of drawn inputs,
/// `include_max_fee` adds the worst-case transaction fee to the request, and
/// `respect_min_utxo` additionally requires the leftover to be large enough
/// to live in a change output of its own.
pub trait UtxoSelector: std::fmt::Debug + Send + Sync {
    fn select(
        &self,
        pool: Vec<Utxo>,
        requested: &[Output],
        pparams: &ProtocolParameters,
        limit: Option<usize>,
        include_max_fee: bool,
        respect_min_utxo: bool,
    ) -> Result<Selection, TxBuilderError>;
}

/// Total value a selection run must cover.
pub(crate) fn requested_total(
    requested: &[Output],
    pparams: &ProtocolParameters,
    include_max_fee: bool,
) -> Value {
    let mut total: Value = requested.iter().map(|out| out.value.clone()).sum();
    if include_max_fee {
        total.add_lovelace(fee::max_tx_fee(pparams));
    }
    total
}

/// Placeholder address used to size hypothetical change outputs; only its
/// serialized length matters.
pub(crate) fn sizing_address() -> Address {
    Address::Shelley(ShelleyAddress::new(
        Network::Mainnet,
        ShelleyPaymentPart::Key(Hash::from([0u8; 28])),
        ShelleyDelegationPart::Null,
    ))
}

pub(crate) fn insufficient_balance(requested: &Value, selected: &Value) -> TxBuilderError {
    let shortfall = (requested.clone() - selected.clone())
        .remove_zero_assets()
        .assets()
        .filter(|_, _, amount| amount > 0);

    let mut value = Value::from_lovelace((requested.coin() - selected.coin()).max(0));
    value.set_multi_asset(shortfall);
    TxBuilderError::InsufficientUtxoBalance { shortfall: value }
}

/// Minimum lovelace the leftover must reach to be emitted as change.
pub(crate) fn min_change_lovelace(leftover: &Value, pparams: &ProtocolParameters) -> i64 {
    Output::new(sizing_address(), leftover.clone()).min_lovelace(pparams)
}
