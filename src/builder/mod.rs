//! The transaction builder: aggregates intents, selects inputs, balances,
//! and emits a finalized transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use pallas::ledger::addresses::Address;
use pallas::ledger::primitives::conway::{AuxiliaryData, Certificate, PlutusData};

use crate::primitives::{
    hash_plutus_data, DatumOption, Input, MultiAsset, Output, PolicyId, PubKeyHash, Redeemer,
    RewardAccount, Script, Utxo,
};
use crate::selection::{LargestFirst, RandomImprove, UtxoSelector};

mod build;
mod change;
mod error;
pub mod fee;
mod script_data;

pub use error::TxBuilderError;
pub use script_data::script_data_hash;

/// Default headroom applied on top of the oracle's execution-unit estimates.
const EXECUTION_UNIT_BUFFER: f64 = 0.2;

#[derive(Clone)]
pub struct MintingScript {
    pub script: Script,
    pub redeemer: Redeemer,
}

/// Mutable aggregate of everything a transaction should do.
///
/// Populate it through the `add_*` operations, then let [`Self::build`] run
/// coin selection, change computation, execution-unit estimation and fee
/// balancing. The chain-context is a shared read-only capability; each
/// builder instance belongs to a single transaction.
#[derive(Clone)]
pub struct TransactionBuilder<C> {
    pub(crate) context: C,
    pub(crate) selectors: Vec<Arc<dyn UtxoSelector>>,
    pub(crate) execution_memory_buffer: f64,
    pub(crate) execution_step_buffer: f64,
    pub(crate) ttl: Option<u64>,
    pub(crate) validity_start: Option<u64>,
    pub(crate) loaded_utxos: Vec<Utxo>,
    pub(crate) auxiliary_data: Option<AuxiliaryData>,
    pub(crate) mint: MultiAsset,
    pub(crate) required_signers: Vec<PubKeyHash>,
    pub(crate) collaterals: Vec<Utxo>,
    pub(crate) certificates: Vec<Certificate>,
    pub(crate) withdrawals: BTreeMap<RewardAccount, u64>,
    pub(crate) reference_inputs: Vec<Input>,
    pub(crate) inputs: Vec<Utxo>,
    pub(crate) excluded_inputs: Vec<Utxo>,
    pub(crate) input_addresses: Vec<Address>,
    pub(crate) outputs: Vec<Output>,
    pub(crate) fee: i64,
    /// Witness datums keyed by the lowercase hex of their hash; the key
    /// order doubles as the canonical datum ordering.
    pub(crate) datums: BTreeMap<String, PlutusData>,
    pub(crate) collateral_return: Option<Output>,
    pub(crate) total_collateral: Option<i64>,
    /// Spend redeemers keyed by the CBOR of the utxo they unlock, until
    /// their index is assigned.
    pub(crate) inputs_to_redeemers: BTreeMap<Vec<u8>, Redeemer>,
    pub(crate) inputs_to_scripts: BTreeMap<Vec<u8>, Script>,
    pub(crate) minting_scripts: Vec<MintingScript>,
    pub(crate) native_scripts: Vec<Script>,
    pub(crate) reference_scripts: Vec<Script>,
    pub(crate) estimate_execution_units: bool,
}

impl<C> TransactionBuilder<C> {
    pub fn new(context: C) -> Self {
        Self {
            context,
            selectors: vec![
                Arc::new(LargestFirst) as Arc<dyn UtxoSelector>,
                Arc::new(RandomImprove),
            ],
            execution_memory_buffer: EXECUTION_UNIT_BUFFER,
            execution_step_buffer: EXECUTION_UNIT_BUFFER,
            ttl: None,
            validity_start: None,
            loaded_utxos: vec![],
            auxiliary_data: None,
            mint: MultiAsset::new(),
            required_signers: vec![],
            collaterals: vec![],
            certificates: vec![],
            withdrawals: BTreeMap::new(),
            reference_inputs: vec![],
            inputs: vec![],
            excluded_inputs: vec![],
            input_addresses: vec![],
            outputs: vec![],
            fee: 0,
            datums: BTreeMap::new(),
            collateral_return: None,
            total_collateral: None,
            inputs_to_redeemers: BTreeMap::new(),
            inputs_to_scripts: BTreeMap::new(),
            minting_scripts: vec![],
            native_scripts: vec![],
            reference_scripts: vec![],
            estimate_execution_units: true,
        }
    }

    /// Mark a utxo for consumption.
    pub fn add_input(&mut self, utxo: Utxo) {
        self.inputs.push(utxo);
    }

    /// Forbid a utxo from ever being consumed by this transaction.
    pub fn exclude_input(&mut self, utxo: Utxo) {
        self.excluded_inputs.push(utxo);
    }

    /// Provide an explicit pool for coin selection instead of querying the
    /// chain-context per input address.
    pub fn add_loaded_utxos(&mut self, utxos: Vec<Utxo>) {
        self.loaded_utxos.extend(utxos);
    }

    /// Enlarge the set of addresses whose utxos selection may draw from.
    pub fn add_input_address(&mut self, address: Address) {
        self.input_addresses.push(address);
    }

    /// Spend a script-locked utxo.
    ///
    /// The utxo must sit at a script address; when it declares a datum hash
    /// the supplied datum must hash to it. The script may be omitted when it
    /// is provided through a reference input instead.
    pub fn add_script_input(
        &mut self,
        utxo: Utxo,
        script: Option<Script>,
        datum: Option<&PlutusData>,
        redeemer: Option<Redeemer>,
    ) -> Result<(), TxBuilderError> {
        if !utxo.output.address.has_script() {
            return Err(TxBuilderError::BadScriptInput(
                "output address of the utxo is not a script address".into(),
            ));
        }

        if let (Some(datum), Some(declared)) = (datum, utxo.output.datum_hash()) {
            let actual = hash_plutus_data(datum);
            if actual != declared {
                return Err(TxBuilderError::BadScriptInput(format!(
                    "datum hash in the spent output is {declared}, but the supplied datum hashes to {actual}",
                )));
            }
        }

        if let Some(datum) = datum {
            self.datums
                .insert(hex::encode(hash_plutus_data(datum)), datum.clone());
        }
        if let Some(redeemer) = redeemer {
            self.inputs_to_redeemers.insert(utxo.cbor_key(), redeemer);
        }
        if let Some(script) = script {
            self.inputs_to_scripts.insert(utxo.cbor_key(), script);
        }

        self.inputs.push(utxo);
        Ok(())
    }

    /// Append an output, optionally attaching a datum inline and recording
    /// it in the witness set.
    pub fn add_output(&mut self, mut output: Output, datum: Option<&PlutusData>, witness_datum: bool) {
        if let Some(datum) = datum {
            output.datum = Some(DatumOption::Inline(datum.clone()));
            if witness_datum {
                self.datums
                    .insert(hex::encode(hash_plutus_data(datum)), datum.clone());
            }
        }
        self.outputs.push(output);
    }

    /// Register a minting policy together with the redeemer that satisfies
    /// it. The minted amounts themselves are declared via
    /// [`Self::add_mint_asset`].
    pub fn add_minting_script(&mut self, script: Script, redeemer: Redeemer) {
        self.minting_scripts.push(MintingScript { script, redeemer });
    }

    /// Mint (positive) or burn (negative) an asset under the given policy.
    pub fn add_mint_asset(&mut self, policy: PolicyId, name: Vec<u8>, amount: i64) {
        self.mint.add_asset(policy, name, amount);
    }

    /// Pure-ADA utxo forfeited if a Plutus script fails phase-2 validation.
    pub fn add_collateral(&mut self, utxo: Utxo) {
        self.collaterals.push(utxo);
    }

    /// Read-only input that scripts can inspect without consuming it.
    pub fn add_reference_input(&mut self, input: Input) {
        self.reference_inputs.push(input);
    }

    /// Script provided through a reference input rather than the witness set.
    pub fn add_reference_script(&mut self, script: Script) {
        self.reference_scripts.push(script);
    }

    pub fn add_native_script(&mut self, script: Script) {
        self.native_scripts.push(script);
    }

    pub fn add_required_signer(&mut self, pub_key_hash: PubKeyHash) {
        self.required_signers.push(pub_key_hash);
    }

    pub fn add_certificate(&mut self, certificate: Certificate) {
        self.certificates.push(certificate);
    }

    pub fn add_withdrawal(&mut self, account: RewardAccount, amount: u64) {
        self.withdrawals.insert(account, amount);
    }

    pub fn set_ttl(&mut self, slot: u64) {
        self.ttl = Some(slot);
    }

    pub fn set_validity_start(&mut self, slot: u64) {
        self.validity_start = Some(slot);
    }

    pub fn set_auxiliary_data(&mut self, data: AuxiliaryData) {
        self.auxiliary_data = Some(data);
    }

    /// Replace the selector chain; selectors run in order, first success
    /// wins.
    pub fn set_selectors(&mut self, selectors: Vec<Arc<dyn UtxoSelector>>) {
        self.selectors = selectors;
    }

    /// Headroom multiplied onto the oracle's execution-unit estimates.
    pub fn set_execution_buffers(&mut self, memory: f64, steps: f64) {
        self.execution_memory_buffer = memory;
        self.execution_step_buffer = steps;
    }

    /// Disable the execution-unit oracle round-trip; redeemers then keep the
    /// budgets they were added with.
    pub fn set_estimate_execution_units(&mut self, estimate: bool) {
        self.estimate_execution_units = estimate;
    }

    pub fn fee(&self) -> i64 {
        self.fee
    }

    pub fn inputs(&self) -> &[Utxo] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// All redeemers of the transaction: spend redeemers first, then the
    /// minting redeemers.
    pub fn redeemers(&self) -> Vec<Redeemer> {
        self.inputs_to_redeemers
            .values()
            .cloned()
            .chain(self.minting_scripts.iter().map(|m| m.redeemer.clone()))
            .collect()
    }

    /// Every script the transaction carries, in witness-set order.
    pub(crate) fn all_scripts(&self) -> Vec<Script> {
        self.native_scripts
            .iter()
            .cloned()
            .chain(self.inputs_to_scripts.values().cloned())
            .chain(self.minting_scripts.iter().map(|m| m.script.clone()))
            .collect()
    }

    /// Sum of deposits the certificates will consume from the inputs.
    pub(crate) fn total_key_deposit(&self, pparams: &crate::params::ProtocolParameters) -> i64 {
        self.certificates
            .iter()
            .map(|certificate| match certificate {
                Certificate::StakeRegistration(_) => pparams.key_deposit,
                Certificate::Reg(_, deposit) => *deposit as i64,
                _ => 0,
            })
            .sum()
    }

    pub(crate) fn withdrawal_total(&self) -> i64 {
        self.withdrawals.values().map(|amount| *amount as i64).sum()
    }
}
