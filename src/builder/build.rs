use std::collections::{BTreeMap, HashSet};

use futures_util::future::LocalBoxFuture;
use pallas::codec::utils::Bytes;
use pallas::crypto::hash::Hash;
use pallas::ledger::addresses::Address;
use pallas::ledger::primitives::conway::{
    Multiasset, NativeScript, NonZeroInt, PlutusData, PlutusScript,
    Redeemer as PallasRedeemer, Redeemers as PallasRedeemers, TransactionBody, Tx, VKeyWitness,
    WitnessSet,
};
use pallas::ledger::primitives::{Fragment, MaybeIndefArray, NonEmptyKeyValuePairs, NonEmptySet, Set};
use pallas::ledger::traverse::ComputeHash;
use tracing::{debug, warn};

use super::{fee, script_data_hash, TransactionBuilder, TxBuilderError};
use crate::context::ChainContext;
use crate::params::ProtocolParameters;
use crate::primitives::{ExUnits, Output, RedeemerTag, Script, TxHash, Utxo, Value};
use crate::selection::sizing_address;
use crate::transaction::PendingTransaction;

// Placeholder witness material, so size estimates already include the
// overhead of the signatures the wallet will add later.
const FAKE_VKEY: [u8; 32] = [0x0b; 32];
const FAKE_SIGNATURE: [u8; 64] = [0x0b; 64];

/// Which rendition of the transaction to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxVariant {
    /// Fake witnesses, worst-case fee when none is set, size-guarded.
    FeeDraft,
    /// Fake witnesses, flagged invalid, handed to the execution oracle.
    EvaluationDraft,
    /// The real thing, ready for signatures.
    Final,
}

impl<C: ChainContext + Clone> TransactionBuilder<C> {
    /// Run the full balancing algorithm and emit the finished transaction.
    ///
    /// Change goes to `change_address`; with `merge_change` set it is folded
    /// into an existing output at that address instead of appending one.
    /// The collateral return goes to `collateral_change_address`, falling
    /// back to the change address.
    pub async fn build(
        &mut self,
        change_address: Option<&Address>,
        merge_change: bool,
        collateral_change_address: Option<&Address>,
    ) -> Result<PendingTransaction, TxBuilderError> {
        let pparams = self.context.protocol_params().await?;

        for input in &self.inputs {
            if self.excluded_inputs.contains(input) {
                return Err(TxBuilderError::InputExclusionConflict);
            }
        }

        let mut selected_utxos = self.inputs.clone();
        let mut selected_amount: Value = selected_utxos
            .iter()
            .map(|utxo| utxo.output.value.clone())
            .sum();
        selected_amount.add_assets(self.mint.clone());
        selected_amount.add_lovelace(self.withdrawal_total());
        selected_amount.sub_lovelace(self.total_key_deposit(&pparams));

        let can_merge_change = merge_change
            && change_address
                .is_some_and(|addr| self.outputs.iter().any(|out| out.address == *addr));

        let mut requested_amount: Value = self
            .outputs
            .iter()
            .map(|out| out.value.clone())
            .sum();
        requested_amount.add_lovelace(self.estimate_fee(&pparams)?);

        // surplus assets on the already-selected inputs must not mask a
        // shortfall, so only the requested dimensions count here
        let trimmed_selected = Value::new(
            selected_amount.coin(),
            selected_amount
                .assets()
                .filter(|policy, name, _| requested_amount.assets().get(policy, name) != 0),
        );

        let mut unfulfilled = requested_amount.clone() - trimmed_selected.clone();
        if change_address.is_some() && !can_merge_change {
            if unfulfilled.coin() < 0 {
                // selection must still leave room for the change output the
                // surplus will need
                let surplus = selected_amount.clone() - trimmed_selected.clone();
                let change_floor = Output::new(
                    change_address.expect("checked above").clone(),
                    surplus,
                )
                .min_lovelace(&pparams);
                unfulfilled.set_lovelace((unfulfilled.coin() + change_floor).max(0));
            }
        } else if unfulfilled.coin() < 0 {
            unfulfilled.set_lovelace(0);
        }
        let unfulfilled = unfulfilled.remove_zero_assets();

        if Value::default().less_or_equal(&unfulfilled) && !unfulfilled.is_zero() {
            debug!(?unfulfilled, "acquiring shortfall from the utxo pool");
            let pool = self.selection_pool(&selected_utxos).await?;
            let request = vec![Output::new(sizing_address(), unfulfilled)];

            let mut selection = None;
            let mut last_error = TxBuilderError::InsufficientUtxoBalance {
                shortfall: request[0].value.clone(),
            };
            for selector in &self.selectors {
                match selector.select(
                    pool.clone(),
                    &request,
                    &pparams,
                    None,
                    false,
                    !can_merge_change,
                ) {
                    Ok(found) => {
                        selection = Some(found);
                        break;
                    }
                    Err(error) => {
                        warn!(selector = ?selector, %error, "selector failed, trying the next one");
                        last_error = error;
                    }
                }
            }

            let selection = selection.ok_or(last_error)?;
            for utxo in selection.chosen {
                selected_amount = selected_amount + utxo.output.value.clone();
                selected_utxos.push(utxo);
            }
        }
        self.inputs = selected_utxos;

        self.set_redeemer_indexes();
        self.set_collateral_return(collateral_change_address.or(change_address), &pparams)?;
        self.update_execution_units(
            change_address,
            merge_change,
            collateral_change_address,
            &pparams,
        )
        .await?;
        self.add_change_and_fee(change_address, merge_change, &pparams)?;

        let (hash, bytes) = self.assemble_tx(&pparams, TxVariant::Final)?;
        Ok(PendingTransaction::new(hash, bytes))
    }

    /// The candidate utxos selection may draw from: the explicitly loaded
    /// pool when one exists, otherwise everything sitting at the configured
    /// input addresses. Already-used, excluded and datum-locked utxos are
    /// filtered out.
    async fn selection_pool(&self, selected: &[Utxo]) -> Result<Vec<Utxo>, TxBuilderError> {
        let mut candidates = vec![];
        if self.loaded_utxos.is_empty() {
            for address in &self.input_addresses {
                candidates.extend(self.context.utxos(address).await?);
            }
        } else {
            candidates = self.loaded_utxos.clone();
        }

        Ok(candidates
            .into_iter()
            .filter(|utxo| {
                !selected.contains(utxo)
                    && !self.excluded_inputs.contains(utxo)
                    && utxo.output.datum_hash().is_none()
            })
            .collect())
    }

    /// Spend redeemers take the position of their input in the id-sorted
    /// input set; minting redeemers take the position of their policy in the
    /// mint map.
    fn set_redeemer_indexes(&mut self) {
        let mut sorted = self.inputs.clone();
        sorted.sort_unstable_by_key(|utxo| (utxo.input.tx_id, utxo.input.index));

        for (index, utxo) in sorted.iter().enumerate() {
            if let Some(redeemer) = self.inputs_to_redeemers.get_mut(&utxo.cbor_key()) {
                if redeemer.tag == RedeemerTag::Spend {
                    redeemer.index = index as u32;
                }
            }
        }

        let policies: Vec<_> = self.mint.policies().copied().collect();
        for minting in &mut self.minting_scripts {
            if let Some(position) = policies
                .iter()
                .position(|policy| *policy == minting.script.hash())
            {
                minting.redeemer.index = position as u32;
            }
        }
    }

    /// When the transaction runs any Plutus script, reserve the collateral
    /// budget out of the collateral inputs and return the rest.
    fn set_collateral_return(
        &mut self,
        change_address: Option<&Address>,
        pparams: &ProtocolParameters,
    ) -> Result<(), TxBuilderError> {
        let (_, plutus_v1, plutus_v2) = self.partition_scripts();
        if plutus_v1.is_empty() && plutus_v2.is_empty() && self.reference_scripts.is_empty() {
            return Ok(());
        }
        let Some(address) = change_address else {
            return Ok(());
        };

        let budget = fee::max_tx_fee(pparams) * pparams.collateral_percent / 100;
        let total: Value = self
            .collaterals
            .iter()
            .map(|utxo| utxo.output.value.clone())
            .sum();

        if budget > total.coin() {
            return Err(TxBuilderError::InsufficientCollateral {
                provided: total.coin(),
                required: budget,
            });
        }

        let return_amount = total.coin() - budget;
        let return_output = Output::lovelace_only(address.clone(), return_amount);
        let min_coin = return_output.min_lovelace(pparams);
        if min_coin > return_amount {
            return Err(TxBuilderError::InsufficientCollateral {
                provided: total.coin(),
                required: budget + min_coin,
            });
        }

        self.collateral_return = Some(return_output);
        self.total_collateral = Some(budget);
        Ok(())
    }

    /// One round-trip through the execution oracle: rebuild the transaction
    /// on a copy with estimation disabled, evaluate it, and substitute the
    /// reported budgets (inflated by the configured buffers) back into the
    /// redeemers.
    async fn update_execution_units(
        &mut self,
        change_address: Option<&Address>,
        merge_change: bool,
        collateral_change_address: Option<&Address>,
        pparams: &ProtocolParameters,
    ) -> Result<(), TxBuilderError> {
        if !self.estimate_execution_units || self.redeemers().is_empty() {
            return Ok(());
        }

        let mut draft = self.clone();
        draft.estimate_execution_units = false;
        {
            let rebuild: LocalBoxFuture<'_, Result<PendingTransaction, TxBuilderError>> =
                Box::pin(draft.build(change_address, merge_change, collateral_change_address));
            rebuild.await?;
        }
        let (_, bytes) = draft.assemble_tx(pparams, TxVariant::EvaluationDraft)?;

        let estimates = self.context.evaluate_tx(&bytes).await?;
        debug!(count = estimates.len(), "oracle reported execution budgets");

        let memory_buffer = self.execution_memory_buffer;
        let step_buffer = self.execution_step_buffer;
        let buffered = |units: &ExUnits| ExUnits {
            mem: (units.mem as f64 * (1.0 + memory_buffer)) as u64,
            steps: (units.steps as f64 * (1.0 + step_buffer)) as u64,
        };

        for redeemer in self.inputs_to_redeemers.values_mut() {
            if let Some(units) = estimates.get(&redeemer.oracle_key()) {
                redeemer.ex_units = buffered(units);
            }
        }
        for minting in &mut self.minting_scripts {
            if let Some(units) = estimates.get(&minting.redeemer.oracle_key()) {
                minting.redeemer.ex_units = buffered(units);
            }
        }
        Ok(())
    }

    /// Two balancing passes: size the change against the current fee
    /// estimate, then re-estimate the fee with the change in place and
    /// recompute the change against it.
    fn add_change_and_fee(
        &mut self,
        change_address: Option<&Address>,
        merge_change: bool,
        pparams: &ProtocolParameters,
    ) -> Result<(), TxBuilderError> {
        let original_inputs = self.inputs.clone();
        let original_outputs = self.outputs.clone();

        let mut change_output_index = None;
        if let Some(address) = change_address {
            if merge_change {
                for (index, output) in original_outputs.iter().enumerate() {
                    if output.address == *address
                        && (change_output_index.is_none() || output.value.coin() == 0)
                    {
                        change_output_index = Some(index);
                    }
                }
            }

            self.fee = self.estimate_fee(pparams)?;
            let changes = self.calc_change(
                self.fee,
                &original_inputs,
                &original_outputs,
                address,
                !merge_change,
                pparams,
            )?;
            self.merge_changes(changes, change_output_index);
        }

        self.fee = self.estimate_fee(pparams)?;

        if let Some(address) = change_address {
            self.outputs = original_outputs.clone();
            let changes = self.calc_change(
                self.fee,
                &original_inputs,
                &original_outputs,
                address,
                !merge_change,
                pparams,
            )?;
            self.merge_changes(changes, change_output_index);
        }

        debug!(fee = self.fee, outputs = self.outputs.len(), "balanced");
        Ok(())
    }

    /// Fee for the current state, measured on a fully-formed fake
    /// transaction so witness overhead is already priced in.
    pub(crate) fn estimate_fee(&self, pparams: &ProtocolParameters) -> Result<i64, TxBuilderError> {
        let mut units = ExUnits::default();
        for redeemer in self.redeemers() {
            units.add(&redeemer.ex_units);
        }

        let (_, bytes) = self.assemble_tx(pparams, TxVariant::FeeDraft)?;
        Ok(fee::fee(
            pparams,
            bytes.len(),
            units.steps as i64,
            units.mem as i64,
        ))
    }

    fn partition_scripts(&self) -> (Vec<NativeScript>, Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let (mut native, mut plutus_v1, mut plutus_v2) = (vec![], vec![], vec![]);
        if self.datums.is_empty()
            && self.inputs_to_redeemers.is_empty()
            && self.minting_scripts.is_empty()
            && self.native_scripts.is_empty()
        {
            return (native, plutus_v1, plutus_v2);
        }

        for script in self.all_scripts() {
            match script {
                Script::Native(script) => native.push(script),
                Script::PlutusV1(bytes) => plutus_v1.push(bytes),
                Script::PlutusV2(bytes) => plutus_v2.push(bytes),
            }
        }
        (native, plutus_v1, plutus_v2)
    }

    /// The witness set as it will ship: scripts, datums and redeemers,
    /// without any signatures yet.
    pub fn build_witness_set(&self) -> WitnessSet {
        let plutus_data: Vec<PlutusData> = self.datums.values().cloned().collect();
        let redeemers: Vec<PallasRedeemer> = self
            .redeemers()
            .iter()
            .map(|redeemer| redeemer.to_pallas())
            .collect();
        self.make_witness_set(None, plutus_data, redeemers)
    }

    fn make_witness_set(
        &self,
        vkeywitness: Option<NonEmptySet<VKeyWitness>>,
        plutus_data: Vec<PlutusData>,
        redeemers: Vec<PallasRedeemer>,
    ) -> WitnessSet {
        let (native_script, plutus_v1_script, plutus_v2_script) = self.partition_scripts();

        let witness_set_datums = if !plutus_data.is_empty() {
            Some(NonEmptySet::from_vec(plutus_data).expect("datum list is non-empty"))
        } else {
            None
        };

        WitnessSet {
            vkeywitness,
            native_script: NonEmptySet::from_vec(
                native_script.into_iter().map(|x| x.into()).collect(),
            ),
            bootstrap_witness: None,
            plutus_v1_script: NonEmptySet::from_vec(
                plutus_v1_script
                    .into_iter()
                    .map(|bytes| PlutusScript::<1>(bytes.into()))
                    .collect(),
            ),
            plutus_v2_script: NonEmptySet::from_vec(
                plutus_v2_script
                    .into_iter()
                    .map(|bytes| PlutusScript::<2>(bytes.into()))
                    .collect(),
            ),
            plutus_v3_script: None,
            plutus_data: witness_set_datums,
            redeemer: if redeemers.is_empty() {
                None
            } else {
                Some(PallasRedeemers::List(MaybeIndefArray::Def(redeemers)).into())
            },
        }
    }

    /// One placeholder witness per distinct payment key among the spent
    /// addresses and the disclosed signers.
    fn fake_vkey_witnesses(&self) -> Option<NonEmptySet<VKeyWitness>> {
        let mut signers: HashSet<[u8; 28]> = HashSet::new();
        for utxo in self.inputs.iter().chain(self.collaterals.iter()) {
            if let Some(hash) = payment_key_hash(&utxo.output.address) {
                signers.insert(hash);
            }
        }
        for signer in &self.required_signers {
            let mut hash = [0u8; 28];
            hash.copy_from_slice(signer.as_ref());
            signers.insert(hash);
        }

        let count = signers.len().max(1);
        NonEmptySet::from_vec(
            (0..count)
                .map(|_| VKeyWitness {
                    vkey: FAKE_VKEY.to_vec().into(),
                    signature: FAKE_SIGNATURE.to_vec().into(),
                })
                .collect(),
        )
    }

    /// Serialize the transaction in the requested rendition, returning the
    /// body hash alongside the bytes.
    pub(crate) fn assemble_tx(
        &self,
        pparams: &ProtocolParameters,
        variant: TxVariant,
    ) -> Result<(TxHash, Vec<u8>), TxBuilderError> {
        let mut inputs: Vec<_> = self
            .inputs
            .iter()
            .map(|utxo| utxo.input.to_pallas())
            .collect();
        inputs.sort_unstable_by_key(|x| (x.transaction_id, x.index));

        let outputs: Vec<_> = self.outputs.iter().map(Output::to_pallas).collect();

        let mut mint: BTreeMap<Hash<28>, BTreeMap<Bytes, NonZeroInt>> = BTreeMap::new();
        for (policy, assets) in self.mint.iter() {
            for (name, amount) in assets {
                let Ok(amount) = NonZeroInt::try_from(*amount) else {
                    continue;
                };
                mint.entry(*policy)
                    .or_default()
                    .insert(name.clone().into(), amount);
            }
        }
        let mint: Option<Multiasset<NonZeroInt>> = (!mint.is_empty()).then(|| {
            mint.into_iter()
                .map(|(policy, assets)| {
                    let assets: NonEmptyKeyValuePairs<Bytes, NonZeroInt> = assets
                        .into_iter()
                        .collect::<Vec<_>>()
                        .try_into()
                        .unwrap();
                    (policy, assets)
                })
                .collect::<Vec<_>>()
                .try_into()
                .unwrap()
        });

        let collateral = NonEmptySet::from_vec(
            self.collaterals
                .iter()
                .map(|utxo| utxo.input.to_pallas())
                .collect(),
        );

        let required_signers = NonEmptySet::from_vec(self.required_signers.clone());

        let withdrawals = if self.withdrawals.is_empty() {
            None
        } else {
            Some(
                self.withdrawals
                    .iter()
                    .map(|(account, amount)| (Bytes::from(account.clone()), *amount))
                    .collect::<Vec<_>>()
                    .try_into()
                    .unwrap(),
            )
        };

        let reference_inputs = NonEmptySet::from_vec(
            self.reference_inputs
                .iter()
                .map(|input| input.to_pallas())
                .collect(),
        );

        let certificates = NonEmptySet::from_vec(self.certificates.clone());

        let collateral_return = self.collateral_return.as_ref().map(Output::to_pallas);

        let plutus_data: Vec<PlutusData> = self.datums.values().cloned().collect();
        let redeemers: Vec<PallasRedeemer> = self
            .redeemers()
            .iter()
            .map(|redeemer| redeemer.to_pallas())
            .collect();

        let script_data_hash = if plutus_data.is_empty() && redeemers.is_empty() {
            None
        } else {
            let cost_models = if redeemers.is_empty() {
                BTreeMap::new()
            } else {
                pparams.cost_models.clone()
            };
            Some(script_data_hash(&redeemers, &plutus_data, &cost_models))
        };

        let vkeywitness = match variant {
            TxVariant::FeeDraft | TxVariant::EvaluationDraft => self.fake_vkey_witnesses(),
            TxVariant::Final => None,
        };
        let witness_set = self.make_witness_set(vkeywitness, plutus_data, redeemers);

        let fee = match variant {
            TxVariant::FeeDraft if self.fee == 0 => fee::max_tx_fee(pparams),
            _ => self.fee,
        };

        let auxiliary_data_hash: Option<Bytes> = self
            .auxiliary_data
            .as_ref()
            .map(|data| data.compute_hash().to_vec().into());

        let pallas_tx: Tx = Tx {
            transaction_body: TransactionBody {
                inputs: Set::from(inputs),
                outputs,
                fee: fee.max(0) as u64,
                ttl: self.ttl,
                validity_interval_start: self.validity_start,
                certificates,
                withdrawals,
                auxiliary_data_hash,
                mint,
                script_data_hash,
                collateral,
                required_signers,
                network_id: None,
                collateral_return,
                total_collateral: self.total_collateral.map(|coin| coin.max(0) as u64),
                reference_inputs,
                voting_procedures: None,
                proposal_procedures: None,
                treasury_value: None,
                donation: None,
            }
            .into(),
            transaction_witness_set: witness_set.into(),
            success: !matches!(variant, TxVariant::EvaluationDraft),
            auxiliary_data: self.auxiliary_data.clone().into(),
        };

        let hash = pallas_tx.transaction_body.compute_hash();
        let bytes = pallas_tx
            .encode_fragment()
            .expect("failed to encode transaction");

        if matches!(variant, TxVariant::FeeDraft) && bytes.len() as u64 > pparams.max_tx_size {
            return Err(TxBuilderError::TransactionTooBig {
                actual: bytes.len(),
                maximum: pparams.max_tx_size as usize,
            });
        }

        Ok((hash, bytes))
    }
}

/// Payment key hash of a Shelley address, when it has one.
///
/// Header (1 byte): type (4 bits) | network (4 bits); even types up to 7
/// carry a payment key hash at bytes 1..29.
fn payment_key_hash(address: &Address) -> Option<[u8; 28]> {
    let bytes = address.to_vec();
    let header = *bytes.first()?;
    let type_id = (header & 0xF0) >> 4;
    if type_id <= 7 && type_id % 2 == 0 && bytes.len() >= 29 {
        let mut hash = [0u8; 28];
        hash.copy_from_slice(&bytes[1..29]);
        Some(hash)
    } else {
        None
    }
}
