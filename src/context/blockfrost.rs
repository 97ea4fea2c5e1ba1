use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pallas::ledger::addresses::Address;
use pallas::ledger::primitives::conway::PlutusData;
use pallas::ledger::primitives::Fragment;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ChainContext, ContextError};
use crate::params::{GenesisParameters, Network, ProtocolParameters};
use crate::primitives::{
    DatumOption, ExUnits, Hash, Input, MultiAsset, Output, TxHash, Utxo, Value,
};

/// Slow-moving chain data is refreshed at most this often.
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

impl<T: Clone> Cached<T> {
    fn fresh(&self) -> Option<T> {
        (self.fetched_at.elapsed() < CACHE_TTL).then(|| self.value.clone())
    }
}

/// Chain-context over the Blockfrost HTTP API.
///
/// `base_url` carries the API version prefix, e.g.
/// `https://cardano-mainnet.blockfrost.io/api/v0`.
#[derive(Clone)]
pub struct BlockfrostContext {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    network: Network,
    epoch: Arc<Mutex<Option<Cached<u64>>>>,
    protocol_params: Arc<Mutex<Option<Cached<ProtocolParameters>>>>,
    genesis_params: Arc<Mutex<Option<Cached<GenesisParameters>>>>,
}

impl BlockfrostContext {
    pub fn new(project_id: impl Into<String>, network: Network, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            project_id: project_id.into(),
            network,
            epoch: Arc::new(Mutex::new(None)),
            protocol_params: Arc::new(Mutex::new(None)),
            genesis_params: Arc::new(Mutex::new(None)),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ContextError> {
        debug!(path, "blockfrost request");
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .header("project_id", &self.project_id)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ContextError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn post_cbor<T: DeserializeOwned>(
        &self,
        path: &str,
        body: impl Into<reqwest::Body>,
    ) -> Result<T, ContextError> {
        debug!(path, "blockfrost request");
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .header("project_id", &self.project_id)
            .header("Content-Type", "application/cbor")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ContextError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

impl ChainContext for BlockfrostContext {
    fn network(&self) -> Network {
        self.network
    }

    async fn epoch(&self) -> Result<u64, ContextError> {
        let mut cache = self.epoch.lock().await;
        if let Some(epoch) = cache.as_ref().and_then(Cached::fresh) {
            return Ok(epoch);
        }

        let latest: LatestEpoch = self.get_json("epochs/latest").await?;
        *cache = Some(Cached {
            value: latest.epoch,
            fetched_at: Instant::now(),
        });
        Ok(latest.epoch)
    }

    async fn last_block_slot(&self) -> Result<u64, ContextError> {
        let block: LatestBlock = self.get_json("blocks/latest").await?;
        Ok(block.slot)
    }

    async fn protocol_params(&self) -> Result<ProtocolParameters, ContextError> {
        let mut cache = self.protocol_params.lock().await;
        if let Some(params) = cache.as_ref().and_then(Cached::fresh) {
            return Ok(params);
        }

        let raw: RawProtocolParameters = self.get_json("epochs/latest/parameters").await?;
        let params: ProtocolParameters = raw.try_into()?;
        *cache = Some(Cached {
            value: params.clone(),
            fetched_at: Instant::now(),
        });
        Ok(params)
    }

    async fn genesis_params(&self) -> Result<GenesisParameters, ContextError> {
        let mut cache = self.genesis_params.lock().await;
        if let Some(params) = cache.as_ref().and_then(Cached::fresh) {
            return Ok(params);
        }

        let raw: RawGenesis = self.get_json("genesis").await?;
        let params: GenesisParameters = raw.try_into()?;
        *cache = Some(Cached {
            value: params.clone(),
            fetched_at: Instant::now(),
        });
        Ok(params)
    }

    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>, ContextError> {
        let bech32 = address
            .to_bech32()
            .map_err(|e| ContextError::Parse(format!("address is not bech32-encodable: {e:?}")))?;

        let mut utxos = vec![];
        for page in 1.. {
            let batch: Vec<RawAddressUtxo> = self
                .get_json(&format!("addresses/{bech32}/utxos?page={page}"))
                .await?;
            if batch.is_empty() {
                break;
            }
            for raw in batch {
                utxos.push(raw.into_utxo(address)?);
            }
        }

        debug!(count = utxos.len(), "fetched address utxos");
        Ok(utxos)
    }

    async fn evaluate_tx(&self, cbor: &[u8]) -> Result<BTreeMap<String, ExUnits>, ContextError> {
        let response: EvaluateResponse = self
            .post_cbor("utils/txs/evaluate", hex::encode(cbor))
            .await?;

        let budgets = response
            .result
            .evaluation_result
            .ok_or_else(|| ContextError::Evaluation("no evaluation result".into()))?;

        Ok(budgets
            .into_iter()
            .map(|(key, units)| {
                (
                    key,
                    ExUnits {
                        mem: units.memory,
                        steps: units.steps,
                    },
                )
            })
            .collect())
    }

    async fn submit_tx(&self, cbor: &[u8]) -> Result<TxHash, ContextError> {
        let tx_id: String = self.post_cbor("tx/submit", cbor.to_vec()).await?;
        parse_hash::<32>(&tx_id, "transaction id")
    }
}

fn parse_num<T: FromStr>(value: &str, field: &'static str) -> Result<T, ContextError> {
    value
        .parse()
        .map_err(|_| ContextError::Parse(format!("{field} is not a number: {value}")))
}

fn parse_hash<const N: usize>(value: &str, field: &'static str) -> Result<Hash<N>, ContextError> {
    let bytes = hex::decode(value)
        .map_err(|_| ContextError::Parse(format!("{field} is not hex: {value}")))?;
    let bytes: [u8; N] = bytes
        .try_into()
        .map_err(|_| ContextError::Parse(format!("{field} has the wrong length")))?;
    Ok(Hash::from(bytes))
}

// -----------
// Wire models
// -----------

#[derive(Debug, Deserialize)]
struct LatestBlock {
    slot: u64,
}

#[derive(Debug, Deserialize)]
struct LatestEpoch {
    epoch: u64,
}

#[derive(Debug, Deserialize)]
struct RawProtocolParameters {
    min_fee_a: i64,
    min_fee_b: i64,
    max_tx_size: u64,
    max_val_size: String,
    key_deposit: String,
    pool_deposit: String,
    price_mem: f64,
    price_step: f64,
    max_tx_ex_mem: String,
    max_tx_ex_steps: String,
    coins_per_utxo_size: String,
    collateral_percent: i64,
    max_collateral_inputs: u64,
    #[serde(default)]
    cost_models_raw: Option<BTreeMap<String, Vec<i64>>>,
}

impl TryFrom<RawProtocolParameters> for ProtocolParameters {
    type Error = ContextError;

    fn try_from(raw: RawProtocolParameters) -> Result<Self, ContextError> {
        let mut cost_models = BTreeMap::new();
        for (language, model) in raw.cost_models_raw.unwrap_or_default() {
            match language.as_str() {
                "PlutusV1" => {
                    cost_models.insert(0, model);
                }
                "PlutusV2" => {
                    cost_models.insert(1, model);
                }
                // later languages are irrelevant to the scripts we build for
                _ => {}
            }
        }

        Ok(Self {
            min_fee_a: raw.min_fee_a,
            min_fee_b: raw.min_fee_b,
            max_tx_size: raw.max_tx_size,
            max_val_size: parse_num(&raw.max_val_size, "max_val_size")?,
            key_deposit: parse_num(&raw.key_deposit, "key_deposit")?,
            pool_deposit: parse_num(&raw.pool_deposit, "pool_deposit")?,
            price_mem: raw.price_mem,
            price_step: raw.price_step,
            max_tx_ex_mem: parse_num(&raw.max_tx_ex_mem, "max_tx_ex_mem")?,
            max_tx_ex_steps: parse_num(&raw.max_tx_ex_steps, "max_tx_ex_steps")?,
            coins_per_utxo_byte: parse_num(&raw.coins_per_utxo_size, "coins_per_utxo_size")?,
            collateral_percent: raw.collateral_percent,
            max_collateral_inputs: raw.max_collateral_inputs,
            cost_models,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawGenesis {
    active_slots_coefficient: f64,
    update_quorum: u64,
    max_lovelace_supply: String,
    network_magic: u64,
    epoch_length: u64,
    system_start: u64,
    slots_per_kes_period: u64,
    slot_length: u64,
    max_kes_evolutions: u64,
    security_param: u64,
}

impl TryFrom<RawGenesis> for GenesisParameters {
    type Error = ContextError;

    fn try_from(raw: RawGenesis) -> Result<Self, ContextError> {
        Ok(Self {
            active_slots_coefficient: raw.active_slots_coefficient,
            update_quorum: raw.update_quorum,
            max_lovelace_supply: parse_num(&raw.max_lovelace_supply, "max_lovelace_supply")?,
            network_magic: raw.network_magic,
            epoch_length: raw.epoch_length,
            system_start: raw.system_start,
            slots_per_kes_period: raw.slots_per_kes_period,
            slot_length: raw.slot_length,
            max_kes_evolutions: raw.max_kes_evolutions,
            security_param: raw.security_param,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawAddressUtxo {
    tx_hash: String,
    output_index: u64,
    amount: Vec<RawAmount>,
    data_hash: Option<String>,
    inline_datum: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAmount {
    unit: String,
    quantity: String,
}

impl RawAddressUtxo {
    fn into_utxo(self, address: &Address) -> Result<Utxo, ContextError> {
        let mut coin = 0i64;
        let mut assets = MultiAsset::new();

        for entry in &self.amount {
            if entry.unit == "lovelace" {
                coin += parse_num::<i64>(&entry.quantity, "lovelace quantity")?;
            } else if entry.unit.len() >= 56 {
                let policy = parse_hash::<28>(&entry.unit[..56], "policy id")?;
                let name = hex::decode(&entry.unit[56..])
                    .map_err(|_| ContextError::Parse(format!("asset name is not hex: {}", entry.unit)))?;
                assets.add_asset(policy, name, parse_num(&entry.quantity, "asset quantity")?);
            } else {
                return Err(ContextError::Parse(format!("malformed unit: {}", entry.unit)));
            }
        }

        let mut output = Output::new(address.clone(), Value::new(coin, assets));
        match (&self.data_hash, &self.inline_datum) {
            (_, Some(inline)) => {
                let bytes = hex::decode(inline)
                    .map_err(|_| ContextError::Parse("inline datum is not hex".into()))?;
                let data = PlutusData::decode_fragment(&bytes)
                    .map_err(|_| ContextError::Parse("inline datum is not plutus data".into()))?;
                output.datum = Some(DatumOption::Inline(data));
            }
            (Some(hash), None) => {
                output.datum = Some(DatumOption::Hash(parse_hash::<32>(hash, "datum hash")?));
            }
            (None, None) => {}
        }

        Ok(Utxo::new(
            Input::new(parse_hash::<32>(&self.tx_hash, "tx hash")?, self.output_index),
            output,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct EvaluateResponse {
    result: EvaluateResult,
}

#[derive(Debug, Deserialize)]
struct EvaluateResult {
    #[serde(rename = "EvaluationResult")]
    evaluation_result: Option<BTreeMap<String, RawExUnits>>,
}

#[derive(Debug, Deserialize)]
struct RawExUnits {
    memory: u64,
    steps: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parameters_parse_from_blockfrost_json() {
        let raw: RawProtocolParameters = serde_json::from_str(
            r#"{
                "min_fee_a": 44,
                "min_fee_b": 155381,
                "max_tx_size": 16384,
                "max_val_size": "5000",
                "key_deposit": "2000000",
                "pool_deposit": "500000000",
                "price_mem": 0.0577,
                "price_step": 0.0000721,
                "max_tx_ex_mem": "14000000",
                "max_tx_ex_steps": "10000000000",
                "coins_per_utxo_size": "4310",
                "collateral_percent": 150,
                "max_collateral_inputs": 3,
                "cost_models_raw": { "PlutusV2": [1, 2, 3] }
            }"#,
        )
        .expect("deserialize");

        let params: ProtocolParameters = raw.try_into().expect("convert");
        assert_eq!(params.max_val_size, 5000);
        assert_eq!(params.coins_per_utxo_byte, 4310);
        assert_eq!(params.cost_models.get(&1), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn address_utxo_parses_lovelace_and_assets() {
        let address = Address::from_bech32(
            "addr1v8xrqjtlfluk9axpmjj5enh0uw0cduwhz7txsqyl36m3ukgqdsn8w",
        )
        .expect("address");

        let raw: RawAddressUtxo = serde_json::from_str(
            r#"{
                "tx_hash": "d2153af861591c5cfe039de304f1e408edbf8bbfc7854621625bb74a4f6cd5cb",
                "output_index": 1,
                "amount": [
                    { "unit": "lovelace", "quantity": "5000000" },
                    {
                        "unit": "0101010101010101010101010101010101010101010101010101010174657374",
                        "quantity": "7"
                    }
                ],
                "data_hash": null,
                "inline_datum": null
            }"#,
        )
        .expect("deserialize");

        let utxo = raw.into_utxo(&address).expect("convert");
        assert_eq!(utxo.input.index, 1);
        assert_eq!(utxo.output.value.coin(), 5_000_000);
        assert_eq!(
            utxo.output
                .value
                .assets()
                .get(&Hash::from([1u8; 28]), b"test"),
            7
        );
    }
}
