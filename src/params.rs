use std::collections::BTreeMap;

/// Network the chain-context is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Ledger network id: mainnet is 1, every test network is 0.
    pub fn value(&self) -> u8 {
        match self {
            Network::Mainnet => 1,
            Network::Testnet => 0,
        }
    }
}

/// The protocol parameters the builder consumes.
///
/// This is a view over whatever the chain-context fetched; only the fields
/// that feed fee, deposit, size and collateral arithmetic are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolParameters {
    /// Fee per transaction byte.
    pub min_fee_a: i64,
    /// Flat fee component.
    pub min_fee_b: i64,
    pub max_tx_size: u64,
    /// Upper bound on the serialized value of a single output.
    pub max_val_size: u64,
    pub key_deposit: i64,
    pub pool_deposit: i64,
    /// Fee per script execution memory unit.
    pub price_mem: f64,
    /// Fee per script execution step.
    pub price_step: f64,
    pub max_tx_ex_mem: i64,
    pub max_tx_ex_steps: i64,
    pub coins_per_utxo_byte: u64,
    pub collateral_percent: i64,
    pub max_collateral_inputs: u64,
    /// Plutus cost models keyed by language (0 = V1, 1 = V2).
    pub cost_models: BTreeMap<u64, Vec<i64>>,
}

impl ProtocolParameters {
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            min_fee_a: 44,
            min_fee_b: 155_381,
            max_tx_size: 16_384,
            max_val_size: 5_000,
            key_deposit: 2_000_000,
            pool_deposit: 500_000_000,
            price_mem: 0.0577,
            price_step: 0.000_072_1,
            max_tx_ex_mem: 14_000_000,
            max_tx_ex_steps: 10_000_000_000,
            coins_per_utxo_byte: 4_310,
            collateral_percent: 150,
            max_collateral_inputs: 3,
            cost_models: BTreeMap::from([(0, vec![205_665, 812, 1, 1]), (1, vec![205_665, 812, 1])]),
        }
    }
}

/// Genesis-time chain constants, surfaced for callers that need slot
/// arithmetic; the builder itself never consults them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenesisParameters {
    pub active_slots_coefficient: f64,
    pub update_quorum: u64,
    pub max_lovelace_supply: i64,
    pub network_magic: u64,
    pub epoch_length: u64,
    pub system_start: u64,
    pub slots_per_kes_period: u64,
    pub slot_length: u64,
    pub max_kes_evolutions: u64,
    pub security_param: u64,
}
