use std::collections::BTreeMap;
use std::ops::{Add, Sub};

use pallas::codec::utils::Bytes;
use pallas::crypto::hash::Hash;
use pallas::ledger::primitives::conway::{Multiasset, Value as PallasValue};
use pallas::ledger::primitives::{NonEmptyKeyValuePairs, PositiveCoin};

pub type PolicyId = Hash<28>;
pub type AssetName = Vec<u8>;

/// Native-token holdings indexed policy -> asset name -> quantity.
///
/// Quantities are signed so intermediate balancing arithmetic can dip below
/// zero; a value destined for a transaction output must be non-negative in
/// every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiAsset(BTreeMap<PolicyId, BTreeMap<AssetName, i64>>);

impl MultiAsset {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, policy: &PolicyId, name: &[u8]) -> i64 {
        self.0
            .get(policy)
            .and_then(|assets| assets.get(name))
            .copied()
            .unwrap_or(0)
    }

    pub fn set(&mut self, policy: PolicyId, name: AssetName, amount: i64) {
        self.0.entry(policy).or_default().insert(name, amount);
    }

    pub fn add_asset(&mut self, policy: PolicyId, name: AssetName, amount: i64) {
        *self.0.entry(policy).or_default().entry(name).or_insert(0) += amount;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PolicyId, &BTreeMap<AssetName, i64>)> {
        self.0.iter()
    }

    pub fn policies(&self) -> impl Iterator<Item = &PolicyId> {
        self.0.keys()
    }

    /// Keeps only the entries for which the predicate holds.
    pub fn filter<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&PolicyId, &AssetName, i64) -> bool,
    {
        let mut out = Self::new();
        for (policy, assets) in &self.0 {
            for (name, amount) in assets {
                if keep(policy, name, *amount) {
                    out.set(*policy, name.clone(), *amount);
                }
            }
        }
        out
    }

    /// Drops zero-quantity entries, then any policy whose inner map emptied.
    pub fn remove_zero_assets(mut self) -> Self {
        for assets in self.0.values_mut() {
            assets.retain(|_, amount| *amount != 0);
        }
        self.0.retain(|_, assets| !assets.is_empty());
        self
    }

    /// Pointwise `self <= other`, where a missing entry counts as zero.
    pub fn less_or_equal(&self, other: &Self) -> bool {
        self.0.iter().all(|(policy, assets)| {
            assets
                .iter()
                .all(|(name, amount)| *amount <= other.get(policy, name))
        }) && other.0.iter().all(|(policy, assets)| {
            assets
                .iter()
                .all(|(name, amount)| self.get(policy, name) <= *amount)
        })
    }

    pub fn to_pallas(&self) -> Option<Multiasset<PositiveCoin>> {
        let mut assets: BTreeMap<Hash<28>, BTreeMap<Bytes, PositiveCoin>> = BTreeMap::new();

        for (policy, names) in &self.0 {
            for (name, amount) in names {
                let Ok(amount) = PositiveCoin::try_from(u64::try_from(*amount).unwrap_or(0))
                else {
                    continue;
                };
                assets
                    .entry(*policy)
                    .or_default()
                    .insert(name.clone().into(), amount);
            }
        }
        assets.retain(|_, names| !names.is_empty());

        (!assets.is_empty()).then(|| {
            assets
                .into_iter()
                .map(|(policy, names)| {
                    let names: NonEmptyKeyValuePairs<Bytes, PositiveCoin> = names
                        .into_iter()
                        .collect::<Vec<_>>()
                        .try_into()
                        .unwrap();
                    (policy, names)
                })
                .collect::<Vec<_>>()
                .try_into()
                .unwrap()
        })
    }
}

impl Add for MultiAsset {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        for (policy, assets) in rhs.0 {
            for (name, amount) in assets {
                self.add_asset(policy, name, amount);
            }
        }
        self
    }
}

impl Sub for MultiAsset {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        for (policy, assets) in rhs.0 {
            for (name, amount) in assets {
                self.add_asset(policy, name, -amount);
            }
        }
        self
    }
}

/// An additive bundle of lovelace plus native assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value {
    coin: i64,
    assets: MultiAsset,
}

impl Value {
    pub fn new(coin: i64, assets: MultiAsset) -> Self {
        Self { coin, assets }
    }

    pub fn from_lovelace(coin: i64) -> Self {
        Self {
            coin,
            assets: MultiAsset::new(),
        }
    }

    pub fn coin(&self) -> i64 {
        self.coin
    }

    pub fn assets(&self) -> &MultiAsset {
        &self.assets
    }

    pub fn has_assets(&self) -> bool {
        !self.assets.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self.coin == 0 && self.assets.is_empty()
    }

    pub fn set_lovelace(&mut self, coin: i64) {
        self.coin = coin;
    }

    pub fn add_lovelace(&mut self, coin: i64) {
        self.coin += coin;
    }

    pub fn sub_lovelace(&mut self, coin: i64) {
        self.coin -= coin;
    }

    pub fn add_assets(&mut self, assets: MultiAsset) {
        self.assets = std::mem::take(&mut self.assets) + assets;
    }

    pub fn set_multi_asset(&mut self, assets: MultiAsset) {
        self.assets = assets;
    }

    pub fn remove_zero_assets(mut self) -> Self {
        self.assets = self.assets.remove_zero_assets();
        self
    }

    /// Pointwise `self <= other` over the coin and every asset entry.
    pub fn less_or_equal(&self, other: &Self) -> bool {
        self.coin <= other.coin && self.assets.less_or_equal(&other.assets)
    }

    pub fn to_pallas(&self) -> PallasValue {
        let coin = u64::try_from(self.coin).unwrap_or(0);
        match self.assets.to_pallas() {
            Some(assets) => PallasValue::Multiasset(coin, assets),
            None => PallasValue::Coin(coin),
        }
    }
}

impl Add for Value {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            coin: self.coin + rhs.coin,
            assets: self.assets + rhs.assets,
        }
    }
}

impl Sub for Value {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            coin: self.coin - rhs.coin,
            assets: self.assets - rhs.assets,
        }
    }
}

impl std::iter::Sum for Value {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, v| acc + v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(byte: u8) -> PolicyId {
        Hash::from([byte; 28])
    }

    fn sample() -> Value {
        let mut assets = MultiAsset::new();
        assets.set(policy(1), b"tokenA".to_vec(), 7);
        assets.set(policy(2), b"tokenB".to_vec(), 3);
        Value::new(1_000_000, assets)
    }

    #[test]
    fn add_is_commutative() {
        let a = sample();
        let mut b = Value::from_lovelace(500);
        b.add_assets({
            let mut m = MultiAsset::new();
            m.set(policy(1), b"tokenA".to_vec(), 2);
            m
        });

        assert_eq!(a.clone() + b.clone(), b + a);
    }

    #[test]
    fn add_is_associative() {
        let a = sample();
        let b = Value::from_lovelace(11);
        let c = sample();

        assert_eq!(
            (a.clone() + b.clone()) + c.clone(),
            a + (b + c)
        );
    }

    #[test]
    fn sub_inverts_add() {
        let v = sample();
        let sum = v.clone() + v.clone();

        assert_eq!(
            (sum - v.clone()).remove_zero_assets(),
            v.remove_zero_assets()
        );
    }

    #[test]
    fn sub_may_go_negative() {
        let a = Value::from_lovelace(5);
        let b = sample();
        let diff = a - b.clone();

        assert_eq!(diff.coin(), 5 - 1_000_000);
        assert_eq!(diff.assets().get(&policy(1), b"tokenA"), -7);
    }

    #[test]
    fn less_or_equal_is_reflexive() {
        let v = sample();
        assert!(v.less_or_equal(&v));
    }

    #[test]
    fn less_or_equal_is_pointwise() {
        let small = sample();
        let mut big = sample();
        big.add_lovelace(1);
        assert!(small.less_or_equal(&big));
        assert!(!big.less_or_equal(&small));

        // an asset dimension missing on the right counts as zero there
        let mut extra = MultiAsset::new();
        extra.set(policy(9), b"ghost".to_vec(), 1);
        let mut with_extra = sample();
        with_extra.add_assets(extra);
        assert!(!with_extra.less_or_equal(&big));
    }

    #[test]
    fn remove_zero_assets_drops_empty_policies() {
        let mut assets = MultiAsset::new();
        assets.set(policy(1), b"tokenA".to_vec(), 0);
        assets.set(policy(2), b"tokenB".to_vec(), 4);
        let trimmed = Value::new(10, assets).remove_zero_assets();

        assert_eq!(trimmed.assets().get(&policy(2), b"tokenB"), 4);
        assert!(trimmed.assets().policies().all(|p| *p != policy(1)));
    }

    #[test]
    fn pallas_value_is_coin_only_without_assets() {
        let v = Value::from_lovelace(42);
        assert_eq!(v.to_pallas(), PallasValue::Coin(42));
    }
}
