//! The storage fetch contract.

use std::collections::{HashMap, HashSet};

use posd_consensus::Hash256;
use posd_primitives::outpoint::OutPoint;
use posd_storage::StoreError;

use crate::coins::UnspentOutput;

/// Answer for one outpoint in a [`FetchCoinsResponse`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fetched<'a> {
    /// Storage holds the coin.
    Found(&'a UnspentOutput),
    /// Requested, and storage has no record of it (never created, or spent
    /// and compacted away).
    Unknown,
    /// The response carries no entry for this key at all.
    NotRequested,
}

impl<'a> Fetched<'a> {
    pub fn found(self) -> Option<&'a UnspentOutput> {
        match self {
            Fetched::Found(entry) => Some(entry),
            Fetched::Unknown | Fetched::NotRequested => None,
        }
    }
}

/// Result of one [`CoinView::fetch_coins`] call.
#[derive(Clone, Debug, Default)]
pub struct FetchCoinsResponse {
    unspent_outputs: HashMap<OutPoint, Option<UnspentOutput>>,
}

impl FetchCoinsResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            unspent_outputs: HashMap::with_capacity(capacity),
        }
    }

    /// Records the answer for `outpoint`; `None` means storage has no record.
    pub fn insert(&mut self, outpoint: OutPoint, entry: Option<UnspentOutput>) {
        self.unspent_outputs.insert(outpoint, entry);
    }

    pub fn get(&self, outpoint: &OutPoint) -> Fetched<'_> {
        match self.unspent_outputs.get(outpoint) {
            Some(Some(entry)) => Fetched::Found(entry),
            Some(None) => Fetched::Unknown,
            None => Fetched::NotRequested,
        }
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.unspent_outputs.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.unspent_outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unspent_outputs.is_empty()
    }

    pub fn outpoints(&self) -> impl Iterator<Item = &OutPoint> {
        self.unspent_outputs.keys()
    }

    /// First requested key the response does not answer, if any.
    pub fn first_unserviced<'a>(&self, requested: &'a HashSet<OutPoint>) -> Option<&'a OutPoint> {
        requested.iter().find(|outpoint| !self.contains(outpoint))
    }

    /// Entries in the shape the unspent-output set loads; unknown keys become `None`.
    pub fn into_unspent_outputs(self) -> Vec<Option<UnspentOutput>> {
        self.unspent_outputs.into_values().collect()
    }
}

impl FromIterator<(OutPoint, Option<UnspentOutput>)> for FetchCoinsResponse {
    fn from_iter<I: IntoIterator<Item = (OutPoint, Option<UnspentOutput>)>>(iter: I) -> Self {
        Self {
            unspent_outputs: iter.into_iter().collect(),
        }
    }
}

/// Block hash and height identifying the chain state a coin view reflects.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct HashHeightPair {
    pub hash: Hash256,
    pub height: u32,
}

impl HashHeightPair {
    pub fn new(hash: Hash256, height: u32) -> Self {
        Self { hash, height }
    }

    pub fn encode(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(&self.hash);
        out[32..].copy_from_slice(&self.height.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 36 {
            return None;
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[..32]);
        let height = u32::from_le_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]);
        Some(Self { hash, height })
    }
}

/// Durable UTXO lookups as seen by validation.
pub trait CoinView: Send + Sync {
    /// Answers every key of `outpoints`, with `None` for coins storage does not hold.
    fn fetch_coins(&self, outpoints: &HashSet<OutPoint>) -> Result<FetchCoinsResponse, StoreError>;

    /// Chain position the stored coins reflect, `None` for an empty view.
    fn get_tip_hash(&self) -> Result<Option<HashHeightPair>, StoreError>;
}

impl<T: CoinView + ?Sized> CoinView for std::sync::Arc<T> {
    fn fetch_coins(&self, outpoints: &HashSet<OutPoint>) -> Result<FetchCoinsResponse, StoreError> {
        self.as_ref().fetch_coins(outpoints)
    }

    fn get_tip_hash(&self) -> Result<Option<HashHeightPair>, StoreError> {
        self.as_ref().get_tip_hash()
    }
}
