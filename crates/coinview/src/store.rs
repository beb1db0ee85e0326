//! Coin view persisted in a [`KeyValueStore`].

use std::collections::HashSet;

use posd_primitives::outpoint::OutPoint;
use posd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::coins::{Coins, UnspentOutput};
use crate::error::CoinViewFault;
use crate::fetch::{CoinView, FetchCoinsResponse, HashHeightPair};
use crate::unspent::UnspentOutputSet;

const TIP_KEY: &[u8] = b"coinview_tip";

pub struct StoreCoinView<S> {
    store: S,
}

impl<S: KeyValueStore> StoreCoinView<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get(&self, outpoint: &OutPoint) -> Result<Option<UnspentOutput>, CoinViewFault> {
        match self.store.get(Column::Utxo, &outpoint.to_bytes())? {
            Some(bytes) => Ok(Some(UnspentOutput::new(*outpoint, Coins::decode(&bytes)?))),
            None => Ok(None),
        }
    }

    /// Writes a connected block's outcome in one batch: spent entries are
    /// deleted, live ones stored, and the tip moves to `new_tip`.
    pub fn save_changes(
        &self,
        set: &UnspentOutputSet,
        new_tip: HashHeightPair,
    ) -> Result<(), CoinViewFault> {
        let entries = set.get_coins();
        let mut batch = WriteBatch::new();
        batch.reserve(entries.len() + 1);
        let mut spent = 0usize;
        for entry in &entries {
            let key = entry.outpoint.to_bytes();
            match entry.coins() {
                Some(coins) => batch.put(Column::Utxo, key, coins.encode()),
                None => {
                    spent += 1;
                    batch.delete(Column::Utxo, key);
                }
            }
        }
        batch.put(Column::Meta, TIP_KEY, new_tip.encode());
        self.store.write_batch(&batch)?;
        posd_log::log_debug!(
            "coin view at height {}: {} written, {} spent",
            new_tip.height,
            entries.len() - spent,
            spent
        );
        Ok(())
    }

    fn fetch_one(&self, outpoint: &OutPoint) -> Result<Option<UnspentOutput>, StoreError> {
        self.get(outpoint).map_err(|err| match err {
            CoinViewFault::Store(err) => err,
            other => StoreError::Backend(format!("utxo {outpoint}: {other}")),
        })
    }
}

impl<S: KeyValueStore> CoinView for StoreCoinView<S> {
    fn fetch_coins(&self, outpoints: &HashSet<OutPoint>) -> Result<FetchCoinsResponse, StoreError> {
        let mut response = FetchCoinsResponse::with_capacity(outpoints.len());
        for outpoint in outpoints {
            response.insert(*outpoint, self.fetch_one(outpoint)?);
        }
        Ok(response)
    }

    fn get_tip_hash(&self) -> Result<Option<HashHeightPair>, StoreError> {
        match self.store.get(Column::Meta, TIP_KEY)? {
            Some(bytes) => HashHeightPair::decode(&bytes)
                .map(Some)
                .ok_or_else(|| StoreError::Backend("coin view tip record is corrupt".to_string())),
            None => Ok(None),
        }
    }
}
