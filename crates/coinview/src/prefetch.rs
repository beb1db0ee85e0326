//! Works out which stored coins a block needs before it can be connected.

use std::collections::HashSet;
use std::sync::Arc;

use posd_consensus::Hash256;
use posd_primitives::block::Block;
use posd_primitives::outpoint::OutPoint;
use posd_primitives::transaction::Transaction;

use crate::error::CoinViewFault;
use crate::fanout::Fanout;
use crate::fetch::CoinView;
use crate::unspent::UnspentOutputSet;

pub struct CoinviewHelper {
    fanout: Arc<Fanout>,
}

impl CoinviewHelper {
    pub fn new(fanout: Arc<Fanout>) -> Self {
        Self { fanout }
    }

    /// Outpoints to load from storage for `block`.
    ///
    /// Inputs spending a transaction of the same block are skipped; those coins
    /// are created in memory while the block is applied. With `enforce_bip30`
    /// every output the block creates is requested too, so the caller can spot
    /// a transaction id that would overwrite a still-unspent one.
    pub fn get_ids_to_fetch(&self, block: &Block, enforce_bip30: bool) -> HashSet<OutPoint> {
        let txids = self
            .fanout
            .map_indexed(&block.transactions, |_, tx| tx.txid());
        let in_block: HashSet<Hash256> = txids.iter().copied().collect();

        let per_tx = self.fanout.map_indexed(&block.transactions, |idx, tx| {
            self.ids_for_transaction(tx, txids[idx], &in_block, enforce_bip30)
        });
        per_tx.into_iter().flatten().collect()
    }

    fn ids_for_transaction(
        &self,
        tx: &Transaction,
        txid: Hash256,
        in_block: &HashSet<Hash256>,
        enforce_bip30: bool,
    ) -> Vec<OutPoint> {
        let mut ids = Vec::new();
        if enforce_bip30 {
            ids.extend(
                self.fanout
                    .map_indexed(&tx.vout, |index, _| OutPoint::new(txid, index as u32)),
            );
        }
        if !tx.is_coinbase() {
            let inputs = self.fanout.map_indexed(&tx.vin, |_, input| {
                (!in_block.contains(&input.prevout.hash)).then_some(input.prevout)
            });
            ids.extend(inputs.into_iter().flatten());
        }
        ids
    }
}

/// Plans, fetches and loads the coins `block` needs into a fresh set.
///
/// The coin view must answer every requested key, even if only to say it
/// holds nothing for it.
pub fn load_unspent_set<V: CoinView + ?Sized>(
    view: &V,
    helper: &CoinviewHelper,
    block: &Block,
    enforce_bip30: bool,
) -> Result<UnspentOutputSet, CoinViewFault> {
    let requested = helper.get_ids_to_fetch(block, enforce_bip30);
    let response = view.fetch_coins(&requested)?;
    if let Some(outpoint) = response.first_unserviced(&requested) {
        posd_log::log_error!(
            "fetch for block {} left {outpoint} unanswered",
            posd_primitives::hash::hash_to_hex(&block.hash())
        );
        return Err(CoinViewFault::UnservicedFetch(*outpoint));
    }
    let set = UnspentOutputSet::from_fetch_response(Arc::clone(&helper.fanout), response);
    posd_log::log_trace!("loaded {} of {} requested coins", set.len(), requested.len());
    Ok(set)
}
