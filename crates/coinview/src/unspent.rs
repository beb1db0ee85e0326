//! The working UTXO set of one block-connection attempt.

use std::sync::Arc;

use dashmap::DashMap;
use posd_consensus::money::checked_add_money;
use posd_consensus::{Amount, ConsensusParams, Hash256};
use posd_primitives::outpoint::OutPoint;
use posd_primitives::transaction::{Transaction, TxIn, TxOut};

use crate::coins::{Coins, UnspentOutput};
use crate::error::CoinViewFault;
use crate::fanout::Fanout;
use crate::fetch::FetchCoinsResponse;

/// Sharded map from outpoint to coin entry.
///
/// Point reads and writes take `&self` and are safe from any thread. Bulk
/// loads take `&mut self`. The set belongs to a single validation attempt and
/// is thrown away as a whole if that attempt fails part way.
pub struct UnspentOutputSet {
    unspents: DashMap<OutPoint, UnspentOutput>,
    fanout: Arc<Fanout>,
}

impl UnspentOutputSet {
    pub fn new(fanout: Arc<Fanout>) -> Self {
        Self {
            unspents: DashMap::new(),
            fanout,
        }
    }

    /// Seeds a set with everything a fetch found; unknown keys are skipped.
    pub fn from_fetch_response(fanout: Arc<Fanout>, response: FetchCoinsResponse) -> Self {
        let mut set = Self::new(fanout);
        set.try_set_coins(response.into_unspent_outputs());
        set
    }

    pub fn len(&self) -> usize {
        self.unspents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unspents.is_empty()
    }

    /// Output spent by `input`, absent when the key is missing or already spent.
    pub fn get_output_for(&self, input: &TxIn) -> Option<TxOut> {
        self.unspents
            .get(&input.prevout)
            .and_then(|entry| entry.coins().map(|coins| coins.tx_out.clone()))
    }

    pub fn have_inputs(&self, tx: &Transaction) -> bool {
        self.fanout
            .all(&tx.vin, |input| self.resolves(&input.prevout))
    }

    /// The stored entry for `outpoint`, spent or not.
    pub fn access_coins(&self, outpoint: &OutPoint) -> Option<UnspentOutput> {
        self.unspents.get(outpoint).map(|entry| entry.clone())
    }

    /// Sum of the values `tx` spends. Fails on the first input that does not
    /// resolve; call [`have_inputs`](Self::have_inputs) first.
    pub fn get_value_in(&self, tx: &Transaction) -> Result<Amount, CoinViewFault> {
        let values = self.fanout.map_indexed(&tx.vin, |_, input| {
            self.get_output_for(input)
                .map(|output| output.value)
                .ok_or(CoinViewFault::MissingCoin(input.prevout))
        });
        values.into_iter().try_fold(0, |total, value| {
            checked_add_money(total, value?).ok_or(CoinViewFault::ValueOutOfRange)
        })
    }

    /// Applies `tx` at `height`: spends its inputs, then records its outputs.
    ///
    /// Every input is attempted; on failure the fault for the lowest input
    /// index is returned and no output is inserted. The set is then
    /// inconsistent and must be discarded. Transactions must be applied in
    /// block order.
    pub fn update(
        &self,
        params: &ConsensusParams,
        tx: &Transaction,
        height: u32,
    ) -> Result<(), CoinViewFault> {
        if !tx.is_coinbase() {
            let spends = self.fanout.map_indexed(&tx.vin, |_, input| self.spend(&input.prevout));
            if let Some(fault) = spends.into_iter().find_map(Result::err) {
                posd_log::log_error!("update of tx {} aborted: {fault}", hex(&tx.txid()));
                return Err(fault);
            }
        }

        let txid = tx.txid();
        let is_coinbase = tx.is_coinbase();
        let is_coinstake = params.is_proof_of_stake && tx.is_coinstake();
        let time = if params.is_proof_of_stake { tx.time } else { 0 };
        self.fanout.for_each_indexed(&tx.vout, |index, output| {
            let coins = Coins::new(height, output.clone(), is_coinbase, is_coinstake, time);
            if coins.is_prunable() {
                return;
            }
            let outpoint = OutPoint::new(txid, index as u32);
            self.unspents
                .insert(outpoint, UnspentOutput::created_from_block(outpoint, coins));
        });
        Ok(())
    }

    /// Replaces the whole contents; on duplicate keys the last entry wins.
    pub fn set_coins<I>(&mut self, coins: I)
    where
        I: IntoIterator<Item = Option<UnspentOutput>>,
    {
        self.unspents.clear();
        for entry in coins.into_iter().flatten() {
            self.unspents.insert(entry.outpoint, entry);
        }
    }

    /// Replaces the whole contents; on duplicate keys the first entry wins.
    pub fn try_set_coins<I>(&mut self, coins: I)
    where
        I: IntoIterator<Item = Option<UnspentOutput>>,
    {
        self.unspents.clear();
        for entry in coins.into_iter().flatten() {
            self.unspents.entry(entry.outpoint).or_insert(entry);
        }
    }

    pub fn get_coins(&self) -> Vec<UnspentOutput> {
        self.unspents.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Entries created by the transaction `txid`.
    pub fn get_coins_for(&self, txid: &Hash256) -> Vec<UnspentOutput> {
        self.unspents
            .iter()
            .filter(|entry| entry.key().hash == *txid)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// True when `outpoint` is held and unspent.
    pub fn is_unspent(&self, outpoint: &OutPoint) -> bool {
        self.resolves(outpoint)
    }

    fn resolves(&self, outpoint: &OutPoint) -> bool {
        self.unspents
            .get(outpoint)
            .is_some_and(|entry| !entry.is_spent())
    }

    fn spend(&self, outpoint: &OutPoint) -> Result<(), CoinViewFault> {
        match self.unspents.get_mut(outpoint) {
            Some(mut entry) => {
                if entry.spend() {
                    Ok(())
                } else {
                    Err(CoinViewFault::DoubleSpend(*outpoint))
                }
            }
            None => Err(CoinViewFault::MissingCoin(*outpoint)),
        }
    }
}

fn hex(hash: &Hash256) -> String {
    posd_primitives::hash::hash_to_hex(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::FanoutConfig;
    use posd_consensus::params::{consensus_params, Network};
    use posd_primitives::script::op_return_script;

    fn sequential() -> Arc<Fanout> {
        Arc::new(Fanout::new(FanoutConfig::sequential()))
    }

    fn stored(outpoint: OutPoint, value: i64) -> UnspentOutput {
        UnspentOutput::new(
            outpoint,
            Coins::new(1, TxOut::new(value, vec![0x51]), false, false, 0),
        )
    }

    fn spend_tx(inputs: &[OutPoint], outputs: Vec<TxOut>) -> Transaction {
        Transaction {
            version: 1,
            time: 1_600_000_000,
            vin: inputs.iter().copied().map(TxIn::new).collect(),
            vout: outputs,
            lock_time: 0,
        }
    }

    #[test]
    fn spent_entries_resolve_as_absent() {
        let outpoint = OutPoint::new([1; 32], 0);
        let mut set = UnspentOutputSet::new(sequential());
        set.set_coins([Some(stored(outpoint, 10))]);
        let params = consensus_params(Network::Regtest);

        let tx = spend_tx(&[outpoint], vec![TxOut::new(9, vec![0x51])]);
        assert!(set.have_inputs(&tx));
        set.update(&params, &tx, 2).expect("update");

        assert!(!set.have_inputs(&tx));
        assert!(set.get_output_for(&tx.vin[0]).is_none());
        let entry = set.access_coins(&outpoint).expect("entry stays in the map");
        assert!(entry.is_spent());
        assert!(!entry.created_from_block);
    }

    #[test]
    fn outputs_carry_creation_metadata() {
        let outpoint = OutPoint::new([1; 32], 0);
        let mut set = UnspentOutputSet::new(sequential());
        set.set_coins([Some(stored(outpoint, 10))]);
        let params = consensus_params(Network::Mainnet);

        let coinstake = spend_tx(
            &[outpoint],
            vec![TxOut::default(), TxOut::new(12, vec![0x51])],
        );
        set.update(&params, &coinstake, 500).expect("update");

        assert!(set.access_coins(&OutPoint::new(coinstake.txid(), 0)).is_none());
        let created = set
            .access_coins(&OutPoint::new(coinstake.txid(), 1))
            .expect("created");
        let coins = created.coins().expect("unspent");
        assert!(created.created_from_block);
        assert!(coins.is_coinstake);
        assert!(!coins.is_coinbase);
        assert_eq!(coins.height, 500);
        assert_eq!(coins.time, coinstake.time);
        assert_eq!(set.get_coins_for(&coinstake.txid()).len(), 1);
    }

    #[test]
    fn value_in_requires_every_input() {
        let a = OutPoint::new([1; 32], 0);
        let b = OutPoint::new([2; 32], 0);
        let mut set = UnspentOutputSet::new(sequential());
        set.set_coins([Some(stored(a, 10)), Some(stored(b, 32))]);

        let both = spend_tx(&[a, b], vec![]);
        assert_eq!(set.get_value_in(&both).expect("value in"), 42);

        let missing = OutPoint::new([3; 32], 0);
        let partial = spend_tx(&[a, missing], vec![]);
        assert!(matches!(
            set.get_value_in(&partial),
            Err(CoinViewFault::MissingCoin(outpoint)) if outpoint == missing
        ));
    }

    #[test]
    fn failed_spend_inserts_nothing() {
        let a = OutPoint::new([1; 32], 0);
        let missing = OutPoint::new([3; 32], 0);
        let mut set = UnspentOutputSet::new(sequential());
        set.set_coins([Some(stored(a, 10))]);
        let params = consensus_params(Network::Regtest);

        let tx = spend_tx(&[a, missing], vec![TxOut::new(1, vec![0x51])]);
        let err = set.update(&params, &tx, 2).expect_err("missing coin");
        assert!(matches!(err, CoinViewFault::MissingCoin(outpoint) if outpoint == missing));
        assert!(set.access_coins(&OutPoint::new(tx.txid(), 0)).is_none());
    }

    #[test]
    fn proof_of_work_network_drops_stake_metadata() {
        let outpoint = OutPoint::new([1; 32], 0);
        let mut set = UnspentOutputSet::new(sequential());
        set.set_coins([Some(stored(outpoint, 10))]);
        let mut params = consensus_params(Network::Regtest);
        params.is_proof_of_stake = false;

        let coinstake = spend_tx(
            &[outpoint],
            vec![TxOut::default(), TxOut::new(12, op_return_script(b"x")), TxOut::new(3, vec![0x51])],
        );
        set.update(&params, &coinstake, 7).expect("update");

        let coins = set
            .access_coins(&OutPoint::new(coinstake.txid(), 2))
            .and_then(|entry| entry.coins().cloned())
            .expect("created");
        assert!(!coins.is_coinstake);
        assert_eq!(coins.time, 0);
        assert!(set.access_coins(&OutPoint::new(coinstake.txid(), 1)).is_none());
    }
}
