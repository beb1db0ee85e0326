//! Applies a block's transactions to a loaded [`UnspentOutputSet`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use posd_consensus::{ConsensusError, ConsensusParams};
use posd_primitives::block::Block;
use posd_primitives::hash::hash_to_hex;
use posd_primitives::outpoint::OutPoint;
use posd_primitives::transaction::{Transaction, TxOut};

use crate::error::CoinViewFault;
use crate::fanout::Fanout;
use crate::unspent::UnspentOutputSet;

/// Checks one input's unlocking script against the output it spends.
pub trait ScriptVerifier: Send + Sync {
    fn verify_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        spent: &TxOut,
    ) -> Result<(), String>;
}

#[derive(Debug)]
pub enum ConnectError {
    Consensus(ConsensusError),
    Fault(CoinViewFault),
}

impl ConnectError {
    pub fn is_fault(&self) -> bool {
        matches!(self, ConnectError::Fault(_))
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::Consensus(err) => write!(f, "{err}"),
            ConnectError::Fault(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectError::Consensus(err) => Some(err),
            ConnectError::Fault(err) => Some(err),
        }
    }
}

impl From<ConsensusError> for ConnectError {
    fn from(err: ConsensusError) -> Self {
        ConnectError::Consensus(err)
    }
}

impl From<CoinViewFault> for ConnectError {
    fn from(err: CoinViewFault) -> Self {
        ConnectError::Fault(err)
    }
}

pub struct UtxoSetRule {
    params: ConsensusParams,
    scripts: Arc<dyn ScriptVerifier>,
    fanout: Arc<Fanout>,
}

impl UtxoSetRule {
    pub fn new(params: ConsensusParams, scripts: Arc<dyn ScriptVerifier>, fanout: Arc<Fanout>) -> Self {
        Self {
            params,
            scripts,
            fanout,
        }
    }

    /// Validates and applies every transaction of `block` in order.
    ///
    /// On error the set is part way through the block and must be dropped.
    pub fn connect_block(
        &self,
        set: &UnspentOutputSet,
        block: &Block,
        height: u32,
    ) -> Result<(), ConnectError> {
        for tx in &block.transactions {
            if let Err(err) = self.connect_transaction(set, tx, height) {
                let txid = hash_to_hex(&tx.txid());
                match &err {
                    ConnectError::Consensus(reason) => posd_log::log_warn!(
                        "block {} rejected at tx {txid}: {}",
                        hash_to_hex(&block.hash()),
                        reason.code()
                    ),
                    ConnectError::Fault(fault) => {
                        posd_log::log_error!("connecting tx {txid} failed: {fault}")
                    }
                }
                return Err(err);
            }
        }
        posd_log::log_debug!(
            "connected {} transactions at height {height}",
            block.transactions.len()
        );
        Ok(())
    }

    fn connect_transaction(
        &self,
        set: &UnspentOutputSet,
        tx: &Transaction,
        height: u32,
    ) -> Result<(), ConnectError> {
        if self.params.enforce_bip30 {
            let txid = tx.txid();
            let overwrites = (0..tx.vout.len() as u32)
                .any(|index| set.is_unspent(&OutPoint::new(txid, index)));
            if overwrites {
                return Err(ConsensusError::BadTransactionBip30.into());
            }
        }

        if !tx.is_coinbase() {
            let distinct: HashSet<&OutPoint> = tx.vin.iter().map(|input| &input.prevout).collect();
            if distinct.len() != tx.vin.len() {
                return Err(ConsensusError::BadTransactionDuplicateInputs.into());
            }
            if !set.have_inputs(tx) {
                return Err(ConsensusError::BadTransactionMissingInput.into());
            }
            let value_in = set.get_value_in(tx)?;
            if !tx.is_coinstake() {
                let value_out = tx
                    .value_out()
                    .ok_or(ConsensusError::BadTransactionInBelowOut)?;
                if value_in < value_out {
                    return Err(ConsensusError::BadTransactionInBelowOut.into());
                }
            }
            self.verify_scripts(set, tx)?;
        }

        set.update(&self.params, tx, height)?;
        Ok(())
    }

    fn verify_scripts(&self, set: &UnspentOutputSet, tx: &Transaction) -> Result<(), ConnectError> {
        let results = self.fanout.map_indexed(&tx.vin, |input_index, input| {
            let spent = set
                .get_output_for(input)
                .ok_or(CoinViewFault::MissingCoin(input.prevout))?;
            Ok::<_, CoinViewFault>(
                self.scripts
                    .verify_input(tx, input_index, &spent)
                    .map_err(|message| (input_index, message)),
            )
        });
        for result in results {
            if let Err((input_index, message)) = result? {
                posd_log::log_warn!(
                    "script validation failed for tx {} input {input_index}: {message}",
                    hash_to_hex(&tx.txid())
                );
                return Err(ConsensusError::BadTransactionScriptError.into());
            }
        }
        Ok(())
    }
}
