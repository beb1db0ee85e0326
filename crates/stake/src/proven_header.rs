//! Stake validation for headers synced without their block bodies.

use std::collections::HashSet;
use std::sync::Arc;

use posd_coinview::{CoinView, CoinViewFault, Fetched, UnspentOutput};
use posd_consensus::{ConsensusError, ConsensusParams, Hash256};
use posd_primitives::hash::hash_to_hex;
use posd_primitives::outpoint::OutPoint;
use posd_primitives::proven::ProvenBlockHeader;
use posd_primitives::transaction::Transaction;

use crate::chain::ChainedHeader;
use crate::error::{RuleError, RuleFault};
use crate::stake::StakeChain;
use crate::validator::{StakeValidator, SCRIPT_VERIFY_NONE};

/// Outcome of a header that passed the rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvenHeaderCheck {
    /// Proven headers are not active at this height.
    Skipped,
    /// The embedded transaction is not a coinstake and the height still
    /// allows proof-of-work.
    ProofOfWork,
    Validated { stake_modifier_v2: Hash256 },
}

pub struct ProvenHeaderCoinstakeRule {
    params: ConsensusParams,
    coin_view: Arc<dyn CoinView>,
    stake_chain: Arc<dyn StakeChain>,
    validator: Arc<dyn StakeValidator>,
}

impl ProvenHeaderCoinstakeRule {
    pub fn new(
        params: ConsensusParams,
        coin_view: Arc<dyn CoinView>,
        stake_chain: Arc<dyn StakeChain>,
        validator: Arc<dyn StakeValidator>,
    ) -> Self {
        Self {
            params,
            coin_view,
            stake_chain,
            validator,
        }
    }

    /// Runs every check against `chained`, stopping at the first failure.
    pub fn run(&self, chained: Option<&ChainedHeader>) -> Result<ProvenHeaderCheck, RuleError> {
        let Some(chained) = chained else {
            posd_log::log_error!("proven header check without a chained header");
            return Err(RuleFault::MissingChainedHeader.into());
        };
        match self.check(chained) {
            Ok(outcome) => Ok(outcome),
            Err(RuleError::Consensus(err)) => {
                posd_log::log_warn!(
                    "proven header {} at height {} rejected: {}",
                    hash_to_hex(&chained.hash),
                    chained.height,
                    err.code()
                );
                Err(RuleError::Consensus(err))
            }
            Err(RuleError::Fault(fault)) => {
                posd_log::log_error!(
                    "proven header {} at height {}: {fault}",
                    hash_to_hex(&chained.hash),
                    chained.height
                );
                Err(RuleError::Fault(fault))
            }
        }
    }

    fn check(&self, chained: &ChainedHeader) -> Result<ProvenHeaderCheck, RuleError> {
        if !self.params.proven_headers_active(chained.height) {
            posd_log::log_trace!("proven headers inactive at height {}", chained.height);
            return Ok(ProvenHeaderCheck::Skipped);
        }
        let proven = chained.proven_header().ok_or(RuleFault::NotProvenHeader)?;
        let coinstake = proven
            .coinstake
            .as_ref()
            .ok_or(ConsensusError::EmptyCoinstake)?;

        let prev_utxo = self.fetch_staked_coin(coinstake)?;

        if !coinstake.is_coinstake() {
            if !self.params.is_pow_height(chained.height) {
                return Err(ConsensusError::ProofOfWorkTooHigh.into());
            }
            return Ok(ProvenHeaderCheck::ProofOfWork);
        }

        self.check_header_and_coinstake_times(proven, coinstake)?;

        let previous = chained
            .previous()
            .ok_or(RuleFault::MissingPreviousHeader)?;
        let max_depth = self.params.stake_min_confirmations.saturating_sub(1);
        if self
            .validator
            .is_confirmed_in_n_prev_blocks(&prev_utxo, previous, max_depth)
        {
            return Err(ConsensusError::InvalidStakeDepth.into());
        }

        if !self
            .validator
            .verify_signature(&prev_utxo, coinstake, 0, SCRIPT_VERIFY_NONE)
        {
            return Err(ConsensusError::CoinstakeVerifySignatureFailed.into());
        }

        let prev_stake_modifier = self.previous_stake_modifier(previous)?;
        let prevout = &coinstake.vin[0].prevout;
        self.validator.check_stake_kernel_hash(
            proven.header.bits,
            &prev_stake_modifier,
            &prev_utxo,
            prevout,
            coinstake.time,
        )?;

        if !proven.merkle_proof_valid() {
            return Err(ConsensusError::BadMerkleRoot.into());
        }

        if !self
            .validator
            .check_stake_signature(&proven.signature, &proven.hash(), coinstake)
        {
            return Err(ConsensusError::BadBlockSignature.into());
        }

        let stake_modifier_v2 = self.validator.compute_stake_modifier_v2(
            previous,
            &prev_stake_modifier,
            &prevout.hash,
        );
        Ok(ProvenHeaderCheck::Validated { stake_modifier_v2 })
    }

    /// Resolves every coinstake input and returns the coin staked by the
    /// first one.
    fn fetch_staked_coin(&self, coinstake: &Transaction) -> Result<UnspentOutput, RuleError> {
        let requested: HashSet<OutPoint> = coinstake.vin.iter().map(|input| input.prevout).collect();
        let response = self
            .coin_view
            .fetch_coins(&requested)
            .map_err(CoinViewFault::from)?;

        let mut staked = None;
        for input in &coinstake.vin {
            let entry = match response.get(&input.prevout) {
                Fetched::Found(entry) => entry,
                Fetched::Unknown => return Err(ConsensusError::ReadTxPrevFailedInsufficient.into()),
                Fetched::NotRequested => {
                    return Err(CoinViewFault::UnservicedFetch(input.prevout).into())
                }
            };
            if entry.is_spent() {
                return Err(ConsensusError::ReadTxPrevFailedInsufficient.into());
            }
            staked.get_or_insert_with(|| entry.clone());
        }
        staked.ok_or_else(|| ConsensusError::ReadTxPrevFailedInsufficient.into())
    }

    fn check_header_and_coinstake_times(
        &self,
        proven: &ProvenBlockHeader,
        coinstake: &Transaction,
    ) -> Result<(), ConsensusError> {
        let header_time = proven.time();
        if coinstake.time != header_time || !self.params.check_stake_timestamp(header_time) {
            return Err(ConsensusError::StakeTimeViolation);
        }
        Ok(())
    }

    /// Stake modifier of `previous`, from its proven form when it has one and
    /// from the stake chain otherwise.
    fn previous_stake_modifier(&self, previous: &ChainedHeader) -> Result<Hash256, RuleError> {
        let modifier = match previous.proven_header() {
            Some(proven) => proven.stake_modifier_v2,
            None => self
                .stake_chain
                .get(&previous.hash)
                .map_err(RuleFault::StakeChain)?
                .and_then(|stake| stake.stake_modifier_v2),
        };
        modifier.ok_or_else(|| ConsensusError::InvalidPreviousProvenHeaderStakeModifier.into())
    }
}
