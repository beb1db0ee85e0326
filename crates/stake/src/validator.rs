//! The stake-kernel collaborator the consensus rules call into.

use posd_coinview::UnspentOutput;
use posd_consensus::{ConsensusError, ConsensusParams, Hash256};
use posd_primitives::block::BlockSignature;
use posd_primitives::outpoint::OutPoint;
use posd_primitives::transaction::Transaction;

use crate::chain::ChainedHeader;
use crate::signature;
use crate::stake::StakeChain;

pub type ScriptFlags = u32;

pub const SCRIPT_VERIFY_NONE: ScriptFlags = 0;

/// Stake math and script checks used by the proof-of-stake rules.
pub trait StakeValidator: Send + Sync {
    /// Verifies input `input_index` of `tx` against the coin it spends.
    fn verify_signature(
        &self,
        coin: &UnspentOutput,
        tx: &Transaction,
        input_index: usize,
        flags: ScriptFlags,
    ) -> bool;

    /// Checks that the kernel built from the staked coin meets the target
    /// encoded in `header_bits`.
    fn check_stake_kernel_hash(
        &self,
        header_bits: u32,
        prev_stake_modifier: &Hash256,
        staking_coin: &UnspentOutput,
        prevout: &OutPoint,
        transaction_time: u32,
    ) -> Result<(), ConsensusError>;

    /// True when `coin` was created within `max_depth` blocks of `reference`.
    fn is_confirmed_in_n_prev_blocks(
        &self,
        coin: &UnspentOutput,
        reference: &ChainedHeader,
        max_depth: u32,
    ) -> bool;

    /// Compact target the block following `previous` must meet.
    fn get_next_target_required(
        &self,
        stake_chain: &dyn StakeChain,
        previous: &ChainedHeader,
        params: &ConsensusParams,
        proof_of_stake: bool,
    ) -> u32;

    fn compute_stake_modifier_v2(
        &self,
        previous: &ChainedHeader,
        prev_stake_modifier: &Hash256,
        kernel: &Hash256,
    ) -> Hash256;

    /// Checks a proof-of-stake block signature against the key published by
    /// the coinstake's second output.
    fn check_stake_signature(
        &self,
        signature: &BlockSignature,
        block_hash: &Hash256,
        coinstake: &Transaction,
    ) -> bool {
        signature::check_stake_signature(signature, block_hash, coinstake)
    }
}
