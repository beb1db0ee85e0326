//! Proof-of-stake block signature checks.

use std::sync::{Arc, OnceLock};

use posd_consensus::{ConsensusError, Hash256};
use posd_primitives::block::{Block, BlockSignature};
use posd_primitives::hash::hash_to_hex;
use posd_primitives::script::{extract_op_return_pubkey, extract_p2pk_pubkey};
use posd_primitives::transaction::Transaction;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, VerifyOnly};

use crate::validator::StakeValidator;

static SECP256K1_VERIFY: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();

fn secp256k1_verify() -> &'static Secp256k1<VerifyOnly> {
    SECP256K1_VERIFY.get_or_init(Secp256k1::verification_only)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RuleContext {
    pub skip_validation: bool,
}

/// Strict DER encoding of an ECDSA signature, with no trailing sighash byte.
pub fn is_strict_der(sig: &[u8]) -> bool {
    if sig.len() < 8 || sig.len() > 72 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 2 {
        return false;
    }
    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 6 != sig.len() {
        return false;
    }

    if sig[2] != 0x02 || len_r == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    if sig[len_r + 4] != 0x02 || len_s == 0 || sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

/// Strict DER whose S value is already in the lower half of the curve order.
pub fn is_low_der_signature(sig: &[u8]) -> bool {
    if !is_strict_der(sig) {
        return false;
    }
    let Ok(parsed) = Signature::from_der(sig) else {
        return false;
    };
    let mut normalized = parsed;
    normalized.normalize_s();
    normalized == parsed
}

/// Proof-of-work blocks carry no signature; proof-of-stake signatures must be
/// canonical.
pub fn is_canonical_block_signature(block: &Block, check_low_s: bool) -> bool {
    if block.is_proof_of_work() {
        return block.signature.is_empty();
    }
    let sig = block.signature.as_bytes();
    if check_low_s {
        is_low_der_signature(sig)
    } else {
        is_strict_der(sig)
    }
}

/// Verifies `signature` over `block_hash` with the key published by the
/// coinstake's second output, either `<pubkey> OP_CHECKSIG` or
/// `OP_RETURN <pubkey>`.
pub fn check_stake_signature(
    signature: &BlockSignature,
    block_hash: &Hash256,
    coinstake: &Transaction,
) -> bool {
    if signature.is_empty() {
        return false;
    }
    let Some(staking_output) = coinstake.vout.get(1) else {
        return false;
    };
    let script = &staking_output.script_pubkey;
    let Some(pubkey_bytes) = extract_p2pk_pubkey(script).or_else(|| extract_op_return_pubkey(script))
    else {
        posd_log::log_debug!("coinstake output 1 publishes no staking key");
        return false;
    };

    let Ok(pubkey) = PublicKey::from_slice(pubkey_bytes) else {
        return false;
    };
    let Ok(mut sig) = Signature::from_der_lax(signature.as_bytes()) else {
        return false;
    };
    sig.normalize_s();
    let Ok(msg) = Message::from_digest_slice(block_hash) else {
        return false;
    };
    secp256k1_verify().verify_ecdsa(&msg, &sig, &pubkey).is_ok()
}

/// Rejects blocks whose signature is not in canonical low-S form.
///
/// Runs at integrity level, so the block itself is rejected rather than only
/// the peer that relayed it.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockSignatureRepresentationRule;

impl BlockSignatureRepresentationRule {
    pub fn run(&self, context: &RuleContext, block: &Block) -> Result<(), ConsensusError> {
        if context.skip_validation {
            return Ok(());
        }
        if !is_canonical_block_signature(block, true) {
            posd_log::log_warn!(
                "block {} signature is not canonical: {}",
                hash_to_hex(&block.hash()),
                ConsensusError::BadBlockSignature.code()
            );
            return Err(ConsensusError::BadBlockSignature);
        }
        Ok(())
    }
}

pub struct BlockSignatureRule {
    validator: Arc<dyn StakeValidator>,
}

impl BlockSignatureRule {
    pub fn new(validator: Arc<dyn StakeValidator>) -> Self {
        Self { validator }
    }

    pub fn run(&self, context: &RuleContext, block: &Block) -> Result<(), ConsensusError> {
        if context.skip_validation {
            return Ok(());
        }
        if !self.check_block_signature(block) {
            posd_log::log_warn!(
                "block {} signature rejected: {}",
                hash_to_hex(&block.hash()),
                ConsensusError::BadBlockSignature.code()
            );
            return Err(ConsensusError::BadBlockSignature);
        }
        Ok(())
    }

    fn check_block_signature(&self, block: &Block) -> bool {
        match block.coinstake() {
            Some(coinstake) => {
                self.validator
                    .check_stake_signature(&block.signature, &block.hash(), coinstake)
            }
            None => block.signature.is_empty(),
        }
    }
}
