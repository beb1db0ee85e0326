//! Named consensus failures.
//!
//! Every variant is an expected, data-dependent rejection. Callers decide how
//! to penalize the sender; validation code only reports which check failed.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConsensusError {
    EmptyCoinstake,
    ReadTxPrevFailed,
    ReadTxPrevFailedInsufficient,
    ProofOfWorkTooHigh,
    StakeTimeViolation,
    InvalidStakeDepth,
    CoinstakeVerifySignatureFailed,
    InvalidPreviousProvenHeaderStakeModifier,
    StakeHashInvalidTarget,
    BadMerkleRoot,
    BadBlockSignature,
    BadTransactionScriptError,
    BadTransactionMissingInput,
    BadTransactionDuplicateInputs,
    BadTransactionBip30,
    BadTransactionInBelowOut,
}

impl ConsensusError {
    pub const ALL: [ConsensusError; 16] = [
        ConsensusError::EmptyCoinstake,
        ConsensusError::ReadTxPrevFailed,
        ConsensusError::ReadTxPrevFailedInsufficient,
        ConsensusError::ProofOfWorkTooHigh,
        ConsensusError::StakeTimeViolation,
        ConsensusError::InvalidStakeDepth,
        ConsensusError::CoinstakeVerifySignatureFailed,
        ConsensusError::InvalidPreviousProvenHeaderStakeModifier,
        ConsensusError::StakeHashInvalidTarget,
        ConsensusError::BadMerkleRoot,
        ConsensusError::BadBlockSignature,
        ConsensusError::BadTransactionScriptError,
        ConsensusError::BadTransactionMissingInput,
        ConsensusError::BadTransactionDuplicateInputs,
        ConsensusError::BadTransactionBip30,
        ConsensusError::BadTransactionInBelowOut,
    ];

    /// Stable reject code, as relayed to peers and written to logs.
    pub fn code(self) -> &'static str {
        match self {
            ConsensusError::EmptyCoinstake => "empty-coinstake",
            ConsensusError::ReadTxPrevFailed => "read-txPrev-failed",
            ConsensusError::ReadTxPrevFailedInsufficient => "read-txPrev-failed-insufficient",
            ConsensusError::ProofOfWorkTooHigh => "proof-of-work-too-high",
            ConsensusError::StakeTimeViolation => "stake-time-violation",
            ConsensusError::InvalidStakeDepth => "invalid-stake-depth",
            ConsensusError::CoinstakeVerifySignatureFailed => {
                "verify-signature-failed-on-coinstake"
            }
            ConsensusError::InvalidPreviousProvenHeaderStakeModifier => {
                "invalid-previous-provenheader-stake-modifier"
            }
            ConsensusError::StakeHashInvalidTarget => "stake-hash-invalid-target",
            ConsensusError::BadMerkleRoot => "bad-txnmrklroot",
            ConsensusError::BadBlockSignature => "bad-block-signature",
            ConsensusError::BadTransactionScriptError => "bad-txns-script-failed",
            ConsensusError::BadTransactionMissingInput => "bad-txns-inputs-missingorspent",
            ConsensusError::BadTransactionDuplicateInputs => "bad-txns-inputs-duplicate",
            ConsensusError::BadTransactionBip30 => "bad-txns-BIP30",
            ConsensusError::BadTransactionInBelowOut => "bad-txns-in-belowout",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ConsensusError::EmptyCoinstake => "empty coinstake",
            ConsensusError::ReadTxPrevFailed => "read txPrev failed",
            ConsensusError::ReadTxPrevFailedInsufficient => {
                "read txPrev failed insufficient information"
            }
            ConsensusError::ProofOfWorkTooHigh => "proof of work too high",
            ConsensusError::StakeTimeViolation => "stake time violation",
            ConsensusError::InvalidStakeDepth => "stake input is below the required depth",
            ConsensusError::CoinstakeVerifySignatureFailed => {
                "coinstake input signature verification failed"
            }
            ConsensusError::InvalidPreviousProvenHeaderStakeModifier => {
                "previous proven header has no stake modifier"
            }
            ConsensusError::StakeHashInvalidTarget => "stake hash does not meet target",
            ConsensusError::BadMerkleRoot => "merkle root mismatch",
            ConsensusError::BadBlockSignature => "bad block signature",
            ConsensusError::BadTransactionScriptError => "a script failed",
            ConsensusError::BadTransactionMissingInput => "input missing or spent",
            ConsensusError::BadTransactionDuplicateInputs => "transaction spends an outpoint twice",
            ConsensusError::BadTransactionBip30 => "tried to overwrite transaction",
            ConsensusError::BadTransactionInBelowOut => "value in below value out",
        }
    }
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl std::error::Error for ConsensusError {}
