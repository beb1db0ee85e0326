//! Proof-of-stake consensus rules: block signatures and the proven-header
//! coinstake check, with the stake collaborators they depend on.

pub mod chain;
pub mod error;
pub mod proven_header;
pub mod signature;
pub mod stake;
pub mod validator;

pub use chain::{ChainedHeader, HeaderVariant};
pub use error::{RuleError, RuleFault};
pub use proven_header::{ProvenHeaderCheck, ProvenHeaderCoinstakeRule};
pub use signature::{
    check_stake_signature, is_canonical_block_signature, BlockSignatureRepresentationRule,
    BlockSignatureRule, RuleContext,
};
pub use stake::{BlockStake, StakeChain, StoreStakeChain};
pub use validator::{ScriptFlags, StakeValidator};
