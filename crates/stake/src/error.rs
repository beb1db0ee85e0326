use std::fmt;

use posd_coinview::CoinViewFault;
use posd_consensus::ConsensusError;
use posd_storage::StoreError;

/// The rule could not reach a verdict. Aborts the validation attempt.
#[derive(Debug)]
pub enum RuleFault {
    MissingChainedHeader,
    /// The header under validation is not in proven form.
    NotProvenHeader,
    MissingPreviousHeader,
    CoinView(CoinViewFault),
    StakeChain(StoreError),
}

impl fmt::Display for RuleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleFault::MissingChainedHeader => write!(f, "no chained header to validate"),
            RuleFault::NotProvenHeader => write!(f, "header is not a proven header"),
            RuleFault::MissingPreviousHeader => write!(f, "previous chained header is missing"),
            RuleFault::CoinView(err) => write!(f, "coin view: {err}"),
            RuleFault::StakeChain(err) => write!(f, "stake chain: {err}"),
        }
    }
}

impl std::error::Error for RuleFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuleFault::CoinView(err) => Some(err),
            RuleFault::StakeChain(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum RuleError {
    Consensus(ConsensusError),
    Fault(RuleFault),
}

impl RuleError {
    pub fn is_fault(&self) -> bool {
        matches!(self, RuleError::Fault(_))
    }

    pub fn consensus(&self) -> Option<ConsensusError> {
        match self {
            RuleError::Consensus(err) => Some(*err),
            RuleError::Fault(_) => None,
        }
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::Consensus(err) => write!(f, "{err}"),
            RuleError::Fault(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuleError::Consensus(err) => Some(err),
            RuleError::Fault(err) => Some(err),
        }
    }
}

impl From<ConsensusError> for RuleError {
    fn from(err: ConsensusError) -> Self {
        RuleError::Consensus(err)
    }
}

impl From<RuleFault> for RuleError {
    fn from(err: RuleFault) -> Self {
        RuleError::Fault(err)
    }
}

impl From<CoinViewFault> for RuleError {
    fn from(err: CoinViewFault) -> Self {
        RuleError::Fault(RuleFault::CoinView(err))
    }
}
