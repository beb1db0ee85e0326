use std::fmt;

use posd_primitives::encoding::DecodeError;
use posd_primitives::outpoint::OutPoint;
use posd_storage::StoreError;

/// Internal-consistency failures. Any of these aborts the current validation
/// attempt; none of them is a verdict on the block.
#[derive(Debug)]
pub enum CoinViewFault {
    /// `update` tried to spend an entry that was already spent.
    DoubleSpend(OutPoint),
    /// An input referenced an outpoint the set does not hold.
    MissingCoin(OutPoint),
    /// The coin view answered a fetch without an entry for a requested key.
    UnservicedFetch(OutPoint),
    /// Summing values left the money range.
    ValueOutOfRange,
    Store(StoreError),
    Decode(DecodeError),
}

impl fmt::Display for CoinViewFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinViewFault::DoubleSpend(outpoint) => {
                write!(f, "unspendable coins are invalid at this point: {outpoint} already spent")
            }
            CoinViewFault::MissingCoin(outpoint) => write!(f, "coin {outpoint} is not in the set"),
            CoinViewFault::UnservicedFetch(outpoint) => {
                write!(f, "coin view returned no entry for requested {outpoint}")
            }
            CoinViewFault::ValueOutOfRange => write!(f, "input value out of range"),
            CoinViewFault::Store(err) => write!(f, "{err}"),
            CoinViewFault::Decode(err) => write!(f, "stored coin is corrupt: {err}"),
        }
    }
}

impl std::error::Error for CoinViewFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoinViewFault::Store(err) => Some(err),
            CoinViewFault::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CoinViewFault {
    fn from(err: StoreError) -> Self {
        CoinViewFault::Store(err)
    }
}

impl From<DecodeError> for CoinViewFault {
    fn from(err: DecodeError) -> Self {
        CoinViewFault::Decode(err)
    }
}
