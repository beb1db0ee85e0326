//! Consensus constants, network parameters, and the consensus error catalog.

pub mod constants;
pub mod error;
pub mod money;
pub mod params;

pub use error::ConsensusError;
pub use money::{money_range, Amount, COIN, MAX_MONEY};
pub use params::{consensus_params, ConsensusParams, Network};

/// 256-bit hash stored in internal (little-endian) byte order.
pub type Hash256 = [u8; 32];
