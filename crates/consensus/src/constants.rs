//! Consensus-wide constants shared across validation.

/// The maximum allowed size for a serialized block, in bytes (network rule).
pub const MAX_BLOCK_SIZE: u32 = 1_000_000;
/// Maximum script size (consensus). Longer output scripts can never be spent.
pub const MAX_SCRIPT_SIZE: usize = 10_000;
/// Proof-of-stake block and coinstake timestamps must clear these low bits.
pub const STAKE_TIMESTAMP_MASK: u32 = 0x0000_000F;
