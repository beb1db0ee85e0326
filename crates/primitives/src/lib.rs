//! Ledger types for a proof-of-stake chain and their consensus serialization.

pub mod block;
pub mod encoding;
pub mod hash;
pub mod merkleblock;
pub mod outpoint;
pub mod proven;
pub mod script;
pub mod transaction;

pub use block::{Block, BlockHeader, BlockSignature};
pub use hash::{hash_to_hex, sha256, sha256d};
pub use merkleblock::{merkle_root, PartialMerkleTree};
pub use outpoint::OutPoint;
pub use proven::ProvenBlockHeader;
pub use transaction::{Transaction, TxIn, TxOut};
