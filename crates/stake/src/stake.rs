//! Per-block stake history.

use posd_consensus::Hash256;
use posd_primitives::encoding::{DecodeError, Decoder, Encoder};
use posd_storage::{Column, KeyValueStore, StoreError};

pub const BLOCK_PROOF_OF_STAKE: u32 = 1 << 0;
pub const BLOCK_STAKE_MODIFIER: u32 = 1 << 1;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockStake {
    pub flags: u32,
    pub stake_modifier_v2: Option<Hash256>,
    pub hash_proof: Hash256,
    pub stake_time: u32,
}

impl BlockStake {
    pub fn is_proof_of_stake(&self) -> bool {
        self.flags & BLOCK_PROOF_OF_STAKE != 0
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(73);
        encoder.write_u32_le(self.flags);
        encoder.write_bool(self.stake_modifier_v2.is_some());
        if let Some(modifier) = &self.stake_modifier_v2 {
            encoder.write_hash_le(modifier);
        }
        encoder.write_hash_le(&self.hash_proof);
        encoder.write_u32_le(self.stake_time);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let flags = decoder.read_u32_le()?;
        let stake_modifier_v2 = if decoder.read_bool()? {
            Some(decoder.read_hash_le()?)
        } else {
            None
        };
        let hash_proof = decoder.read_hash_le()?;
        let stake_time = decoder.read_u32_le()?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self {
            flags,
            stake_modifier_v2,
            hash_proof,
            stake_time,
        })
    }
}

/// Stake records by block hash.
pub trait StakeChain: Send + Sync {
    fn get(&self, block_hash: &Hash256) -> Result<Option<BlockStake>, StoreError>;
}

impl<T: StakeChain + ?Sized> StakeChain for std::sync::Arc<T> {
    fn get(&self, block_hash: &Hash256) -> Result<Option<BlockStake>, StoreError> {
        self.as_ref().get(block_hash)
    }
}

pub struct StoreStakeChain<S> {
    store: S,
}

impl<S: KeyValueStore> StoreStakeChain<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn set(&self, block_hash: &Hash256, stake: &BlockStake) -> Result<(), StoreError> {
        self.store.put(Column::Stake, block_hash, &stake.encode())
    }
}

impl<S: KeyValueStore> StakeChain for StoreStakeChain<S> {
    fn get(&self, block_hash: &Hash256) -> Result<Option<BlockStake>, StoreError> {
        let Some(bytes) = self.store.get(Column::Stake, block_hash)? else {
            return Ok(None);
        };
        BlockStake::decode(&bytes)
            .map(Some)
            .map_err(|err| StoreError::Backend(format!("stake record is corrupt: {err}")))
    }
}
