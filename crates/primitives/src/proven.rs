//! Headers that carry their own stake proof.

use posd_consensus::Hash256;

use crate::block::{Block, BlockHeader, BlockSignature};
use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::merkleblock::PartialMerkleTree;
use crate::transaction::Transaction;

/// A proof-of-stake block header bundled with its coinstake, the merkle proof
/// tying that coinstake to the header, and the block signature. Enough to
/// validate stake without downloading the block body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvenBlockHeader {
    pub header: BlockHeader,
    pub signature: BlockSignature,
    pub coinstake: Option<Transaction>,
    pub merkle_proof: PartialMerkleTree,
    /// Modifier established when this header was validated, when known.
    pub stake_modifier_v2: Option<Hash256>,
}

impl ProvenBlockHeader {
    /// Builds the proven form of a proof-of-stake block. Returns `None` when the
    /// block has no coinstake in second position.
    pub fn from_block(block: &Block) -> Option<Self> {
        let coinstake = block.coinstake()?.clone();
        let txids = block.txids();
        let mut matches = vec![false; txids.len()];
        matches[1] = true;
        let merkle_proof = PartialMerkleTree::from_txids(&txids, &matches).ok()?;
        Some(Self {
            header: block.header.clone(),
            signature: block.signature.clone(),
            coinstake: Some(coinstake),
            merkle_proof,
            stake_modifier_v2: None,
        })
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn time(&self) -> u32 {
        self.header.time
    }

    /// Checks the embedded proof against the header's merkle root.
    pub fn merkle_proof_valid(&self) -> bool {
        match &self.coinstake {
            Some(coinstake) => self
                .merkle_proof
                .proves(&self.header.merkle_root, &coinstake.txid()),
            None => false,
        }
    }
}

impl Encodable for ProvenBlockHeader {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        Encodable::consensus_encode(&self.header, encoder);
        self.merkle_proof.consensus_encode(encoder);
        self.signature.consensus_encode(encoder);
        encoder.write_bool(self.coinstake.is_some());
        if let Some(coinstake) = &self.coinstake {
            Encodable::consensus_encode(coinstake, encoder);
        }
    }
}

impl Decodable for ProvenBlockHeader {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let header = BlockHeader::consensus_decode(decoder)?;
        let merkle_proof = PartialMerkleTree::consensus_decode(decoder)?;
        let signature = BlockSignature::consensus_decode(decoder)?;
        let coinstake = if decoder.read_bool()? {
            Some(<Transaction as Decodable>::consensus_decode(decoder)?)
        } else {
            None
        };
        Ok(Self {
            header,
            signature,
            coinstake,
            merkle_proof,
            stake_modifier_v2: None,
        })
    }
}
