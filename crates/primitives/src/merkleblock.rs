//! Merkle roots and partial merkle trees.
//!
//! A proven header carries a partial tree that proves its coinstake is a
//! leaf of the block's transaction tree.

use posd_consensus::constants::MAX_BLOCK_SIZE;
use posd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;

/// Upper bound on leaves, given the smallest transaction that fits in a block.
const MAX_TREE_LEAVES: u32 = MAX_BLOCK_SIZE / 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialMerkleTree {
    pub tx_count: u32,
    /// Depth-first traversal flags: set when the subtree holds a matched leaf.
    pub flags: Vec<bool>,
    pub hashes: Vec<Hash256>,
}

/// Level widths of a tree with `leaves` leaves.
#[derive(Clone, Copy)]
struct Shape {
    leaves: u64,
}

impl Shape {
    fn new(leaves: u32) -> Self {
        Self {
            leaves: u64::from(leaves),
        }
    }

    fn width(self, height: u32) -> u64 {
        if height >= 64 {
            return 0;
        }
        (self.leaves + (1u64 << height) - 1) >> height
    }

    fn height(self) -> u32 {
        (0..64).find(|&height| self.width(height) <= 1).unwrap_or(64)
    }

    fn has_right_child(self, height: u32, pos: u64) -> bool {
        pos * 2 + 1 < self.width(height - 1)
    }
}

impl PartialMerkleTree {
    /// Builds the proof for the leaves of `txids` flagged in `matches`.
    pub fn from_txids(txids: &[Hash256], matches: &[bool]) -> Result<Self, DecodeError> {
        if txids.len() != matches.len() {
            return Err(DecodeError::InvalidData("txids/matches length mismatch"));
        }
        let tx_count = u32::try_from(txids.len()).map_err(|_| DecodeError::SizeTooLarge)?;
        let mut tree = Self {
            tx_count,
            flags: Vec::new(),
            hashes: Vec::new(),
        };
        if tx_count > 0 {
            let shape = Shape::new(tx_count);
            tree.build(shape, shape.height(), 0, txids, matches);
        }
        Ok(tree)
    }

    fn build(&mut self, shape: Shape, height: u32, pos: u64, txids: &[Hash256], matches: &[bool]) {
        let first = (pos << height) as usize;
        let last = (((pos + 1) << height).min(shape.leaves)) as usize;
        let contains_match = matches[first..last].iter().any(|matched| *matched);
        self.flags.push(contains_match);

        if height == 0 || !contains_match {
            self.hashes.push(subtree_hash(shape, height, pos, txids));
            return;
        }
        self.build(shape, height - 1, pos * 2, txids, matches);
        if shape.has_right_child(height, pos) {
            self.build(shape, height - 1, pos * 2 + 1, txids, matches);
        }
    }

    /// Recomputes the root and collects the matched leaves. `None` when the
    /// tree is malformed or does not consume exactly its flags and hashes.
    pub fn extract_matches(&self) -> Option<(Hash256, Vec<Hash256>)> {
        if self.tx_count == 0
            || self.tx_count > MAX_TREE_LEAVES
            || self.hashes.len() > self.tx_count as usize
            || self.flags.len() < self.hashes.len()
        {
            return None;
        }
        let shape = Shape::new(self.tx_count);
        let mut walk = Walk {
            tree: self,
            shape,
            next_flag: 0,
            next_hash: 0,
            matched: Vec::new(),
        };
        let root = walk.visit(shape.height(), 0)?;

        // Only padding bits may be left over in the last flag byte.
        if walk.next_flag.div_ceil(8) != self.flags.len().div_ceil(8)
            || walk.next_hash != self.hashes.len()
        {
            return None;
        }
        Some((root, walk.matched))
    }

    /// True when the tree hashes up to `root` and `txid` is one of its matched leaves.
    pub fn proves(&self, root: &Hash256, txid: &Hash256) -> bool {
        self.extract_matches()
            .is_some_and(|(computed, matched)| computed == *root && matched.contains(txid))
    }
}

struct Walk<'a> {
    tree: &'a PartialMerkleTree,
    shape: Shape,
    next_flag: usize,
    next_hash: usize,
    matched: Vec<Hash256>,
}

impl Walk<'_> {
    fn visit(&mut self, height: u32, pos: u64) -> Option<Hash256> {
        let contains_match = *self.tree.flags.get(self.next_flag)?;
        self.next_flag += 1;

        if height == 0 || !contains_match {
            let hash = *self.tree.hashes.get(self.next_hash)?;
            self.next_hash += 1;
            if contains_match {
                self.matched.push(hash);
            }
            return Some(hash);
        }

        let left = self.visit(height - 1, pos * 2)?;
        if !self.shape.has_right_child(height, pos) {
            return Some(hash_pair(&left, &left));
        }
        let right = self.visit(height - 1, pos * 2 + 1)?;
        // Identical siblings would let two different leaf sets share a root.
        if right == left {
            return None;
        }
        Some(hash_pair(&left, &right))
    }
}

fn subtree_hash(shape: Shape, height: u32, pos: u64, txids: &[Hash256]) -> Hash256 {
    if height == 0 {
        return txids[pos as usize];
    }
    let left = subtree_hash(shape, height - 1, pos * 2, txids);
    if !shape.has_right_child(height, pos) {
        return hash_pair(&left, &left);
    }
    let right = subtree_hash(shape, height - 1, pos * 2 + 1, txids);
    hash_pair(&left, &right)
}

impl Encodable for PartialMerkleTree {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u32_le(self.tx_count);
        encoder.write_varint(self.hashes.len() as u64);
        self.hashes
            .iter()
            .for_each(|hash| encoder.write_hash_le(hash));

        let packed: Vec<u8> = self
            .flags
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |byte, (bit, set)| byte | (u8::from(*set) << bit))
            })
            .collect();
        encoder.write_var_bytes(&packed);
    }
}

impl Decodable for PartialMerkleTree {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let tx_count = decoder.read_u32_le()?;
        if tx_count > MAX_TREE_LEAVES {
            return Err(DecodeError::InvalidData("merkle tree leaf count out of range"));
        }

        let hash_count = usize::try_from(decoder.read_varint()?)
            .map_err(|_| DecodeError::SizeTooLarge)?;
        if hash_count > tx_count as usize {
            return Err(DecodeError::InvalidData("merkle tree has more hashes than leaves"));
        }
        let hashes = (0..hash_count)
            .map(|_| decoder.read_hash_le())
            .collect::<Result<Vec<_>, _>>()?;

        let packed = decoder.read_var_bytes()?;
        // A traversal visits at most 2 * leaves nodes.
        if packed.len() > (tx_count as usize * 2).div_ceil(8) {
            return Err(DecodeError::InvalidData("merkle tree flags too long"));
        }
        let flags = packed
            .iter()
            .flat_map(|byte| (0..8).map(move |bit| byte & (1 << bit) != 0))
            .collect();

        Ok(Self {
            tx_count,
            flags,
            hashes,
        })
    }
}

fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut joined = [0u8; 64];
    joined[..32].copy_from_slice(left);
    joined[32..].copy_from_slice(right);
    sha256d(&joined)
}

/// Merkle root of `txids`, plus whether any level paired a hash with an equal
/// sibling (the CVE-2012-2459 mutation).
pub fn merkle_root(txids: &[Hash256]) -> (Hash256, bool) {
    let Some(first) = txids.first() else {
        return ([0u8; 32], false);
    };
    if txids.len() == 1 {
        return (*first, false);
    }
    let mut level = txids.to_vec();
    let mut mutated = false;
    while level.len() > 1 {
        mutated |= level.chunks_exact(2).any(|pair| pair[0] == pair[1]);
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    (level[0], mutated)
}
