//! Headers linked into a chain.

use std::sync::Arc;

use posd_consensus::Hash256;
use posd_primitives::block::BlockHeader;
use posd_primitives::proven::ProvenBlockHeader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderVariant {
    Plain(BlockHeader),
    Proven(Arc<ProvenBlockHeader>),
}

impl HeaderVariant {
    pub fn header(&self) -> &BlockHeader {
        match self {
            HeaderVariant::Plain(header) => header,
            HeaderVariant::Proven(proven) => &proven.header,
        }
    }
}

/// A header at a known height, sharing ownership of its ancestors.
#[derive(Clone, Debug)]
pub struct ChainedHeader {
    pub hash: Hash256,
    pub height: u32,
    pub header: HeaderVariant,
    pub previous: Option<Arc<ChainedHeader>>,
}

impl ChainedHeader {
    pub fn new(header: HeaderVariant, height: u32, previous: Option<Arc<ChainedHeader>>) -> Self {
        Self {
            hash: header.header().hash(),
            height,
            header,
            previous,
        }
    }

    pub fn plain(header: BlockHeader, height: u32, previous: Option<Arc<ChainedHeader>>) -> Self {
        Self::new(HeaderVariant::Plain(header), height, previous)
    }

    pub fn proven(
        header: ProvenBlockHeader,
        height: u32,
        previous: Option<Arc<ChainedHeader>>,
    ) -> Self {
        Self::new(HeaderVariant::Proven(Arc::new(header)), height, previous)
    }

    pub fn block_header(&self) -> &BlockHeader {
        self.header.header()
    }

    pub fn proven_header(&self) -> Option<&ProvenBlockHeader> {
        match &self.header {
            HeaderVariant::Proven(proven) => Some(proven),
            HeaderVariant::Plain(_) => None,
        }
    }

    pub fn previous(&self) -> Option<&ChainedHeader> {
        self.previous.as_deref()
    }

    /// Walks back to the ancestor at `height`, or `None` above this header or
    /// past the start of the linked chain.
    pub fn ancestor(&self, height: u32) -> Option<&ChainedHeader> {
        if height > self.height {
            return None;
        }
        let mut current = self;
        while current.height > height {
            current = current.previous()?;
        }
        (current.height == height).then_some(current)
    }
}
