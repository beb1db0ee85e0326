//! Consensus parameter definitions.

use crate::constants::STAKE_TIMESTAMP_MASK;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    /// Coinstake outputs are flagged as such only on proof-of-stake networks.
    pub is_proof_of_stake: bool,
    /// Last height at which a proof-of-work block is still acceptable.
    pub last_pow_block: u32,
    pub proof_of_stake_timestamp_mask: u32,
    pub stake_min_confirmations: u32,
    pub proven_headers_activation_height: u32,
    pub enforce_bip30: bool,
}

impl ConsensusParams {
    pub fn proven_headers_active(&self, height: u32) -> bool {
        height >= self.proven_headers_activation_height
    }

    pub fn is_pow_height(&self, height: u32) -> bool {
        height <= self.last_pow_block
    }

    /// Both the header and its coinstake must carry a timestamp with the mask bits cleared.
    pub fn check_stake_timestamp(&self, time: u32) -> bool {
        time & self.proof_of_stake_timestamp_mask == 0
    }
}

pub fn consensus_params(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => mainnet_consensus_params(),
        Network::Testnet => testnet_consensus_params(),
        Network::Regtest => regtest_consensus_params(),
    }
}

fn mainnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Mainnet,
        is_proof_of_stake: true,
        last_pow_block: 12_500,
        proof_of_stake_timestamp_mask: STAKE_TIMESTAMP_MASK,
        stake_min_confirmations: 50,
        proven_headers_activation_height: 1_400_000,
        enforce_bip30: true,
    }
}

fn testnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Testnet,
        stake_min_confirmations: 10,
        proven_headers_activation_height: 1_000_000,
        ..mainnet_consensus_params()
    }
}

fn regtest_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Regtest,
        stake_min_confirmations: 10,
        proven_headers_activation_height: 0,
        enforce_bip30: false,
        ..mainnet_consensus_params()
    }
}
