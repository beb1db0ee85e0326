//! Coin entries: what the UTXO set remembers about one output.

use posd_primitives::encoding::{DecodeError, Decoder, Encoder};
use posd_primitives::outpoint::OutPoint;
use posd_primitives::script::is_unspendable;
use posd_primitives::transaction::TxOut;

const FLAG_COINBASE: u8 = 1 << 0;
const FLAG_COINSTAKE: u8 = 1 << 1;

/// Consensus metadata captured when an output is created. Never mutated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Coins {
    pub height: u32,
    pub tx_out: TxOut,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
    /// Creating transaction's timestamp on proof-of-stake networks, else 0.
    pub time: u32,
}

impl Coins {
    pub fn new(height: u32, tx_out: TxOut, is_coinbase: bool, is_coinstake: bool, time: u32) -> Self {
        Self {
            height,
            tx_out,
            is_coinbase,
            is_coinstake,
            time,
        }
    }

    /// Outputs that can never be spent are not worth tracking.
    pub fn is_prunable(&self) -> bool {
        is_unspendable(&self.tx_out.script_pubkey)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_u32_le(self.height);
        let mut flags = 0u8;
        if self.is_coinbase {
            flags |= FLAG_COINBASE;
        }
        if self.is_coinstake {
            flags |= FLAG_COINSTAKE;
        }
        encoder.write_u8(flags);
        encoder.write_u32_le(self.time);
        encoder.write_i64_le(self.tx_out.value);
        encoder.write_var_bytes(&self.tx_out.script_pubkey);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let height = decoder.read_u32_le()?;
        let flags = decoder.read_u8()?;
        if flags & !(FLAG_COINBASE | FLAG_COINSTAKE) != 0 {
            return Err(DecodeError::InvalidData("unknown coin flags"));
        }
        let time = decoder.read_u32_le()?;
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self {
            height,
            tx_out: TxOut::new(value, script_pubkey),
            is_coinbase: flags & FLAG_COINBASE != 0,
            is_coinstake: flags & FLAG_COINSTAKE != 0,
            time,
        })
    }
}

/// An outpoint with its coin and the state the current validation attempt has
/// put it in. A spent entry is logically absent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    coins: Coins,
    spent: bool,
    /// True when the output was created while connecting the current block,
    /// false when it was loaded from storage.
    pub created_from_block: bool,
}

impl UnspentOutput {
    pub fn new(outpoint: OutPoint, coins: Coins) -> Self {
        Self {
            outpoint,
            coins,
            spent: false,
            created_from_block: false,
        }
    }

    pub fn created_from_block(outpoint: OutPoint, coins: Coins) -> Self {
        Self {
            created_from_block: true,
            ..Self::new(outpoint, coins)
        }
    }

    /// The coin, or `None` once spent.
    pub fn coins(&self) -> Option<&Coins> {
        (!self.spent).then_some(&self.coins)
    }

    pub fn is_spent(&self) -> bool {
        self.spent
    }

    /// Marks the entry spent. Returns `false` if it already was.
    #[must_use]
    pub fn spend(&mut self) -> bool {
        if self.spent {
            return false;
        }
        self.spent = true;
        true
    }
}
