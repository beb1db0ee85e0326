//! Standard output script shapes used by staking.

use posd_consensus::constants::MAX_SCRIPT_SIZE;

pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

const COMPRESSED_PUBKEY_LEN: usize = 33;
const UNCOMPRESSED_PUBKEY_LEN: usize = 65;

/// Scripts that can never be satisfied. Outputs paying to them are pruned.
pub fn is_unspendable(script: &[u8]) -> bool {
    script.first() == Some(&OP_RETURN) || script.len() > MAX_SCRIPT_SIZE
}

pub fn is_pubkey_encoding(data: &[u8]) -> bool {
    match data.len() {
        COMPRESSED_PUBKEY_LEN => data[0] == 0x02 || data[0] == 0x03,
        UNCOMPRESSED_PUBKEY_LEN => data[0] == 0x04,
        _ => false,
    }
}

/// `<pubkey> OP_CHECKSIG`
pub fn p2pk_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = push_data(pubkey);
    script.push(OP_CHECKSIG);
    script
}

/// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// `OP_RETURN <data>`
pub fn op_return_script(data: &[u8]) -> Vec<u8> {
    let mut script = vec![OP_RETURN];
    script.extend_from_slice(&push_data(data));
    script
}

pub fn push_data(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 3);
    match data.len() {
        len @ 0..=0x4b => out.push(len as u8),
        len @ 0x4c..=0xff => {
            out.push(OP_PUSHDATA1);
            out.push(len as u8);
        }
        len => {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(len.min(u16::MAX as usize) as u16).to_le_bytes());
        }
    }
    out.extend_from_slice(data);
    out
}

/// Public key of a pay-to-pubkey script.
pub fn extract_p2pk_pubkey(script: &[u8]) -> Option<&[u8]> {
    let (&last, body) = script.split_last()?;
    if last != OP_CHECKSIG {
        return None;
    }
    let (pushed, rest) = read_push(body)?;
    (rest.is_empty() && is_pubkey_encoding(pushed)).then_some(pushed)
}

/// Public key published by an `OP_RETURN <pubkey>` staking output.
pub fn extract_op_return_pubkey(script: &[u8]) -> Option<&[u8]> {
    let (&first, body) = script.split_first()?;
    if first != OP_RETURN {
        return None;
    }
    let (pushed, _) = read_push(body)?;
    is_pubkey_encoding(pushed).then_some(pushed)
}

fn read_push(script: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&opcode, rest) = script.split_first()?;
    let (len, rest) = match opcode {
        0x01..=0x4b => (opcode as usize, rest),
        OP_PUSHDATA1 => {
            let (&len, rest) = rest.split_first()?;
            (len as usize, rest)
        }
        OP_PUSHDATA2 => {
            if rest.len() < 2 {
                return None;
            }
            (u16::from_le_bytes([rest[0], rest[1]]) as usize, &rest[2..])
        }
        _ => return None,
    };
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}
