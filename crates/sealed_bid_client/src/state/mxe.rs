//! MXE account: the cluster's published x25519 key
//!
//! Only the prefix up to the utility keys is walked. Fields before it are
//! variable-width (Borsh `Option`s), so offsets are computed while reading.

use anchor_lang::prelude::Pubkey;

use crate::codec::{RecordReader, DISCRIMINATOR_LEN};
use crate::error::{BidClientError, Result};

/// sha256("account:MXEAccount")[0..8]
pub const MXE_ACCOUNT_DISCRIMINATOR: [u8; 8] = [0x67, 0x1a, 0x55, 0xfa, 0xb3, 0x9f, 0x11, 0x75];

pub const MXE_ACCOUNT_SEED: &[u8] = b"MXEAccount";

const RECORD: &str = "MXEAccount";

/// x25519 + ed25519 + elgamal (32 each) + 64-byte proof of encryption
const UTILITY_PUBKEYS_LEN: usize = 32 + 32 + 32 + 64;

const SET: u8 = 0;
const UNSET: u8 = 1;

/// Read the MXE x25519 key.
///
/// `Ok(None)` while keygen is still collecting node signatures.
pub fn decode_mxe_x25519_key(data: &[u8]) -> Result<Option<[u8; 32]>> {
    let reader = RecordReader::new(RECORD, data, MXE_ACCOUNT_DISCRIMINATOR, DISCRIMINATOR_LEN)?;
    let mut offset = DISCRIMINATOR_LEN;

    // cluster: Option<u32>
    offset = skip_option(&reader, offset, 4)?;
    // keygen_offset, key_recovery_init_offset
    offset += 8 + 8;
    // mxe_program_id
    offset += 32;
    // authority: Option<Pubkey>
    offset = skip_option(&reader, offset, 32)?;

    let tag = reader.u8_at(offset)?;
    offset += 1;
    let x25519: [u8; 32] = reader.bytes(offset)?;

    match tag {
        SET => Ok(Some(x25519)),
        UNSET => {
            let votes_at = offset + UTILITY_PUBKEYS_LEN;
            let votes = reader.bytes::<4>(votes_at).map(u32::from_le_bytes)? as usize;
            let mut all_signed = votes > 0;
            for i in 0..votes {
                all_signed &= reader.bool_at(votes_at + 4 + i)?;
            }
            Ok(all_signed.then_some(x25519))
        }
        other => Err(BidClientError::decode(
            RECORD,
            format!("utility key tag {other} at offset {}", offset - 1),
        )),
    }
}

fn skip_option(reader: &RecordReader<'_>, offset: usize, width: usize) -> Result<usize> {
    match reader.u8_at(offset)? {
        0 => Ok(offset + 1),
        1 => Ok(offset + 1 + width),
        other => Err(BidClientError::decode(
            RECORD,
            format!("option tag {other} at offset {offset}"),
        )),
    }
}

/// Serialize the prefix read by `decode_mxe_x25519_key`.
#[cfg(test)]
pub(crate) fn encode_mxe_account(
    cluster: Option<u32>,
    authority: Option<Pubkey>,
    x25519: [u8; 32],
    votes: Option<&[bool]>,
) -> Vec<u8> {
    let mut out = MXE_ACCOUNT_DISCRIMINATOR.to_vec();
    match cluster {
        Some(offset) => {
            out.push(1);
            out.extend_from_slice(&offset.to_le_bytes());
        }
        None => out.push(0),
    }
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(Pubkey::new_unique().as_ref());
    match authority {
        Some(key) => {
            out.push(1);
            out.extend_from_slice(key.as_ref());
        }
        None => out.push(0),
    }
    out.push(if votes.is_some() { UNSET } else { SET });
    out.extend_from_slice(&x25519);
    out.extend_from_slice(&[0u8; UTILITY_PUBKEYS_LEN - 32]);
    if let Some(votes) = votes {
        out.extend_from_slice(&(votes.len() as u32).to_le_bytes());
        out.extend(votes.iter().map(|v| *v as u8));
    }
    out
}
