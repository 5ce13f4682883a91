//! Binary codec for instruction payloads and account records
//!
//! There is no shared schema with the remote programs: every integer is
//! little-endian and every field sits at a fixed offset agreed with the
//! on-chain code. Record decoders live next to their types in `state`.

use anchor_lang::prelude::Pubkey;
use solana_sha256_hasher::hashv;

use crate::error::{BidClientError, Result};

/// Length of the Anchor type discriminator prefixing every record and
/// instruction payload
pub const DISCRIMINATOR_LEN: usize = 8;

/// Identity chunks carried through the MPC circuit (4 x u64 = 32 bytes)
pub const IDENTITY_CHUNKS: usize = 4;

pub fn encode_u64_le(value: u64) -> [u8; 8] {
    value.to_le_bytes()
}

pub fn encode_i64_le(value: i64) -> [u8; 8] {
    value.to_le_bytes()
}

/// u128 as two u64 little-endian words, low word first.
pub fn encode_u128_le(value: u128) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&encode_u64_le(value as u64));
    out[8..].copy_from_slice(&encode_u64_le((value >> 64) as u64));
    out
}

pub fn decode_u128_le(bytes: [u8; 16]) -> u128 {
    let mut low = [0u8; 8];
    let mut high = [0u8; 8];
    low.copy_from_slice(&bytes[..8]);
    high.copy_from_slice(&bytes[8..]);
    (u64::from_le_bytes(high) as u128) << 64 | u64::from_le_bytes(low) as u128
}

/// Concatenate fixed-width fields into one payload.
pub fn concat_fixed(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

/// Split a 32-byte identity into the four u64 words the circuit consumes.
pub fn identity_chunks(identity: &Pubkey) -> [u64; IDENTITY_CHUNKS] {
    let bytes = identity.to_bytes();
    let mut chunks = [0u64; IDENTITY_CHUNKS];
    for (i, chunk) in chunks.iter_mut().enumerate() {
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
        *chunk = u64::from_le_bytes(word);
    }
    chunks
}

pub fn identity_from_chunks(chunks: [u64; IDENTITY_CHUNKS]) -> Pubkey {
    let mut bytes = [0u8; 32];
    for (i, chunk) in chunks.iter().enumerate() {
        bytes[i * 8..(i + 1) * 8].copy_from_slice(&chunk.to_le_bytes());
    }
    Pubkey::new_from_array(bytes)
}

/// sha256("global:<name>")[0..8]
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    prefix8(&hashv(&[b"global:".as_slice(), name.as_bytes()]).to_bytes())
}

/// sha256("account:<Name>")[0..8]
pub fn account_discriminator(name: &str) -> [u8; 8] {
    prefix8(&hashv(&[b"account:".as_slice(), name.as_bytes()]).to_bytes())
}

/// Arcium computation definition offset: sha256(name)[0..4] as u32 LE
pub fn comp_def_offset(name: &str) -> u32 {
    let digest = hashv(&[name.as_bytes()]).to_bytes();
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

fn prefix8(digest: &[u8; 32]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Bounds-checked reads at fixed offsets of one record
pub struct RecordReader<'a> {
    record: &'static str,
    data: &'a [u8],
}

impl<'a> RecordReader<'a> {
    /// Check the discriminator and minimum length before any field is read.
    pub fn new(
        record: &'static str,
        data: &'a [u8],
        discriminator: [u8; 8],
        min_len: usize,
    ) -> Result<Self> {
        let min_len = min_len.max(DISCRIMINATOR_LEN);
        if data.len() < min_len {
            return Err(BidClientError::decode(
                record,
                format!("expected at least {min_len} bytes, got {}", data.len()),
            ));
        }
        if data[..DISCRIMINATOR_LEN] != discriminator {
            return Err(BidClientError::decode(
                record,
                format!(
                    "discriminator {} does not match {}",
                    hex::encode(&data[..DISCRIMINATOR_LEN]),
                    hex::encode(discriminator)
                ),
            ));
        }
        Ok(Self { record, data })
    }

    pub fn bytes<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let end = offset.checked_add(N).filter(|end| *end <= self.data.len());
        let end = end.ok_or_else(|| {
            BidClientError::decode(self.record, format!("field at {offset}+{N} out of bounds"))
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[offset..end]);
        Ok(out)
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.bytes::<1>(offset)?[0])
    }

    pub fn u64_at(&self, offset: usize) -> Result<u64> {
        Ok(u64::from_le_bytes(self.bytes(offset)?))
    }

    pub fn i64_at(&self, offset: usize) -> Result<i64> {
        Ok(i64::from_le_bytes(self.bytes(offset)?))
    }

    pub fn u128_at(&self, offset: usize) -> Result<u128> {
        Ok(decode_u128_le(self.bytes(offset)?))
    }

    pub fn pubkey_at(&self, offset: usize) -> Result<Pubkey> {
        Ok(Pubkey::new_from_array(self.bytes(offset)?))
    }

    /// Strict: only 0 and 1 are valid boolean bytes.
    pub fn bool_at(&self, offset: usize) -> Result<bool> {
        match self.u8_at(offset)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(BidClientError::decode(
                self.record,
                format!("boolean at offset {offset} holds {other}"),
            )),
        }
    }
}
