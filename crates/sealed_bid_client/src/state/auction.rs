//! Ledger Auction record (owned by the sealed auction program)

use anchor_lang::prelude::Pubkey;

use crate::codec::{concat_fixed, encode_i64_le, encode_u64_le, RecordReader};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auction {
    pub seller: Pubkey,
    pub nft_mint: Pubkey,
    /// Lamports
    pub min_price: u64,
    pub end_time: i64,
    pub settled: bool,
    pub bid_count: u64,
    pub bump: u8,
}

impl Auction {
    /// sha256("account:Auction")[0..8], as published in the ledger IDL
    pub const DISCRIMINATOR: [u8; 8] = [218, 94, 247, 242, 126, 233, 131, 81];

    pub const SEED: &'static [u8] = b"auction";

    pub const SIZE: usize = 8 + // discriminator
        32 + // seller
        32 + // nft_mint
        8 + // min_price
        8 + // end_time
        1 + // settled
        8 + // bid_count
        1; // bump

    pub fn decode(data: &[u8]) -> Result<Self> {
        let reader = RecordReader::new("Auction", data, Self::DISCRIMINATOR, Self::SIZE)?;
        Ok(Self {
            seller: reader.pubkey_at(8)?,
            nft_mint: reader.pubkey_at(40)?,
            min_price: reader.u64_at(72)?,
            end_time: reader.i64_at(80)?,
            settled: reader.bool_at(88)?,
            bid_count: reader.u64_at(89)?,
            bump: reader.u8_at(97)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        concat_fixed(&[
            &Self::DISCRIMINATOR,
            self.seller.as_ref(),
            self.nft_mint.as_ref(),
            &encode_u64_le(self.min_price),
            &encode_i64_le(self.end_time),
            &[self.settled as u8],
            &encode_u64_le(self.bid_count),
            &[self.bump],
        ])
    }
}
