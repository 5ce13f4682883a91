//! Auction Bid State
//!
//! Running encrypted best bid for one auction. Created by the first
//! `init_auction_state`, rewritten by the MXE callback after every bid.

use anchor_lang::prelude::Pubkey;

use crate::cipher::CipherBlock;
use crate::codec::{concat_fixed, encode_u128_le, encode_u64_le, RecordReader, IDENTITY_CHUNKS};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionBidState {
    /// Parent auction (ledger `Auction` PDA)
    pub auction_id: Pubkey,
    /// Bids accepted so far
    pub bid_count: u64,
    /// Current best bid, never decrypted client-side
    pub encrypted_max_bid: CipherBlock,
    /// Current best bidder identity, four u64 chunks
    pub encrypted_winner: [CipherBlock; IDENTITY_CHUNKS],
    /// Nonce of the most recent encryption of this record
    pub nonce: u128,
    /// PDA bump
    pub bump: u8,
}

impl AuctionBidState {
    /// sha256("account:AuctionBidState")[0..8]
    pub const DISCRIMINATOR: [u8; 8] = [0xd5, 0x99, 0xa9, 0x8c, 0x0a, 0x94, 0x84, 0x52];

    pub const SEED: &'static [u8] = b"auction_bid_state";

    pub const SIZE: usize = 8 + // discriminator
        32 + // auction_id
        8 + // bid_count
        32 + // encrypted_max_bid
        32 * IDENTITY_CHUNKS + // encrypted_winner
        16 + // nonce
        1; // bump

    pub const AUCTION_ID_OFFSET: usize = 8;
    pub const BID_COUNT_OFFSET: usize = 40;
    pub const MAX_BID_OFFSET: usize = 48;
    pub const WINNER_OFFSET: usize = 80;
    pub const NONCE_OFFSET: usize = 208;
    pub const BUMP_OFFSET: usize = 224;

    pub fn decode(data: &[u8]) -> Result<Self> {
        let reader = RecordReader::new("AuctionBidState", data, Self::DISCRIMINATOR, Self::SIZE)?;

        let mut encrypted_winner = [[0u8; 32]; IDENTITY_CHUNKS];
        for (i, chunk) in encrypted_winner.iter_mut().enumerate() {
            *chunk = reader.bytes(Self::WINNER_OFFSET + i * 32)?;
        }

        Ok(Self {
            auction_id: reader.pubkey_at(Self::AUCTION_ID_OFFSET)?,
            bid_count: reader.u64_at(Self::BID_COUNT_OFFSET)?,
            encrypted_max_bid: reader.bytes(Self::MAX_BID_OFFSET)?,
            encrypted_winner,
            nonce: reader.u128_at(Self::NONCE_OFFSET)?,
            bump: reader.u8_at(Self::BUMP_OFFSET)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let winner = self.encrypted_winner.concat();
        concat_fixed(&[
            &Self::DISCRIMINATOR,
            self.auction_id.as_ref(),
            &encode_u64_le(self.bid_count),
            &self.encrypted_max_bid,
            &winner,
            &encode_u128_le(self.nonce),
            &[self.bump],
        ])
    }

    /// A record initialized ahead of a bid that never landed has no bids.
    pub fn has_bids(&self) -> bool {
        self.bid_count > 0
    }
}
