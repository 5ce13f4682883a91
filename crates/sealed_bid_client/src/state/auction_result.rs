//! Auction Result
//!
//! Plaintext outcome written by the `reveal_winner` callback. The record may
//! exist with `revealed == false` between the reveal request and the MPC
//! finalization.

use anchor_lang::prelude::Pubkey;

use crate::codec::{concat_fixed, encode_i64_le, encode_u64_le, RecordReader};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionResult {
    pub auction_id: Pubkey,
    pub revealed: bool,
    /// All-zero key = no valid winner
    pub winner: Pubkey,
    /// Lamports
    pub winning_amount: u64,
    /// Unix timestamp of the reveal callback
    pub revealed_at: i64,
    pub bump: u8,
}

impl AuctionResult {
    /// sha256("account:AuctionResult")[0..8]
    pub const DISCRIMINATOR: [u8; 8] = [0xb6, 0x69, 0x47, 0x71, 0xe4, 0x93, 0x75, 0x87];

    pub const SEED: &'static [u8] = b"auction_result";

    pub const SIZE: usize = 8 + // discriminator
        32 + // auction_id
        1 + // revealed
        32 + // winner
        8 + // winning_amount
        8 + // revealed_at
        1; // bump

    pub const AUCTION_ID_OFFSET: usize = 8;
    pub const REVEALED_OFFSET: usize = 40;
    pub const WINNER_OFFSET: usize = 41;
    pub const WINNING_AMOUNT_OFFSET: usize = 73;
    pub const REVEALED_AT_OFFSET: usize = 81;
    pub const BUMP_OFFSET: usize = 89;

    pub fn decode(data: &[u8]) -> Result<Self> {
        let reader = RecordReader::new("AuctionResult", data, Self::DISCRIMINATOR, Self::SIZE)?;
        Ok(Self {
            auction_id: reader.pubkey_at(Self::AUCTION_ID_OFFSET)?,
            revealed: reader.bool_at(Self::REVEALED_OFFSET)?,
            winner: reader.pubkey_at(Self::WINNER_OFFSET)?,
            winning_amount: reader.u64_at(Self::WINNING_AMOUNT_OFFSET)?,
            revealed_at: reader.i64_at(Self::REVEALED_AT_OFFSET)?,
            bump: reader.u8_at(Self::BUMP_OFFSET)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        concat_fixed(&[
            &Self::DISCRIMINATOR,
            self.auction_id.as_ref(),
            &[self.revealed as u8],
            self.winner.as_ref(),
            &encode_u64_le(self.winning_amount),
            &encode_i64_le(self.revealed_at),
            &[self.bump],
        ])
    }

    /// A zero-identity winner or a zero amount both mean no bid cleared the
    /// minimum price.
    pub fn has_valid_winner(&self) -> bool {
        self.winner != Pubkey::default() && self.winning_amount > 0
    }
}
