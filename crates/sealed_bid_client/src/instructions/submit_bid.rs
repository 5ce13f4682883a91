//! `submit_bid` payload
//!
//! Eleven cipher blocks in a fixed order agreed with the bid circuit:
//!
//! | slot  | field                         |
//! |-------|-------------------------------|
//! | 0     | current max bid               |
//! | 1..5  | current winner identity       |
//! | 5     | new bid (lamports)            |
//! | 6..10 | new bidder identity           |
//! | 10    | minimum price (lamports)      |
//!
//! Slots 0..5 are carried verbatim from the bid state, or encrypted zeros
//! on the first bid.

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};

use super::{computation_account_metas, computation_header, mxe_discriminators};
use crate::cipher::CipherBlock;
use crate::codec::{identity_chunks, IDENTITY_CHUNKS};
use crate::pda::ComputationAccounts;
use crate::state::AuctionBidState;

pub const BID_FIELD_COUNT: usize = 11;

pub const MAX_BID_SLOT: usize = 0;
pub const WINNER_SLOT: usize = 1;
pub const NEW_BID_SLOT: usize = 5;
pub const BIDDER_SLOT: usize = 6;
pub const MIN_PRICE_SLOT: usize = 10;

/// Carried slots owned by the bid state rather than this submission
pub const CARRIED_SLOTS: usize = NEW_BID_SLOT;

/// Plaintext inputs of one bid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidFields {
    pub bidder: Pubkey,
    pub amount: u64,
    pub min_price: u64,
}

impl BidFields {
    /// Values to encrypt, in slot order. Carried slots are zero.
    pub fn plaintext(&self) -> [u64; BID_FIELD_COUNT] {
        let mut values = [0u64; BID_FIELD_COUNT];
        values[NEW_BID_SLOT] = self.amount;
        values[BIDDER_SLOT..BIDDER_SLOT + IDENTITY_CHUNKS]
            .copy_from_slice(&identity_chunks(&self.bidder));
        values[MIN_PRICE_SLOT] = self.min_price;
        values
    }
}

/// Replace the carried slots with the ciphertexts of an existing bid state.
pub fn carry_forward(blocks: &mut [CipherBlock; BID_FIELD_COUNT], state: &AuctionBidState) {
    blocks[MAX_BID_SLOT] = state.encrypted_max_bid;
    blocks[WINNER_SLOT..WINNER_SLOT + IDENTITY_CHUNKS].copy_from_slice(&state.encrypted_winner);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitBidArgs {
    pub computation_offset: u64,
    pub ephemeral_public_key: [u8; 32],
    pub nonce: u128,
    pub blocks: [CipherBlock; BID_FIELD_COUNT],
}

impl SubmitBidArgs {
    pub fn encode(&self) -> Vec<u8> {
        let mut data = computation_header(
            &mxe_discriminators::SUBMIT_BID,
            self.computation_offset,
            &self.ephemeral_public_key,
            self.nonce,
        );
        for block in &self.blocks {
            data.extend_from_slice(block);
        }
        data
    }
}

pub fn submit_bid(
    mxe_program: &Pubkey,
    payer: &Pubkey,
    accounts: &ComputationAccounts,
    bid_state: &Pubkey,
    args: &SubmitBidArgs,
) -> Instruction {
    let mut metas = computation_account_metas(payer, accounts);
    metas.push(AccountMeta::new(*bid_state, false));

    Instruction {
        program_id: *mxe_program,
        accounts: metas,
        data: args.encode(),
    }
}
