//! Instruction builders
//!
//! No generated client exists for the cross-program accounts involved, so
//! every payload is assembled by hand: 8-byte discriminator followed by
//! little-endian fields in the order the remote program reads them.

pub mod init_auction_state;
pub mod ledger;
pub mod reveal_winner;
pub mod submit_bid;

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::AccountMeta;

use crate::codec::{concat_fixed, encode_u128_le, encode_u64_le};
use crate::pda::ComputationAccounts;

pub use init_auction_state::init_auction_state;
pub use ledger::{
    finalize_no_winner, lock_bid_funds, reclaim_unsold, refund_loser, settle_auction, ArciumProof,
    SettleAccounts,
};
pub use reveal_winner::{reveal_winner, RevealWinnerArgs};
pub use submit_bid::{submit_bid, BidFields, SubmitBidArgs, BID_FIELD_COUNT};

/// Instruction discriminators for the sealed-bid MXE program
/// Computed as sha256("global:<instruction_name>")[0..8]
pub mod mxe_discriminators {
    /// init_auction_state: sha256("global:init_auction_state")[0..8]
    pub const INIT_AUCTION_STATE: [u8; 8] = [0x31, 0x73, 0x4b, 0xdf, 0x31, 0x3d, 0x4f, 0x72];
    /// submit_bid: sha256("global:submit_bid")[0..8]
    pub const SUBMIT_BID: [u8; 8] = [0x13, 0xa4, 0xed, 0xfe, 0x40, 0x8b, 0xed, 0x5d];
    /// reveal_winner: sha256("global:reveal_winner")[0..8]
    pub const REVEAL_WINNER: [u8; 8] = [0xea, 0xd1, 0xed, 0x6d, 0x10, 0xc4, 0x40, 0xfe];
}

/// Instruction discriminators for the sealed auction ledger program
pub mod ledger_discriminators {
    pub const LOCK_BID_FUNDS: [u8; 8] = [117, 76, 216, 205, 58, 48, 193, 109];
    pub const SETTLE_AUCTION: [u8; 8] = [246, 196, 183, 98, 222, 139, 46, 133];
    pub const FINALIZE_NO_WINNER: [u8; 8] = [96, 187, 244, 162, 223, 69, 153, 119];
    pub const REFUND_LOSER: [u8; 8] = [89, 15, 42, 234, 40, 156, 190, 136];
    /// reclaim_unsold: sha256("global:reclaim_unsold")[0..8]
    pub const RECLAIM_UNSOLD: [u8; 8] = [0x84, 0x30, 0xdc, 0xb0, 0x42, 0xdd, 0xc2, 0x0d];
}

/// Header shared by every queued computation:
/// `disc | computation_offset u64 | ephemeral_pubkey [32] | nonce u128`
pub(crate) fn computation_header(
    discriminator: &[u8; 8],
    computation_offset: u64,
    ephemeral_public_key: &[u8; 32],
    nonce: u128,
) -> Vec<u8> {
    concat_fixed(&[
        discriminator,
        &encode_u64_le(computation_offset),
        ephemeral_public_key,
        &encode_u128_le(nonce),
    ])
}

/// Arcium account list in the order the MXE program declares it.
pub(crate) fn computation_account_metas(
    payer: &Pubkey,
    accounts: &ComputationAccounts,
) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new(*payer, true),
        AccountMeta::new(accounts.sign_pda, false),
        AccountMeta::new_readonly(accounts.mxe_account, false),
        AccountMeta::new(accounts.mempool, false),
        AccountMeta::new(accounts.executing_pool, false),
        AccountMeta::new(accounts.computation, false),
        AccountMeta::new_readonly(accounts.comp_def, false),
        AccountMeta::new(accounts.cluster, false),
        AccountMeta::new(accounts.fee_pool, false),
        AccountMeta::new(accounts.clock, false),
        AccountMeta::new_readonly(anchor_lang::system_program::ID, false),
        AccountMeta::new_readonly(accounts.arcium_program, false),
    ]
}
